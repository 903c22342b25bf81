//! Calendar slugs.

/// Derives a URL-safe slug from a display name.
///
/// Lowercases, turns every run of non-alphanumeric characters into a single
/// `-` and trims dashes from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Whether `slug` is a canonical slug (what [`slugify`] would produce).
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_slugs() {
        assert_eq!(slugify("Community Events"), "community-events");
        assert_eq!(slugify("  Parks & Rec!  "), "parks-rec");
        assert_eq!(slugify("2024 -- Schedule"), "2024-schedule");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
    }

    #[test]
    fn non_ascii_is_separator() {
        assert_eq!(slugify("Café Nights"), "caf-nights");
        assert_eq!(slugify("日本"), "");
    }

    #[test]
    fn validity() {
        assert!(is_valid_slug("community-events"));
        assert!(!is_valid_slug("Community"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("double--dash"));
        assert!(!is_valid_slug(""));
    }
}
