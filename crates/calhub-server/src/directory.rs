//! Calendar directory: the slug to source list lookup.

use std::collections::HashMap;

use calhub_core::Calendar;

/// Yields the configured calendars.
///
/// The directory is already loaded when the aggregator is built; lookups are
/// synchronous and cheap.
pub trait CalendarDirectory: Send + Sync {
    /// Calendar configured under `slug`.
    fn calendar(&self, slug: &str) -> Option<Calendar>;

    /// Every configured slug, in declaration order.
    fn slugs(&self) -> Vec<String>;
}

/// A fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    calendars: Vec<Calendar>,
    index: HashMap<String, usize>,
}

impl StaticDirectory {
    /// Builds a directory. A later calendar with a duplicate slug replaces
    /// the earlier one.
    pub fn new(calendars: impl IntoIterator<Item = Calendar>) -> Self {
        let mut directory = Self::default();
        for calendar in calendars {
            directory.insert(calendar);
        }
        directory
    }

    pub fn insert(&mut self, calendar: Calendar) {
        match self.index.get(&calendar.slug) {
            Some(&i) => self.calendars[i] = calendar,
            None => {
                self.index.insert(calendar.slug.clone(), self.calendars.len());
                self.calendars.push(calendar);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }
}

impl CalendarDirectory for StaticDirectory {
    fn calendar(&self, slug: &str) -> Option<Calendar> {
        self.index.get(slug).map(|&i| self.calendars[i].clone())
    }

    fn slugs(&self) -> Vec<String> {
        self.calendars.iter().map(|c| c.slug.clone()).collect()
    }
}
