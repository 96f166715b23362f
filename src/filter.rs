use dashmap::DashSet;

/// Concurrent insert-if-absent set used for run-scoped deduplication.
///
/// Keys are lower-cased before insertion so lookups are case-insensitive.
#[derive(Debug, Default)]
pub struct StringFilter {
    seen: DashSet<String>,
}

impl StringFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the string, returning true when it was already present.
    pub fn duplicate(&self, s: &str) -> bool {
        !self.seen.insert(s.to_lowercase())
    }

    pub fn contains(&self, s: &str) -> bool {
        self.seen.contains(&s.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
