//! Per-run deduplication of `METHOD URL` identity keys

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Record a key. Returns false if it was already present.
    pub fn mark(&mut self, key: impl Into<String>) -> bool {
        self.seen.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_and_mark() {
        let mut dedup = Deduplicator::new();
        assert!(!dedup.seen("GET https://example.test/api"));
        assert!(dedup.mark("GET https://example.test/api"));
        assert!(dedup.seen("GET https://example.test/api"));
        assert!(!dedup.mark("GET https://example.test/api"));

        // Method is part of the identity
        assert!(!dedup.seen("POST https://example.test/api"));
        assert_eq!(dedup.len(), 1);
    }
}
