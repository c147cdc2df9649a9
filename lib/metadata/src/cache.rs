use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use nohash::BuildNoHashHasher;

use crate::TagSet;

/// Interns tag sets so that every value equal set is represented by one shared instance
///
/// A cache belongs to a single build or evaluation session, hand it to whoever needs it
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: Mutex<HashSet<Arc<TagSet>, BuildNoHashHasher<TagSet>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the canonical instance for this set
    pub fn canonize(&self, tags: TagSet) -> Arc<TagSet> {
        let mut entries = self.entries.lock().unwrap();

        if let Some(existing) = entries.get(&tags) {
            return existing.clone();
        }

        let tags = Arc::new(tags);
        entries.insert(tags.clone());

        tags
    }

    /// Number of distinct sets seen so far
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
