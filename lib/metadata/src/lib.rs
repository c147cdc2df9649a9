//! Pipetag Metadata
//!
//! Compact tag sets and the lookup machinery that turns symbolic policy names into them

/// Canonicalization of tag sets
mod cache;
/// Name to tag set lookup
pub mod factory;
/// The tag set itself
mod tag_set;

pub use cache::MetadataCache;
pub use factory::{MetadataFactory, PolicyConfig, PolicyError, PolicyMetadata};
pub use tag_set::{TAG_SET_WORDS, TagId, TagSet, TagSetError};
