use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::Arc,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MetadataCache, TagId, TagSet, TagSetError};

/// File inside a policy directory describing its tags
pub const POLICY_METADATA_FILE_NAME: &str = "metadata.ron";

/// Turns symbolic names into tag sets
pub trait MetadataFactory {
    /// Tag set for a single symbolic tag name
    fn lookup_metadata(&self, name: &str) -> Option<Arc<TagSet>>;

    /// Tag set for the operation group an instruction mnemonic belongs to
    fn lookup_group_metadata(&self, mnemonic: &str) -> Option<Arc<TagSet>>;
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Could not read policy metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed policy metadata: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Tag \"{name}\" is unusable: {source}")]
    TagOutOfRange { name: String, source: TagSetError },
    #[error("Operation group for \"{mnemonic}\" references unknown tag \"{name}\"")]
    UnknownTag { mnemonic: String, name: String },
}

/// Policy description as emitted alongside a compiled policy
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct PolicyConfig {
    /// Symbolic tag name to tag id
    #[serde(default)]
    pub tags: BTreeMap<String, TagId>,
    /// Instruction mnemonic to the names of the tags its group carries
    #[serde(default)]
    pub opgroups: BTreeMap<String, Vec<String>>,
}

impl PolicyConfig {
    pub fn load(reader: impl Read) -> Result<Self, PolicyError> {
        Ok(ron::de::from_reader(reader)?)
    }
}

/// [MetadataFactory] backed by a [PolicyConfig]
#[derive(Debug)]
pub struct PolicyMetadata {
    tags: HashMap<String, Arc<TagSet>>,
    groups: HashMap<String, Arc<TagSet>>,
    names: BTreeMap<TagId, String>,
}

impl PolicyMetadata {
    pub fn new(config: PolicyConfig, cache: &MetadataCache) -> Result<Self, PolicyError> {
        let mut tags = HashMap::with_capacity(config.tags.len());
        let mut names = BTreeMap::new();

        for (name, id) in &config.tags {
            let set = TagSet::from_tags([*id]).map_err(|source| PolicyError::TagOutOfRange {
                name: name.clone(),
                source,
            })?;

            tags.insert(name.clone(), cache.canonize(set));
            names.entry(*id).or_insert_with(|| name.clone());
        }

        let mut groups = HashMap::with_capacity(config.opgroups.len());

        for (mnemonic, members) in config.opgroups {
            let mut set = TagSet::new();

            for name in members {
                let Some(member) = tags.get(&name) else {
                    return Err(PolicyError::UnknownTag { mnemonic, name });
                };

                set.insert_all(member);
            }

            groups.insert(mnemonic, cache.canonize(set));
        }

        tracing::debug!(
            "Loaded policy metadata with {} tags and {} operation groups",
            tags.len(),
            groups.len()
        );

        Ok(Self {
            tags,
            groups,
            names,
        })
    }

    /// Load [POLICY_METADATA_FILE_NAME] out of a policy directory
    pub fn from_policy_dir(
        policy_dir: impl AsRef<Path>,
        cache: &MetadataCache,
    ) -> Result<Self, PolicyError> {
        let path = policy_dir.as_ref().join(POLICY_METADATA_FILE_NAME);
        let config = PolicyConfig::load(BufReader::new(File::open(path)?))?;

        Self::new(config, cache)
    }

    /// Human readable form of a tag set, unknown tags show up as their id
    pub fn render(&self, tags: &TagSet) -> String {
        let rendered = tags
            .tags()
            .map(|id| match self.names.get(&id) {
                Some(name) => name.clone(),
                None => id.to_string(),
            })
            .join(", ");

        format!("{{{rendered}}}")
    }
}

impl MetadataFactory for PolicyMetadata {
    fn lookup_metadata(&self, name: &str) -> Option<Arc<TagSet>> {
        self.tags.get(name).cloned()
    }

    fn lookup_group_metadata(&self, mnemonic: &str) -> Option<Arc<TagSet>> {
        self.groups.get(mnemonic).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const POLICY: &str = r#"(
        tags: {
            "riscv.Ecall": 0,
            "osv.Code": 3,
            "osv.Branch": 7,
        },
        opgroups: {
            "ecall": ["riscv.Ecall", "osv.Code"],
            "beq": ["osv.Branch", "osv.Code"],
            "bne": ["osv.Code", "osv.Branch"],
        },
    )"#;

    fn policy(cache: &MetadataCache) -> PolicyMetadata {
        PolicyMetadata::new(ron::from_str(POLICY).unwrap(), cache).unwrap()
    }

    #[test]
    fn lookup_by_name() {
        let cache = MetadataCache::new();
        let policy = policy(&cache);

        let ecall = policy.lookup_metadata("riscv.Ecall").unwrap();
        assert_eq!(ecall.to_vec(), vec![0]);
        assert!(policy.lookup_metadata("riscv.Missing").is_none());
    }

    #[test]
    fn lookup_by_group() {
        let cache = MetadataCache::new();
        let policy = policy(&cache);

        let ecall = policy.lookup_group_metadata("ecall").unwrap();
        assert_eq!(ecall.to_vec(), vec![0, 3]);

        let beq = policy.lookup_group_metadata("beq").unwrap();
        let bne = policy.lookup_group_metadata("bne").unwrap();
        assert!(Arc::ptr_eq(&beq, &bne));

        assert!(policy.lookup_group_metadata("fence").is_none());
    }

    #[test]
    fn render_uses_names() {
        let cache = MetadataCache::new();
        let policy = policy(&cache);

        let tags = TagSet::from_tags([3, 0, 9]).unwrap();
        assert_eq!(policy.render(&tags), "{riscv.Ecall, osv.Code, 9}");
        assert_eq!(policy.render(&TagSet::new()), "{}");
    }

    #[test]
    fn unknown_group_member_is_rejected() {
        let config: PolicyConfig =
            ron::from_str(r#"(tags: { "a": 1 }, opgroups: { "add": ["a", "b"] })"#).unwrap();

        assert!(matches!(
            PolicyMetadata::new(config, &MetadataCache::new()),
            Err(PolicyError::UnknownTag { .. })
        ));
    }

    #[test]
    fn oversized_tag_id_is_rejected() {
        let config: PolicyConfig = ron::from_str(r#"(tags: { "huge": 100000 })"#).unwrap();

        assert!(matches!(
            PolicyMetadata::new(config, &MetadataCache::new()),
            Err(PolicyError::TagOutOfRange { .. })
        ));
    }

    #[test]
    fn load_from_directory() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join(POLICY_METADATA_FILE_NAME), POLICY).unwrap();

        let policy = PolicyMetadata::from_policy_dir(directory.path(), &MetadataCache::new());
        assert!(policy.unwrap().lookup_metadata("osv.Branch").is_some());

        let missing = PolicyMetadata::from_policy_dir(
            directory.path().join("nowhere"),
            &MetadataCache::new(),
        );
        assert!(matches!(missing, Err(PolicyError::Io(_))));
    }
}
