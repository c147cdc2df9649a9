use crate::{Outcome, save::save_tags_atomically};
use pipetag_metadata::{MetadataCache, PolicyMetadata};
use pipetag_tagging::{Address, TagMemoryMap, driver::tag_ranges};
use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};

pub fn md_range(
    policy_dir: PathBuf,
    base_address: Address,
    range_file: PathBuf,
    tag_file: PathBuf,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let cache = Arc::new(MetadataCache::new());
    let policy = PolicyMetadata::from_policy_dir(&policy_dir, &cache)?;

    let mut map = TagMemoryMap::new(base_address, cache);
    tracing::info!("base addr = {:#010x}", map.base_address());

    let reader = BufReader::new(File::open(&range_file)?);
    let summary = tag_ranges(&mut map, reader, &policy)?;

    save_tags_atomically(&map, &tag_file)?;

    if summary.is_complete() {
        Ok(Outcome::Complete)
    } else {
        tracing::warn!(
            "{}: {} lines were skipped",
            range_file.display(),
            summary.failures.len()
        );

        Ok(Outcome::Partial)
    }
}
