use crate::{
    Outcome,
    save::{load_existing_tags, save_tags_atomically},
};
use pipetag_metadata::{MetadataCache, PolicyMetadata};
use pipetag_tagging::{
    Address, TagMemoryMap,
    driver::tag_code,
    instruction::{ReaderInstructionStream, Rv32Decoder},
};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
    sync::Arc,
};

pub fn md_code(
    policy_dir: PathBuf,
    base_address: Address,
    code_address: Address,
    tag_file: PathBuf,
    input: Option<PathBuf>,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let cache = Arc::new(MetadataCache::new());
    let policy = PolicyMetadata::from_policy_dir(&policy_dir, &cache)?;

    let mut map = TagMemoryMap::new(base_address, cache);
    load_existing_tags(&mut map, &tag_file)?;

    tracing::info!(
        "base addr = {:#010x}, code addr = {:#010x}",
        map.base_address(),
        code_address
    );

    let input: Box<dyn Read> = match input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(std::io::stdin().lock()),
    };
    let mut stream = ReaderInstructionStream::new(BufReader::new(input));

    // Instructions without a group only produce warnings, they never fail the run
    tag_code(&mut map, &mut stream, &Rv32Decoder, &policy, code_address)?;

    save_tags_atomically(&map, &tag_file)?;

    Ok(Outcome::Complete)
}
