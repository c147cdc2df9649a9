use crate::Outcome;
use itertools::Itertools;
use pipetag_metadata::{MetadataCache, PolicyMetadata, TagSet};
use pipetag_tagging::{
    TagMemoryMap,
    args::load_tag_args,
    tag_file::load_tags,
};
use std::{
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

pub fn dump(
    tag_file: PathBuf,
    policy_dir: Option<PathBuf>,
    args_file: Option<PathBuf>,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let cache = Arc::new(MetadataCache::new());

    let policy = policy_dir
        .map(|policy_dir| PolicyMetadata::from_policy_dir(policy_dir, &cache))
        .transpose()?;

    let mut map = TagMemoryMap::new(0, cache);
    load_tags(&mut map, &tag_file)?;

    let render = |tags: &TagSet| match &policy {
        Some(policy) => policy.render(tags),
        None => format!("{{{}}}", tags.tags().join(", ")),
    };

    let mut stdout = BufWriter::new(std::io::stdout().lock());

    for (range, tags) in map.iter() {
        writeln!(
            stdout,
            "{:#010x} {:#010x} {}",
            range.start,
            range.end,
            render(tags)
        )?;
    }

    if let Some(args_file) = args_file {
        let args = load_tag_args(args_file)?;

        for (address, values) in args.iter() {
            writeln!(stdout, "{:#010x} args {}", address, values.iter().join(" "))?;
        }
    }

    stdout.flush()?;

    Ok(Outcome::Complete)
}
