use pipetag_tagging::{
    TagMemoryMap,
    tag_file::{TagFileError, load_tags, write_tags},
};
use std::{io::BufWriter, path::Path};
use tempfile::NamedTempFile;

/// Replace `path` with the contents of `map`
///
/// The file is written next to its destination first and renamed over it, so readers never see
/// a partial tag file
pub fn save_tags_atomically(
    map: &TagMemoryMap,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temporary = NamedTempFile::new_in(directory)?;
    write_tags(map, BufWriter::new(temporary.as_file_mut()))?;
    temporary.as_file().sync_all()?;
    temporary.persist(path)?;

    tracing::info!("Wrote {} ranges to \"{}\"", map.len(), path.display());

    Ok(())
}

/// Load an existing tag file into `map`, a missing one just means starting fresh
pub fn load_existing_tags(map: &mut TagMemoryMap, path: &Path) -> Result<(), TagFileError> {
    match load_tags(map, path) {
        Ok(count) => {
            tracing::info!("Merging into {} existing ranges from \"{}\"", count, path.display());
            Ok(())
        }
        Err(TagFileError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("\"{}\" does not exist yet, starting empty", path.display());
            Ok(())
        }
        Err(error) => Err(error),
    }
}
