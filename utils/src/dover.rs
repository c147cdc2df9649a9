use crate::Outcome;
use pipetag_tagging::{
    dover::{DOVER_METADATA_SECTION_NAME, DoverPolicy, parse_dover_metadata},
    range_file::RangeFileWriter,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};

pub fn dover_ranges(
    policy: DoverPolicy,
    metadata_section: PathBuf,
    range_file: PathBuf,
    compiler_generated: Option<String>,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let data = fs::read(&metadata_section)?;
    tracing::debug!(
        "Read {} bytes of {} from \"{}\"",
        data.len(),
        DOVER_METADATA_SECTION_NAME,
        metadata_section.display()
    );
    let ranges = parse_dover_metadata(&data, policy)?;

    let mut writer = RangeFileWriter::new(BufWriter::new(File::create(&range_file)?));
    ranges.write(&mut writer, compiler_generated.as_deref())?;
    writer.into_inner()?;

    tracing::info!(
        "Wrote {} {} ranges to \"{}\"",
        ranges.tagged.len(),
        policy,
        range_file.display()
    );

    Ok(Outcome::Complete)
}
