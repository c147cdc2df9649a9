use clap::Parser;
use pipetag_tagging::{Address, dover::DoverPolicy, parse_address};
use std::{path::PathBuf, process::ExitCode};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod code;
mod dover;
mod dump;
mod range;
mod save;

/// How a command that produced output went
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Output was written but some inputs were skipped
    Partial,
}

/// Exit status for [Outcome::Partial]
const PARTIAL_EXIT_CODE: u8 = 2;

#[derive(Clone, Parser)]
#[clap(about = "Builds and inspects tag files for the policy validator")]
pub enum Cli {
    /// Reads a stream of binary instructions, applying metadata for each instruction related to
    /// the group of operations that instruction may represent
    MdCode {
        policy_dir: PathBuf,
        #[clap(value_parser = parse_address)]
        base_address: Address,
        #[clap(value_parser = parse_address)]
        code_address: Address,
        tag_file: PathBuf,
        /// Read instructions from this file instead of stdin
        #[clap(short, long)]
        input: Option<PathBuf>,
    },
    /// Applies the tags named in a range file
    MdRange {
        policy_dir: PathBuf,
        #[clap(value_parser = parse_address)]
        base_address: Address,
        range_file: PathBuf,
        tag_file: PathBuf,
    },
    /// Prints the contents of a tag file
    Dump {
        tag_file: PathBuf,
        /// Render tag names from this policy instead of ids
        #[clap(short, long)]
        policy: Option<PathBuf>,
        /// Also print the argument file
        #[clap(short, long)]
        args: Option<PathBuf>,
    },
    /// Turns a raw compiler metadata section into a range file
    DoverRanges {
        policy: DoverPolicy,
        metadata_section: PathBuf,
        range_file: PathBuf,
        /// Also emit compiler generated code extents under this tag
        #[clap(short, long)]
        compiler_generated: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let result = match args {
        Cli::MdCode {
            policy_dir,
            base_address,
            code_address,
            tag_file,
            input,
        } => code::md_code(policy_dir, base_address, code_address, tag_file, input),
        Cli::MdRange {
            policy_dir,
            base_address,
            range_file,
            tag_file,
        } => range::md_range(policy_dir, base_address, range_file, tag_file),
        Cli::Dump {
            tag_file,
            policy,
            args,
        } => dump::dump(tag_file, policy, args),
        Cli::DoverRanges {
            policy,
            metadata_section,
            range_file,
            compiler_generated,
        } => dover::dover_ranges(policy, metadata_section, range_file, compiler_generated),
    };

    match result {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Partial) => ExitCode::from(PARTIAL_EXIT_CODE),
        Err(error) => {
            tracing::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}
