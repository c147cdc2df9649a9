use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    sync::Arc,
};

use thiserror::Error;

use crate::{Address, parse_address};

/// Shared argument list, every address a line covers holds the same one
pub type TagArgs = Arc<[u32]>;

/// Tokens a line needs at minimum, start, end and one argument
const MINIMUM_TOKENS: usize = 3;

#[derive(Error, Debug)]
pub enum ArgFileError {
    #[error("Could not read argument file: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgLineError {
    #[error("Line {line}: expected at least {MINIMUM_TOKENS} items, found {found}")]
    TokenCount { line: usize, found: usize },
    #[error("Line {line}: \"{token}\" is not a valid number")]
    BadNumber { line: usize, token: String },
}

/// Word aligned address to the arguments attached to it
#[derive(Debug, Default, Clone)]
pub struct TagArgMap {
    entries: BTreeMap<Address, TagArgs>,
}

impl TagArgMap {
    pub fn get(&self, address: Address) -> Option<&TagArgs> {
        self.entries.get(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, &TagArgs)> {
        self.entries.iter().map(|(address, args)| (*address, args))
    }

    /// Attach `args` to every aligned word in `start..end`, addresses already set keep theirs
    fn insert_range(&mut self, start: Address, end: Address, args: TagArgs) {
        let Some(first) = start.checked_add(0b11).map(|address| address & !0b11) else {
            return;
        };

        for address in (first..end).step_by(4) {
            self.entries.entry(address).or_insert_with(|| args.clone());
        }
    }
}

type ArgLine = (Address, Address, TagArgs);

fn parse_line(line_number: usize, line: &str) -> Result<Option<ArgLine>, ArgLineError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if tokens.is_empty() || tokens[0].starts_with('#') {
        return Ok(None);
    }

    if tokens.len() < MINIMUM_TOKENS {
        return Err(ArgLineError::TokenCount {
            line: line_number,
            found: tokens.len(),
        });
    }

    let bad_number = |token: &str| ArgLineError::BadNumber {
        line: line_number,
        token: token.to_string(),
    };

    let start = parse_address(tokens[0]).map_err(|_| bad_number(tokens[0]))?;
    let end = parse_address(tokens[1]).map_err(|_| bad_number(tokens[1]))?;

    let args = tokens[2..]
        .iter()
        .map(|token| token.parse::<u32>().map_err(|_| bad_number(token)))
        .collect::<Result<TagArgs, _>>()?;

    Ok(Some((start, end, args)))
}

/// Parse an argument file
///
/// Lines are `<hex start> <hex end> <decimal arg>...`. Malformed lines are handed back alongside
/// the map instead of failing the whole read, only I/O problems are fatal.
pub fn read_tag_args(reader: impl BufRead) -> Result<(TagArgMap, Vec<ArgLineError>), ArgFileError> {
    let mut map = TagArgMap::default();
    let mut problems = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;

        match parse_line(index + 1, &line) {
            Ok(Some((start, end, args))) => map.insert_range(start, end, args),
            Ok(None) => {}
            Err(problem) => problems.push(problem),
        }
    }

    Ok((map, problems))
}

/// Load an argument file, logging malformed lines
///
/// A missing file is not an error, it simply means nothing carries arguments
pub fn load_tag_args(path: impl AsRef<Path>) -> Result<TagArgMap, ArgFileError> {
    let path = path.as_ref();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                "Argument file \"{}\" not found, no arguments set",
                path.display()
            );
            return Ok(TagArgMap::default());
        }
        Err(error) => return Err(error.into()),
    };

    let (map, problems) = read_tag_args(BufReader::new(file))?;

    for problem in &problems {
        tracing::warn!("{}: {}", path.display(), problem);
    }

    tracing::debug!(
        "Loaded arguments for {} addresses from \"{}\"",
        map.len(),
        path.display()
    );

    Ok(map)
}
