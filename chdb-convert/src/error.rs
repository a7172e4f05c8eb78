use std::path::PathBuf;

use crate::conversion::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("line {line}: {source}")]
    Decode {
        line: u64,
        #[source]
        source: DecodeError,
    },

    #[error("prefix {prefix:#x} does not fit in 24 bits")]
    Range { prefix: u32 },

    #[error("line {line}: prefix {prefix:06X} follows {previous:06X}, input must be sorted by prefix")]
    OrderingViolation { line: u64, previous: u32, prefix: u32 },

    #[error("more than {} records, the index cannot address them", u32::MAX)]
    CountOverflow,

    #[error("Cannot open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
