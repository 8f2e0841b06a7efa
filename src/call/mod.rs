//! Variant calling from alignment records.

pub mod intra;
pub mod schema;
pub mod sink;

use std::path::PathBuf;

/// Variant call source tag stamped on every row produced here.
pub const CALL_SOURCE: &str = "INTRA";

/// Error type for the variant calling pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Align(#[from] crate::align::Error),
    #[error(transparent)]
    Score(#[from] crate::align::score::Error),
    #[error(transparent)]
    Seq(#[from] crate::seq::Error),
    #[error(transparent)]
    Kde(#[from] crate::kde::Error),
    #[error(transparent)]
    Kmer(#[from] crate::kmer::Error),
    #[error("temporary directory does not exist or is not a directory: {0}")]
    MissingTempDir(PathBuf),
    #[error("could not write spill file {path}: {source}")]
    SpillWrite {
        path: PathBuf,
        #[source]
        source: arrow2::error::Error,
    },
    #[error("could not read spill file {path}: {source}")]
    SpillRead {
        path: PathBuf,
        #[source]
        source: arrow2::error::Error,
    },
    #[error("spill file I/O failed for {path}: {source}")]
    SpillIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
