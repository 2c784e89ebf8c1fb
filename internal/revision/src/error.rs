use std::io;

use thiserror::Error;

/// Diagnostics surfaced to HTTP clients.
///
/// The display strings are part of the wire contract: clients and the
/// regression suite match on the exact text, so they must not be reworded.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found")]
    NotFound,

    #[error("no such file")]
    NoSuchFile,

    #[error("invalid file name")]
    InvalidFileName,

    #[error("invalid revision")]
    InvalidRevision,

    #[error("invalid revision database")]
    InvalidRevisionDatabase,

    #[error("invalid revision number")]
    InvalidRevisionNumber,

    #[error("invalid tag name")]
    InvalidTagName,

    #[error("invalid numeric tag name")]
    InvalidNumericTagName,

    #[error("cannot assign the all tag name")]
    CannotAssignAll,

    #[error("cannot assign the latest tag name")]
    CannotAssignLatest,

    #[error("cannot delete current")]
    CannotDeleteCurrent,

    #[error("Cannot delete latest")]
    CannotDeleteLatest,

    #[error("Cannot open for writing")]
    CannotOpenForWriting,

    #[error("Cannot write the data")]
    CannotWriteData,

    #[error("Cannot create link for the latest tag")]
    LatestLink,

    #[error("Cannot create link for the current tag")]
    CurrentLink,

    #[error("Cannot create link for default file")]
    DefaultLink,

    #[error("Cannot create the tag link")]
    TagLink,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
