//! # Error types
//!
//! Failure kinds of the core analysis pipeline. Initialisation-time problems
//! (catalog parsing, graph construction, reference lookups) surface as
//! [`Error::InputMalformed`], [`Error::MalformedStructure`],
//! [`Error::FlankTooAmbiguous`] or [`Error::RegionUnavailable`] and abort the
//! run unless permissive mode is enabled. Runtime worker failures are captured
//! by the dispatch fabric and rethrown as [`Error::WorkerFailure`] after the
//! pool is joined.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed locus structure: {0}")]
    MalformedStructure(String),

    #[error("flanks can contain at most {limit} N characters but found {found}")]
    FlankTooAmbiguous { found: usize, limit: usize },

    #[error("malformed input: {0}")]
    InputMalformed(String),

    #[error("region {0} is not available in the reference")]
    RegionUnavailable(String),

    #[error("failed to decode alignment record: {0}")]
    RecordDecode(String),

    #[error("unable to recover the mate of fragment {0}")]
    MatePairUnrecoverable(String),

    #[error("worker thread failed: {0}")]
    WorkerFailure(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
