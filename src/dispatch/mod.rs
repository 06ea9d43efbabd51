//! # Read dispatch
//!
//! Routing of mate pairs from the archive to locus workflows. The analysis
//! runs in three phases: parallel locus initialisation, read dispatch
//! (streaming or seeking), and parallel finalisation. The data structures
//! built here (genome mask, interval trees) are immutable after construction
//! and shared read-only across workers.
pub mod finder;
pub mod mask;
pub mod queue;
pub mod seeking;
pub mod streaming;

pub use finder::{WorkflowBundle, WorkflowFinder};
pub use mask::GenomeMask;
pub use queue::{PairJob, ReadPairQueue};
pub use seeking::run_seeking;
pub use streaming::{run_streaming, StreamingParams};
