//! # Graph alignment
//!
//! The aligner stack: alignment operations and graph alignments, the k-mer
//! seed index, the orientation predictor, and the seeded gapped aligner.
pub mod aligner;
pub mod alignment;
pub mod kmer_index;
pub mod operation;
pub mod orientation;

pub use aligner::{AlignerConfig, GraphAligner};
pub use alignment::{decode_graph_alignment, AlignmentParams, GraphAlignment, NodeAlignment};
pub use kmer_index::{GraphPosition, KmerIndex};
pub use operation::{Operation, OperationType};
pub use orientation::{predict_orientation, OrientationPrediction};
