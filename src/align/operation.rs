//! # Alignment operations
//!
//! Per-node alignments are CIGAR-like runs over `{M, X, I, D, S, N}`: match,
//! mismatch, insertion to the reference, deletion from the reference,
//! soft-clip, and missing bases. Missing bases are aligned columns whose
//! query base was masked for low quality; they consume both sequences but
//! carry no score.
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationType {
    Match,
    Mismatch,
    Insertion,
    Deletion,
    SoftClip,
    MissingBases,
}

impl OperationType {
    pub fn decode(encoding: char) -> Result<Self> {
        match encoding {
            'M' => Ok(OperationType::Match),
            'X' => Ok(OperationType::Mismatch),
            'I' => Ok(OperationType::Insertion),
            'D' => Ok(OperationType::Deletion),
            'S' => Ok(OperationType::SoftClip),
            'N' => Ok(OperationType::MissingBases),
            _ => Err(Error::InputMalformed(format!(
                "'{encoding}' is not an alignment operation"
            ))),
        }
    }

    pub fn encode(&self) -> char {
        match self {
            OperationType::Match => 'M',
            OperationType::Mismatch => 'X',
            OperationType::Insertion => 'I',
            OperationType::Deletion => 'D',
            OperationType::SoftClip => 'S',
            OperationType::MissingBases => 'N',
        }
    }

    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            OperationType::Match
                | OperationType::Mismatch
                | OperationType::Deletion
                | OperationType::MissingBases
        )
    }

    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            OperationType::Match
                | OperationType::Mismatch
                | OperationType::Insertion
                | OperationType::SoftClip
                | OperationType::MissingBases
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub op_type: OperationType,
    pub length: u32,
}

impl Operation {
    pub fn new(op_type: OperationType, length: u32) -> Self {
        Operation { op_type, length }
    }

    pub fn reference_length(&self) -> u32 {
        if self.op_type.consumes_reference() {
            self.length
        } else {
            0
        }
    }

    pub fn query_length(&self) -> u32 {
        if self.op_type.consumes_query() {
            self.length
        } else {
            0
        }
    }

    /// Decode a single `<length><op>` run, e.g. `3M`.
    pub fn decode(encoding: &str) -> Result<Self> {
        let malformed =
            || Error::InputMalformed(format!("'{encoding}' is not an alignment operation"));
        let op_char = encoding.chars().last().ok_or_else(malformed)?;
        let length: u32 = encoding[..encoding.len() - 1].parse().map_err(|_| malformed())?;
        Ok(Operation::new(OperationType::decode(op_char)?, length))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length, self.op_type.encode())
    }
}
