//! # Reference sequence access
//!
//! The analysis core only ever asks for uppercase sequence over half-open
//! coordinates; [`ReferenceSequence`] is that narrow seam. [`FastaReference`]
//! backs it with an indexed FASTA via htslib, and [`InMemoryReference`]
//! serves graph-construction tests without touching the filesystem.
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use rust_htslib::faidx;

use crate::error::{Error, Result};
use crate::genome::{ContigInfo, GenomicRegion};

pub trait ReferenceSequence {
    fn contig_info(&self) -> &ContigInfo;

    /// Uppercase sequence of `[start, end)` on the named contig.
    fn get_sequence(&self, contig_name: &str, start: i64, end: i64) -> Result<String>;

    fn get_region(&self, region: &GenomicRegion) -> Result<String> {
        let contig_name = self.contig_info().name(region.contig_index)?.to_string();
        self.get_sequence(&contig_name, region.start, region.end)
    }
}

pub struct FastaReference {
    reader: faidx::Reader,
    contig_info: ContigInfo,
}

impl FastaReference {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let reader = faidx::Reader::from_path(path)
            .with_context(|| format!("Failed to open reference {}", path.display()))?;

        let mut names_and_sizes = Vec::new();
        for index in 0..reader.n_seqs() {
            let name = reader
                .seq_name(index as i32)
                .with_context(|| format!("Failed to read contig names of {}", path.display()))?;
            let size = reader.fetch_seq_len(&name);
            names_and_sizes.push((name, size));
        }

        Ok(FastaReference { reader, contig_info: ContigInfo::new(names_and_sizes) })
    }
}

impl ReferenceSequence for FastaReference {
    fn contig_info(&self) -> &ContigInfo {
        &self.contig_info
    }

    fn get_sequence(&self, contig_name: &str, start: i64, end: i64) -> Result<String> {
        let unavailable = || Error::RegionUnavailable(format!("{contig_name}:{start}-{end}"));

        let contig_index = self.contig_info.index(contig_name)?;
        let size = self.contig_info.size(contig_index)? as i64;
        if start < 0 || end > size || start > end {
            return Err(unavailable());
        }
        if start == end {
            return Ok(String::new());
        }

        // htslib takes inclusive end coordinates.
        let sequence = self
            .reader
            .fetch_seq_string(contig_name, start as usize, end as usize - 1)
            .map_err(|_| unavailable())?;
        Ok(sequence.to_uppercase())
    }
}

/// Reference backed by in-memory contigs; intended for tests and synthetic
/// loci.
pub struct InMemoryReference {
    contigs: HashMap<String, String>,
    contig_info: ContigInfo,
}

impl InMemoryReference {
    pub fn new(contigs: Vec<(String, String)>) -> Self {
        let names_and_sizes = contigs
            .iter()
            .map(|(name, sequence)| (name.clone(), sequence.len() as u64))
            .collect();
        InMemoryReference {
            contig_info: ContigInfo::new(names_and_sizes),
            contigs: contigs.into_iter().collect(),
        }
    }
}

impl ReferenceSequence for InMemoryReference {
    fn contig_info(&self) -> &ContigInfo {
        &self.contig_info
    }

    fn get_sequence(&self, contig_name: &str, start: i64, end: i64) -> Result<String> {
        let unavailable = || Error::RegionUnavailable(format!("{contig_name}:{start}-{end}"));
        let contig = self.contigs.get(contig_name).ok_or_else(unavailable)?;
        if start < 0 || end > contig.len() as i64 || start > end {
            return Err(unavailable());
        }
        Ok(contig[start as usize..end as usize].to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_reference_serves_uppercase_slices() {
        let reference =
            InMemoryReference::new(vec![("chr1".to_string(), "aacCGGtt".to_string())]);
        assert_eq!("ACCGG", reference.get_sequence("chr1", 1, 6).unwrap());
        assert_eq!("", reference.get_sequence("chr1", 3, 3).unwrap());
    }

    #[test]
    fn out_of_range_requests_fail() {
        let reference = InMemoryReference::new(vec![("chr1".to_string(), "ACGT".to_string())]);
        assert!(matches!(
            reference.get_sequence("chr1", 0, 5),
            Err(Error::RegionUnavailable(_))
        ));
        assert!(reference.get_sequence("chr9", 0, 1).is_err());
    }
}
