//! # Alignment archive access
//!
//! Thin wrappers over htslib readers exposing the two iteration modes of the
//! pipeline: a sequential scan over all primary alignments (streaming mode)
//! and indexed region fetches with targeted mate recovery (seeking mode).
//! Records are decoded into [`MappedRead`]s with low-quality bases masked;
//! BAM contig ids are translated into the canonical contig indexes of the
//! reference so that every coordinate in the pipeline shares one namespace.
use std::path::Path;

use anyhow::Context;
use rust_htslib::bam::{self, Read as BamRead};

use crate::error::{Error, Result};
use crate::genome::ContigInfo;
use crate::reads::{mask_low_quality_bases, MappedRead, MateNumber, Read, ReadId};

/// Translation table from BAM contig ids to canonical contig indexes.
#[derive(Debug, Clone)]
pub struct TidMap {
    map: Vec<i32>,
}

impl TidMap {
    pub fn new(header: &bam::HeaderView, contig_info: &ContigInfo) -> Self {
        let map = (0..header.target_count())
            .map(|tid| {
                let name = String::from_utf8_lossy(header.tid2name(tid));
                contig_info.index(&name).map_or(-1, |index| index as i32)
            })
            .collect();
        TidMap { map }
    }

    pub fn canonical(&self, tid: i32) -> i32 {
        if tid < 0 {
            return -1;
        }
        self.map.get(tid as usize).copied().unwrap_or(-1)
    }
}

/// Build the canonical contig table straight from an alignment header.
pub fn contig_info_from_header(header: &bam::HeaderView) -> ContigInfo {
    let names_and_sizes = (0..header.target_count())
        .map(|tid| {
            let name = String::from_utf8_lossy(header.tid2name(tid)).to_string();
            let size = header.target_len(tid).unwrap_or(0);
            (name, size)
        })
        .collect();
    ContigInfo::new(names_and_sizes)
}

pub fn is_primary_alignment(record: &bam::Record) -> bool {
    !record.is_secondary() && !record.is_supplementary()
}

/// Decode one record, masking bases at or below the quality cutoff.
pub fn decode_mapped_read(
    record: &bam::Record,
    tid_map: &TidMap,
    quality_cutoff: u8,
) -> Result<MappedRead> {
    let fragment_id = std::str::from_utf8(record.qname())
        .map_err(|_| Error::RecordDecode("fragment id is not valid UTF-8".to_string()))?
        .to_string();
    if fragment_id.is_empty() {
        return Err(Error::RecordDecode("encountered an empty fragment id".to_string()));
    }

    let mate_number =
        if record.is_last_in_template() { MateNumber::Second } else { MateNumber::First };

    let mut sequence = record.seq().as_bytes();
    if sequence.is_empty() {
        return Err(Error::RecordDecode(format!("record {fragment_id} has no sequence")));
    }
    let qualities = record.qual();
    if qualities.len() == sequence.len() {
        mask_low_quality_bases(&mut sequence, qualities, quality_cutoff);
    }

    let read = Read::new(ReadId::new(fragment_id, mate_number), sequence, record.is_reverse());
    Ok(MappedRead::new(
        read,
        tid_map.canonical(record.tid()),
        record.pos(),
        record.mapq(),
        tid_map.canonical(record.mtid()),
        record.mpos(),
        record.is_paired(),
        !record.is_unmapped(),
        !record.is_mate_unmapped(),
    ))
}

/// Sequential scan over the aligned, primary records of an archive.
pub struct HtsStreamer {
    reader: bam::Reader,
    tid_map: TidMap,
    record: bam::Record,
    quality_cutoff: u8,
}

impl HtsStreamer {
    pub fn new<P: AsRef<Path>>(
        archive: P,
        reference: Option<&Path>,
        contig_info: &ContigInfo,
        quality_cutoff: u8,
    ) -> anyhow::Result<Self> {
        let archive = archive.as_ref();
        let mut reader = bam::Reader::from_path(archive)
            .with_context(|| format!("Failed to open {}", archive.display()))?;
        if let Some(reference) = reference {
            reader
                .set_reference(reference)
                .with_context(|| format!("Failed to attach reference for {}", archive.display()))?;
        }
        let tid_map = TidMap::new(reader.header(), contig_info);
        Ok(HtsStreamer { reader, tid_map, record: bam::Record::new(), quality_cutoff })
    }

    pub fn tid_map(&self) -> &TidMap {
        &self.tid_map
    }

    /// Advance to the next primary alignment. Returns `None` once the
    /// aligned portion of a coordinate-sorted archive is exhausted.
    pub fn next_primary(&mut self) -> Result<Option<MappedRead>> {
        while let Some(outcome) = self.reader.read(&mut self.record) {
            outcome.map_err(|error| Error::RecordDecode(error.to_string()))?;
            if self.record.tid() < 0 {
                // Unmapped reads are sorted to the tail of the archive.
                return Ok(None);
            }
            if is_primary_alignment(&self.record) {
                let read = decode_mapped_read(&self.record, &self.tid_map, self.quality_cutoff)?;
                return Ok(Some(read));
            }
        }
        Ok(None)
    }
}

/// Indexed access to an archive: per-region fetches plus targeted mate
/// recovery. Seeking-mode workers own one `HtsSeeker` each.
pub struct HtsSeeker {
    reader: bam::IndexedReader,
    tid_map: TidMap,
    quality_cutoff: u8,
}

impl HtsSeeker {
    pub fn new<P: AsRef<Path>>(
        archive: P,
        reference: Option<&Path>,
        contig_info: &ContigInfo,
        quality_cutoff: u8,
    ) -> anyhow::Result<Self> {
        let archive = archive.as_ref();
        let mut reader = bam::IndexedReader::from_path(archive)
            .with_context(|| format!("Failed to open {} with its index", archive.display()))?;
        if let Some(reference) = reference {
            reader
                .set_reference(reference)
                .with_context(|| format!("Failed to attach reference for {}", archive.display()))?;
        }
        let tid_map = TidMap::new(reader.header(), contig_info);
        Ok(HtsSeeker { reader, tid_map, quality_cutoff })
    }

    /// All primary alignments whose coordinate falls into `[start, end)` of
    /// the named contig.
    pub fn fetch(&mut self, contig_name: &str, start: i64, end: i64) -> Result<Vec<MappedRead>> {
        self.reader
            .fetch((contig_name, start, end))
            .map_err(|_| Error::RegionUnavailable(format!("{contig_name}:{start}-{end}")))?;

        let mut reads = Vec::new();
        let mut record = bam::Record::new();
        while let Some(outcome) = self.reader.read(&mut record) {
            outcome.map_err(|error| Error::RecordDecode(error.to_string()))?;
            if is_primary_alignment(&record) && !record.is_unmapped() {
                reads.push(decode_mapped_read(&record, &self.tid_map, self.quality_cutoff)?);
            }
        }
        Ok(reads)
    }

    /// Jump to the recorded mate coordinate of `read` and scan for the
    /// record completing the pair.
    pub fn extract_mate(
        &mut self,
        read: &MappedRead,
        contig_info: &ContigInfo,
    ) -> Result<Option<MappedRead>> {
        if !read.is_mate_mapped() || read.mate_contig_index() < 0 {
            return Ok(None);
        }
        let contig_name = contig_info.name(read.mate_contig_index() as usize)?.to_string();
        let candidates = self.fetch(&contig_name, read.mate_pos(), read.mate_pos() + 1)?;

        Ok(candidates.into_iter().find(|candidate| {
            candidate.fragment_id() == read.fragment_id()
                && candidate.read().id().mate_number() != read.read().id().mate_number()
                && candidate.pos() == read.mate_pos()
        }))
    }
}
