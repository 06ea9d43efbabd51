//! # Genomic coordinates
//!
//! [`GenomicRegion`] follows the 0-based half-open coordinate system used by
//! BAM records and the variant catalog. Contig names are translated to dense
//! indexes through [`ContigInfo`], which is built once from the alignment
//! header and shared read-only by all workers.
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// A half-open interval `[start, end)` on a contig identified by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenomicRegion {
    pub contig_index: usize,
    pub start: i64,
    pub end: i64,
}

impl GenomicRegion {
    pub fn new(contig_index: usize, start: i64, end: i64) -> Self {
        assert!(start <= end, "region start must not exceed end");
        GenomicRegion { contig_index, start, end }
    }

    pub fn length(&self) -> i64 {
        self.end - self.start
    }

    /// Widen the region by `length` bases on both sides, clamping at zero.
    pub fn extend(&self, length: i64) -> Self {
        GenomicRegion {
            contig_index: self.contig_index,
            start: (self.start - length).max(0),
            end: self.end + length,
        }
    }

    pub fn contains(&self, contig_index: usize, pos: i64) -> bool {
        self.contig_index == contig_index && self.start <= pos && pos < self.end
    }

    /// Whether `[start, end)` lies entirely inside this region.
    pub fn encloses(&self, contig_index: usize, start: i64, end: i64) -> bool {
        self.contig_index == contig_index && self.start <= start && end <= self.end
    }
}

/// Contig index <-> name translation plus contig lengths.
#[derive(Debug, Clone, Default)]
pub struct ContigInfo {
    names: Vec<String>,
    sizes: Vec<u64>,
    indexes: HashMap<String, usize>,
}

impl ContigInfo {
    pub fn new(names_and_sizes: Vec<(String, u64)>) -> Self {
        let mut info = ContigInfo::default();
        for (name, size) in names_and_sizes {
            info.indexes.insert(name.clone(), info.names.len());
            info.names.push(name);
            info.sizes.push(size);
        }
        info
    }

    pub fn num_contigs(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::RegionUnavailable(format!("contig index {index}")))
    }

    pub fn size(&self, index: usize) -> Result<u64> {
        self.sizes
            .get(index)
            .copied()
            .ok_or_else(|| Error::RegionUnavailable(format!("contig index {index}")))
    }

    pub fn index(&self, name: &str) -> Result<usize> {
        self.indexes
            .get(name)
            .copied()
            .ok_or_else(|| Error::RegionUnavailable(name.to_string()))
    }
}

/// Encode a region as `contig:start-end` with 0-based half-open coordinates.
pub fn encode_region(contig_info: &ContigInfo, region: &GenomicRegion) -> Result<String> {
    let name = contig_info.name(region.contig_index)?;
    Ok(format!("{}:{}-{}", name, region.start, region.end))
}

/// Decode a `contig:start-end` encoding produced by [`encode_region`].
pub fn decode_region(contig_info: &ContigInfo, encoding: &str) -> Result<GenomicRegion> {
    let malformed = || Error::InputMalformed(format!("unexpected region encoding: {encoding}"));

    let (name, interval) = encoding.rsplit_once(':').ok_or_else(malformed)?;
    let (start, end) = interval.split_once('-').ok_or_else(malformed)?;
    let start: i64 = start.parse().map_err(|_| malformed())?;
    let end: i64 = end.parse().map_err(|_| malformed())?;
    if start > end || start < 0 {
        return Err(malformed());
    }

    let contig_index = contig_info.index(name)?;
    Ok(GenomicRegion::new(contig_index, start, end))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sex {
    Female,
    Male,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "Female"),
            Sex::Male => write!(f, "Male"),
        }
    }
}

/// Expected number of locus copies carried by a sample, derived from the
/// contig the locus lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyNumberBySex {
    TwoInFemaleTwoInMale,
    TwoInFemaleOneInMale,
    ZeroInFemaleOneInMale,
}

impl CopyNumberBySex {
    pub fn from_contig(contig_name: &str) -> Self {
        match contig_name {
            "chrY" | "Y" => CopyNumberBySex::ZeroInFemaleOneInMale,
            "chrX" | "X" => CopyNumberBySex::TwoInFemaleOneInMale,
            _ => CopyNumberBySex::TwoInFemaleTwoInMale,
        }
    }

    pub fn allele_count(&self, sex: Sex) -> AlleleCount {
        match (self, sex) {
            (CopyNumberBySex::TwoInFemaleTwoInMale, _) => AlleleCount::Two,
            (CopyNumberBySex::TwoInFemaleOneInMale, Sex::Female) => AlleleCount::Two,
            (CopyNumberBySex::TwoInFemaleOneInMale, Sex::Male) => AlleleCount::One,
            (CopyNumberBySex::ZeroInFemaleOneInMale, Sex::Female) => AlleleCount::Zero,
            (CopyNumberBySex::ZeroInFemaleOneInMale, Sex::Male) => AlleleCount::One,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleCount {
    Zero = 0,
    One = 1,
    Two = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contig_info() -> ContigInfo {
        ContigInfo::new(vec![
            ("chr1".to_string(), 248_956_422),
            ("chrX".to_string(), 156_040_895),
        ])
    }

    #[test]
    fn region_codec_round_trips() {
        let info = contig_info();
        let region = GenomicRegion::new(1, 100, 200);
        let encoding = encode_region(&info, &region).unwrap();
        assert_eq!("chrX:100-200", encoding);
        assert_eq!(region, decode_region(&info, &encoding).unwrap());
    }

    #[test]
    fn decoding_unknown_contig_fails() {
        let info = contig_info();
        assert!(matches!(
            decode_region(&info, "chr7:1-2"),
            Err(Error::RegionUnavailable(_))
        ));
    }

    #[test]
    fn decoding_garbled_region_fails() {
        let info = contig_info();
        assert!(decode_region(&info, "chr1:5").is_err());
        assert!(decode_region(&info, "chr1:7-2").is_err());
    }

    #[test]
    fn copy_number_follows_contig_and_sex() {
        let rule = CopyNumberBySex::from_contig("chrX");
        assert_eq!(AlleleCount::Two, rule.allele_count(Sex::Female));
        assert_eq!(AlleleCount::One, rule.allele_count(Sex::Male));

        let rule = CopyNumberBySex::from_contig("Y");
        assert_eq!(AlleleCount::Zero, rule.allele_count(Sex::Female));

        let rule = CopyNumberBySex::from_contig("chr4");
        assert_eq!(AlleleCount::Two, rule.allele_count(Sex::Male));
    }

    #[test]
    fn extend_clamps_at_contig_start() {
        let region = GenomicRegion::new(0, 500, 600).extend(1000);
        assert_eq!(0, region.start);
        assert_eq!(1600, region.end);
    }
}
