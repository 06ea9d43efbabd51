//! # Locus coverage statistics
//!
//! Depth and read length are estimated from two non-overlapping windows
//! flanking the locus. Only reads wholly contained in a window count, so the
//! estimate normalises by the number of start positions a read can take:
//! `depth = meanReadLength * numReads / sum(max(0, windowLen - meanReadLength))`.
use crate::genome::{AlleleCount, GenomicRegion};
use crate::reads::MappedRead;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocusStats {
    pub allele_count: AlleleCount,
    pub mean_read_length: u32,
    pub depth: f64,
}

impl LocusStats {
    pub fn haplotype_depth(&self) -> f64 {
        match self.allele_count {
            AlleleCount::Two => self.depth / 2.0,
            _ => self.depth,
        }
    }
}

/// Tallies reads landing in the stats windows of one locus.
#[derive(Debug, Clone)]
pub struct CountingModel {
    windows: Vec<GenomicRegion>,
    num_reads: u64,
    total_read_length: u64,
}

impl CountingModel {
    pub fn new(windows: Vec<GenomicRegion>) -> Self {
        CountingModel { windows, num_reads: 0, total_read_length: 0 }
    }

    pub fn windows(&self) -> &[GenomicRegion] {
        &self.windows
    }

    /// Count a read if its linear alignment lies wholly inside a window.
    pub fn inspect(&mut self, read: &MappedRead) {
        if read.contig_index() < 0 {
            return;
        }
        let contig_index = read.contig_index() as usize;
        let is_contained = self
            .windows
            .iter()
            .any(|window| window.encloses(contig_index, read.pos(), read.approximate_end()));
        if is_contained {
            self.num_reads += 1;
            self.total_read_length += read.sequence().len() as u64;
        }
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    pub fn mean_read_length(&self) -> u32 {
        if self.num_reads == 0 {
            return 0;
        }
        (self.total_read_length / self.num_reads) as u32
    }

    pub fn depth(&self) -> f64 {
        let mean_read_length = self.mean_read_length();
        if mean_read_length == 0 {
            return 0.0;
        }
        let num_start_positions: i64 = self
            .windows
            .iter()
            .map(|window| (window.length() - i64::from(mean_read_length)).max(0))
            .sum();
        if num_start_positions == 0 {
            return 0.0;
        }
        f64::from(mean_read_length) * self.num_reads as f64 / num_start_positions as f64
    }

    pub fn stats(&self, allele_count: AlleleCount) -> LocusStats {
        LocusStats {
            allele_count,
            mean_read_length: self.mean_read_length(),
            depth: self.depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::{MateNumber, Read, ReadId};
    use approx::assert_relative_eq;

    fn read_at(pos: i64, length: usize) -> MappedRead {
        let id = ReadId::new(format!("frag-{pos}"), MateNumber::First);
        let read = Read::new(id, vec![b'A'; length], false);
        MappedRead::new(read, 0, pos, 60, 0, pos + 200, true, true, true)
    }

    fn model() -> CountingModel {
        CountingModel::new(vec![
            GenomicRegion::new(0, 1000, 2000),
            GenomicRegion::new(0, 3000, 4000),
        ])
    }

    #[test]
    fn only_contained_reads_are_counted() {
        let mut model = model();
        model.inspect(&read_at(1100, 100));
        model.inspect(&read_at(3900, 100));
        // straddles the window boundary
        model.inspect(&read_at(1950, 100));
        // outside both windows
        model.inspect(&read_at(2500, 100));

        assert_eq!(2, model.num_reads());
        assert_eq!(100, model.mean_read_length());
    }

    #[test]
    fn depth_normalises_by_start_positions() {
        let mut model = model();
        for pos in (1000..1900).step_by(50) {
            model.inspect(&read_at(pos, 100));
        }
        // 18 reads of length 100 over 2 * (1000 - 100) start positions
        assert_relative_eq!(100.0 * 18.0 / 1800.0, model.depth());
    }

    #[test]
    fn depth_is_zero_without_reads() {
        let model = model();
        assert_relative_eq!(0.0, model.depth());
        assert_eq!(0, model.mean_read_length());
    }

    #[test]
    fn haplotype_depth_halves_diploid_coverage() {
        let stats =
            LocusStats { allele_count: AlleleCount::Two, mean_read_length: 100, depth: 30.0 };
        assert_relative_eq!(15.0, stats.haplotype_depth());

        let stats =
            LocusStats { allele_count: AlleleCount::One, mean_read_length: 100, depth: 30.0 };
        assert_relative_eq!(30.0, stats.haplotype_depth());
    }
}
