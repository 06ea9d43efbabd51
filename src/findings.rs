//! # Findings
//!
//! The structured results a locus workflow materialises when its input is
//! exhausted. Findings are plain data consumed by the JSON and VCF writers
//! through pattern matching.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::genotype::{PresenceStatus, RepeatGenotype, SmallVariantGenotype};
use crate::stats::LocusStats;

/// Tally of evidence per integer key (allele size in units, or node id).
/// Serialises as `"k1:v1,k2:v2"` in ascending key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    counts: BTreeMap<i64, u64>,
}

impl CountTable {
    pub fn new() -> Self {
        CountTable::default()
    }

    pub fn increment(&mut self, key: i64) {
        self.increment_by(key, 1);
    }

    pub fn increment_by(&mut self, key: i64, count: u64) {
        *self.counts.entry(key).or_insert(0) += count;
    }

    pub fn count_of(&self, key: i64) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn max_key(&self) -> Option<i64> {
        self.counts.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.counts.iter().map(|(&key, &count)| (key, count))
    }

    /// Sum of counts over all keys at or below `key`.
    pub fn count_at_or_below(&self, key: i64) -> u64 {
        self.counts.range(..=key).map(|(_, &count)| count).sum()
    }
}

impl fmt::Display for CountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iter().map(|(key, count)| format!("{key}:{count}")).join(","))
    }
}

impl FromStr for CountTable {
    type Err = Error;

    fn from_str(encoding: &str) -> Result<Self> {
        let mut table = CountTable::new();
        if encoding.is_empty() {
            return Ok(table);
        }
        for entry in encoding.split(',') {
            let (key, count) = entry.split_once(':').ok_or_else(|| {
                Error::InputMalformed(format!("'{encoding}' is not a count table"))
            })?;
            let key: i64 = key
                .parse()
                .map_err(|_| Error::InputMalformed(format!("bad count table key '{key}'")))?;
            let count: u64 = count
                .parse()
                .map_err(|_| Error::InputMalformed(format!("bad count '{count}'")))?;
            table.increment_by(key, count);
        }
        Ok(table)
    }
}

#[derive(Debug, Clone)]
pub struct StrFindings {
    pub counts_of_spanning_reads: CountTable,
    pub counts_of_flanking_reads: CountTable,
    pub counts_of_inrepeat_reads: CountTable,
    pub genotype: Option<RepeatGenotype>,
}

impl StrFindings {
    pub fn empty() -> Self {
        StrFindings {
            counts_of_spanning_reads: CountTable::new(),
            counts_of_flanking_reads: CountTable::new(),
            counts_of_inrepeat_reads: CountTable::new(),
            genotype: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmallVariantFindings {
    pub num_ref_reads: u64,
    pub num_alt_reads: u64,
    pub ref_allele_status: PresenceStatus,
    pub alt_allele_status: PresenceStatus,
    pub genotype: Option<SmallVariantGenotype>,
}

#[derive(Debug, Clone)]
pub enum VariantFindings {
    Str(StrFindings),
    SmallVariant(SmallVariantFindings),
}

#[derive(Debug, Clone)]
pub struct LocusFindings {
    pub stats: LocusStats,
    pub findings: BTreeMap<String, VariantFindings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_table_serialises_in_ascending_key_order() {
        let mut table = CountTable::new();
        table.increment(5);
        table.increment(2);
        table.increment(5);
        table.increment_by(11, 3);
        assert_eq!("2:1,5:2,11:3", table.to_string());
    }

    #[test]
    fn count_table_round_trips() {
        let encoding = "2:1,5:2,11:3";
        let table: CountTable = encoding.parse().unwrap();
        assert_eq!(encoding, table.to_string());
        assert_eq!(2, table.count_of(5));
        assert_eq!(6, table.total());
    }

    #[test]
    fn empty_count_table_round_trips() {
        let table: CountTable = "".parse().unwrap();
        assert!(table.is_empty());
        assert_eq!("", table.to_string());
    }

    #[test]
    fn garbled_count_tables_are_rejected() {
        assert!("5".parse::<CountTable>().is_err());
        assert!("a:1".parse::<CountTable>().is_err());
        assert!("1:b".parse::<CountTable>().is_err());
    }

    #[test]
    fn cumulative_counts_accumulate_below_key() {
        let table: CountTable = "2:1,5:2,11:3".parse().unwrap();
        assert_eq!(0, table.count_at_or_below(1));
        assert_eq!(3, table.count_at_or_below(5));
        assert_eq!(6, table.count_at_or_below(100));
    }
}
