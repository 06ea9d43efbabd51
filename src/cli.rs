//! # Command line interface for `graphstr`
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use crate::genome::Sex;
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisMode {
    /// Jump to each locus through the archive index and recover broken mates
    /// with targeted seeks
    Seeking,
    /// Scan the archive once and route mate pairs through per-locus queues
    Streaming,
}

#[derive(Parser)]
#[command(
    name = "graphstr",
    author,
    version,
    about = "Sequence-graph STR and small-variant genotyping from short reads",
    long_about = None
)]
pub struct Cli {
    /// Coordinate-sorted and indexed alignment file (BAM or CRAM)
    #[arg(long)]
    pub reads: String,

    /// Reference genome. Expected format is FASTA with an index file right next to it
    #[arg(long)]
    pub reference: String,

    /// Variant catalog. Expected format is JSON
    #[arg(long)]
    pub variant_catalog: String,

    /// Prefix for the output files; <prefix>.json and <prefix>.vcf are written
    #[arg(long)]
    pub output_prefix: String,

    /// Sex of the sample; affects the analysis of sex-chromosome loci
    #[arg(long, value_enum, default_value_t = Sex::Female)]
    pub sex: Sex,

    /// How reads are pulled from the alignment file
    #[arg(long, value_enum, default_value_t = AnalysisMode::Seeking)]
    pub analysis_mode: AnalysisMode,

    /// Sample name. Inferred from the alignment file name when not set
    #[arg(long)]
    pub sample: Option<String>,

    /// Number of threads to use
    #[arg(long, default_value_t = 1, value_parser = threads_in_range)]
    pub threads: usize,

    /// Size of the reference flank added around each locus and its regions
    #[arg(long, default_value_t = 1000)]
    pub region_extension_length: usize,

    /// Skip loci whose reference sequence cannot be retrieved instead of failing
    #[arg(long, default_value_t = false)]
    pub permissive: bool,
}

impl Cli {
    pub fn get_sample_name(&self) -> Result<String> {
        if let Some(name) = &self.sample {
            return Ok(name.clone());
        }
        let name = utils::sample_name_from_path(&self.reads)?;
        info!("Inferring sample name from filename: {name}");
        Ok(name)
    }
}

fn threads_in_range(s: &str) -> Result<usize> {
    let threads = s
        .parse()
        .context("Could not parse value passed to --threads to integer")?;
    if threads < 1 {
        bail!("--threads must be at least 1");
    }
    Ok(threads)
}
