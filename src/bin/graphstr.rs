use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use graphstr::catalog;
use graphstr::cli::{AnalysisMode, Cli};
use graphstr::dispatch::{run_seeking, run_streaming, StreamingParams};
use graphstr::hts;
use graphstr::io::{json, vcf};
use graphstr::reference::FastaReference;
use graphstr::workflow::HeuristicParams;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let sample_name = cli.get_sample_name()?;
    let heuristics = HeuristicParams {
        region_extension_length: cli.region_extension_length,
        ..HeuristicParams::default()
    };

    // The alignment header defines the canonical contig table; catalog
    // coordinates and the reference are resolved against it.
    let reader = rust_htslib::bam::Reader::from_path(&cli.reads)
        .with_context(|| format!("Failed to open {}", cli.reads))?;
    let contig_info = hts::contig_info_from_header(rust_htslib::bam::Read::header(&reader));
    drop(reader);

    let reference = FastaReference::from_path(&cli.reference)?;
    let loci: Vec<Arc<_>> =
        catalog::load_catalog(&cli.variant_catalog, &contig_info, &reference, &heuristics, cli.permissive)?
            .into_iter()
            .map(Arc::new)
            .collect();

    let archive = Path::new(&cli.reads);
    let reference_path = Path::new(&cli.reference);
    let findings = match cli.analysis_mode {
        AnalysisMode::Seeking => run_seeking(
            archive,
            Some(reference_path),
            &contig_info,
            &loci,
            &heuristics,
            cli.sex,
            cli.threads,
        )?,
        AnalysisMode::Streaming => {
            let params = StreamingParams { threads: cli.threads, ..StreamingParams::default() };
            run_streaming(
                archive,
                Some(reference_path),
                &contig_info,
                &loci,
                &heuristics,
                cli.sex,
                &params,
            )?
        }
    };

    let json_path = format!("{}.json", cli.output_prefix);
    let mut json_writer = BufWriter::new(
        File::create(&json_path).with_context(|| format!("Failed to create {json_path}"))?,
    );
    json::write_json(&mut json_writer, &sample_name, cli.sex, &contig_info, &loci, &findings)?;
    info!("Wrote {json_path}");

    let vcf_path = format!("{}.vcf", cli.output_prefix);
    vcf::write_vcf(&vcf_path, &sample_name, &contig_info, &reference, &loci, &findings)?;
    info!("Wrote {vcf_path}");

    Ok(())
}
