#![allow(non_snake_case)]

pub mod error;
pub mod params;

pub mod annotation;
pub mod cohort;
pub mod ctg;
pub mod evidence;
pub mod expression;
pub mod genome;
pub mod insertion;
pub mod io;
pub mod pipeline;
pub mod stats;

use log::info;

use crate::annotation::GeneIndex;
use crate::cohort::{CohortTable, write_insertions};
use crate::ctg::{CtgEngine, write_ctg};
use crate::evidence::read_evidence_files;
use crate::expression::{ExpressionCorrelator, ExpressionMatrix, write_expression};
use crate::genome::GenomeLayout;
use crate::insertion::CancelToken;
use crate::params::{Parameters, RunMode};
use crate::pipeline::{SampleProcessor, build_cohort, genome_layout};
use crate::stats::RunSummary;

/// Top-level dispatcher. Called from `main()` after CLI parsing.
pub fn run(params: &Parameters) -> anyhow::Result<()> {
    params.validate()?;

    info!("ruCTG v{}", env!("CARGO_PKG_VERSION"));
    info!("runMode: {}", params.run_mode);
    info!("runThreadN: {}", params.run_thread_n);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.run_thread_n)
        .build()?;

    pool.install(|| {
        let mut summary = RunSummary::default();
        let result = match params.run_mode {
            RunMode::Identify => identify(params, &mut summary).map(|_| ()),
            RunMode::Ctg => ctg(params, &mut summary),
        };
        summary.print_summary();
        result
    })
}

/// Load annotation and evidence, then cluster, annotate, merge and write
/// the cohort insertion table.
fn identify(params: &Parameters, summary: &mut RunSummary) -> anyhow::Result<(GeneIndex, CohortTable)> {
    info!(
        "evidenceFiles: {:?}",
        params
            .evidence_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
    );

    let gtf = params
        .gtf_file
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--gtfFile is required"))?;
    let index = GeneIndex::from_gtf(gtf)?;

    let samples = read_evidence_files(params.evidence_files.as_slice())?;
    let expected = params.expected_samples.unwrap_or(samples.len()).max(samples.len());
    *summary = RunSummary::new(expected);

    let cluster = params.cluster_config();
    let link = params.link_config();
    let processor = SampleProcessor::new(&cluster, &link, &index);
    let tokens: Vec<CancelToken> = samples.iter().map(|_| CancelToken::new()).collect();

    info!("Clustering and annotating {} samples...", samples.len());
    let table = build_cohort(&samples, &tokens, &processor, params.merge_config(), summary);

    write_insertions(&table, &params.out_file_name_prefix)?;
    Ok((index, table))
}

/// `identify`, then test genes for recurrent insertion and optionally
/// compare expression.
fn ctg(params: &Parameters, summary: &mut RunSummary) -> anyhow::Result<()> {
    let (index, table) = identify(params, summary)?;

    let genome = match &params.chrom_sizes {
        Some(path) => GenomeLayout::from_chrom_sizes(path)?,
        None => genome_layout(&index, &table),
    };
    info!(
        "Genome: {} chromosomes, {} bp",
        genome.n_chr(),
        genome.total_length()
    );

    let config = params.ctg_config();
    let outcome = CtgEngine::new(&index, &config).run(&table, &genome)?;
    for e in &outcome.degenerate {
        summary.record_error(e);
    }
    summary.genes_tested = outcome.calls.len() as u64;
    summary.significant_genes = outcome.n_significant(config.fdr_threshold) as u64;

    write_ctg(&outcome, config.fdr_threshold, &params.out_file_name_prefix)?;

    if let Some(path) = &params.expression_file {
        let matrix = ExpressionMatrix::from_tsv(path)?;
        let results = ExpressionCorrelator::new(&matrix).correlate(&outcome.calls, &table.samples);
        write_expression(&results, &params.out_file_name_prefix)?;
    }

    info!("CTG analysis complete!");
    Ok(())
}
