//! CLI entry point for the pagepress tool.

use std::num::NonZeroU32;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pagepress_core::pipeline::{self, PipelineConfig, RunSummary};
use pagepress_core::{Fetcher, SourceEntry};
use tracing::{debug, error, info};
use url::Url;

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    let config = build_config(&args);

    let summary = match args.command {
        Command::Single { url, output } => {
            pipeline::run_single(&config, &url, output.as_deref()).await?
        }
        Command::Multi { urls, combine } => {
            let entries = urls.into_iter().map(SourceEntry::new).collect();
            pipeline::run_urls(&config, entries, combine).await?
        }
        Command::File { path, combine } => {
            pipeline::run_url_file(&config, &path, combine).await?
        }
        Command::Manifest {
            path,
            base_url,
            combine,
        } => {
            let base = Url::parse(&base_url)
                .map_err(|e| anyhow::anyhow!("invalid base URL {base_url}: {e}"))?;
            pipeline::run_manifest(&config, &path, &base, combine).await?
        }
        Command::Dir {
            input_dir,
            recursive,
            combine,
        } => pipeline::run_directory(&config, &input_dir, recursive, combine).await?,
        Command::Check { url } => {
            let fetcher = Fetcher::with_timeout(config.output_dir.clone(), config.timeout);
            let (ok, detail) = fetcher.check(&url).await;
            if ok {
                info!(url, content_type = %detail, "URL serves a supported type");
            } else {
                info!(url, detail = %detail, "URL does not serve a supported type");
            }
            return Ok(ok);
        }
    };

    report_summary(&summary);
    Ok(summary.succeeded)
}

fn build_config(args: &Args) -> PipelineConfig {
    PipelineConfig {
        output_dir: args.output_dir.clone(),
        concurrency: usize::from(args.concurrency),
        timeout: std::time::Duration::from_secs(u64::from(args.timeout)),
        dpi: u32::from(args.dpi),
        workers: usize::from(args.workers),
        batch_size: usize::from(args.batch_size),
        max_pages: NonZeroU32::new(args.max_pages).unwrap_or(NonZeroU32::MIN),
        page_param: args.page_param.clone(),
        keep_images: args.keep_images,
        // The bar would garble piped/quiet output
        progress: !args.quiet && args.verbose == 0,
    }
}

fn report_summary(summary: &RunSummary) {
    info!(
        fetched = summary.fetched,
        fetch_failures = summary.fetch_failures,
        converted = summary.converted,
        conversion_failures = summary.conversion_failures,
        succeeded = summary.succeeded,
        "pagepress finished"
    );
    if let Some(report) = &summary.report_path {
        info!(report = %report.display(), "failure report available");
    }
}
