use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use harvester_core::{ChromiumSession, Harvester, RunSummary, TesseractRecognizer};
use tracing::{debug, info};

use crate::ProcessExit;
use crate::app::{config_runtime, exit_handler, progress, terminal};

pub(crate) async fn run_harvester() -> Result<ProcessExit> {
    let (args, cli_sources) = config_runtime::parse_cli_with_sources();

    let default_level = config_runtime::resolve_default_log_level(&args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);
    debug!(?args, "CLI arguments parsed");

    let file_config = config_runtime::load_file_config(args.config.as_deref())?;
    let settings = config_runtime::build_settings(&args, &cli_sources, file_config.as_ref())?;
    info!(
        base_url = %settings.base_url,
        pages = %format!("{}..={}", settings.first_page, settings.last_page),
        output = %settings.output_dir.display(),
        "Harvester starting"
    );

    let recognizer = TesseractRecognizer::locate(settings.tesseract_path.as_deref())
        .context("CAPTCHA recognition is unavailable")?;
    debug!(tesseract = %recognizer.binary().display(), "recognizer ready");

    let session = ChromiumSession::launch(&settings.browser)
        .await
        .context("Failed to start the browser")?;

    let harvester = Harvester::new(settings, Arc::new(recognizer));
    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let (spinner, stop) = progress::spawn_progress_ui(use_spinner, harvester.progress());

    let result = harvester.run(Box::new(session)).await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    let summary = result.context("Harvest failed")?;
    if !args.quiet {
        let settings = harvester.settings();
        let report = settings.write_report.then(|| settings.report_path());
        print_summary(&summary, report.as_deref());
    }

    Ok(exit_handler::determine_exit_outcome(
        summary.succeeded(),
        summary.failed(),
    ))
}

fn print_summary(summary: &RunSummary, report: Option<&Path>) {
    println!(
        "Harvested {} dataset(s) from {} page(s): {} complete, {} partial, {} failed",
        summary.datasets.len(),
        summary.pages_visited,
        summary.completed(),
        summary.partial(),
        summary.failed()
    );
    if summary.duplicates_skipped > 0 {
        println!("  Skipped {} duplicate link(s)", summary.duplicates_skipped);
    }
    if summary.pages_failed > 0 {
        println!("  {} listing page(s) could not be read", summary.pages_failed);
    }
    if let Some(bundle) = &summary.bundle {
        println!("  Bundle: {}", bundle.display());
    }
    if let Some(report) = report {
        println!("  Report: {}", report.display());
    }
}
