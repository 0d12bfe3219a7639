//! Merges CLI flags, the optional config file, and built-in defaults.
//!
//! Precedence: a value given on the command line, then the config file, then
//! the default. Whether a value came from the command line is read from clap's
//! `ValueSource`, so an explicit `--last-page 30` still beats the file.

use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use harvester_core::HarvestSettings;
use harvester_core::config::{FileConfig, load_config_file, load_default_file_config};
use tracing::debug;

use crate::cli::Args;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) output_dir: bool,
    pub(crate) base_url: bool,
    pub(crate) first_page: bool,
    pub(crate) last_page: bool,
    pub(crate) captcha_attempts: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    parse_cli_from(std::env::args_os()).unwrap_or_else(|err| err.exit())
}

pub(crate) fn parse_cli_from<I, T>(itr: I) -> Result<(Args, CliValueSources), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Args::command().try_get_matches_from(itr)?;
    let args = Args::from_arg_matches(&matches)?;

    let sources = CliValueSources {
        output_dir: is_commandline_value(&matches, "output_dir"),
        base_url: is_commandline_value(&matches, "base_url"),
        first_page: is_commandline_value(&matches, "first_page"),
        last_page: is_commandline_value(&matches, "last_page"),
        captcha_attempts: is_commandline_value(&matches, "captcha_attempts"),
        verbose: is_commandline_value(&matches, "verbose"),
        quiet: is_commandline_value(&matches, "quiet"),
    };
    Ok((args, sources))
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Reads `--config PATH` when given, otherwise the default location if it exists.
pub(crate) fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        let config = load_config_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
        return Ok(Some(config));
    }

    let loaded = load_default_file_config().context("Failed to load default config file")?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        debug!(path = %path.display(), "config file loaded");
    }
    Ok(loaded.config)
}

/// Builds effective run settings.
pub(crate) fn build_settings(
    args: &Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<HarvestSettings> {
    let mut settings = HarvestSettings::default();
    if let Some(file_config) = file_config {
        file_config.apply_to(&mut settings);
    }

    if cli_sources.output_dir || file_config.and_then(|f| f.output_dir.as_ref()).is_none() {
        settings.output_dir.clone_from(&args.output_dir);
    }
    if cli_sources.base_url || file_config.and_then(|f| f.base_url.as_ref()).is_none() {
        settings.base_url = args.base_url.clone();
    }
    if cli_sources.first_page {
        settings.first_page = args.first_page;
    }
    if cli_sources.last_page {
        settings.last_page = args.last_page;
    }
    if cli_sources.captcha_attempts {
        settings.captcha_attempts = args.captcha_attempts;
    }

    if args.dedupe {
        settings.dedupe_links = true;
    }
    if args.stop_on_empty_page {
        settings.stop_on_empty_page = true;
    }
    if args.headed {
        settings.browser.headless = false;
    }
    if args.no_report {
        settings.write_report = false;
    }
    if let Some(path) = &args.chromium_path {
        settings.browser.executable = Some(path.clone());
    }
    if let Some(path) = &args.tesseract_path {
        settings.tesseract_path = Some(path.clone());
    }

    if let Err(reason) = settings.validate() {
        bail!("Invalid effective settings: {reason}");
    }
    Ok(settings)
}

pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use harvester_core::config::file::parse_config_str;

    use super::*;

    fn parse(argv: &[&str]) -> (Args, CliValueSources) {
        parse_cli_from(argv.iter().copied()).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let (args, sources) = parse(&["harvester"]);
        let settings = build_settings(&args, &sources, None).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("telanganadatasets"));
        assert_eq!((settings.first_page, settings.last_page), (1, 30));
        assert!(settings.write_report);
        assert!(settings.browser.headless);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = parse_config_str(
            "output_dir = \"from-file\"\nlast_page = 4\nbase_url = \"https://portal.test/s/\"",
        )
        .unwrap();
        let (args, sources) = parse(&["harvester"]);
        let settings = build_settings(&args, &sources, Some(&file)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("from-file"));
        assert_eq!(settings.last_page, 4);
        assert_eq!(settings.base_url.as_str(), "https://portal.test/s/");
    }

    #[test]
    fn test_cli_overrides_file_even_when_equal_to_default() {
        let file = parse_config_str("last_page = 4\noutput_dir = \"from-file\"").unwrap();
        let (args, sources) = parse(&["harvester", "--last-page", "30", "-o", "cli-dir"]);
        assert!(sources.last_page);
        let settings = build_settings(&args, &sources, Some(&file)).unwrap();
        assert_eq!(settings.last_page, 30);
        assert_eq!(settings.output_dir, PathBuf::from("cli-dir"));
    }

    #[test]
    fn test_switches_apply_over_file() {
        let file = parse_config_str("dedupe_links = false\nwrite_report = true").unwrap();
        let (args, sources) = parse(&["harvester", "--dedupe", "--no-report", "--headed"]);
        let settings = build_settings(&args, &sources, Some(&file)).unwrap();
        assert!(settings.dedupe_links);
        assert!(!settings.write_report);
        assert!(!settings.browser.headless);
    }

    #[test]
    fn test_inverted_page_range_rejected() {
        let (args, sources) = parse(&["harvester", "--first-page", "5", "--last-page", "2"]);
        let error = build_settings(&args, &sources, None).unwrap_err();
        assert!(error.to_string().contains("last_page"), "{error}");
    }

    #[test]
    fn test_inverted_range_across_file_and_cli_rejected() {
        let file = parse_config_str("last_page = 3").unwrap();
        let (args, sources) = parse(&["harvester", "--first-page", "4"]);
        assert!(build_settings(&args, &sources, Some(&file)).is_err());
    }

    #[test]
    fn test_log_level_resolution() {
        let (args, sources) = parse(&["harvester"]);
        assert_eq!(resolve_default_log_level(&args), "info");
        assert!(!should_force_cli_log_level(&sources));

        let (args, sources) = parse(&["harvester", "-v"]);
        assert_eq!(resolve_default_log_level(&args), "debug");
        assert!(should_force_cli_log_level(&sources));

        let (args, _) = parse(&["harvester", "-vvv"]);
        assert_eq!(resolve_default_log_level(&args), "trace");

        let (args, _) = parse(&["harvester", "--quiet"]);
        assert_eq!(resolve_default_log_level(&args), "error");
    }

    #[test]
    fn test_load_file_config_explicit_missing_path_errors() {
        let error = load_file_config(Some(Path::new("/no/such/harvester.toml"))).unwrap_err();
        assert!(format!("{error:#}").contains("/no/such/harvester.toml"));
    }
}
