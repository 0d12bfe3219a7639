//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use harvester_core::config::{
    DEFAULT_BASE_URL, DEFAULT_CAPTCHA_ATTEMPTS, DEFAULT_FIRST_PAGE, DEFAULT_LAST_PAGE,
    DEFAULT_OUTPUT_DIR,
};
use url::Url;

/// Harvest datasets from a paginated open-data portal.
///
/// Walks the catalog listing pages, saves each dataset's metadata, completes
/// its download request form (solving the CAPTCHA with tesseract), and bundles
/// everything into `<output-dir>.zip`.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored log output (also honors NO_COLOR and TERM=dumb)
    #[arg(long)]
    pub no_color: bool,

    /// Config file (default: $XDG_CONFIG_HOME/portal-harvester/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory; the bundle is written next to it
    #[arg(short = 'o', long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Catalog search URL; listing pages are `<base-url>?page=N`
    #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,

    /// First listing page to visit
    #[arg(long, default_value_t = DEFAULT_FIRST_PAGE, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub first_page: u32,

    /// Last listing page to visit (inclusive)
    #[arg(long, default_value_t = DEFAULT_LAST_PAGE, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub last_page: u32,

    /// Skip dataset links already seen on an earlier listing page
    #[arg(long)]
    pub dedupe: bool,

    /// Stop paging at the first listing page without datasets
    #[arg(long)]
    pub stop_on_empty_page: bool,

    /// CAPTCHA decode+submit attempts per dataset (1-10)
    #[arg(long, default_value_t = DEFAULT_CAPTCHA_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub captcha_attempts: u32,

    /// Chromium/Chrome binary (default: HARVESTER_CHROMIUM_PATH, then PATH)
    #[arg(long, value_name = "PATH")]
    pub chromium_path: Option<PathBuf>,

    /// tesseract binary (default: HARVESTER_TESSERACT_PATH, then PATH)
    #[arg(long, value_name = "PATH")]
    pub tesseract_path: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Don't write `<output-dir>.report.json`
    #[arg(long)]
    pub no_report: bool,
}
