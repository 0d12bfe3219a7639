//! Harvester Core Library
//!
//! Crawls a paginated open-data portal with a headless browser, saves each
//! dataset's metadata, passes its gated download form (request details plus an
//! OCR-solved CAPTCHA), and bundles the result into one zip archive.
//!
//! # Architecture
//!
//! - [`session`] - page renderer traits and the Chromium implementation
//! - [`recognizer`] - CAPTCHA text recognition via tesseract
//! - [`discover`] - dataset links on numbered listing pages
//! - [`dataset`] - per-dataset processing, naming, and errors
//! - [`gate`] - the download request form state machine and staging
//! - [`archive`] - zip bundle of the output tree
//! - [`orchestrator`] - the full run
//! - [`report`] - JSON run summary
//! - [`config`] - settings and the optional config file
//! - [`wait`] - polling and retry primitives

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod dataset;
pub mod discover;
pub mod gate;
pub mod orchestrator;
pub mod recognizer;
pub mod report;
pub mod session;
pub mod wait;

// Re-export commonly used types
pub use archive::{ArchiveError, archive};
pub use config::{HarvestSettings, PortalLayout, RequesterIdentity, WaitSettings};
pub use dataset::{
    DatasetError, DatasetIssue, DatasetProcessor, DatasetRecord, DatasetReference,
    FailureCategory, sanitize_dataset_name,
};
pub use discover::{DiscoveryError, LinkDiscoverer};
pub use gate::{DownloadGate, GateOutcome, GateState, RelocatedArtifact};
pub use orchestrator::{HarvestError, Harvester, RunProgress};
pub use recognizer::{RecognizeError, TesseractRecognizer, TextRecognizer};
pub use report::{DatasetStatus, DatasetSummary, RunSummary, write_report};
pub use session::chromium::{BrowserOptions, ChromiumSession};
pub use session::{Locator, PageElement, PageSession, RenderError};
pub use wait::{FailureType, PollPolicy, RetryDecision, RetryPolicy};
