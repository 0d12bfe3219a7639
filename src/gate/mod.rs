//! Download gate: request form, CAPTCHA, submit, and artifact relocation.

mod staging;
mod state;
mod workflow;

pub use staging::{RelocatedArtifact, StagingArea, relocate_all, wait_for_download};
pub use state::GateState;
pub use workflow::{CAPTCHA_FILE_NAME, DownloadGate, GateOutcome, GateRun};
