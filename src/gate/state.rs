use std::fmt;

use serde::Serialize;

/// Steps of the download gate, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Waiting for the request form.
    FormPresent,
    /// Requester identity typed, usage type selected.
    FormFilled,
    /// CAPTCHA image saved to the dataset folder.
    CaptchaCaptured,
    /// Decoded text typed into the CAPTCHA input.
    CaptchaSolved,
    /// Form submitted; waiting for the browser download.
    Submitted,
    /// Downloaded files moved into the dataset folder.
    ArtifactRelocated,
}

impl GateState {
    #[must_use]
    pub fn step(self) -> &'static str {
        match self {
            Self::FormPresent => "form wait",
            Self::FormFilled => "form fill",
            Self::CaptchaCaptured => "captcha capture",
            Self::CaptchaSolved => "captcha solve",
            Self::Submitted => "submit",
            Self::ArtifactRelocated => "relocation",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step())
    }
}
