use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trigger::TriggerCode;

/// Class of an oddball stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    Target,
    Deviant,
}

impl StimulusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StimulusKind::Target => "target",
            StimulusKind::Deviant => "deviant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "target" => Some(StimulusKind::Target),
            "deviant" => Some(StimulusKind::Deviant),
            _ => None,
        }
    }

    pub fn is_deviant(&self) -> bool {
        matches!(self, StimulusKind::Deviant)
    }
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered tone: its class, pitch and the trigger code marking its onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub kind: StimulusKind,
    pub frequency: f64,
    pub code: TriggerCode,
}

impl Stimulus {
    /// Key under which the stimulus is registered, e.g. `target/1000`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.frequency)
    }
}

impl fmt::Display for Stimulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz {} (trigger {})", self.frequency, self.kind, self.code)
    }
}
