//! Trigger codes and the registry resolving stimuli and blocks to codes.
//!
//! The registry is built once from a [`TriggerTable`] and is immutable
//! afterwards. Every code it hands out has been validated: non-zero and used
//! by exactly one stimulus or block boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stimulus::{Stimulus, StimulusKind};

const FREQUENCY_TOLERANCE: f64 = 1e-6;

/// Marker value written to the recording equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TriggerCode(u8);

impl TriggerCode {
    pub fn new(code: u8) -> Option<Self> {
        (code != 0).then_some(Self(code))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for TriggerCode {
    type Error = &'static str;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::new(code).ok_or("trigger codes must be strictly positive")
    }
}

impl From<TriggerCode> for u8 {
    fn from(code: TriggerCode) -> u8 {
        code.0
    }
}

impl fmt::Display for TriggerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw trigger table as found in the configuration file.
///
/// `stimuli` maps `<kind>/<frequency>` keys to codes, `blocks` maps the name of
/// a non-stimulus block to its `[start, stop]` codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerTable {
    pub stimuli: BTreeMap<String, u8>,
    pub blocks: BTreeMap<String, [u8; 2]>,
}

impl Default for TriggerTable {
    fn default() -> Self {
        let frequencies = [250, 500, 1000, 2000];
        let mut stimuli = BTreeMap::new();
        for (i, freq) in frequencies.iter().enumerate() {
            stimuli.insert(format!("target/{freq}"), 1 + i as u8);
            stimuli.insert(format!("deviant/{freq}"), 11 + i as u8);
        }
        let mut blocks = BTreeMap::new();
        blocks.insert("baseline".to_string(), [101, 102]);
        Self { stimuli, blocks }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTriggers {
    pub start: TriggerCode,
    pub stop: TriggerCode,
}

/// Validated, immutable lookup from stimuli and blocks to trigger codes.
#[derive(Debug, Clone)]
pub struct TriggerRegistry {
    stimuli: Vec<Stimulus>,
    blocks: BTreeMap<String, BlockTriggers>,
}

impl TriggerRegistry {
    pub fn new(table: &TriggerTable) -> Result<Self, ConfigError> {
        let mut owners: BTreeMap<u8, String> = BTreeMap::new();
        let mut claim = |code: u8, key: String| -> Result<TriggerCode, ConfigError> {
            let trigger = TriggerCode::new(code).ok_or_else(|| ConfigError::ZeroCode {
                key: key.clone(),
            })?;
            if let Some(first) = owners.get(&code) {
                return Err(ConfigError::DuplicateCode {
                    code,
                    first: first.clone(),
                    second: key,
                });
            }
            owners.insert(code, key);
            Ok(trigger)
        };

        let mut stimuli = Vec::with_capacity(table.stimuli.len());
        for (key, &code) in &table.stimuli {
            let (kind, frequency) = parse_stimulus_key(key)?;
            if stimuli.iter().any(|s: &Stimulus| {
                s.kind == kind && (s.frequency - frequency).abs() < FREQUENCY_TOLERANCE
            }) {
                return Err(ConfigError::Invalid(format!(
                    "stimulus '{key}' is registered twice"
                )));
            }
            let code = claim(code, key.clone())?;
            stimuli.push(Stimulus {
                kind,
                frequency,
                code,
            });
        }

        let mut blocks = BTreeMap::new();
        for (name, &[start, stop]) in &table.blocks {
            let start = claim(start, format!("{name}/start"))?;
            let stop = claim(stop, format!("{name}/stop"))?;
            blocks.insert(name.clone(), BlockTriggers { start, stop });
        }

        tracing::debug!(
            stimuli = stimuli.len(),
            blocks = blocks.len(),
            "trigger registry validated"
        );
        Ok(Self { stimuli, blocks })
    }

    pub fn stimulus(&self, kind: StimulusKind, frequency: f64) -> Result<Stimulus, ConfigError> {
        self.stimuli
            .iter()
            .find(|s| s.kind == kind && (s.frequency - frequency).abs() < FREQUENCY_TOLERANCE)
            .copied()
            .ok_or_else(|| ConfigError::UnregisteredTrigger {
                key: format!("{kind}/{frequency}"),
            })
    }

    /// Resolves the target and deviant tones of one oddball run.
    pub fn oddball_pair(
        &self,
        target: f64,
        deviant: f64,
    ) -> Result<(Stimulus, Stimulus), ConfigError> {
        if (target - deviant).abs() < FREQUENCY_TOLERANCE {
            return Err(ConfigError::SameFrequency(target));
        }
        Ok((
            self.stimulus(StimulusKind::Target, target)?,
            self.stimulus(StimulusKind::Deviant, deviant)?,
        ))
    }

    pub fn block(&self, name: &str) -> Result<BlockTriggers, ConfigError> {
        self.blocks
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnregisteredTrigger {
                key: name.to_string(),
            })
    }

    pub fn stimuli(&self) -> &[Stimulus] {
        &self.stimuli
    }
}

fn parse_stimulus_key(key: &str) -> Result<(StimulusKind, f64), ConfigError> {
    let invalid = || ConfigError::InvalidTriggerKey {
        key: key.to_string(),
    };
    let (kind, freq) = key.split_once('/').ok_or_else(invalid)?;
    let kind = StimulusKind::parse(kind.trim()).ok_or_else(invalid)?;
    let frequency: f64 = freq.trim().parse().map_err(|_| invalid())?;
    if !(frequency.is_finite() && frequency > 0.0) {
        return Err(invalid());
    }
    Ok((kind, frequency))
}
