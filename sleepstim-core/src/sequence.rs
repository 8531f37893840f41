//! Oddball presentation order.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::ConfigError;
use crate::stimulus::{Stimulus, StimulusKind};
use crate::trigger::TriggerCode;

pub const MAX_SHUFFLE_ATTEMPTS: usize = 1_000;

/// Builds target/deviant orders where the sequence opens on a target and no
/// more than `max_consecutive_deviants` deviants follow each other.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    pub max_consecutive_deviants: usize,
    pub max_attempts: usize,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self {
            max_consecutive_deviants: 1,
            max_attempts: MAX_SHUFFLE_ATTEMPTS,
        }
    }
}

impl SequenceGenerator {
    pub fn new(max_consecutive_deviants: usize) -> Self {
        Self {
            max_consecutive_deviants,
            ..Default::default()
        }
    }

    /// Rejection-samples a shuffled arrangement, then falls back to placing
    /// deviant runs directly into the gaps after each target once
    /// `max_attempts` shuffles were rejected.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        targets: usize,
        deviants: usize,
    ) -> Result<Vec<StimulusKind>, ConfigError> {
        self.check_feasible(targets, deviants)?;

        let mut kinds = Vec::with_capacity(targets + deviants);
        kinds.extend(std::iter::repeat_n(StimulusKind::Target, targets));
        kinds.extend(std::iter::repeat_n(StimulusKind::Deviant, deviants));
        if deviants == 0 {
            return Ok(kinds);
        }

        for attempt in 1..=self.max_attempts {
            kinds.shuffle(rng);
            if is_valid_arrangement(&kinds, self.max_consecutive_deviants) {
                debug!(attempt, targets, deviants, "sequence accepted");
                return Ok(kinds);
            }
        }

        debug!(
            attempts = self.max_attempts,
            "shuffles exhausted, building sequence by constrained insertion"
        );
        Ok(self.insert_runs(rng, targets, deviants))
    }

    pub fn check_feasible(&self, targets: usize, deviants: usize) -> Result<(), ConfigError> {
        if targets == 0 {
            return Err(ConfigError::NoTarget);
        }
        if deviants > self.max_consecutive_deviants.saturating_mul(targets) {
            return Err(ConfigError::InfeasibleSequence {
                targets,
                deviants,
                max_consecutive: self.max_consecutive_deviants,
            });
        }
        Ok(())
    }

    // Every target opens a gap holding up to `max_consecutive_deviants`
    // deviants. Picking `deviants` of those slots at random fixes the run
    // lengths.
    fn insert_runs<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        targets: usize,
        deviants: usize,
    ) -> Vec<StimulusKind> {
        let mut slots: Vec<usize> = (0..targets)
            .flat_map(|gap| std::iter::repeat_n(gap, self.max_consecutive_deviants))
            .collect();
        slots.shuffle(rng);

        let mut runs = vec![0usize; targets];
        for &gap in &slots[..deviants] {
            runs[gap] += 1;
        }

        let mut kinds = Vec::with_capacity(targets + deviants);
        for run in runs {
            kinds.push(StimulusKind::Target);
            kinds.extend(std::iter::repeat_n(StimulusKind::Deviant, run));
        }
        kinds
    }
}

/// True when `kinds` opens on a target and never holds more than
/// `max_consecutive` deviants in a row.
pub fn is_valid_arrangement(kinds: &[StimulusKind], max_consecutive: usize) -> bool {
    if kinds.first().is_some_and(StimulusKind::is_deviant) {
        return false;
    }
    let mut run = 0;
    for kind in kinds {
        if kind.is_deviant() {
            run += 1;
            if run > max_consecutive {
                return false;
            }
        } else {
            run = 0;
        }
    }
    true
}

/// Immutable presentation order for one task run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    items: Vec<Stimulus>,
}

impl Sequence {
    pub fn new(kinds: &[StimulusKind], target: Stimulus, deviant: Stimulus) -> Self {
        let items = kinds
            .iter()
            .map(|kind| match kind {
                StimulusKind::Target => target,
                StimulusKind::Deviant => deviant,
            })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stimulus> {
        self.items.iter()
    }

    pub fn codes(&self) -> Vec<TriggerCode> {
        self.items.iter().map(|s| s.code).collect()
    }

    pub fn count(&self, kind: StimulusKind) -> usize {
        self.items.iter().filter(|s| s.kind == kind).count()
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Stimulus;
    type IntoIter = std::slice::Iter<'a, Stimulus>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
