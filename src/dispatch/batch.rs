//! Color commands and per-batch outcome tracking.

use std::collections::HashMap;
use std::time::Instant;

use crate::bridge::{ActuatorRef, ProtocolError, Rgb};

/// What caused a command to be issued. Logged with the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A recognized utterance.
    Voice,
    /// A voice-activity edge with gating enabled.
    VoiceActivity,
    /// A non-voice trigger from the host.
    Manual,
}

/// A resolved color command. `color: None` means randomize: every fixture
/// gets its own independent draw rather than one shared value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCommand {
    pub color: Option<Rgb>,
    pub trigger: Trigger,
}

impl ColorCommand {
    pub fn randomize(trigger: Trigger) -> Self {
        Self {
            color: None,
            trigger,
        }
    }

    pub fn solid(color: Rgb, trigger: Trigger) -> Self {
        Self {
            color: Some(color),
            trigger,
        }
    }
}

/// Outcome of one fixture update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorOutcome {
    /// No acknowledgement yet.
    Pending,
    Success,
    Failed(ProtocolError),
}

/// Per-fixture record within a batch.
#[derive(Debug, Clone)]
pub struct ActuatorResult {
    pub light: ActuatorRef,
    pub outcome: ActuatorOutcome,
    /// When the acknowledgement arrived; `None` while pending.
    pub resolved_at: Option<Instant>,
}

/// One command's fan-out and its per-fixture results.
///
/// A batch closes when every targeted fixture has reported or the batch
/// timeout elapses, whichever comes first. Closure is an observation made
/// by the collector; it is never a precondition for dispatching more
/// commands. Acknowledgements arriving after closure are discarded.
#[derive(Debug)]
pub struct DispatchBatch {
    pub id: u64,
    pub command: ColorCommand,
    results: HashMap<ActuatorRef, ActuatorResult>,
    opened_at: Instant,
}

impl DispatchBatch {
    pub fn new(id: u64, command: ColorCommand, targets: &[ActuatorRef]) -> Self {
        let results = targets
            .iter()
            .map(|light| {
                (
                    light.clone(),
                    ActuatorResult {
                        light: light.clone(),
                        outcome: ActuatorOutcome::Pending,
                        resolved_at: None,
                    },
                )
            })
            .collect();

        Self {
            id,
            command,
            results,
            opened_at: Instant::now(),
        }
    }

    /// Record one fixture's acknowledgement.
    pub fn record(&mut self, light: &ActuatorRef, outcome: ActuatorOutcome) {
        if let Some(result) = self.results.get_mut(light) {
            result.outcome = outcome;
            result.resolved_at = Some(Instant::now());
        }
    }

    /// True once every targeted fixture has reported.
    pub fn is_complete(&self) -> bool {
        self.results
            .values()
            .all(|r| r.outcome != ActuatorOutcome::Pending)
    }

    pub fn result(&self, light: &ActuatorRef) -> Option<&ActuatorResult> {
        self.results.get(light)
    }

    pub fn results(&self) -> impl Iterator<Item = &ActuatorResult> {
        self.results.values()
    }

    pub fn successes(&self) -> usize {
        self.count(|o| *o == ActuatorOutcome::Success)
    }

    pub fn failures(&self) -> usize {
        self.count(|o| matches!(o, ActuatorOutcome::Failed(_)))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| *o == ActuatorOutcome::Pending)
    }

    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    fn count(&self, pred: impl Fn(&ActuatorOutcome) -> bool) -> usize {
        self.results.values().filter(|r| pred(&r.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lights(n: usize) -> Vec<ActuatorRef> {
        (0..n)
            .map(|i| ActuatorRef::new(format!("light-{}", i)))
            .collect()
    }

    #[test]
    fn test_new_batch_is_all_pending() {
        let targets = lights(3);
        let batch = DispatchBatch::new(1, ColorCommand::randomize(Trigger::Manual), &targets);
        assert_eq!(batch.pending(), 3);
        assert!(!batch.is_complete());
    }

    #[test]
    fn test_batch_completes_when_all_report() {
        let targets = lights(2);
        let mut batch = DispatchBatch::new(1, ColorCommand::randomize(Trigger::Manual), &targets);

        batch.record(&targets[0], ActuatorOutcome::Success);
        assert!(!batch.is_complete());

        batch.record(
            &targets[1],
            ActuatorOutcome::Failed(ProtocolError {
                code: 901,
                message: "unreachable".to_string(),
            }),
        );
        assert!(batch.is_complete());
        assert_eq!(batch.successes(), 1);
        assert_eq!(batch.failures(), 1);
    }

    #[test]
    fn test_record_unknown_light_is_ignored() {
        let targets = lights(1);
        let mut batch = DispatchBatch::new(1, ColorCommand::randomize(Trigger::Manual), &targets);
        batch.record(&ActuatorRef::new("stranger"), ActuatorOutcome::Success);
        assert_eq!(batch.pending(), 1);
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let batch = DispatchBatch::new(1, ColorCommand::randomize(Trigger::Manual), &[]);
        assert!(batch.is_complete());
    }
}
