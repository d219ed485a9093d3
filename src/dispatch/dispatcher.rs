//! Fan-out of one color command to every reachable fixture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::batch::{ActuatorOutcome, ColorCommand, DispatchBatch};
use crate::bridge::{xy_from_rgb, ActuatorBridge, ActuatorRef, LightState, MAX_HUE};

/// Observation handle for one dispatched batch.
///
/// Dropping it is fine; the collector closes the batch either way.
pub struct BatchHandle {
    pub id: u64,
    pub targets: usize,
    closed: oneshot::Receiver<DispatchBatch>,
}

impl BatchHandle {
    /// Wait for the batch to close and take its final results.
    pub async fn closed(self) -> Option<DispatchBatch> {
        self.closed.await.ok()
    }
}

/// Issues fixture updates for color commands and tracks their outcomes.
pub struct Dispatcher {
    bridge: Arc<dyn ActuatorBridge>,
    batch_timeout: Duration,
    next_batch: AtomicU64,
}

impl Dispatcher {
    pub fn new(bridge: Arc<dyn ActuatorBridge>, batch_timeout: Duration) -> Self {
        Self {
            bridge,
            batch_timeout,
            next_batch: AtomicU64::new(0),
        }
    }

    /// Fan a command out to every fixture the bridge knows.
    ///
    /// Returns as soon as all update tasks are spawned. Each fixture gets
    /// its own unit of work reporting on a shared results channel; a
    /// collector task closes the batch on all-reported or on the batch
    /// timeout. One slow light never delays the others or the caller.
    pub fn dispatch(&self, command: ColorCommand) -> BatchHandle {
        let id = self.next_batch.fetch_add(1, Ordering::SeqCst) + 1;
        let targets = self.bridge.actuators();

        info!(
            batch = id,
            targets = targets.len(),
            trigger = ?command.trigger,
            color = ?command.color,
            "dispatching color command"
        );

        let (results_tx, results_rx) = mpsc::channel(targets.len().max(1));

        for light in &targets {
            let state = self.state_for(&command, light);
            let bridge = Arc::clone(&self.bridge);
            let light = light.clone();
            let results_tx = results_tx.clone();

            tokio::spawn(async move {
                let outcome = match bridge.update(&light, state).await {
                    Ok(()) => ActuatorOutcome::Success,
                    Err(err) => {
                        warn!(light = %light.id, %err, "fixture update failed");
                        ActuatorOutcome::Failed(err)
                    }
                };
                if results_tx.send((light.clone(), outcome)).await.is_err() {
                    // Batch already closed; the straggler is dropped on the
                    // floor rather than reopening anything.
                    debug!(light = %light.id, "late acknowledgement discarded");
                }
            });
        }
        drop(results_tx);

        let (done_tx, done_rx) = oneshot::channel();
        let batch = DispatchBatch::new(id, command, &targets);
        let timeout = self.batch_timeout;
        tokio::spawn(collect(batch, results_rx, timeout, done_tx));

        BatchHandle {
            id,
            targets: targets.len(),
            closed: done_rx,
        }
    }

    /// The state one fixture receives for a command.
    ///
    /// Randomize draws an independent hue per fixture; a solid color is a
    /// deterministic function of the color and the fixture's model.
    fn state_for(&self, command: &ColorCommand, light: &ActuatorRef) -> LightState {
        match command.color {
            None => LightState::hue(rand::thread_rng().gen_range(0..=MAX_HUE)),
            Some(color) => LightState::xy(xy_from_rgb(color, &self.bridge.model_of(light))),
        }
    }
}

async fn collect(
    mut batch: DispatchBatch,
    mut results_rx: mpsc::Receiver<(ActuatorRef, ActuatorOutcome)>,
    timeout: Duration,
    done_tx: oneshot::Sender<DispatchBatch>,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        if batch.is_complete() {
            break;
        }
        tokio::select! {
            _ = &mut deadline => {
                warn!(
                    batch = batch.id,
                    pending = batch.pending(),
                    "batch timed out with unresolved fixtures"
                );
                break;
            }
            maybe = results_rx.recv() => {
                match maybe {
                    Some((light, outcome)) => batch.record(&light, outcome),
                    // All update tasks finished reporting.
                    None => break,
                }
            }
        }
    }

    info!(
        batch = batch.id,
        ok = batch.successes(),
        failed = batch.failures(),
        pending = batch.pending(),
        age_ms = batch.age().as_millis() as u64,
        "batch closed"
    );

    let _ = done_tx.send(batch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ColorMode, ModelId, ProtocolError, Rgb};
    use crate::dispatch::Trigger;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Bridge that records every update and can be told to never answer
    /// for some lights or to fail others.
    struct RecordingBridge {
        lights: Vec<(ActuatorRef, ModelId)>,
        updates: Mutex<Vec<(ActuatorRef, LightState)>>,
        stalled: Vec<ActuatorRef>,
        failing: Vec<ActuatorRef>,
    }

    impl RecordingBridge {
        fn new(n: usize) -> Self {
            let lights = (0..n)
                .map(|i| {
                    (
                        ActuatorRef::new(format!("light-{}", i)),
                        ModelId(if i % 2 == 0 { "LCT001" } else { "LCT014" }.to_string()),
                    )
                })
                .collect();
            Self {
                lights,
                updates: Mutex::new(Vec::new()),
                stalled: Vec::new(),
                failing: Vec::new(),
            }
        }

        fn updates(&self) -> Vec<(ActuatorRef, LightState)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActuatorBridge for RecordingBridge {
        fn actuators(&self) -> Vec<ActuatorRef> {
            self.lights.iter().map(|(l, _)| l.clone()).collect()
        }

        fn model_of(&self, light: &ActuatorRef) -> ModelId {
            self.lights
                .iter()
                .find(|(l, _)| l == light)
                .map(|(_, m)| m.clone())
                .unwrap_or_else(|| ModelId("UNKNOWN".to_string()))
        }

        async fn update(
            &self,
            light: &ActuatorRef,
            state: LightState,
        ) -> Result<(), ProtocolError> {
            self.updates.lock().unwrap().push((light.clone(), state));
            if self.stalled.contains(light) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(light) {
                return Err(ProtocolError {
                    code: 901,
                    message: "light unreachable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn dispatcher(bridge: Arc<RecordingBridge>) -> Dispatcher {
        Dispatcher::new(bridge, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_randomize_draws_independent_hues() {
        let bridge = Arc::new(RecordingBridge::new(8));
        let handle = dispatcher(Arc::clone(&bridge)).dispatch(ColorCommand::randomize(Trigger::Manual));

        let batch = handle.closed().await.unwrap();
        assert!(batch.is_complete());

        let updates = bridge.updates();
        assert_eq!(updates.len(), 8);

        let hues: Vec<u16> = updates
            .iter()
            .map(|(_, state)| match state.color {
                ColorMode::Hue(h) => h,
                ColorMode::Xy { .. } => panic!("randomize must use the hue wheel"),
            })
            .collect();

        // Independent draws: eight identical 16-bit hues would be a
        // broken generator, not bad luck.
        let first = hues[0];
        assert!(hues.iter().any(|h| *h != first));
    }

    #[tokio::test]
    async fn test_solid_color_is_deterministic_per_model() {
        let bridge = Arc::new(RecordingBridge::new(4));
        let d = dispatcher(Arc::clone(&bridge));
        let red = Rgb::new(255, 0, 0);

        let first = d.dispatch(ColorCommand::solid(red, Trigger::Voice));
        first.closed().await.unwrap();
        let second = d.dispatch(ColorCommand::solid(red, Trigger::Voice));
        second.closed().await.unwrap();

        let updates = bridge.updates();
        assert_eq!(updates.len(), 8);

        let mut by_light: HashMap<ActuatorRef, Vec<LightState>> = HashMap::new();
        for (light, state) in updates {
            by_light.entry(light).or_default().push(state);
        }
        for (light, states) in by_light {
            assert_eq!(states.len(), 2);
            assert_eq!(states[0], states[1], "non-deterministic state for {:?}", light);
            let expected = LightState::xy(xy_from_rgb(red, &bridge.model_of(&light)));
            assert_eq!(states[0], expected);
        }
    }

    #[tokio::test]
    async fn test_batch_closes_on_all_acks_before_timeout() {
        let bridge = Arc::new(RecordingBridge::new(3));
        let handle = dispatcher(bridge).dispatch(ColorCommand::randomize(Trigger::Manual));

        let batch = handle.closed().await.unwrap();
        assert!(batch.is_complete());
        assert_eq!(batch.successes(), 3);
        assert!(batch.age() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_failed_light_does_not_abort_batch() {
        let mut bridge = RecordingBridge::new(3);
        bridge.failing.push(ActuatorRef::new("light-1"));
        let handle = dispatcher(Arc::new(bridge)).dispatch(ColorCommand::randomize(Trigger::Manual));

        let batch = handle.closed().await.unwrap();
        assert!(batch.is_complete());
        assert_eq!(batch.successes(), 2);
        assert_eq!(batch.failures(), 1);

        let failed = batch.result(&ActuatorRef::new("light-1")).unwrap();
        assert!(matches!(failed.outcome, ActuatorOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_light_leaves_pending_at_timeout() {
        let mut bridge = RecordingBridge::new(3);
        bridge.stalled.push(ActuatorRef::new("light-2"));
        let bridge = Arc::new(bridge);
        let d = dispatcher(Arc::clone(&bridge));

        let handle = d.dispatch(ColorCommand::randomize(Trigger::Manual));
        let batch = handle.closed().await.unwrap();

        assert!(!batch.is_complete());
        assert_eq!(batch.successes(), 2);
        assert_eq!(batch.pending(), 1);
        let stuck = batch.result(&ActuatorRef::new("light-2")).unwrap();
        assert_eq!(stuck.outcome, ActuatorOutcome::Pending);
        assert!(stuck.resolved_at.is_none());

        // The stuck batch must not block a new one.
        let next = d.dispatch(ColorCommand::randomize(Trigger::Manual));
        let next_batch = next.closed().await.unwrap();
        assert_eq!(next_batch.successes(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_with_no_lights_closes_immediately() {
        let bridge = Arc::new(RecordingBridge::new(0));
        let handle = dispatcher(bridge).dispatch(ColorCommand::randomize(Trigger::Manual));
        let batch = handle.closed().await.unwrap();
        assert!(batch.is_complete());
        assert_eq!(batch.successes(), 0);
    }
}
