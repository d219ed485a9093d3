//! Light bridge abstraction.
//!
//! The daemon reaches fixtures through an opaque bridge handle; discovery,
//! pairing, and transport all live behind it. The bridge's callback pair
//! (success / protocol error) is surfaced here as an awaited `Result` so
//! the dispatcher can treat every update as one unit of work.

mod color;

pub use color::{xy_from_rgb, ColorResolver, Gamut, NamedPalette, Rgb, XyPoint};

use async_trait::async_trait;
use tracing::debug;

/// Identity of one reachable fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActuatorRef {
    pub id: String,
}

impl ActuatorRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Hardware model identifier, used to pick the fixture's native color
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Largest hue value a fixture accepts.
pub const MAX_HUE: u16 = u16::MAX;

/// The state pushed to a fixture by one update.
#[derive(Debug, Clone, PartialEq)]
pub struct LightState {
    pub on: bool,
    pub color: ColorMode,
}

/// A fixture's native color encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorMode {
    /// Raw hue on the fixture's 16-bit hue wheel.
    Hue(u16),
    /// CIE chromaticity point, already clamped to the fixture's gamut.
    Xy { x: f32, y: f32 },
}

impl LightState {
    pub fn hue(hue: u16) -> Self {
        Self {
            on: true,
            color: ColorMode::Hue(hue),
        }
    }

    pub fn xy(point: XyPoint) -> Self {
        Self {
            on: true,
            color: ColorMode::Xy {
                x: point.x,
                y: point.y,
            },
        }
    }
}

/// Per-fixture failure reported by the bridge.
///
/// Always recoverable from the session's point of view: it is recorded in
/// the batch and never escalated.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("bridge error {code}: {message}")]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
}

/// Handle to the set of reachable fixtures.
#[async_trait]
pub trait ActuatorBridge: Send + Sync {
    /// All fixtures currently known to the bridge.
    fn actuators(&self) -> Vec<ActuatorRef>;

    /// Hardware model of a fixture.
    fn model_of(&self, light: &ActuatorRef) -> ModelId;

    /// Push a state update to one fixture. Resolves exactly once.
    async fn update(&self, light: &ActuatorRef, state: LightState) -> Result<(), ProtocolError>;
}

/// Bridge that acknowledges every update locally without touching the
/// network. Stands in for a paired bridge in the default wiring.
pub struct LoopbackBridge {
    lights: Vec<(ActuatorRef, ModelId)>,
}

impl LoopbackBridge {
    pub fn new(lights: Vec<(ActuatorRef, ModelId)>) -> Self {
        Self { lights }
    }

    /// A three-light living-room setup, enough to see fan-out in the logs.
    pub fn with_default_lights() -> Self {
        Self::new(vec![
            (ActuatorRef::new("light-1"), ModelId("LCT001".to_string())),
            (ActuatorRef::new("light-2"), ModelId("LCT010".to_string())),
            (ActuatorRef::new("light-3"), ModelId("LST001".to_string())),
        ])
    }
}

#[async_trait]
impl ActuatorBridge for LoopbackBridge {
    fn actuators(&self) -> Vec<ActuatorRef> {
        self.lights.iter().map(|(light, _)| light.clone()).collect()
    }

    fn model_of(&self, light: &ActuatorRef) -> ModelId {
        self.lights
            .iter()
            .find(|(l, _)| l == light)
            .map(|(_, model)| model.clone())
            .unwrap_or_else(|| ModelId("UNKNOWN".to_string()))
    }

    async fn update(&self, light: &ActuatorRef, state: LightState) -> Result<(), ProtocolError> {
        debug!(light = %light.id, ?state, "loopback update");
        Ok(())
    }
}
