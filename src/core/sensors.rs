use serde::Serialize;

use crate::anatomy::Side;
use crate::delay::SourceId;

/// Spatial axis of a body-segment sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// A physical quantity the body simulator must supply every control step.
///
/// Indices refer to the lists in `BodyDescription`. For sided body-segment
/// sensors the simulator mirrors the reading for the left side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorKind {
    /// Normalized fiber length.
    MuscleLength { muscle: usize },
    /// Normalized muscle force.
    MuscleForce { muscle: usize },
    /// Normalized ground load on a leg.
    LegLoad { leg: usize },
    /// Orientation plus `gain` times angular velocity.
    BodyOriVel {
        body: usize,
        axis: Axis,
        side: Side,
        gain: f64,
    },
    BodyOrientation { body: usize, axis: Axis, side: Side },
    /// Angular velocity scaled by `gain`.
    BodyAngularVelocity {
        body: usize,
        axis: Axis,
        side: Side,
        gain: f64,
    },
}

/// A registered sensor: its delay bus source plus what it measures.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSource {
    /// Channel name, e.g. `soleus_r.L` or `leg_l.LD`.
    pub name: String,
    #[serde(skip)]
    pub id: SourceId,
    pub kind: SensorKind,
}
