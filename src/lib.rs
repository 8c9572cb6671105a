#[path = "core/error.rs"]
pub mod error;

#[path = "core/delay.rs"]
pub mod delay;

#[path = "core/anatomy.rs"]
pub mod anatomy;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/params.rs"]
pub mod params;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/sensors.rs"]
pub mod sensors;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/builder.rs"]
pub mod builder;

#[path = "core/controller.rs"]
pub mod controller;

#[path = "core/trial.rs"]
pub mod trial;

pub mod observer;

pub mod prelude {
    pub use crate::config::{BodyDescription, SpinalConfig};
    pub use crate::controller::{ControlNetwork, NetworkState};
    pub use crate::error::{ConfigError, TopologyWarning};
    pub use crate::observer::{NetworkAdapter, NetworkReport};
    pub use crate::params::{ParamSet, ParamSpec, ParamStore};
    pub use crate::sensors::{SensorKind, SensorSource};
    pub use crate::trial::{evaluate_batch, run_trial, BodySim, TrialResult};
}
