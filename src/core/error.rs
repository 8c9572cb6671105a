use serde::Serialize;
use thiserror::Error;

use crate::anatomy::Side;

/// Fatal construction error. Aborts `ControlNetwork::build` before any
/// simulation time elapses.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key `{key}`")]
    MissingKey { key: String },

    #[error("could not find neural delay for `{muscle}`")]
    MissingDelay { muscle: String },

    #[error("unknown activation function `{name}` for group {group}")]
    UnknownActivation { group: String, name: String },

    #[error("body has no segment named `{name}`")]
    UnknownBody { name: String },

    #[error("body has no leg on side {side:?}")]
    MissingLeg { side: Side },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Name of the key (or muscle/body) the error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::MissingKey { key } => Some(key),
            ConfigError::MissingDelay { muscle } => Some(muscle),
            ConfigError::UnknownActivation { group, .. } => Some(group),
            ConfigError::UnknownBody { name } => Some(name),
            _ => None,
        }
    }
}

/// Non-fatal topology condition. Logged and kept on the built network.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyWarning {
    #[error("{group} does not contain any muscles")]
    EmptyGroup { group: String },

    #[error("{muscle} is not part of any MuscleGroup")]
    UngroupedMuscle { muscle: String },

    #[error("rule `{key}` refers to group {group}, which is not enabled")]
    DisabledGroupRule { key: String, group: String },
}
