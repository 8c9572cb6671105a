use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::anatomy::{name_without_side, Pattern, Side};
use crate::delay::TimeInSeconds;
use crate::error::ConfigError;
use crate::params::ParamSpec;

fn default_equilibration_steps() -> u32 {
    20
}

fn default_delay_scaling() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_vel_gain() -> f64 {
    0.2
}

/// Declarative description of a spinal control network.
///
/// Optional neuron groups are enabled by the presence of their config
/// section (`VES`, `LD`, `CPG`) or of their `<GROUP>_bias` key in
/// `params`. Connection rules are realized only when their
/// `<SRC>_<TGT>_weight` key is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinalConfig {
    /// Default activation function for every non-input group.
    pub activation: String,

    /// Per-group activation overrides, keyed by group name (`"IA"`).
    #[serde(default)]
    pub activations: BTreeMap<String, String>,

    /// Neural delay per muscle base name (side stripped), in seconds.
    pub neural_delays: BTreeMap<String, TimeInSeconds>,

    /// Multiplier applied to every resolved neural delay.
    #[serde(default = "default_delay_scaling")]
    pub delay_scaling: f64,

    /// Extra update iterations on the first tick of a trial.
    #[serde(default = "default_equilibration_steps")]
    pub equilibration_steps: u32,

    /// Use only the vertical axis for vestibular input. Defaults to
    /// `dof_count < 14` of the body.
    #[serde(default)]
    pub planar: Option<bool>,

    /// Restrict the controller to one side of the body.
    #[serde(default)]
    pub side: Side,

    /// Fixed offset added to every muscle length reading.
    #[serde(default, rename = "L_bias")]
    pub length_offset: f64,

    #[serde(default, rename = "VES")]
    pub vestibular: Option<VestibularConfig>,

    #[serde(default, rename = "LD")]
    pub load: Option<LoadConfig>,

    #[serde(default, rename = "CPG")]
    pub rhythm: Option<RhythmConfig>,

    #[serde(default, rename = "MuscleGroup")]
    pub muscle_groups: Vec<MuscleGroupSpec>,

    /// `<GROUP>_bias` and `<SRC>_<TGT>[_<relation>]_weight` entries.
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestibularConfig {
    /// Name of the body segment whose orientation is sensed.
    pub body: String,
    pub delay: TimeInSeconds,
    /// One combined orientation+velocity channel per axis instead of two.
    #[serde(default = "default_true")]
    pub use_orivel: bool,
    #[serde(default = "default_vel_gain")]
    pub vel_gain: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub delay: TimeInSeconds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhythmConfig {
    /// L/F neurons (by full neuron name) driving the flexor half-center.
    pub flex_inputs: Pattern,
    /// L/F neurons driving the extensor half-center.
    pub ext_inputs: Pattern,
}

/// Side-independent muscle group template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuscleGroupSpec {
    pub name: String,
    /// Matched against side-stripped muscle names.
    pub muscles: Pattern,
    /// Same-side groups (by name) this group inhibits reciprocally.
    #[serde(default)]
    pub antagonists: Option<Pattern>,
    /// Same-side groups (by name) this group cooperates with.
    #[serde(default)]
    pub related: Option<Pattern>,
    /// Opposite-side groups (by name) treated as antagonists.
    #[serde(default)]
    pub cl_antagonists: Option<Pattern>,
    /// Group-local overrides of the top-level `params` table.
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
}

impl SpinalConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Scaled neural delay of a (sided) muscle.
    pub fn neural_delay(&self, muscle: &str) -> Result<TimeInSeconds, ConfigError> {
        self.neural_delays
            .get(name_without_side(muscle))
            .map(|d| d * self.delay_scaling)
            .ok_or_else(|| ConfigError::MissingDelay {
                muscle: muscle.to_string(),
            })
    }

    /// Look up a rule or bias key, preferring the muscle group's own table.
    pub fn param_spec<'a>(&'a self, key: &str, group: Option<&'a MuscleGroupSpec>) -> Option<&'a ParamSpec> {
        group
            .and_then(|g| g.params.get(key))
            .or_else(|| self.params.get(key))
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }
}

/// What the body simulator exposes to the controller at build time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyDescription {
    /// Actuated muscles, sided by `_r` / `_l` suffix, in actuator order.
    pub muscles: Vec<String>,
    /// Legs, sided by name suffix (`leg_r`).
    #[serde(default)]
    pub legs: Vec<String>,
    /// Rigid body segments available for vestibular sensing.
    #[serde(default)]
    pub bodies: Vec<String>,
    /// Degrees of freedom of the model.
    #[serde(default)]
    pub dof_count: usize,
}

impl BodyDescription {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn leg_index(&self, side: Side) -> Result<usize, ConfigError> {
        self.legs
            .iter()
            .position(|l| Side::from_name(l) == side)
            .ok_or(ConfigError::MissingLeg { side })
    }

    pub fn body_index(&self, name: &str) -> Result<usize, ConfigError> {
        self.bodies
            .iter()
            .position(|b| b == name)
            .ok_or_else(|| ConfigError::UnknownBody {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: SpinalConfig = serde_json::from_value(json!({
            "activation": "relu",
            "neural_delays": { "soleus": 0.035 },
        }))
        .unwrap();
        assert_eq!(cfg.equilibration_steps, 20);
        assert_eq!(cfg.delay_scaling, 1.0);
        assert_eq!(cfg.side, Side::None);
        assert!(cfg.vestibular.is_none() && cfg.load.is_none() && cfg.rhythm.is_none());
        assert_eq!(cfg.neural_delay("soleus_l").unwrap(), 0.035);
    }

    #[test]
    fn missing_required_key_is_a_parse_error() {
        let err = SpinalConfig::from_json_str(r#"{ "neural_delays": {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("activation"));
    }

    #[test]
    fn delay_lookup_scales_and_reports_muscle() {
        let cfg: SpinalConfig = serde_json::from_value(json!({
            "activation": "relu",
            "neural_delays": { "hamstrings": 0.02 },
            "delay_scaling": 1.5,
        }))
        .unwrap();
        assert!((cfg.neural_delay("hamstrings_r").unwrap() - 0.03).abs() < 1e-12);
        let err = cfg.neural_delay("vasti_r").unwrap_err();
        assert_eq!(err.key(), Some("vasti_r"));
    }

    #[test]
    fn group_params_override_top_level() {
        let cfg: SpinalConfig = serde_json::from_value(json!({
            "activation": "relu",
            "neural_delays": {},
            "params": { "L_IA_weight": 0.5, "IA_bias": "0~0.1" },
            "MuscleGroup": [
                { "name": "extensors", "muscles": "glut_max", "params": { "L_IA_weight": 1.0 } }
            ],
        }))
        .unwrap();
        let g = &cfg.muscle_groups[0];
        assert_eq!(cfg.param_spec("L_IA_weight", Some(g)), Some(&ParamSpec::Fixed(1.0)));
        assert_eq!(cfg.param_spec("L_IA_weight", None), Some(&ParamSpec::Fixed(0.5)));
        assert!(cfg.param_spec("IA_bias", Some(g)).is_some());
        assert!(cfg.param_spec("IB_bias", Some(g)).is_none());
    }

    #[test]
    fn body_lookups() {
        let body = BodyDescription {
            muscles: vec!["soleus_r".into()],
            legs: vec!["leg0_r".into(), "leg1_l".into()],
            bodies: vec!["pelvis".into(), "torso".into()],
            dof_count: 9,
        };
        assert_eq!(body.leg_index(Side::Left).unwrap(), 1);
        assert_eq!(body.body_index("torso").unwrap(), 1);
        assert!(matches!(body.body_index("head"), Err(ConfigError::UnknownBody { .. })));
    }
}
