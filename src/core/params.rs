use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;
use crate::prng::Prng;

pub type ParamValue = f64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid parameter spec `{0}` (expected a number or `mean~std<min,max>`)")]
pub struct ParamSpecError(pub String);

/// Distribution of an optimizable scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreeParam {
    pub mean: f64,
    pub std: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FreeParam {
    pub fn clamp(&self, value: f64) -> f64 {
        let v = self.min.map_or(value, |lo| value.max(lo));
        self.max.map_or(v, |hi| v.min(hi))
    }
}

/// How a bias or link weight is obtained.
///
/// In configuration this is a number (a fixed constant that is never
/// optimized), a `{ mean, std, min, max }` table, or the string
/// notation `"mean~std<min,max>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParamSpec", into = "RawParamSpec")]
pub enum ParamSpec {
    Fixed(f64),
    Free(FreeParam),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawParamSpec {
    Number(f64),
    Text(String),
    Table(FreeParam),
}

impl TryFrom<RawParamSpec> for ParamSpec {
    type Error = ParamSpecError;

    fn try_from(raw: RawParamSpec) -> Result<Self, Self::Error> {
        match raw {
            RawParamSpec::Number(v) => Ok(ParamSpec::Fixed(v)),
            RawParamSpec::Text(s) => s.parse(),
            RawParamSpec::Table(f) => Ok(ParamSpec::Free(f)),
        }
    }
}

impl From<ParamSpec> for RawParamSpec {
    fn from(spec: ParamSpec) -> Self {
        match spec {
            ParamSpec::Fixed(v) => RawParamSpec::Number(v),
            ParamSpec::Free(f) => RawParamSpec::Table(f),
        }
    }
}

impl FromStr for ParamSpec {
    type Err = ParamSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParamSpecError(s.to_string());
        let num = |x: &str| x.trim().parse::<f64>().map_err(|_| bad());

        let Some((mean, rest)) = s.split_once('~') else {
            return num(s).map(ParamSpec::Fixed);
        };
        let (std, bounds) = match rest.split_once('<') {
            Some((std, bounds)) => (std, Some(bounds.strip_suffix('>').ok_or_else(bad)?)),
            None => (rest, None),
        };
        let (min, max) = match bounds {
            Some(b) => {
                let (lo, hi) = b.split_once(',').ok_or_else(bad)?;
                (Some(num(lo)?), Some(num(hi)?))
            }
            None => (None, None),
        };
        Ok(ParamSpec::Free(FreeParam {
            mean: num(mean)?,
            std: num(std)?,
            min,
            max,
        }))
    }
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSpec::Fixed(v) => write!(f, "{v}"),
            ParamSpec::Free(p) => {
                write!(f, "{}~{}", p.mean, p.std)?;
                if let (Some(lo), Some(hi)) = (p.min, p.max) {
                    write!(f, "<{lo},{hi}>")?;
                }
                Ok(())
            }
        }
    }
}

/// Source of optimizable scalars, queried only while a network is built.
pub trait ParamStore {
    /// Resolve `name`, creating it from `spec` when not yet known.
    /// Fixed specs resolve to their constant and are never registered.
    fn get_or_create(&mut self, name: &str, spec: &ParamSpec) -> ParamValue;

    /// Value of `name` if the store already holds it.
    fn try_get(&self, name: &str) -> Option<ParamValue>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    /// Distribution the parameter was created with; `None` for values that
    /// were supplied directly (e.g. loaded from a file) and not yet requested.
    pub spec: Option<FreeParam>,
    pub value: ParamValue,
}

/// Ordered, named parameter vector.
///
/// Parameters appear in creation order, which is the order an optimizer
/// sees them in `values()` / `set_values()`.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    infos: Vec<ParamInfo>,
    index: HashMap<String, usize>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, ParamValue)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in values {
            set.set(&name.into(), value);
        }
        set
    }

    /// Parse a JSON object of `{ "name": value }` pairs.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let map: BTreeMap<String, ParamValue> = serde_json::from_str(s)?;
        Ok(Self::from_values(map))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn infos(&self) -> &[ParamInfo] {
        &self.infos
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.index.get(name).map(|&i| self.infos[i].value)
    }

    /// Set (or insert) a value by name.
    pub fn set(&mut self, name: &str, value: ParamValue) {
        match self.index.get(name) {
            Some(&i) => self.infos[i].value = value,
            None => {
                self.index.insert(name.to_string(), self.infos.len());
                self.infos.push(ParamInfo {
                    name: name.to_string(),
                    spec: None,
                    value,
                });
            }
        }
    }

    pub fn values(&self) -> Vec<ParamValue> {
        self.infos.iter().map(|p| p.value).collect()
    }

    /// Overwrite every value in creation order (an optimizer's candidate vector).
    pub fn set_values(&mut self, values: &[ParamValue]) {
        assert_eq!(
            values.len(),
            self.infos.len(),
            "parameter vector length does not match parameter count"
        );
        for (p, &v) in self.infos.iter_mut().zip(values) {
            p.value = v;
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, ParamValue> {
        self.infos.iter().map(|p| (p.name.clone(), p.value)).collect()
    }

    /// A candidate drawn around each parameter's mean (`mean + std * N(0,1)`,
    /// clamped to its bounds). Parameters without a distribution keep their value.
    pub fn sample(&self, seed: u64) -> ParamSet {
        let mut rng = Prng::new(seed);
        let mut out = self.clone();
        for p in &mut out.infos {
            if let Some(spec) = p.spec {
                p.value = spec.clamp(spec.mean + spec.std * rng.gen_normal());
            }
        }
        out
    }
}

impl ParamStore for ParamSet {
    fn get_or_create(&mut self, name: &str, spec: &ParamSpec) -> ParamValue {
        let free = match spec {
            ParamSpec::Fixed(v) => return *v,
            ParamSpec::Free(f) => *f,
        };
        match self.index.get(name) {
            Some(&i) => {
                let p = &mut self.infos[i];
                p.spec.get_or_insert(free);
                p.value
            }
            None => {
                let value = free.clamp(free.mean);
                self.index.insert(name.to_string(), self.infos.len());
                self.infos.push(ParamInfo {
                    name: name.to_string(),
                    spec: Some(free),
                    value,
                });
                value
            }
        }
    }

    fn try_get(&self, name: &str) -> Option<ParamValue> {
        self.get(name)
    }
}
