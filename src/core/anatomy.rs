use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MuscleGroupSpec;
use crate::delay::TimeInSeconds;
use crate::error::{ConfigError, TopologyWarning};

/// Body side, encoded in element names as an `_r` / `_l` suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Right,
    Left,
    #[default]
    None,
}

/// Right first, then left.
pub const BOTH_SIDES: [Side; 2] = [Side::Right, Side::Left];

impl Side {
    pub fn suffix(self) -> &'static str {
        match self {
            Side::Right => "_r",
            Side::Left => "_l",
            Side::None => "",
        }
    }

    pub fn from_name(name: &str) -> Side {
        if name.ends_with("_r") {
            Side::Right
        } else if name.ends_with("_l") {
            Side::Left
        } else {
            Side::None
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Right => Side::Left,
            Side::Left => Side::Right,
            Side::None => Side::None,
        }
    }
}

/// Strip a trailing `_r` / `_l`.
pub fn name_without_side(name: &str) -> &str {
    let suffix = Side::from_name(name).suffix();
    &name[..name.len() - suffix.len()]
}

pub fn sided_name(base: &str, side: Side) -> String {
    format!("{base}{}", side.suffix())
}

/// Wildcard pattern: `*` matches any run, `?` one character, `;` separates
/// alternatives (`"soleus;gastroc*"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Pattern {
    source: String,
    alternatives: Vec<String>,
}

impl Pattern {
    pub fn new(source: &str) -> Self {
        let alternatives = source
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            source: source.to_string(),
            alternatives,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.alternatives.iter().any(|p| glob_match(p.as_bytes(), name.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::new(&s)
    }
}

impl From<Pattern> for String {
    fn from(p: Pattern) -> Self {
        p.source
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn glob_match(pat: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pat.len() && (pat[p] == b'?' || pat[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            // Let the last star swallow one more character.
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == b'*' {
        p += 1;
    }
    p == pat.len()
}

/// One actuated muscle retained by the network.
#[derive(Debug, Clone, Serialize)]
pub struct MuscleRecord {
    pub name: String,
    pub side: Side,
    pub delay: TimeInSeconds,
    /// Index into the body's muscle list.
    pub body_index: usize,
    pub groups: BTreeSet<usize>,
    pub antagonists: BTreeSet<usize>,
}

/// A side-qualified functional cluster instantiated from a template.
#[derive(Debug, Clone, Serialize)]
pub struct MuscleGroup {
    pub name: String,
    pub side: Side,
    /// Index of the template in `SpinalConfig::muscle_groups`.
    pub template: usize,
    pub muscles: Vec<usize>,
    pub antagonists: Vec<usize>,
    pub related: Vec<usize>,
    pub contralateral: Option<usize>,
}

impl MuscleGroup {
    pub fn sided_name(&self) -> String {
        sided_name(&self.name, self.side)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Anatomy {
    pub muscles: Vec<MuscleRecord>,
    pub groups: Vec<MuscleGroup>,
    pub warnings: Vec<TopologyWarning>,
}

/// Sides covered by a controller placed at `location` (`Side::None` = whole body).
pub fn sides_of(location: Side) -> Vec<Side> {
    match location {
        Side::None => BOTH_SIDES.to_vec(),
        side => vec![side],
    }
}

/// Classify body muscles into side-aware groups and derive group relations.
///
/// Muscles that end up in no group are dropped (with a warning) before
/// their delay is looked up; `delay_of` receives the sided muscle name.
pub fn classify<F>(
    body_muscles: &[String],
    templates: &[MuscleGroupSpec],
    location: Side,
    mut delay_of: F,
) -> Result<Anatomy, ConfigError>
where
    F: FnMut(&str) -> Result<TimeInSeconds, ConfigError>,
{
    let mut anatomy = Anatomy::default();
    let sides = sides_of(location);

    for (ti, template) in templates.iter().enumerate() {
        for &side in &sides {
            anatomy.groups.push(MuscleGroup {
                name: template.name.clone(),
                side,
                template: ti,
                muscles: Vec::new(),
                antagonists: Vec::new(),
                related: Vec::new(),
                contralateral: None,
            });
        }
    }

    for (body_index, name) in body_muscles.iter().enumerate() {
        let side = Side::from_name(name);
        if location != Side::None && side != location {
            continue;
        }
        let base = name_without_side(name);
        let memberships: Vec<usize> = anatomy
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.side == side && templates[g.template].muscles.matches(base))
            .map(|(gi, _)| gi)
            .collect();

        if memberships.is_empty() {
            let w = TopologyWarning::UngroupedMuscle {
                muscle: name.clone(),
            };
            warn!("{w}");
            anatomy.warnings.push(w);
            continue;
        }

        let mi = anatomy.muscles.len();
        for &gi in &memberships {
            anatomy.groups[gi].muscles.push(mi);
        }
        anatomy.muscles.push(MuscleRecord {
            name: name.clone(),
            side,
            delay: delay_of(name)?,
            body_index,
            groups: memberships.into_iter().collect(),
            antagonists: BTreeSet::new(),
        });
    }

    for g in &anatomy.groups {
        if g.muscles.is_empty() {
            let w = TopologyWarning::EmptyGroup {
                group: g.sided_name(),
            };
            warn!("{w}");
            anatomy.warnings.push(w);
        }
    }

    for gi in 0..anatomy.groups.len() {
        let template = &templates[anatomy.groups[gi].template];
        for other in 0..anatomy.groups.len() {
            if other == gi {
                continue;
            }
            let (g, og) = (&anatomy.groups[gi], &anatomy.groups[other]);
            let same_side = g.side == og.side;
            let is_antagonist = if same_side {
                template.antagonists.as_ref().is_some_and(|p| p.matches(&og.name))
            } else {
                template.cl_antagonists.as_ref().is_some_and(|p| p.matches(&og.name))
            };
            let is_related = same_side && template.related.as_ref().is_some_and(|p| p.matches(&og.name));
            let is_contra = !same_side && g.name == og.name;

            let g = &mut anatomy.groups[gi];
            if is_contra {
                g.contralateral = Some(other);
            }
            if is_related {
                g.related.push(other);
            }
            if is_antagonist {
                g.antagonists.push(other);
                for &mi in &g.muscles {
                    anatomy.muscles[mi].antagonists.insert(other);
                }
            }
        }
    }

    Ok(anatomy)
}
