//! Topology construction.
//!
//! Groups are created in a fixed order (L, F, VES, LD, CPG, IA, IB, IBI,
//! IBE, PM, MN, RC); optional groups exist only when enabled. Connection
//! rules are then realized per muscle group and per muscle. A rule whose
//! `<SRC>_<TGT>_weight` key is absent creates no links; a present key
//! with value zero creates silenced links.

use std::collections::BTreeSet;
use std::iter;

use tracing::warn;

use crate::anatomy::{classify, name_without_side, sided_name, sides_of, Anatomy, Side};
use crate::config::{BodyDescription, MuscleGroupSpec, SpinalConfig};
use crate::delay::{ChannelId, DelayBus, TimeInSeconds};
use crate::error::{ConfigError, TopologyWarning};
use crate::network::{Activation, GroupId, Network, NeuronId, Value, Weight};
use crate::params::{ParamSpec, ParamStore};
use crate::sensors::{Axis, SensorKind, SensorSource};

/// Every role name a rule key may refer to, in creation order.
pub const ROLE_NAMES: [&str; 12] = [
    "L", "F", "VES", "LD", "CPG", "IA", "IB", "IBI", "IBE", "PM", "MN", "RC",
];

const WEIGHT: &str = "_weight";

/// Group ids of the roles present in a built network.
#[derive(Debug, Clone, Copy)]
pub struct Roles {
    pub l: GroupId,
    pub f: GroupId,
    pub ves: Option<GroupId>,
    pub ld: Option<GroupId>,
    pub cpg: Option<GroupId>,
    pub ia: Option<GroupId>,
    pub ib: Option<GroupId>,
    pub ibi: Option<GroupId>,
    pub ibe: Option<GroupId>,
    pub pm: Option<GroupId>,
    pub mn: GroupId,
    pub rc: Option<GroupId>,
}

impl Roles {
    /// Enabled IB-family roles in IB, IBI, IBE order.
    pub fn ib_family(&self) -> Vec<GroupId> {
        [self.ib, self.ibi, self.ibe].into_iter().flatten().collect()
    }
}

/// Input neuron fed from a delayed sensor channel.
#[derive(Debug, Clone, Copy)]
pub struct InputBinding {
    pub neuron: NeuronId,
    pub channel: ChannelId,
    /// Constant added to every reading.
    pub offset: f64,
}

/// Motor neuron driving one muscle through a delayed actuator channel.
#[derive(Debug, Clone, Copy)]
pub struct ActuatorBinding {
    /// Index into the retained muscle list.
    pub muscle: usize,
    pub neuron: NeuronId,
    pub channel: ChannelId,
}

/// Everything a `ControlNetwork` is assembled from.
#[derive(Debug, Clone)]
pub struct Topology {
    pub network: Network,
    /// `<GROUP>.<element>`, one per neuron, by flat id.
    pub neuron_names: Vec<String>,
    pub roles: Roles,
    pub anatomy: Anatomy,
    pub bus: DelayBus,
    pub sensors: Vec<SensorSource>,
    pub inputs: Vec<InputBinding>,
    pub actuators: Vec<ActuatorBinding>,
    pub warnings: Vec<TopologyWarning>,
}

impl Topology {
    /// Short description of the enabled roles plus neuron and link counts,
    /// e.g. `AB-36-212`.
    pub fn signature(&self) -> String {
        let r = &self.roles;
        let mut s = String::new();
        if r.ia.is_some() {
            s.push('A');
        }
        if !r.ib_family().is_empty() {
            s.push('B');
        }
        if r.pm.is_some() {
            s.push('P');
        }
        if r.rc.is_some() {
            s.push('R');
        }
        if r.ld.is_some() {
            s.push('L');
        }
        if r.ves.is_some() {
            s.push('V');
        }
        format!(
            "{s}-{}-{}",
            self.network.neuron_count(),
            self.network.link_count()
        )
    }
}

/// Parameter names of a link: the side-specific override name and the
/// shared name, which gets `_o` when source and target sit on opposite sides.
pub fn link_param_names(source: &str, target: &str) -> (String, String) {
    let own = format!("{target}-{source}");
    let mut shared = format!("{}-{}", name_without_side(target), name_without_side(source));
    if Side::from_name(source) != Side::from_name(target) {
        shared.push_str("_o");
    }
    (own, shared)
}

struct Builder<'a, P: ParamStore + ?Sized> {
    cfg: &'a SpinalConfig,
    store: &'a mut P,
    network: Network,
    neuron_names: Vec<String>,
    bus: DelayBus,
    sensors: Vec<SensorSource>,
    inputs: Vec<InputBinding>,
    actuators: Vec<ActuatorBinding>,
}

impl<'a, P: ParamStore + ?Sized> Builder<'a, P> {
    fn group_name(&self, group: GroupId) -> &str {
        &self.network.group(group).name
    }

    fn neuron_name(&self, group: GroupId, index: usize) -> &str {
        &self.neuron_names[self.network.neuron_id(group, index)]
    }

    fn neuron_side(&self, group: GroupId, index: usize) -> Side {
        Side::from_name(self.neuron_name(group, index))
    }

    /// Indices of the neurons of `group` that sit on `side`.
    fn on_side(&self, group: GroupId, side: Side) -> Vec<usize> {
        (0..self.network.group_size(group))
            .filter(|&i| self.neuron_side(group, i) == side)
            .collect()
    }

    fn add_input_group(&mut self, name: &str) -> GroupId {
        self.network.add_group(name, Activation::Input)
    }

    fn add_group(&mut self, name: &str) -> Result<GroupId, ConfigError> {
        let fn_name = self
            .cfg
            .activations
            .get(name)
            .unwrap_or(&self.cfg.activation);
        let activation = Activation::from_name(fn_name).ok_or_else(|| ConfigError::UnknownActivation {
            group: name.to_string(),
            name: fn_name.clone(),
        })?;
        Ok(self.network.add_group(name, activation))
    }

    fn add_neuron(&mut self, group: GroupId, element: &str, bias: Value) -> usize {
        assert_eq!(
            self.network.neuron_count(),
            self.neuron_names.len(),
            "neuron name registry out of sync with network"
        );
        let name = format!("{}.{element}", self.group_name(group));
        self.neuron_names.push(name);
        self.network.add_neuron(group, bias)
    }

    /// Neuron whose bias comes from `<GROUP>_bias` (zero when absent).
    fn add_param_neuron(&mut self, group: GroupId, element: &str) -> usize {
        let cfg = self.cfg;
        let full = format!("{}.{element}", self.group_name(group));
        let key = format!("{}_bias", self.group_name(group));
        let bias = match cfg.params.get(&key) {
            Some(spec) => self.param(&full, name_without_side(&full), spec, None),
            None => 0.0,
        };
        self.add_neuron(group, element, bias as Value)
    }

    fn add_muscle_group_neurons(&mut self, name: &str, anatomy: &Anatomy) -> Result<GroupId, ConfigError> {
        let g = self.add_group(name)?;
        for mg in &anatomy.groups {
            self.add_param_neuron(g, &mg.sided_name());
        }
        Ok(g)
    }

    fn add_sensor_neuron(
        &mut self,
        group: GroupId,
        element: &str,
        source: String,
        kind: SensorKind,
        delay: TimeInSeconds,
        offset: f64,
    ) {
        let index = self.add_neuron(group, element, 0.0);
        let neuron = self.network.neuron_id(group, index);
        let id = match self.bus.source_id(&source) {
            Some(id) => id,
            None => {
                let id = self.bus.add_source(&source);
                self.sensors.push(SensorSource {
                    name: source,
                    id,
                    kind,
                });
                id
            }
        };
        let channel = self.bus.acquire(id, delay, 0.0);
        self.inputs.push(InputBinding {
            neuron,
            channel,
            offset,
        });
    }

    /// Resolve a parameter by its sided name when a side-specific override
    /// exists, otherwise by its shared (side-stripped) name.
    ///
    /// An override is declared in the active params table (the muscle
    /// group's, then the top level) or already held by the store.
    fn param(&mut self, own: &str, shared: &str, spec: &ParamSpec, mg: Option<&MuscleGroupSpec>) -> f64 {
        if own != shared {
            let cfg = self.cfg;
            if let Some(own_spec) = cfg.param_spec(own, mg) {
                return self.store.get_or_create(own, own_spec);
            }
            if let Some(v) = self.store.try_get(own) {
                return v;
            }
        }
        self.store.get_or_create(shared, spec)
    }

    fn rule(
        &self,
        source: GroupId,
        target: GroupId,
        suffix: &str,
        mg: Option<&MuscleGroupSpec>,
    ) -> (String, Option<ParamSpec>) {
        let key = format!("{}_{}{suffix}", self.group_name(source), self.group_name(target));
        let spec = self.cfg.param_spec(&key, mg).cloned();
        (key, spec)
    }

    fn link(
        &mut self,
        source: NeuronId,
        target: NeuronId,
        spec: &ParamSpec,
        size: usize,
        mg: Option<&MuscleGroupSpec>,
    ) {
        assert!(size > 0, "aggregated link over an empty source set");
        let (own, shared) = link_param_names(&self.neuron_names[source], &self.neuron_names[target]);
        let w = self.param(&own, &shared, spec, mg) / size as f64;
        self.network.connect(source, target, w as Weight);
    }

    fn link_all(
        &mut self,
        source: GroupId,
        sources: &[usize],
        target: GroupId,
        tidx: usize,
        spec: &ParamSpec,
        mg: Option<&MuscleGroupSpec>,
    ) {
        let t = self.network.neuron_id(target, tidx);
        for &s in sources {
            let s = self.network.neuron_id(source, s);
            self.link(s, t, spec, sources.len(), mg);
        }
    }

    /// Required rule: the key must exist even when `sources` is empty.
    fn connect(
        &mut self,
        source: GroupId,
        sources: &[usize],
        target: GroupId,
        tidx: usize,
        mg: Option<&MuscleGroupSpec>,
        suffix: &str,
    ) -> Result<(), ConfigError> {
        let (key, spec) = self.rule(source, target, suffix, mg);
        let spec = spec.ok_or(ConfigError::MissingKey { key })?;
        self.link_all(source, sources, target, tidx, &spec, mg);
        Ok(())
    }

    /// Optional rule: no key, no links.
    fn try_connect(
        &mut self,
        source: GroupId,
        sources: &[usize],
        target: GroupId,
        tidx: usize,
        mg: Option<&MuscleGroupSpec>,
        suffix: &str,
    ) {
        if let (_, Some(spec)) = self.rule(source, target, suffix, mg) {
            self.link_all(source, sources, target, tidx, &spec, mg);
        }
    }
}

/// Classify the body's muscles and build the network in one deterministic pass.
pub fn build_topology<P>(
    cfg: &SpinalConfig,
    store: &mut P,
    body: &BodyDescription,
) -> Result<Topology, ConfigError>
where
    P: ParamStore + ?Sized,
{
    let mut anatomy = classify(&body.muscles, &cfg.muscle_groups, cfg.side, |m| cfg.neural_delay(m))?;
    let sides = sides_of(cfg.side);

    let mut b = Builder {
        cfg,
        store,
        network: Network::new(),
        neuron_names: Vec::new(),
        bus: DelayBus::new(),
        sensors: Vec::new(),
        inputs: Vec::new(),
        actuators: Vec::new(),
    };

    let l = b.add_input_group("L");
    for m in &anatomy.muscles {
        let kind = SensorKind::MuscleLength {
            muscle: m.body_index,
        };
        b.add_sensor_neuron(l, &m.name, format!("{}.L", m.name), kind, m.delay, cfg.length_offset);
    }

    let f = b.add_input_group("F");
    for m in &anatomy.muscles {
        let kind = SensorKind::MuscleForce {
            muscle: m.body_index,
        };
        b.add_sensor_neuron(f, &m.name, format!("{}.F", m.name), kind, m.delay, 0.0);
    }

    let ves = match &cfg.vestibular {
        Some(v) => {
            let g = b.add_input_group("VES");
            let segment = body.body_index(&v.body)?;
            let delay = v.delay * cfg.delay_scaling;
            let planar = cfg.planar.unwrap_or(body.dof_count < 14);
            let axes: &[Axis] = if planar { &[Axis::Z] } else { &Axis::ALL };
            for &axis in axes {
                for &side in &sides {
                    let a = sided_name(axis.name(), side);
                    if v.use_orivel {
                        let kind = SensorKind::BodyOriVel {
                            body: segment,
                            axis,
                            side,
                            gain: v.vel_gain,
                        };
                        b.add_sensor_neuron(g, &a, format!("{}.ov_{a}", v.body), kind, delay, 0.0);
                    } else {
                        let kind = SensorKind::BodyOrientation {
                            body: segment,
                            axis,
                            side,
                        };
                        b.add_sensor_neuron(g, &format!("p{a}"), format!("{}.o_{a}", v.body), kind, delay, 0.0);
                        let kind = SensorKind::BodyAngularVelocity {
                            body: segment,
                            axis,
                            side,
                            gain: v.vel_gain,
                        };
                        b.add_sensor_neuron(g, &format!("v{a}"), format!("{}.av_{a}", v.body), kind, delay, 0.0);
                    }
                }
            }
            Some(g)
        }
        None => None,
    };

    let ld = match &cfg.load {
        Some(load) => {
            let g = b.add_input_group("LD");
            for &side in &sides {
                let leg = body.leg_index(side)?;
                let kind = SensorKind::LegLoad { leg };
                let source = format!("{}.LD", body.legs[leg]);
                b.add_sensor_neuron(g, &sided_name("LD", side), source, kind, load.delay * cfg.delay_scaling, 0.0);
            }
            Some(g)
        }
        None => None,
    };

    let cpg = match &cfg.rhythm {
        Some(_) => {
            let g = b.add_group("CPG")?;
            for &side in &sides {
                b.add_param_neuron(g, &sided_name("flex", side));
                b.add_param_neuron(g, &sided_name("ext", side));
            }
            Some(g)
        }
        None => None,
    };

    let ia = optional_group(&mut b, "IA", &anatomy)?;
    let ib = optional_group(&mut b, "IB", &anatomy)?;
    let ibi = optional_group(&mut b, "IBI", &anatomy)?;
    let ibe = optional_group(&mut b, "IBE", &anatomy)?;
    let pm = optional_group(&mut b, "PM", &anatomy)?;

    let mn = b.add_group("MN")?;
    for (mi, m) in anatomy.muscles.iter().enumerate() {
        let index = b.add_param_neuron(mn, &m.name);
        let neuron = b.network.neuron_id(mn, index);
        let source = b.bus.add_source(&format!("{}.A", m.name));
        let channel = b.bus.acquire(source, m.delay, b.network.bias(neuron) as f64);
        b.actuators.push(ActuatorBinding {
            muscle: mi,
            neuron,
            channel,
        });
    }

    let rc = if cfg.has_key("RC_bias") {
        let g = b.add_group("RC")?;
        for m in &anatomy.muscles {
            b.add_param_neuron(g, &m.name);
        }
        Some(g)
    } else {
        None
    };

    let roles = Roles {
        l,
        f,
        ves,
        ld,
        cpg,
        ia,
        ib,
        ibi,
        ibe,
        pm,
        mn,
        rc,
    };

    connect_rhythm(&mut b, &roles, &anatomy, &sides)?;
    connect_interneurons(&mut b, &roles, &anatomy)?;
    connect_motor(&mut b, &roles, &anatomy)?;

    let mut warnings = std::mem::take(&mut anatomy.warnings);
    warnings.extend(disabled_rule_warnings(cfg, &b.network));

    Ok(Topology {
        network: b.network,
        neuron_names: b.neuron_names,
        roles,
        anatomy,
        bus: b.bus,
        sensors: b.sensors,
        inputs: b.inputs,
        actuators: b.actuators,
        warnings,
    })
}

/// One neuron per muscle group, enabled by `<NAME>_bias`.
fn optional_group<P: ParamStore + ?Sized>(
    b: &mut Builder<'_, P>,
    name: &str,
    anatomy: &Anatomy,
) -> Result<Option<GroupId>, ConfigError> {
    if b.cfg.has_key(&format!("{name}_bias")) {
        b.add_muscle_group_neurons(name, anatomy).map(Some)
    } else {
        Ok(None)
    }
}

fn connect_rhythm<P: ParamStore + ?Sized>(
    b: &mut Builder<'_, P>,
    roles: &Roles,
    anatomy: &Anatomy,
    sides: &[Side],
) -> Result<(), ConfigError> {
    let cfg = b.cfg;
    let (Some(cpg), Some(rhythm)) = (roles.cpg, &cfg.rhythm) else {
        return Ok(());
    };
    for si in 0..sides.len() {
        // flex and ext alternate per side
        let (flex, ext) = (2 * si, 2 * si + 1);
        for (half, other, pattern) in [(flex, ext, &rhythm.flex_inputs), (ext, flex, &rhythm.ext_inputs)] {
            b.connect(cpg, &[other], cpg, half, None, WEIGHT)?;
            for (mi, m) in anatomy.muscles.iter().enumerate() {
                if m.side != sides[si] {
                    continue;
                }
                for input in [roles.l, roles.f] {
                    if pattern.matches(b.neuron_name(input, mi)) {
                        b.connect(input, &[mi], cpg, half, None, WEIGHT)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn connect_interneurons<P: ParamStore + ?Sized>(
    b: &mut Builder<'_, P>,
    roles: &Roles,
    anatomy: &Anatomy,
) -> Result<(), ConfigError> {
    let cfg = b.cfg;
    let ib_family = roles.ib_family();

    for (mgi, mg) in anatomy.groups.iter().enumerate() {
        let tmpl = Some(&cfg.muscle_groups[mg.template]);

        if let Some(ia) = roles.ia {
            b.connect(roles.l, &mg.muscles, ia, mgi, tmpl, WEIGHT)?;
            b.connect(ia, &mg.antagonists, ia, mgi, tmpl, WEIGHT)?;
            if let Some(ves) = roles.ves {
                for vi in b.on_side(ves, mg.side) {
                    b.try_connect(ves, &[vi], ia, mgi, tmpl, WEIGHT);
                }
            }
            if let Some(ld) = roles.ld {
                for vi in 0..b.network.group_size(ld) {
                    b.try_connect(ld, &[vi], ia, mgi, tmpl, WEIGHT);
                }
            }
            if let Some(cpg) = roles.cpg {
                for ci in b.on_side(cpg, mg.side) {
                    b.connect(cpg, &[ci], ia, mgi, tmpl, WEIGHT)?;
                }
            }
            for src in [roles.ib, roles.ibe].into_iter().flatten() {
                b.try_connect(src, &[mgi], ia, mgi, tmpl, WEIGHT);
            }
            if let Some(rc) = roles.rc {
                b.connect(rc, &mg.muscles, ia, mgi, tmpl, WEIGHT)?;
            }
            if let Some(pm) = roles.pm {
                b.connect(pm, &[mgi], ia, mgi, tmpl, WEIGHT)?;
            }
        }

        for &role in &ib_family {
            b.connect(roles.f, &mg.muscles, role, mgi, tmpl, WEIGHT)?;
            b.try_connect(roles.l, &mg.muscles, role, mgi, tmpl, WEIGHT);
            if let Some(ld) = roles.ld {
                for vi in 0..b.network.group_size(ld) {
                    b.try_connect(ld, &[vi], role, mgi, tmpl, WEIGHT);
                }
            }
            if let Some(ves) = roles.ves {
                for vi in b.on_side(ves, mg.side) {
                    b.try_connect(ves, &[vi], role, mgi, tmpl, WEIGHT);
                }
            }

            // The role itself first, then the other enabled roles.
            let sources = iter::once(role).chain(ib_family.iter().copied().filter(|&r| r != role));
            for src in sources {
                b.try_connect(src, &mg.antagonists, role, mgi, tmpl, "_ant_weight");
                b.try_connect(src, &mg.related, role, mgi, tmpl, "_rel_weight");
                if let Some(ci) = mg.contralateral {
                    b.try_connect(src, &[ci], role, mgi, tmpl, "_com_weight");
                    let contra_ants = &anatomy.groups[ci].antagonists;
                    b.try_connect(src, contra_ants, role, mgi, tmpl, "_com_ant_weight");
                }
            }
        }

        if let Some(pm) = roles.pm {
            for (smgi, smg) in anatomy.groups.iter().enumerate() {
                if smg.side != mg.side {
                    continue;
                }
                for &role in &ib_family {
                    b.connect(role, &[smgi], pm, mgi, tmpl, WEIGHT)?;
                }
            }
            if let Some(ves) = roles.ves {
                for vi in b.on_side(ves, mg.side) {
                    b.try_connect(ves, &[vi], pm, mgi, tmpl, WEIGHT);
                }
            }
        }
    }
    Ok(())
}

fn connect_motor<P: ParamStore + ?Sized>(
    b: &mut Builder<'_, P>,
    roles: &Roles,
    anatomy: &Anatomy,
) -> Result<(), ConfigError> {
    let cfg = b.cfg;
    let ib_family = roles.ib_family();
    let mn = roles.mn;

    for (mi, m) in anatomy.muscles.iter().enumerate() {
        // Motor rules read the table of the muscle's first group.
        let tmpl = m
            .groups
            .iter()
            .next()
            .map(|&gi| &cfg.muscle_groups[anatomy.groups[gi].template]);
        let own: Vec<usize> = m.groups.iter().copied().collect();

        b.connect(roles.l, &[mi], mn, mi, tmpl, WEIGHT)?;
        if let Some(ia) = roles.ia {
            let antagonists: Vec<usize> = m.antagonists.iter().copied().collect();
            b.connect(ia, &antagonists, mn, mi, tmpl, WEIGHT)?;
        }
        for &role in &ib_family {
            b.connect(role, &own, mn, mi, tmpl, WEIGHT)?;
        }
        if let Some(cpg) = roles.cpg {
            for ci in b.on_side(cpg, m.side) {
                b.connect(cpg, &[ci], mn, mi, None, WEIGHT)?;
            }
        }
        if let Some(pm) = roles.pm {
            b.connect(pm, &own, mn, mi, tmpl, WEIGHT)?;
        }
        if let Some(rc) = roles.rc {
            b.connect(rc, &[mi], mn, mi, tmpl, WEIGHT)?;
            b.connect(mn, &[mi], rc, mi, tmpl, WEIGHT)?;
        }
    }
    Ok(())
}

/// Rule keys that name a role which is not part of the network.
fn disabled_rule_warnings(cfg: &SpinalConfig, network: &Network) -> Vec<TopologyWarning> {
    let enabled: BTreeSet<&str> = network.groups().iter().map(|g| g.name.as_str()).collect();
    let keys = cfg
        .params
        .keys()
        .chain(cfg.muscle_groups.iter().flat_map(|g| g.params.keys()));

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for key in keys {
        let Some(stem) = key.strip_suffix(WEIGHT) else {
            continue;
        };
        for group in stem.split('_').take(2) {
            if ROLE_NAMES.contains(&group) && !enabled.contains(group) && seen.insert((key.clone(), group)) {
                let w = TopologyWarning::DisabledGroupRule {
                    key: key.clone(),
                    group: group.to_string(),
                };
                warn!("{w}");
                out.push(w);
            }
        }
    }
    out
}
