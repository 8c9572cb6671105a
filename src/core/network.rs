use core::ops::Range;

use serde::Serialize;

pub type NeuronId = usize;
pub type GroupId = usize;

/// Neuron state and bias.
pub type Value = f32;

/// Link weight.
pub type Weight = f32;

/// Per-group update function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Input group: values are written from outside and never recomputed.
    Input,
    Linear,
    Relu,
    Tanh,
    /// `max(0, tanh(x))`
    TanhRelu,
    Sigmoid,
}

impl Activation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" | "identity" => Some(Activation::Linear),
            "relu" | "rectifier" => Some(Activation::Relu),
            "tanh" => Some(Activation::Tanh),
            "tanh_relu" => Some(Activation::TanhRelu),
            "sigmoid" => Some(Activation::Sigmoid),
            _ => None,
        }
    }

    pub fn is_input(self) -> bool {
        self == Activation::Input
    }

    #[inline]
    pub fn apply(self, x: Value) -> Value {
        match self {
            Activation::Input | Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::TanhRelu => x.tanh().max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NeuronGroup {
    pub name: String,
    pub activation: Activation,
    /// Neurons of this group occupy `begin..end` in the flat arrays.
    pub begin: NeuronId,
    pub end: NeuronId,
}

impl NeuronGroup {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn range(&self) -> Range<NeuronId> {
        self.begin..self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Link {
    pub source: NeuronId,
    pub target: NeuronId,
    pub weight: Weight,
}

/// Neuron groups, neurons and weighted links in flat arrays.
///
/// Neurons are group-contiguous: a group only accepts neurons while it is
/// the most recently added group. Links are kept sorted by target (stable
/// in insertion order) with CSR offsets, so the update loop walks each
/// neuron's inputs sequentially.
#[derive(Debug, Clone)]
pub struct Network {
    groups: Vec<NeuronGroup>,

    group_of: Vec<GroupId>,
    bias: Vec<Value>,
    values: Vec<Value>,

    links: Vec<Link>,
    /// Neuron `n` owns links `input_offsets[n]..input_offsets[n + 1]`.
    input_offsets: Vec<usize>,

    // Previous-tick snapshot used by `update()`.
    snapshot: Vec<Value>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            group_of: Vec::new(),
            bias: Vec::new(),
            values: Vec::new(),
            links: Vec::new(),
            input_offsets: vec![0],
            snapshot: Vec::new(),
        }
    }

    pub fn add_group(&mut self, name: &str, activation: Activation) -> GroupId {
        let begin = self.bias.len();
        self.groups.push(NeuronGroup {
            name: name.to_string(),
            activation,
            begin,
            end: begin,
        });
        self.groups.len() - 1
    }

    /// Append a neuron to `group`; returns its index within the group.
    /// The initial value equals the bias.
    pub fn add_neuron(&mut self, group: GroupId, bias: Value) -> usize {
        assert_eq!(
            group + 1,
            self.groups.len(),
            "neurons can only be added to the most recent group"
        );
        let id = self.bias.len();
        self.group_of.push(group);
        self.bias.push(bias);
        self.values.push(bias);
        // A new neuron has no inputs and sorts after every existing target.
        self.input_offsets.push(self.links.len());
        let g = &mut self.groups[group];
        g.end = id + 1;
        id - g.begin
    }

    /// Add a directed link. Several links between the same pair are allowed.
    pub fn connect(&mut self, source: NeuronId, target: NeuronId, weight: Weight) {
        let n = self.neuron_count();
        assert!(source < n, "link source {source} out of range ({n} neurons)");
        assert!(target < n, "link target {target} out of range ({n} neurons)");
        assert!(
            !self.groups[self.group_of[target]].activation.is_input(),
            "link into input neuron {target}"
        );

        // Insert after the target's existing inputs, then shift the offsets.
        let at = self.input_offsets[target + 1];
        self.links.insert(at, Link { source, target, weight });
        for off in &mut self.input_offsets[target + 1..] {
            *off += 1;
        }
    }

    pub fn neuron_count(&self) -> usize {
        self.bias.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[NeuronGroup] {
        &self.groups
    }

    pub fn group(&self, group: GroupId) -> &NeuronGroup {
        &self.groups[group]
    }

    pub fn group_size(&self, group: GroupId) -> usize {
        self.groups[group].len()
    }

    pub fn group_of(&self, neuron: NeuronId) -> GroupId {
        self.group_of[neuron]
    }

    /// Flat id of neuron `index` within `group`.
    pub fn neuron_id(&self, group: GroupId, index: usize) -> NeuronId {
        let g = &self.groups[group];
        assert!(
            index < g.len(),
            "neuron {index} out of range for group {} ({} neurons)",
            g.name,
            g.len()
        );
        g.begin + index
    }

    pub fn bias(&self, neuron: NeuronId) -> Value {
        self.bias[neuron]
    }

    pub fn value(&self, neuron: NeuronId) -> Value {
        self.values[neuron]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Incoming links of `neuron`, in creation order.
    pub fn inputs(&self, neuron: NeuronId) -> &[Link] {
        &self.links[self.input_offsets[neuron]..self.input_offsets[neuron + 1]]
    }

    pub fn set_value(&mut self, group: GroupId, index: usize, value: Value) {
        let id = self.neuron_id(group, index);
        self.values[id] = value;
    }

    /// Overwrite the value of an input neuron by flat id.
    pub fn write_input(&mut self, neuron: NeuronId, value: Value) {
        assert!(
            self.groups[self.group_of[neuron]].activation.is_input(),
            "neuron {neuron} is not an input neuron"
        );
        self.values[neuron] = value;
    }

    /// One synchronous update of every non-input neuron:
    /// `v' = f(bias + sum(w * v_src))`, all sources read from the
    /// values as they were before this call.
    pub fn update(&mut self) {
        self.snapshot.clear();
        self.snapshot.extend_from_slice(&self.values);

        for g in &self.groups {
            if g.activation.is_input() {
                continue;
            }
            for n in g.range() {
                let mut acc = self.bias[n];
                for l in &self.links[self.input_offsets[n]..self.input_offsets[n + 1]] {
                    acc += l.weight * self.snapshot[l.source];
                }
                self.values[n] = g.activation.apply(acc);
            }
        }
    }
}
