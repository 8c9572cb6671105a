use serde::Serialize;

use crate::controller::ControlNetwork;
use crate::delay::TimeInSeconds;
use crate::error::TopologyWarning;
use crate::network::Activation;

/// A read-only snapshot of a built network.
///
/// Design intent:
/// - Observers cannot mutate or steer the network.
/// - Snapshotting is *on-demand* and allocates; `tick` stays unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub signature: String,
    pub neurons: usize,
    pub links: usize,
    pub muscles: Vec<MuscleReport>,
    pub muscle_groups: Vec<MuscleGroupReport>,
    pub groups: Vec<GroupReport>,
    pub warnings: Vec<TopologyWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MuscleReport {
    pub name: String,
    pub delay: TimeInSeconds,
    pub groups: Vec<usize>,
    pub antagonists: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MuscleGroupReport {
    pub name: String,
    pub muscles: Vec<usize>,
    pub antagonists: Vec<usize>,
    pub related: Vec<usize>,
    pub contralateral: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub activation: Activation,
    pub neurons: Vec<NeuronReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeuronReport {
    pub name: String,
    pub bias: f32,
    pub value: f32,
    pub inputs: Vec<LinkReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub source: String,
    pub weight: f32,
}

pub struct NetworkAdapter<'a> {
    net: &'a ControlNetwork,
}

impl<'a> NetworkAdapter<'a> {
    pub fn new(net: &'a ControlNetwork) -> Self {
        Self { net }
    }

    pub fn describe(&self) -> NetworkReport {
        let net = self.net;
        let graph = net.network();

        let muscles = net
            .muscles()
            .iter()
            .map(|m| MuscleReport {
                name: m.name.clone(),
                delay: m.delay,
                groups: m.groups.iter().copied().collect(),
                antagonists: m.antagonists.iter().copied().collect(),
            })
            .collect();

        let muscle_groups = net
            .muscle_groups()
            .iter()
            .map(|g| MuscleGroupReport {
                name: g.sided_name(),
                muscles: g.muscles.clone(),
                antagonists: g.antagonists.clone(),
                related: g.related.clone(),
                contralateral: g.contralateral,
            })
            .collect();

        let groups = graph
            .groups()
            .iter()
            .map(|g| GroupReport {
                name: g.name.clone(),
                activation: g.activation,
                neurons: g
                    .range()
                    .map(|n| NeuronReport {
                        name: net.neuron_name(n).to_string(),
                        bias: graph.bias(n),
                        value: graph.value(n),
                        inputs: graph
                            .inputs(n)
                            .iter()
                            .map(|l| LinkReport {
                                source: net.neuron_name(l.source).to_string(),
                                weight: l.weight,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        NetworkReport {
            signature: net.signature().to_string(),
            neurons: graph.neuron_count(),
            links: graph.link_count(),
            muscles,
            muscle_groups,
            groups,
            warnings: net.warnings().to_vec(),
        }
    }

    /// Per-step export: every neuron value plus each link's instantaneous
    /// contribution (`weight * source value`) keyed `target-source`.
    ///
    /// Two rules can link the same pair (a group that is both antagonist and
    /// related); the second link is keyed `target-source#2`, and so on.
    pub fn frame(&self) -> Vec<(String, f64)> {
        let net = self.net;
        let graph = net.network();
        let mut out = Vec::with_capacity(graph.neuron_count() + graph.link_count());
        for n in 0..graph.neuron_count() {
            let name = net.neuron_name(n);
            out.push((name.to_string(), graph.value(n) as f64));
            let inputs = graph.inputs(n);
            for (i, l) in inputs.iter().enumerate() {
                let v = graph.value(l.source) * l.weight;
                let mut key = format!("{name}-{}", net.neuron_name(l.source));
                let repeat = inputs[..i].iter().filter(|p| p.source == l.source).count();
                if repeat > 0 {
                    key.push_str(&format!("#{}", repeat + 1));
                }
                out.push((key, v as f64));
            }
        }
        out
    }
}
