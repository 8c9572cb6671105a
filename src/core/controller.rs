use tracing::{debug, info};

use crate::anatomy::{MuscleGroup, MuscleRecord};
use crate::builder::{build_topology, ActuatorBinding, InputBinding, Roles};
use crate::config::{BodyDescription, SpinalConfig};
use crate::delay::{DelayBus, SourceId, TimeInSeconds};
use crate::error::{ConfigError, TopologyWarning};
use crate::network::{Network, NeuronId, Value};
use crate::params::ParamStore;
use crate::sensors::SensorSource;

/// Lifecycle of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Topology fixed, neuron values at bias, no tick yet.
    Built,
    /// First tick in progress.
    Equilibrating,
    Running,
    Finalized,
}

/// A built spinal control network bound to its delayed sensor and
/// actuator channels.
///
/// Per control step the owner records sensor readings (`sense` or
/// `record_sensor`), calls `tick`, then reads `excitation` per muscle.
#[derive(Debug, Clone)]
pub struct ControlNetwork {
    network: Network,
    neuron_names: Vec<String>,
    roles: Roles,
    muscles: Vec<MuscleRecord>,
    muscle_groups: Vec<MuscleGroup>,
    bus: DelayBus,
    sensors: Vec<SensorSource>,
    inputs: Vec<InputBinding>,
    actuators: Vec<ActuatorBinding>,
    warnings: Vec<TopologyWarning>,
    equilibration_steps: u32,
    state: NetworkState,
    signature: String,
}

impl ControlNetwork {
    /// Build the network once; every bias and weight is captured from
    /// `params` here and never queried again.
    pub fn build<P>(cfg: &SpinalConfig, params: &mut P, body: &BodyDescription) -> Result<Self, ConfigError>
    where
        P: ParamStore + ?Sized,
    {
        let t = build_topology(cfg, params, body)?;
        let signature = t.signature();
        info!(
            signature = %signature,
            muscles = t.anatomy.muscles.len(),
            warnings = t.warnings.len(),
            "spinal network built"
        );
        Ok(Self {
            network: t.network,
            neuron_names: t.neuron_names,
            roles: t.roles,
            muscles: t.anatomy.muscles,
            muscle_groups: t.anatomy.groups,
            bus: t.bus,
            sensors: t.sensors,
            inputs: t.inputs,
            actuators: t.actuators,
            warnings: t.warnings,
            equilibration_steps: cfg.equilibration_steps,
            state: NetworkState::Built,
            signature,
        })
    }

    /// Sensors the body simulator must supply each step.
    pub fn sensor_sources(&self) -> &[SensorSource] {
        &self.sensors
    }

    /// Record the reading of one sensor source produced at `time`.
    pub fn record_sensor(&mut self, source: SourceId, time: TimeInSeconds, value: f64) {
        self.bus.write_source(source, time, value);
    }

    /// Record the current reading of every sensor source.
    pub fn sense<F>(&mut self, time: TimeInSeconds, mut read: F)
    where
        F: FnMut(&SensorSource) -> f64,
    {
        for s in &self.sensors {
            self.bus.write_source(s.id, time, read(s));
        }
    }

    /// One control step at `time`: load delayed inputs, update, write
    /// motor outputs. The first tick also runs the equilibration updates.
    /// Returns whether the trial should stop, which this controller never requests.
    pub fn tick(&mut self, time: TimeInSeconds) -> bool {
        assert!(
            self.state != NetworkState::Finalized,
            "tick on a finalized network"
        );

        for inp in &self.inputs {
            let v = self.bus.read(inp.channel, time) + inp.offset;
            self.network.write_input(inp.neuron, v as Value);
        }

        self.network.update();

        if self.state == NetworkState::Built {
            self.state = NetworkState::Equilibrating;
            debug!(steps = self.equilibration_steps, time, "equilibrating");
            for _ in 0..self.equilibration_steps {
                self.network.update();
            }
        }
        self.state = NetworkState::Running;

        for act in &self.actuators {
            self.bus
                .write(act.channel, time, self.network.value(act.neuron) as f64);
        }
        false
    }

    /// Excitation reaching muscle `muscle` (retained-muscle index) at `time`,
    /// which may not precede the last tick.
    pub fn excitation(&mut self, muscle: usize, time: TimeInSeconds) -> f64 {
        self.bus.read(self.actuators[muscle].channel, time)
    }

    /// End the trial. Further ticks panic.
    pub fn finalize(&mut self) {
        self.state = NetworkState::Finalized;
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn warnings(&self) -> &[TopologyWarning] {
        &self.warnings
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn neuron_names(&self) -> &[String] {
        &self.neuron_names
    }

    pub fn neuron_name(&self, neuron: NeuronId) -> &str {
        &self.neuron_names[neuron]
    }

    pub fn muscles(&self) -> &[MuscleRecord] {
        &self.muscles
    }

    pub fn muscle_groups(&self) -> &[MuscleGroup] {
        &self.muscle_groups
    }

    pub fn actuators(&self) -> &[ActuatorBinding] {
        &self.actuators
    }

    pub fn bus(&self) -> &DelayBus {
        &self.bus
    }
}
