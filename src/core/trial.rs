//! Closed-loop trial driver.
//!
//! The body simulator is an external collaborator behind [`BodySim`]; one
//! trial owns one `ControlNetwork` and one body, so independent candidates
//! can be evaluated on separate threads (`evaluate_batch`).

use crate::controller::ControlNetwork;
use crate::delay::TimeInSeconds;
use crate::observer::NetworkAdapter;
use crate::params::ParamSet;
use crate::sensors::SensorSource;

/// What the controller needs from a simulated body.
pub trait BodySim {
    /// Current reading of a sensor.
    fn sensor_value(&self, sensor: &SensorSource) -> f64;

    /// Apply excitation to a muscle, by index into `BodyDescription::muscles`.
    fn set_excitation(&mut self, body_muscle: usize, value: f64);

    /// Integrate the body forward by `dt` seconds.
    fn advance(&mut self, dt: TimeInSeconds);
}

#[derive(Debug, Clone, Default)]
pub struct TrialResult {
    /// Number of control steps executed.
    pub steps: usize,
    /// Simulation time of the last executed step.
    pub end_time: TimeInSeconds,
    /// Whether the controller requested termination.
    pub halted: bool,
    /// Per-step export frames (`time`, neuron and link values), when requested.
    pub frames: Vec<(TimeInSeconds, Vec<(String, f64)>)>,
}

/// Drive `net` against `body` on the grid `t_k = k * step_size` for
/// `duration` seconds: sense, tick, actuate, advance.
pub fn run_trial<B>(
    net: &mut ControlNetwork,
    body: &mut B,
    step_size: TimeInSeconds,
    duration: TimeInSeconds,
    record_frames: bool,
) -> TrialResult
where
    B: BodySim + ?Sized,
{
    assert!(step_size > 0.0, "step size must be positive");

    let steps = (duration / step_size + 1e-9).floor() as usize + 1;
    let mut result = TrialResult::default();

    for k in 0..steps {
        let t = k as f64 * step_size;
        net.sense(t, |s| body.sensor_value(s));
        let halt = net.tick(t);

        for mi in 0..net.muscles().len() {
            let target = net.muscles()[mi].body_index;
            let u = net.excitation(mi, t);
            body.set_excitation(target, u);
        }
        if record_frames {
            result.frames.push((t, NetworkAdapter::new(net).frame()));
        }

        result.steps = k + 1;
        result.end_time = t;
        if halt {
            result.halted = true;
            break;
        }
        body.advance(step_size);
    }

    net.finalize();
    result
}

/// Evaluate every candidate parameter set with `eval`, in candidate order.
///
/// With the `parallel` feature candidates run on the rayon thread pool.
pub fn evaluate_batch<R, F>(candidates: &[ParamSet], eval: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ParamSet) -> R + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        candidates.par_iter().map(|c| eval(c)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        candidates.iter().map(|c| eval(c)).collect()
    }
}
