#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "simd")]
use wide::f32x4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, StructuralError};
use crate::prng::Prng;
use crate::time_series::TimeSeries;

/// Type alias for unit activity (spikes per second, filtered).
pub type Activity = f32;

/// Node-level origin carrying per-unit activity.
pub const AXON: &str = "AXON";

/// Probeable membrane-voltage state.
pub const VOLTAGE: &str = "V";

/// Probeable represented-input state.
pub const INPUT: &str = "input";

/// How a population (and the origins reading it) is simulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SimulationMode {
    /// Spiking units; activity is the low-passed spike train.
    #[default]
    Default,
    /// Steady-state firing rates.
    Rate,
    /// Units are bypassed; origins evaluate their functions on the
    /// represented input directly.
    Direct,
}

/// Execution tier for the spiking update.
///
/// - `Scalar`: Single-threaded, no SIMD (baseline)
/// - `Simd`: Single-threaded with the membrane update vectorized
/// - `Parallel`: Multi-threaded via rayon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    #[default]
    Scalar,
    /// Requires the `simd` feature, otherwise falls back to `Scalar`.
    Simd,
    /// Requires the `parallel` feature, otherwise falls back to `Scalar`.
    Parallel,
}

impl ExecutionTier {
    /// The tier that will actually run given compile-time features.
    pub fn effective(self) -> ExecutionTier {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Simd => {
                #[cfg(feature = "simd")]
                {
                    ExecutionTier::Simd
                }
                #[cfg(not(feature = "simd"))]
                {
                    ExecutionTier::Scalar
                }
            }
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// The population-stepping collaborator an ensemble delegates to.
pub trait Population: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the represented vector space.
    fn dimension(&self) -> usize;

    /// Names of the node-level origins decoders may read from.
    fn node_origins(&self) -> &[&'static str];

    /// Names of node-level terminations, listed ahead of decoded ones.
    fn node_terminations(&self) -> &[&'static str] {
        &[]
    }

    /// Steady-state per-unit response to a constant represented value.
    fn rates(&self, point: &[f32]) -> Vec<Activity>;

    /// Evaluation points drawn from this population's generator.
    fn eval_points(&mut self, count: usize) -> Vec<Vec<f32>>;

    /// Advances the units over `[start, end]` with `input` held constant.
    fn step(&mut self, start: f32, end: f32, input: &[f32]) -> Result<()>;

    /// Per-unit activity after the last step.
    fn activities(&self) -> &[Activity];

    /// Represented input of the last step.
    fn represented(&self) -> &[f32];

    fn reset(&mut self, randomize: bool);

    fn mode(&self) -> SimulationMode;

    fn set_mode(&mut self, mode: SimulationMode);

    /// Population-level probe states, as `(name, description)`.
    fn list_states(&self) -> Vec<(String, String)>;

    /// Latest value of a population-level state.
    fn history(&self, state: &str) -> Option<TimeSeries>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PopulationConfig {
    pub unit_count: usize,
    pub dimension: usize,

    /// Membrane time constant (s).
    pub tau_rc: f32,
    /// Refractory period (s).
    pub tau_ref: f32,

    /// Uniform range of firing rates at the preferred-direction edge (Hz).
    pub max_rate: (f32, f32),
    /// Uniform range of threshold positions along the encoder.
    pub intercept: (f32, f32),

    /// Force every encoder component to be non-negative.
    pub rectified_encoders: bool,

    /// Radius of the evaluation-point ball.
    pub eval_point_radius: f32,
    /// Constant added to dimension 0 of every evaluation point.
    pub eval_point_bias: f32,

    /// Low-pass time constant applied to spikes to form activity (s).
    pub activity_tau: f32,

    pub mode: SimulationMode,
    pub tier: ExecutionTier,

    // If set, makes encoders, intercepts and evaluation points reproducible.
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            unit_count: 50,
            dimension: 1,
            tau_rc: 0.02,
            tau_ref: 0.002,
            max_rate: (200.0, 400.0),
            intercept: (-1.0, 1.0),
            rectified_encoders: false,
            eval_point_radius: 1.0,
            eval_point_bias: 0.0,
            activity_tau: 0.005,
            mode: SimulationMode::Default,
            tier: ExecutionTier::Scalar,
            seed: None,
        }
    }
}

impl PopulationConfig {
    pub fn with_size(unit_count: usize, dimension: usize) -> Self {
        Self {
            unit_count,
            dimension,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Unit {
    pub encoder: Vec<f32>,
    pub gain: f32,
    pub bias: f32,

    pub voltage: f32,
    /// Remaining refractory time (s).
    pub refractory: f32,
    pub activity: Activity,
}

impl Unit {
    #[inline]
    fn current(&self, input: &[f32]) -> f32 {
        let drive: f32 = self.encoder.iter().zip(input).map(|(e, x)| e * x).sum();
        self.gain * drive + self.bias
    }
}

#[inline]
fn lif_rate(current: f32, tau_rc: f32, tau_ref: f32) -> f32 {
    if current <= 1.0 {
        return 0.0;
    }
    1.0 / (tau_ref - tau_rc * (1.0 - 1.0 / current).ln())
}

/// One spiking sub-step for a unit whose candidate voltage is already known.
/// Returns whether it spiked.
#[inline]
fn settle_unit(u: &mut Unit, candidate: f32, dt: f32, tau_ref: f32) -> bool {
    if u.refractory > 0.0 {
        u.refractory -= dt;
        // Absorb rounding so a period of k*dt lasts exactly k steps.
        if u.refractory < 0.5 * dt {
            u.refractory = 0.0;
        }
        return false;
    }
    if candidate > 1.0 {
        u.voltage = 0.0;
        u.refractory = tau_ref;
        return true;
    }
    u.voltage = candidate.max(0.0);
    false
}

/// Leaky integrate-and-fire population with random encoders, gains and biases.
#[derive(Debug, Clone)]
pub struct LifPopulation {
    cfg: PopulationConfig,
    units: Vec<Unit>,
    activities: Vec<Activity>,
    input: Vec<f32>,
    time: f32,
    rng: Prng,
}

impl LifPopulation {
    pub fn new(cfg: PopulationConfig) -> Result<Self> {
        if cfg.unit_count == 0 {
            return Err(StructuralError::EmptySamples {
                context: "population units",
            }
            .into());
        }
        if cfg.dimension == 0 {
            return Err(StructuralError::DimensionMismatch {
                context: "population dimension",
                expected: 1,
                got: 0,
            }
            .into());
        }

        let mut rng = Prng::new(cfg.seed.unwrap_or(1));

        let mut units = Vec::with_capacity(cfg.unit_count);
        for _ in 0..cfg.unit_count {
            let mut encoder = rng.unit_vector(cfg.dimension);
            if cfg.rectified_encoders {
                for e in &mut encoder {
                    *e = e.abs();
                }
            }

            // Gain and bias place the threshold (J = 1) at the intercept and
            // the requested rate at the edge of the represented range.
            let intercept = rng.gen_range_f32(cfg.intercept.0, cfg.intercept.1).min(0.999);
            let max_rate = rng.gen_range_f32(cfg.max_rate.0, cfg.max_rate.1);
            let x = 1.0 / (1.0 - ((cfg.tau_ref - 1.0 / max_rate) / cfg.tau_rc).exp());
            let gain = (x - 1.0) / (1.0 - intercept);
            let bias = 1.0 - gain * intercept;

            units.push(Unit {
                encoder,
                gain,
                bias,
                voltage: 0.0,
                refractory: 0.0,
                activity: 0.0,
            });
        }

        Ok(Self {
            activities: vec![0.0; cfg.unit_count],
            input: vec![0.0; cfg.dimension],
            cfg,
            units,
            time: 0.0,
            rng,
        })
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.cfg
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.cfg.tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.cfg.tier
    }

    fn step_rate(&mut self) {
        let (tau_rc, tau_ref) = (self.cfg.tau_rc, self.cfg.tau_ref);
        for u in &mut self.units {
            u.activity = lif_rate(u.current(&self.input), tau_rc, tau_ref);
        }
    }

    fn step_spiking(&mut self, dt: f32) {
        let currents: Vec<f32> = self.units.iter().map(|u| u.current(&self.input)).collect();
        let alpha = dt / self.cfg.tau_rc;
        let tau_ref = self.cfg.tau_ref;
        let decay = (-dt / self.cfg.activity_tau).exp();
        let impulse = (1.0 - decay) / dt;

        match self.cfg.tier.effective() {
            ExecutionTier::Scalar => {
                for (u, &j) in self.units.iter_mut().zip(&currents) {
                    let candidate = u.voltage + (j - u.voltage) * alpha;
                    let spiked = settle_unit(u, candidate, dt, tau_ref);
                    u.activity = decay * u.activity + if spiked { impulse } else { 0.0 };
                }
            }
            #[cfg(feature = "simd")]
            ExecutionTier::Simd => {
                let n = self.units.len();
                let mut candidates = vec![0.0f32; n];
                let alpha_v = f32x4::splat(alpha);
                let simd_end = n - n % 4;
                let mut i = 0;
                while i < simd_end {
                    let v = f32x4::from([
                        self.units[i].voltage,
                        self.units[i + 1].voltage,
                        self.units[i + 2].voltage,
                        self.units[i + 3].voltage,
                    ]);
                    let j = f32x4::from([currents[i], currents[i + 1], currents[i + 2], currents[i + 3]]);
                    let next = v + (j - v) * alpha_v;
                    candidates[i..(i + 4)].copy_from_slice(&next.to_array());
                    i += 4;
                }
                // Handle remainder (tail elements).
                for k in simd_end..n {
                    let v = self.units[k].voltage;
                    candidates[k] = v + (currents[k] - v) * alpha;
                }
                for (u, &candidate) in self.units.iter_mut().zip(&candidates) {
                    let spiked = settle_unit(u, candidate, dt, tau_ref);
                    u.activity = decay * u.activity + if spiked { impulse } else { 0.0 };
                }
            }
            #[cfg(feature = "parallel")]
            ExecutionTier::Parallel => {
                self.units
                    .par_iter_mut()
                    .zip(currents.par_iter())
                    .for_each(|(u, &j)| {
                        let candidate = u.voltage + (j - u.voltage) * alpha;
                        let spiked = settle_unit(u, candidate, dt, tau_ref);
                        u.activity = decay * u.activity + if spiked { impulse } else { 0.0 };
                    });
            }
            #[allow(unreachable_patterns)]
            _ => unreachable!("effective() only returns enabled tiers"),
        }
    }
}

impl Population for LifPopulation {
    fn len(&self) -> usize {
        self.units.len()
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    fn node_origins(&self) -> &[&'static str] {
        &[AXON]
    }

    fn rates(&self, point: &[f32]) -> Vec<Activity> {
        let (tau_rc, tau_ref) = (self.cfg.tau_rc, self.cfg.tau_ref);
        self.units
            .iter()
            .map(|u| lif_rate(u.current(point), tau_rc, tau_ref))
            .collect()
    }

    fn eval_points(&mut self, count: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|_| {
                let mut p = self.rng.in_ball(self.cfg.dimension, self.cfg.eval_point_radius);
                p[0] += self.cfg.eval_point_bias;
                p
            })
            .collect()
    }

    fn step(&mut self, start: f32, end: f32, input: &[f32]) -> Result<()> {
        if input.len() != self.cfg.dimension {
            return Err(StructuralError::DimensionMismatch {
                context: "population input",
                expected: self.cfg.dimension,
                got: input.len(),
            }
            .into());
        }
        self.input.copy_from_slice(input);

        let dt = end - start;
        match self.cfg.mode {
            SimulationMode::Direct => {}
            SimulationMode::Rate => self.step_rate(),
            SimulationMode::Default => {
                if dt > 0.0 {
                    self.step_spiking(dt);
                }
            }
        }

        for (a, u) in self.activities.iter_mut().zip(&self.units) {
            *a = u.activity;
        }
        self.time = end;
        Ok(())
    }

    fn activities(&self) -> &[Activity] {
        &self.activities
    }

    fn represented(&self) -> &[f32] {
        &self.input
    }

    fn reset(&mut self, randomize: bool) {
        for u in &mut self.units {
            u.voltage = if randomize { self.rng.next_f32_01() } else { 0.0 };
            u.refractory = 0.0;
            u.activity = 0.0;
        }
        self.activities.iter_mut().for_each(|a| *a = 0.0);
        self.input.iter_mut().for_each(|x| *x = 0.0);
        self.time = 0.0;
    }

    fn mode(&self) -> SimulationMode {
        self.cfg.mode
    }

    fn set_mode(&mut self, mode: SimulationMode) {
        self.cfg.mode = mode;
    }

    fn list_states(&self) -> Vec<(String, String)> {
        vec![
            (AXON.to_string(), "Per-unit activity".to_string()),
            (VOLTAGE.to_string(), "Membrane potential".to_string()),
            (INPUT.to_string(), "Represented input".to_string()),
        ]
    }

    fn history(&self, state: &str) -> Option<TimeSeries> {
        let values = match state {
            AXON => self.activities.clone(),
            VOLTAGE => self.units.iter().map(|u| u.voltage).collect(),
            INPUT => self.input.clone(),
            _ => return None,
        };
        Some(TimeSeries::single(self.time, values))
    }
}
