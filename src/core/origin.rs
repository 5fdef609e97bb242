//! Decoded origins: named output ports that read per-unit activity and
//! decode it into a vector, one component per target function.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::approximator::LinearApproximator;
use crate::bias::BiasOrigin;
use crate::error::{Result, StructuralError};
use crate::function::Function;
use crate::named::Named;
use crate::population::SimulationMode;
use crate::time_series::TimeSeries;

/// Activity-dependent depression of each unit's contribution to an origin.
///
/// Each unit carries a resource level `r` in `[0, 1]` that scales its
/// activity before decoding. Resources are consumed in proportion to
/// activity and recover toward 1:
///
/// ```text
/// dr/dt = (1 - r) / tau_recovery - release_fraction * r * a
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShortTermPlasticity {
    pub tau_recovery: f32,
    pub release_fraction: f32,
    resources: Vec<f32>,
}

impl ShortTermPlasticity {
    pub fn new(units: usize, tau_recovery: f32, release_fraction: f32) -> Result<Self> {
        if tau_recovery.is_nan() || tau_recovery <= 0.0 {
            return Err(StructuralError::InvalidSystem {
                reason: "recovery time constant must be positive",
            }
            .into());
        }
        if !(0.0..=1.0).contains(&release_fraction) {
            return Err(StructuralError::InvalidSystem {
                reason: "release fraction must lie in [0, 1]",
            }
            .into());
        }
        Ok(Self {
            tau_recovery,
            release_fraction,
            resources: vec![1.0; units],
        })
    }

    pub fn resources(&self) -> &[f32] {
        &self.resources
    }

    fn update(&mut self, activities: &[f32], dt: f32) {
        if dt <= 0.0 {
            return;
        }
        for (r, &a) in self.resources.iter_mut().zip(activities) {
            let dr = (1.0 - *r) / self.tau_recovery - self.release_fraction * *r * a;
            *r = (*r + dt * dr).clamp(0.0, 1.0);
        }
    }

    fn reset(&mut self) {
        self.resources.iter_mut().for_each(|r| *r = 1.0);
    }
}

#[derive(Debug, Clone)]
pub struct DecodedOrigin {
    name: String,
    node_origin: String,
    functions: Vec<Box<dyn Function>>,
    /// rows = units, cols = functions
    decoders: DMatrix<f32>,
    values: DVector<f32>,
    mode: SimulationMode,
    required_on_accelerator: bool,
    stp: Option<ShortTermPlasticity>,
    time: f32,
}

impl DecodedOrigin {
    pub fn new(
        name: impl Into<String>,
        node_origin: impl Into<String>,
        functions: Vec<Box<dyn Function>>,
        decoders: DMatrix<f32>,
    ) -> Result<Self> {
        if decoders.ncols() != functions.len() {
            return Err(StructuralError::DimensionMismatch {
                context: "decoder columns",
                expected: functions.len(),
                got: decoders.ncols(),
            }
            .into());
        }
        Ok(Self {
            name: name.into(),
            node_origin: node_origin.into(),
            values: DVector::zeros(functions.len()),
            functions,
            decoders,
            mode: SimulationMode::Default,
            required_on_accelerator: false,
            stp: None,
            time: 0.0,
        })
    }

    /// Fits one decoder column per function with `approximator`.
    pub fn fit(
        name: impl Into<String>,
        node_origin: impl Into<String>,
        functions: Vec<Box<dyn Function>>,
        approximator: &dyn LinearApproximator,
    ) -> Result<Self> {
        let decoders = approximator.fit(&functions)?;
        Self::new(name, node_origin, functions, decoders)
    }

    pub fn node_origin(&self) -> &str {
        &self.node_origin
    }

    pub fn functions(&self) -> &[Box<dyn Function>] {
        &self.functions
    }

    pub fn decoders(&self) -> &DMatrix<f32> {
        &self.decoders
    }

    /// Replaces the decoding matrix. The shape must not change.
    pub fn set_decoders(&mut self, decoders: DMatrix<f32>) -> Result<()> {
        if decoders.shape() != self.decoders.shape() {
            return Err(StructuralError::ShapeMismatch {
                context: "replacement decoders",
                expected: self.decoders.shape(),
                got: decoders.shape(),
            }
            .into());
        }
        self.decoders = decoders;
        Ok(())
    }

    pub fn unit_count(&self) -> usize {
        self.decoders.nrows()
    }

    /// Output dimension: one component per function.
    pub fn dimension(&self) -> usize {
        self.functions.len()
    }

    /// Output produced by the last [`DecodedOrigin::run`].
    pub fn values(&self) -> &DVector<f32> {
        &self.values
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SimulationMode) {
        self.mode = mode;
    }

    pub fn required_on_accelerator(&self) -> bool {
        self.required_on_accelerator
    }

    /// Scheduler hint only; decoding ignores it.
    pub fn set_required_on_accelerator(&mut self, required: bool) {
        self.required_on_accelerator = required;
    }

    pub fn stp(&self) -> Option<&ShortTermPlasticity> {
        self.stp.as_ref()
    }

    /// Enables short-term depression with the given recovery time constant
    /// and release fraction, or disables it with `None`.
    pub fn set_stp(&mut self, params: Option<(f32, f32)>) -> Result<()> {
        self.stp = match params {
            Some((tau, u)) => Some(ShortTermPlasticity::new(self.unit_count(), tau, u)?),
            None => None,
        };
        Ok(())
    }

    /// `activitiesᵀ · decoders`, with activities depressed by the current
    /// plasticity resources.
    pub fn evaluate(&self, activities: &[f32]) -> Result<DVector<f32>> {
        if activities.len() != self.decoders.nrows() {
            return Err(StructuralError::DimensionMismatch {
                context: "origin activities",
                expected: self.decoders.nrows(),
                got: activities.len(),
            }
            .into());
        }
        let mut a = DVector::from_column_slice(activities);
        if let Some(stp) = &self.stp {
            for (x, r) in a.iter_mut().zip(stp.resources()) {
                *x *= r;
            }
        }
        Ok(self.decoders.tr_mul(&a))
    }

    /// Computes this tick's output. In `Direct` mode the functions are
    /// applied to the represented value instead of decoding activity.
    pub fn run(&mut self, activities: &[f32], represented: &[f32], end: f32) -> Result<()> {
        self.values = match self.mode {
            SimulationMode::Direct => {
                DVector::from_iterator(self.functions.len(), self.functions.iter().map(|f| f.map(represented)))
            }
            SimulationMode::Default | SimulationMode::Rate => self.evaluate(activities)?,
        };
        let dt = end - self.time;
        if let Some(stp) = &mut self.stp {
            stp.update(activities, dt);
        }
        self.time = end;
        Ok(())
    }

    pub fn history(&self) -> TimeSeries {
        TimeSeries::single(self.time, self.values.iter().copied().collect())
    }

    /// Plasticity resources per unit; all ones when plasticity is off.
    pub fn stp_history(&self) -> TimeSeries {
        let resources = match &self.stp {
            Some(stp) => stp.resources().to_vec(),
            None => vec![1.0; self.unit_count()],
        };
        TimeSeries::single(self.time, resources)
    }

    pub fn reset(&mut self) {
        self.values.fill(0.0);
        if let Some(stp) = &mut self.stp {
            stp.reset();
        }
        self.time = 0.0;
    }
}

impl Named for DecodedOrigin {
    fn name(&self) -> &str {
        &self.name
    }
}

/// An ensemble's decoded output port.
#[derive(Debug, Clone)]
pub enum Origin {
    Decoded(DecodedOrigin),
    Bias(Box<BiasOrigin>),
}

impl Origin {
    pub fn decoded(&self) -> &DecodedOrigin {
        match self {
            Origin::Decoded(o) => o,
            Origin::Bias(b) => b.origin(),
        }
    }

    pub fn decoded_mut(&mut self) -> &mut DecodedOrigin {
        match self {
            Origin::Decoded(o) => o,
            Origin::Bias(b) => b.origin_mut(),
        }
    }

    pub fn as_bias(&self) -> Option<&BiasOrigin> {
        match self {
            Origin::Bias(b) => Some(b.as_ref()),
            Origin::Decoded(_) => None,
        }
    }

    pub fn values(&self) -> &DVector<f32> {
        self.decoded().values()
    }

    pub fn run(&mut self, activities: &[f32], represented: &[f32], start: f32, end: f32) -> Result<()> {
        match self {
            Origin::Decoded(o) => o.run(activities, represented, end),
            Origin::Bias(b) => b.run(activities, represented, start, end),
        }
    }

    pub fn set_mode(&mut self, mode: SimulationMode) {
        match self {
            Origin::Decoded(o) => o.set_mode(mode),
            Origin::Bias(b) => b.set_mode(mode),
        }
    }

    pub fn reset(&mut self, randomize: bool) {
        match self {
            Origin::Decoded(o) => o.reset(),
            Origin::Bias(b) => b.reset(randomize),
        }
    }
}

impl Named for Origin {
    fn name(&self) -> &str {
        self.decoded().name()
    }
}
