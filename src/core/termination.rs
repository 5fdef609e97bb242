//! Decoded terminations: named input ports that transform an upstream vector
//! and filter it through an owned LTI system before it reaches the
//! population.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dynamics::LinearSystem;
use crate::error::{Result, StructuralError};
use crate::integrator::EulerIntegrator;
use crate::named::Named;
use crate::prng::Prng;
use crate::time_series::TimeSeries;

/// Amplitude of the randomized state perturbation applied by
/// [`DecodedTermination::reset`].
const RESET_PERTURBATION: f32 = 1e-3;

/// How a termination's filter is specified.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationDynamics {
    /// Unit-integral one-pole low-pass with the given post-synaptic time
    /// constant.
    LowPass { tau: f32 },
    /// `num(s) / den(s) + passthrough`, coefficients in descending powers.
    TransferFunction {
        numerator: Vec<f32>,
        denominator: Vec<f32>,
        passthrough: f32,
    },
    StateSpace(LinearSystem),
}

impl TerminationDynamics {
    /// Builds the system and an integrator sized to its fastest time constant.
    pub fn build(&self) -> Result<(LinearSystem, EulerIntegrator)> {
        match self {
            TerminationDynamics::LowPass { tau } => Ok((
                LinearSystem::low_pass(*tau)?,
                EulerIntegrator::for_time_constant(*tau)?,
            )),
            TerminationDynamics::TransferFunction {
                numerator,
                denominator,
                passthrough,
            } => {
                let system = LinearSystem::from_transfer_function(numerator, denominator, *passthrough)?;
                let integrator = EulerIntegrator::for_system(&system)?;
                Ok((system, integrator))
            }
            TerminationDynamics::StateSpace(system) => {
                let integrator = EulerIntegrator::for_system(system)?;
                Ok((system.clone(), integrator))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TerminationState {
    /// Built but not yet attached to an ensemble.
    #[default]
    Uninitialized,
    Active,
    Removed,
}

/// How the system is applied to the transformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// A SISO system, replicated once per output dimension.
    PerDimension,
    /// One MIMO system over the whole transformed vector.
    Shared,
}

#[derive(Debug, Clone)]
pub struct DecodedTermination {
    name: String,
    /// rows = output dimension, cols = upstream dimension
    transform: DMatrix<f32>,
    dynamics: TerminationDynamics,
    system: LinearSystem,
    integrator: EulerIntegrator,
    layout: Layout,
    states: Vec<DVector<f32>>,
    input: DVector<f32>,
    output: DVector<f32>,
    modulatory: bool,
    scaling: Option<String>,
    state: TerminationState,
    rng: Prng,
    time: f32,
}

impl DecodedTermination {
    pub fn new(
        name: impl Into<String>,
        transform: DMatrix<f32>,
        dynamics: TerminationDynamics,
        modulatory: bool,
        seed: u64,
    ) -> Result<Self> {
        let out_dim = transform.nrows();
        if out_dim == 0 || transform.ncols() == 0 {
            return Err(StructuralError::DimensionMismatch {
                context: "termination transform",
                expected: 1,
                got: 0,
            }
            .into());
        }

        let (system, integrator) = dynamics.build()?;
        let (p, q) = (system.input_dimension(), system.output_dimension());
        let layout = if p == 1 && q == 1 {
            Layout::PerDimension
        } else if p == out_dim && q == out_dim {
            Layout::Shared
        } else {
            return Err(StructuralError::DimensionMismatch {
                context: "termination dynamics inputs",
                expected: out_dim,
                got: p,
            }
            .into());
        };

        let copies = match layout {
            Layout::PerDimension => out_dim,
            Layout::Shared => 1,
        };
        let states = vec![DVector::zeros(system.state_dimension()); copies];

        Ok(Self {
            name: name.into(),
            input: DVector::zeros(transform.ncols()),
            output: DVector::zeros(out_dim),
            transform,
            dynamics,
            system,
            integrator,
            layout,
            states,
            modulatory,
            scaling: None,
            state: TerminationState::Uninitialized,
            rng: Prng::new(seed),
            time: 0.0,
        })
    }

    pub fn transform(&self) -> &DMatrix<f32> {
        &self.transform
    }

    pub fn dynamics(&self) -> &TerminationDynamics {
        &self.dynamics
    }

    pub fn system(&self) -> &LinearSystem {
        &self.system
    }

    pub fn integrator(&self) -> &EulerIntegrator {
        &self.integrator
    }

    /// Lets callers override the derived step size.
    pub fn integrator_mut(&mut self) -> &mut EulerIntegrator {
        &mut self.integrator
    }

    /// Upstream signal dimension.
    pub fn input_dimension(&self) -> usize {
        self.transform.ncols()
    }

    pub fn output_dimension(&self) -> usize {
        self.transform.nrows()
    }

    pub fn is_modulatory(&self) -> bool {
        self.modulatory
    }

    pub fn scaling(&self) -> Option<&str> {
        self.scaling.as_deref()
    }

    /// Name of the peer termination whose output scales this one. The owning
    /// ensemble validates the name.
    pub(crate) fn set_scaling(&mut self, peer: Option<String>) {
        self.scaling = peer;
    }

    pub fn lifecycle(&self) -> TerminationState {
        self.state
    }

    pub(crate) fn activate(&mut self) {
        self.state = TerminationState::Active;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.state = TerminationState::Removed;
    }

    /// Filtered drive produced by the last step.
    pub fn output(&self) -> &DVector<f32> {
        &self.output
    }

    pub fn input(&self) -> &DVector<f32> {
        &self.input
    }

    /// Stores the upstream value consumed by [`DecodedTermination::run`].
    pub fn set_input(&mut self, upstream: &[f32]) -> Result<()> {
        self.check_upstream(upstream)?;
        self.input.copy_from_slice(upstream);
        Ok(())
    }

    /// Advances the dynamics by `dt` on the stored input.
    pub fn run(&mut self, dt: f32, scale: Option<f32>) -> Result<&DVector<f32>> {
        let upstream = self.input.clone();
        self.advance(&upstream, dt, scale)
    }

    /// Applies the transform to `upstream`, optionally multiplied by a
    /// runtime scale, and integrates the dynamics for `dt`.
    pub fn step(&mut self, upstream: &[f32], dt: f32, scale: Option<f32>) -> Result<&DVector<f32>> {
        self.set_input(upstream)?;
        let upstream = self.input.clone();
        self.advance(&upstream, dt, scale)
    }

    fn advance(&mut self, upstream: &DVector<f32>, dt: f32, scale: Option<f32>) -> Result<&DVector<f32>> {
        if self.state == TerminationState::Removed {
            return Err(StructuralError::MissingTermination {
                name: self.name.clone(),
            }
            .into());
        }

        let mut drive = &self.transform * upstream;
        if let Some(s) = scale {
            drive *= s;
        }

        match self.layout {
            Layout::PerDimension => {
                for (i, state) in self.states.iter_mut().enumerate() {
                    let u = DVector::from_element(1, drive[i]);
                    let y = self.integrator.integrate(&self.system, state, &u, dt);
                    self.output[i] = y[0];
                }
            }
            Layout::Shared => {
                self.output = self.integrator.integrate(&self.system, &mut self.states[0], &drive, dt);
            }
        }
        self.time += dt.max(0.0);
        Ok(&self.output)
    }

    /// Returns the dynamics to the zero state, or to a small random
    /// perturbation of it.
    pub fn reset(&mut self, randomize: bool) {
        for state in &mut self.states {
            for x in state.iter_mut() {
                *x = if randomize {
                    self.rng.gen_range_f32(-RESET_PERTURBATION, RESET_PERTURBATION)
                } else {
                    0.0
                };
            }
        }
        let zero_in = DVector::zeros(self.system.input_dimension());
        match self.layout {
            Layout::PerDimension => {
                for (i, state) in self.states.iter().enumerate() {
                    self.output[i] = self.system.output(state, &zero_in)[0];
                }
            }
            Layout::Shared => self.output = self.system.output(&self.states[0], &zero_in),
        }
        self.time = 0.0;
    }

    /// Latest output as a one-sample series.
    pub fn history(&self) -> TimeSeries {
        TimeSeries::single(self.time, self.output.iter().copied().collect())
    }

    fn check_upstream(&self, upstream: &[f32]) -> Result<()> {
        if upstream.len() != self.transform.ncols() {
            return Err(StructuralError::DimensionMismatch {
                context: "termination input",
                expected: self.transform.ncols(),
                got: upstream.len(),
            }
            .into());
        }
        Ok(())
    }
}

impl Named for DecodedTermination {
    fn name(&self) -> &str {
        &self.name
    }
}
