use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dynamics::LinearSystem;
use crate::error::{Result, StructuralError};

/// Euler steps per fastest time constant when the step size is derived from
/// the dynamics. Tunable.
pub const INTEGRATOR_STEPS_PER_TIME_CONSTANT: f32 = 10.0;

/// Forward-Euler integrator with a fixed maximum step size.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EulerIntegrator {
    step_size: f32,
}

impl EulerIntegrator {
    pub fn new(step_size: f32) -> Result<Self> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(StructuralError::InvalidStepSize { step: step_size }.into());
        }
        Ok(Self { step_size })
    }

    /// `tau / 10` for a single-pole system.
    pub fn for_time_constant(tau: f32) -> Result<Self> {
        Self::new(tau / INTEGRATOR_STEPS_PER_TIME_CONSTANT)
    }

    /// `1 / (10 * max|eig(A)|)`.
    ///
    /// A system whose state matrix has only zero eigenvalues has no time
    /// constant; it is advanced in a single step per interval.
    pub fn for_system(system: &LinearSystem) -> Result<Self> {
        let fastest = system.fastest_rate()?;
        if fastest == 0.0 {
            return Ok(Self {
                step_size: f32::INFINITY,
            });
        }
        Self::new(1.0 / (INTEGRATOR_STEPS_PER_TIME_CONSTANT * fastest))
    }

    pub fn step_size(&self) -> f32 {
        self.step_size
    }

    /// Overrides the derived step size.
    pub fn set_step_size(&mut self, step_size: f32) -> Result<()> {
        *self = Self::new(step_size)?;
        Ok(())
    }

    /// Advances `state` by `dt` with the input held constant, in as many equal
    /// sub-steps as needed to stay at or below the step size, and returns the
    /// output at the end of the interval.
    pub fn integrate(
        &self,
        system: &LinearSystem,
        state: &mut DVector<f32>,
        input: &DVector<f32>,
        dt: f32,
    ) -> DVector<f32> {
        if dt > 0.0 {
            let steps = (dt / self.step_size).ceil().max(1.0) as usize;
            let h = dt / steps as f32;
            for _ in 0..steps {
                let dx = system.derivative(state, input);
                state.axpy(h, &dx, 1.0);
            }
        }
        system.output(state, input)
    }
}
