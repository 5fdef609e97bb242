//! Linear time-invariant systems in state-space form.
//!
//! ```text
//! x' = A x + B u
//! y  = C x + D u
//! ```
//!
//! Terminations use these to model synaptic and filter dynamics. A system can
//! be given directly as matrices, as a single-pole low-pass, or realized from
//! transfer-function coefficients in controllable canonical form.

use nalgebra::{Complex, DMatrix, DVector, Schur};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError, StructuralError};

/// Unit tag attached to each system output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Units {
    #[default]
    Unknown,
    Current,
    SpikesPerSecond,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearSystem {
    a: DMatrix<f32>,
    b: DMatrix<f32>,
    c: DMatrix<f32>,
    d: DMatrix<f32>,
    output_units: Vec<Units>,
}

impl LinearSystem {
    /// Validated state-space system.
    ///
    /// `a` must be n×n, `b` n×p, `c` q×n, `d` q×p, with one unit tag per output.
    pub fn new(
        a: DMatrix<f32>,
        b: DMatrix<f32>,
        c: DMatrix<f32>,
        d: DMatrix<f32>,
        output_units: Vec<Units>,
    ) -> Result<Self> {
        let n = a.nrows();
        if n == 0 || a.ncols() != n {
            return Err(StructuralError::InvalidSystem {
                reason: "state matrix must be square and non-empty",
            }
            .into());
        }
        if b.nrows() != n {
            return Err(StructuralError::DimensionMismatch {
                context: "input matrix rows",
                expected: n,
                got: b.nrows(),
            }
            .into());
        }
        if c.ncols() != n {
            return Err(StructuralError::DimensionMismatch {
                context: "output matrix columns",
                expected: n,
                got: c.ncols(),
            }
            .into());
        }
        if d.nrows() != c.nrows() || d.ncols() != b.ncols() {
            return Err(StructuralError::InvalidSystem {
                reason: "feed-through matrix must be outputs x inputs",
            }
            .into());
        }
        if output_units.len() != c.nrows() {
            return Err(StructuralError::DimensionMismatch {
                context: "output unit tags",
                expected: c.nrows(),
                got: output_units.len(),
            }
            .into());
        }

        Ok(Self {
            a,
            b,
            c,
            d,
            output_units,
        })
    }

    /// One-pole low-pass with unit impulse integral: pole at `-1/tau`, output
    /// scaled by `1/tau`.
    pub fn low_pass(tau: f32) -> Result<Self> {
        if tau.is_nan() || tau <= 0.0 {
            return Err(StructuralError::InvalidSystem {
                reason: "time constant must be positive",
            }
            .into());
        }
        let scale = 1.0 / tau;
        Self::new(
            DMatrix::from_element(1, 1, -1.0 / tau),
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, scale),
            DMatrix::zeros(1, 1),
            vec![Units::Unknown],
        )
    }

    /// Controllable canonical realization of
    /// `H(s) = num(s) / den(s) + passthrough`.
    ///
    /// Coefficients are in descending powers of `s`. The denominator must have
    /// degree at least one and a non-zero leading coefficient; the numerator
    /// must be strictly lower in degree (the feed-through is `passthrough`).
    pub fn from_transfer_function(numerator: &[f32], denominator: &[f32], passthrough: f32) -> Result<Self> {
        if denominator.len() < 2 {
            return Err(StructuralError::InvalidTransferFunction {
                reason: "denominator degree must be at least one",
            }
            .into());
        }
        let lead = denominator[0];
        if lead == 0.0 || !lead.is_finite() {
            return Err(StructuralError::InvalidTransferFunction {
                reason: "leading denominator coefficient must be non-zero",
            }
            .into());
        }
        let n = denominator.len() - 1;
        if numerator.len() > n {
            return Err(StructuralError::InvalidTransferFunction {
                reason: "numerator degree must be below denominator degree",
            }
            .into());
        }
        if numerator
            .iter()
            .chain(denominator)
            .any(|c| !c.is_finite())
            || !passthrough.is_finite()
        {
            return Err(StructuralError::InvalidTransferFunction {
                reason: "coefficients must be finite",
            }
            .into());
        }

        let mut a = DMatrix::zeros(n, n);
        for j in 0..n {
            a[(0, j)] = -denominator[j + 1] / lead;
        }
        for i in 1..n {
            a[(i, i - 1)] = 1.0;
        }

        let mut b = DMatrix::zeros(n, 1);
        b[(0, 0)] = 1.0;

        // Right-align the numerator so C holds the coefficient of s^(n-1-j).
        let mut c = DMatrix::zeros(1, n);
        let offset = n - numerator.len();
        for (j, coeff) in numerator.iter().enumerate() {
            c[(0, offset + j)] = coeff / lead;
        }

        let d = DMatrix::from_element(1, 1, passthrough);
        Self::new(a, b, c, d, vec![Units::Unknown])
    }

    pub fn a(&self) -> &DMatrix<f32> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f32> {
        &self.b
    }

    pub fn c(&self) -> &DMatrix<f32> {
        &self.c
    }

    pub fn d(&self) -> &DMatrix<f32> {
        &self.d
    }

    pub fn output_units(&self) -> &[Units] {
        &self.output_units
    }

    pub fn state_dimension(&self) -> usize {
        self.a.nrows()
    }

    pub fn input_dimension(&self) -> usize {
        self.b.ncols()
    }

    pub fn output_dimension(&self) -> usize {
        self.c.nrows()
    }

    /// `A x + B u`
    pub fn derivative(&self, state: &DVector<f32>, input: &DVector<f32>) -> DVector<f32> {
        &self.a * state + &self.b * input
    }

    /// `C x + D u`
    pub fn output(&self, state: &DVector<f32>, input: &DVector<f32>) -> DVector<f32> {
        &self.c * state + &self.d * input
    }

    /// Eigenvalues of `A` via a real Schur decomposition.
    pub fn eigenvalues(&self) -> Result<Vec<Complex<f32>>> {
        let schur = Schur::try_new(self.a.clone(), f32::EPSILON, 10_000)
            .ok_or(SimulationError::EigenDecomposition)?;
        Ok(schur.complex_eigenvalues().iter().copied().collect())
    }

    /// Largest eigenvalue magnitude of `A`: the system's fastest rate.
    pub fn fastest_rate(&self) -> Result<f32> {
        let rate = self
            .eigenvalues()?
            .iter()
            .map(|l| l.norm())
            .fold(0.0f32, f32::max);
        if !rate.is_finite() {
            return Err(SimulationError::EigenDecomposition.into());
        }
        Ok(rate)
    }
}
