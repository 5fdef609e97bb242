//! Linear decoder fitting.
//!
//! An approximator is built once per set of evaluation points together with
//! the population's activity at each point (`activities`: one row per point,
//! one column per unit). It then answers any number of target functions with a
//! decoding vector per function, so origins that share evaluation points share
//! the expensive factorization.
//!
//! Rank-deficient activity data is handled with Tikhonov regularization of the
//! Gram matrix (`noise`, as a fraction of peak activity) followed by the
//! minimum-norm SVD pseudo-inverse: singular values below
//! `pinv_tolerance * sigma_max` are treated as zero. With `noise = 0` this is
//! exactly the minimum-norm least-squares solution.

use core::fmt;

use nalgebra::{DMatrix, DVector};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError, StructuralError};
use crate::function::Function;

/// Coefficient constraint applied by [`GradientDescentApproximator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Constraint {
    /// Plain regularized least squares.
    #[default]
    None,
    /// Every decoding coefficient must be `>= 0`.
    NonNegative,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ApproximatorConfig {
    /// Regularization noise as a fraction of the peak activity.
    pub noise: f32,
    /// Relative singular-value cutoff for the pseudo-inverse.
    pub pinv_tolerance: f32,
    pub constraint: Constraint,
    /// Iteration cap for the constrained fixed-point loop.
    pub max_iterations: usize,
    /// Relative coefficient change below which the constrained loop stops.
    pub tolerance: f32,
    /// Multiplier on the stable step `1 / lambda_max(Gram)`; keep in (0, 2).
    pub learning_rate_scale: f32,
}

impl Default for ApproximatorConfig {
    fn default() -> Self {
        Self {
            noise: 0.1,
            pinv_tolerance: 1e-6,
            constraint: Constraint::None,
            max_iterations: 5_000,
            tolerance: 1e-6,
            learning_rate_scale: 1.0,
        }
    }
}

impl ApproximatorConfig {
    pub fn non_negative() -> Self {
        Self {
            constraint: Constraint::NonNegative,
            ..Self::default()
        }
    }
}

/// Projection onto a coefficient constraint set.
pub trait Constraints: fmt::Debug + Send + Sync {
    /// Corrects `coefficients` in place. Returns `true` when every
    /// coefficient had to be corrected, i.e. the whole vector sits on the
    /// constraint boundary.
    fn correct(&self, coefficients: &mut [f32]) -> bool;
}

/// Clamps negative coefficients to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoefficientsPositive;

impl Constraints for CoefficientsPositive {
    fn correct(&self, coefficients: &mut [f32]) -> bool {
        let mut all_corrected = true;
        for c in coefficients.iter_mut() {
            if *c < 0.0 {
                *c = 0.0;
            } else {
                all_corrected = false;
            }
        }
        all_corrected
    }
}

pub trait LinearApproximator: fmt::Debug + Send + Sync {
    fn eval_points(&self) -> &[Vec<f32>];

    fn unit_count(&self) -> usize;

    /// One coefficient per unit such that `activities * coefficients`
    /// approximates `targets` (one entry per evaluation point).
    fn find_coefficients(&self, targets: &DVector<f32>) -> Result<DVector<f32>>;

    /// Decoding matrix (units × outputs) for target samples given as one row
    /// per evaluation point and one column per output.
    fn fit_targets(&self, targets: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        let points = self.eval_points().len();
        if targets.nrows() != points {
            return Err(StructuralError::DimensionMismatch {
                context: "target samples",
                expected: points,
                got: targets.nrows(),
            }
            .into());
        }
        let mut decoders = DMatrix::zeros(self.unit_count(), targets.ncols());
        for j in 0..targets.ncols() {
            let column = self.find_coefficients(&targets.column(j).into_owned())?;
            decoders.set_column(j, &column);
        }
        Ok(decoders)
    }

    /// Decoding matrix (units × functions) for functions of the represented
    /// value, evaluated at each evaluation point.
    fn fit(&self, functions: &[Box<dyn Function>]) -> Result<DMatrix<f32>> {
        let points = self.eval_points();
        let targets = DMatrix::from_fn(points.len(), functions.len(), |i, j| {
            functions[j].map(&points[i])
        });
        self.fit_targets(&targets)
    }
}

/// Builds the approximator selected by `config.constraint`.
pub fn make_approximator(
    config: &ApproximatorConfig,
    eval_points: Vec<Vec<f32>>,
    activities: DMatrix<f32>,
) -> Result<Box<dyn LinearApproximator>> {
    Ok(match config.constraint {
        Constraint::None => Box::new(LeastSquaresApproximator::new(*config, eval_points, activities)?),
        Constraint::NonNegative => Box::new(GradientDescentApproximator::new(
            *config,
            eval_points,
            activities,
            Box::new(CoefficientsPositive),
        )?),
    })
}

/// Fits a decoding matrix (units × outputs) in one call.
///
/// `targets` and `activities` both have one row per evaluation point.
pub fn fit_decoders(
    eval_points: &[Vec<f32>],
    targets: &DMatrix<f32>,
    activities: &DMatrix<f32>,
    config: &ApproximatorConfig,
) -> Result<DMatrix<f32>> {
    make_approximator(config, eval_points.to_vec(), activities.clone())?.fit_targets(targets)
}

fn validate_samples(eval_points: &[Vec<f32>], activities: &DMatrix<f32>) -> Result<()> {
    if eval_points.is_empty() {
        return Err(StructuralError::EmptySamples {
            context: "evaluation points",
        }
        .into());
    }
    if activities.nrows() != eval_points.len() {
        return Err(StructuralError::DimensionMismatch {
            context: "activity samples",
            expected: eval_points.len(),
            got: activities.nrows(),
        }
        .into());
    }
    let dim = eval_points[0].len();
    if let Some(bad) = eval_points.iter().find(|p| p.len() != dim) {
        return Err(StructuralError::DimensionMismatch {
            context: "evaluation point dimension",
            expected: dim,
            got: bad.len(),
        }
        .into());
    }
    Ok(())
}

/// Regularized Gram matrix `AᵀA + (noise * max|A|)² * N * I`.
fn regularized_gram(activities: &DMatrix<f32>, noise: f32) -> DMatrix<f32> {
    let mut gram = activities.tr_mul(activities);
    let peak = activities.amax();
    let sigma = noise * peak;
    let ridge = sigma * sigma * activities.nrows() as f32;
    if ridge > 0.0 {
        for i in 0..gram.nrows() {
            gram[(i, i)] += ridge;
        }
    }
    gram
}

fn pseudo_inverse(gram: DMatrix<f32>, tolerance: f32) -> Result<DMatrix<f32>> {
    let svd = gram.svd(true, true);
    let cutoff = tolerance * svd.singular_values.max();
    let inverse = svd
        .pseudo_inverse(cutoff)
        .map_err(|reason| SimulationError::Numerical { reason })?;
    Ok(inverse)
}

/// Regularized least squares with a cached solve matrix.
#[derive(Debug, Clone)]
pub struct LeastSquaresApproximator {
    eval_points: Vec<Vec<f32>>,
    // pinv(Gram) * Aᵀ: units × points
    solve: DMatrix<f32>,
}

impl LeastSquaresApproximator {
    pub fn new(
        config: ApproximatorConfig,
        eval_points: Vec<Vec<f32>>,
        activities: DMatrix<f32>,
    ) -> Result<Self> {
        validate_samples(&eval_points, &activities)?;
        let gram = regularized_gram(&activities, config.noise);
        let inverse = pseudo_inverse(gram, config.pinv_tolerance)?;
        let solve = inverse * activities.transpose();
        Ok(Self { eval_points, solve })
    }
}

impl LinearApproximator for LeastSquaresApproximator {
    fn eval_points(&self) -> &[Vec<f32>] {
        &self.eval_points
    }

    fn unit_count(&self) -> usize {
        self.solve.nrows()
    }

    fn find_coefficients(&self, targets: &DVector<f32>) -> Result<DVector<f32>> {
        if targets.len() != self.eval_points.len() {
            return Err(StructuralError::DimensionMismatch {
                context: "target samples",
                expected: self.eval_points.len(),
                got: targets.len(),
            }
            .into());
        }
        Ok(&self.solve * targets)
    }
}

/// Projected gradient descent on the regularized squared error.
///
/// Each iteration takes a gradient step and then projects onto the
/// constraint set. The loop stops when the relative coefficient change falls
/// under `tolerance`, when every coefficient sits on the constraint boundary,
/// or after `max_iterations`.
#[derive(Debug)]
pub struct GradientDescentApproximator {
    config: ApproximatorConfig,
    eval_points: Vec<Vec<f32>>,
    activities_t: DMatrix<f32>,
    gram: DMatrix<f32>,
    learning_rate: f32,
    constraints: Box<dyn Constraints>,
}

impl GradientDescentApproximator {
    pub fn new(
        config: ApproximatorConfig,
        eval_points: Vec<Vec<f32>>,
        activities: DMatrix<f32>,
        constraints: Box<dyn Constraints>,
    ) -> Result<Self> {
        validate_samples(&eval_points, &activities)?;
        let gram = regularized_gram(&activities, config.noise);
        let sigma_max = gram.clone().svd(false, false).singular_values.max();
        let learning_rate = if sigma_max > 0.0 {
            config.learning_rate_scale / sigma_max
        } else {
            0.0
        };
        Ok(Self {
            config,
            eval_points,
            activities_t: activities.transpose(),
            gram,
            learning_rate,
            constraints,
        })
    }
}

impl LinearApproximator for GradientDescentApproximator {
    fn eval_points(&self) -> &[Vec<f32>] {
        &self.eval_points
    }

    fn unit_count(&self) -> usize {
        self.gram.nrows()
    }

    fn find_coefficients(&self, targets: &DVector<f32>) -> Result<DVector<f32>> {
        if targets.len() != self.eval_points.len() {
            return Err(StructuralError::DimensionMismatch {
                context: "target samples",
                expected: self.eval_points.len(),
                got: targets.len(),
            }
            .into());
        }

        let n = self.gram.nrows();
        let mut coefficients = DVector::zeros(n);
        if self.learning_rate == 0.0 {
            return Ok(coefficients);
        }

        let aty = &self.activities_t * targets;
        let mut converged = false;
        for _ in 0..self.config.max_iterations {
            let gradient = &self.gram * &coefficients - &aty;
            let mut next = &coefficients - gradient * self.learning_rate;
            let all_corrected = self.constraints.correct(next.as_mut_slice());

            let change = (&next - &coefficients).norm();
            let scale = next.norm().max(f32::EPSILON);
            coefficients = next;

            if all_corrected || change <= self.config.tolerance * scale {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                iterations = self.config.max_iterations,
                "constrained decoder fit hit its iteration cap"
            );
        }
        Ok(coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{ConstantFunction, IdentityFunction};

    // Rectified-linear "units" with distinct thresholds over x in [-1, 1].
    fn ramp_samples(points: usize, units: usize) -> (Vec<Vec<f32>>, DMatrix<f32>) {
        let xs: Vec<Vec<f32>> = (0..points)
            .map(|i| vec![-1.0 + 2.0 * i as f32 / (points - 1) as f32])
            .collect();
        let acts = DMatrix::from_fn(points, units, |i, j| {
            let threshold = -1.0 + 2.0 * j as f32 / units as f32;
            let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
            (sign * (xs[i][0] - threshold)).max(0.0) * 50.0
        });
        (xs, acts)
    }

    #[test]
    fn decoding_matrix_shape_is_units_by_functions() {
        let (xs, acts) = ramp_samples(5, 3);
        let approx = LeastSquaresApproximator::new(ApproximatorConfig::default(), xs, acts).unwrap();
        let functions: Vec<Box<dyn Function>> = vec![Box::new(ConstantFunction::new(1, 1.0))];
        let d = approx.fit(&functions).unwrap();
        assert_eq!((d.nrows(), d.ncols()), (3, 1));
    }

    #[test]
    fn least_squares_reconstructs_identity() {
        let (xs, acts) = ramp_samples(41, 16);
        let config = ApproximatorConfig {
            noise: 0.01,
            ..Default::default()
        };
        let approx = LeastSquaresApproximator::new(config, xs.clone(), acts.clone()).unwrap();
        let functions: Vec<Box<dyn Function>> = vec![Box::new(IdentityFunction::new(1, 0))];
        let d = approx.fit(&functions).unwrap();
        let estimate = &acts * &d;
        let rmse = (0..xs.len())
            .map(|i| (estimate[(i, 0)] - xs[i][0]).powi(2))
            .sum::<f32>()
            .sqrt()
            / (xs.len() as f32).sqrt();
        assert!(rmse < 0.1, "rmse {rmse}");
    }

    #[test]
    fn rank_deficient_activities_yield_finite_minimum_norm_decoders() {
        // Two identical units: infinitely many exact solutions.
        let xs: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32]).collect();
        let acts = DMatrix::from_fn(4, 2, |i, _| i as f32 + 1.0);
        let targets = DMatrix::from_fn(4, 1, |i, _| 2.0 * (i as f32 + 1.0));
        let config = ApproximatorConfig {
            noise: 0.0,
            pinv_tolerance: 1e-4,
            ..Default::default()
        };
        let d = fit_decoders(&xs, &targets, &acts, &config).unwrap();
        assert!(d.iter().all(|v| v.is_finite()));
        // Minimum-norm split is symmetric.
        assert!((d[(0, 0)] - d[(1, 0)]).abs() < 1e-3);
        assert!((d[(0, 0)] + d[(1, 0)] - 2.0).abs() < 1e-2);
    }

    #[test]
    fn all_zero_activity_returns_zero_decoders() {
        let xs: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32]).collect();
        let acts = DMatrix::zeros(5, 3);
        let targets = DMatrix::from_element(5, 1, 1.0);
        let d = fit_decoders(&xs, &targets, &acts, &ApproximatorConfig::default()).unwrap();
        assert_eq!(d, DMatrix::zeros(3, 1));
    }

    #[test]
    fn non_negative_fit_respects_constraint() {
        let (xs, acts) = ramp_samples(21, 8);
        let approx = make_approximator(&ApproximatorConfig::non_negative(), xs, acts).unwrap();
        let functions: Vec<Box<dyn Function>> = vec![Box::new(IdentityFunction::new(1, 0))];
        let d = approx.fit(&functions).unwrap();
        assert!(d.iter().all(|&c| c >= 0.0));
        assert!(d.iter().any(|&c| c > 0.0));
    }

    #[test]
    fn iteration_cap_still_returns_a_valid_matrix() {
        let (xs, acts) = ramp_samples(21, 8);
        let capped = ApproximatorConfig {
            max_iterations: 3,
            tolerance: 0.0,
            ..ApproximatorConfig::non_negative()
        };
        let functions: Vec<Box<dyn Function>> = vec![Box::new(IdentityFunction::new(1, 0))];

        let early = make_approximator(&capped, xs.clone(), acts.clone())
            .unwrap()
            .fit(&functions)
            .unwrap();
        assert_eq!(early.shape(), (8, 1));
        assert!(early.iter().all(|&c| c.is_finite() && c >= 0.0));
        assert!(early.iter().any(|&c| c > 0.0));

        let full = make_approximator(&ApproximatorConfig::non_negative(), xs, acts)
            .unwrap()
            .fit(&functions)
            .unwrap();
        assert_ne!(early, full);

        let none = ApproximatorConfig {
            max_iterations: 0,
            ..capped
        };
        let (xs, acts) = ramp_samples(21, 8);
        let d = make_approximator(&none, xs, acts).unwrap().fit(&functions).unwrap();
        assert_eq!(d, DMatrix::zeros(8, 1));
    }

    #[test]
    fn constraint_boundary_returns_degenerate_matrix() {
        // Positive activities and a negative target push every coefficient
        // below zero on the first step.
        let xs: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32]).collect();
        let acts = DMatrix::from_fn(6, 3, |i, j| (i + j + 1) as f32);
        let targets = DMatrix::from_element(6, 1, -1.0);
        let d = fit_decoders(&xs, &targets, &acts, &ApproximatorConfig::non_negative()).unwrap();
        assert_eq!(d, DMatrix::zeros(3, 1));
    }

    #[test]
    fn coefficients_positive_reports_all_corrected() {
        let mut all_negative = [-1.0, -0.5];
        assert!(CoefficientsPositive.correct(&mut all_negative));
        assert_eq!(all_negative, [0.0, 0.0]);

        let mut mixed = [-1.0, 0.5];
        assert!(!CoefficientsPositive.correct(&mut mixed));
        assert_eq!(mixed, [0.0, 0.5]);
    }

    #[test]
    fn mismatched_sample_counts_are_structural() {
        let xs: Vec<Vec<f32>> = (0..3).map(|i| vec![i as f32]).collect();
        let acts = DMatrix::zeros(4, 2);
        let err = LeastSquaresApproximator::new(ApproximatorConfig::default(), xs, acts).unwrap_err();
        assert!(err.is_structural());
    }
}
