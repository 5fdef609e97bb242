//! Decode targets.
//!
//! The elementary function library lives outside this crate; the core only
//! relies on the `map(vector) -> scalar` contract below. The handful of
//! implementations here are the ones the decoding paths construct themselves.

use core::fmt;
use std::sync::Arc;

use crate::error::{Result, StructuralError};
use crate::time_series::TimeSeries;

pub trait Function: fmt::Debug + Send + Sync {
    /// Input dimension expected by [`Function::map`].
    fn dimension(&self) -> usize;

    fn map(&self, from: &[f32]) -> f32;

    fn clone_box(&self) -> Box<dyn Function>;
}

impl Clone for Box<dyn Function> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantFunction {
    dimension: usize,
    value: f32,
}

impl ConstantFunction {
    pub fn new(dimension: usize, value: f32) -> Self {
        Self { dimension, value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Function for ConstantFunction {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn map(&self, _from: &[f32]) -> f32 {
        self.value
    }

    fn clone_box(&self) -> Box<dyn Function> {
        Box::new(self.clone())
    }
}

/// Picks one component of the input vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityFunction {
    dimension: usize,
    index: usize,
}

impl IdentityFunction {
    pub fn new(dimension: usize, index: usize) -> Self {
        Self { dimension, index }
    }
}

impl Function for IdentityFunction {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn map(&self, from: &[f32]) -> f32 {
        from.get(self.index).copied().unwrap_or(0.0)
    }

    fn clone_box(&self) -> Box<dyn Function> {
        Box::new(self.clone())
    }
}

/// One dimension of a recorded trajectory, read as a function of time
/// (`from[0]`).
#[derive(Debug, Clone)]
pub struct TimeSeriesFunction {
    series: Arc<TimeSeries>,
    dim: usize,
}

impl TimeSeriesFunction {
    /// `dim` must be one of the series' dimensions.
    pub fn new(series: Arc<TimeSeries>, dim: usize) -> Result<Self> {
        if dim >= series.dimension() {
            return Err(StructuralError::DimensionMismatch {
                context: "time series dimension",
                expected: series.dimension(),
                got: dim + 1,
            }
            .into());
        }
        Ok(Self { series, dim })
    }
}

impl Function for TimeSeriesFunction {
    fn dimension(&self) -> usize {
        1
    }

    fn map(&self, from: &[f32]) -> f32 {
        self.series
            .interpolate(self.dim, from.first().copied().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    fn clone_box(&self) -> Box<dyn Function> {
        Box::new(self.clone())
    }
}

/// Adapts a plain closure.
#[derive(Clone)]
pub struct FnFunction<F> {
    dimension: usize,
    f: F,
}

impl<F> FnFunction<F>
where
    F: Fn(&[f32]) -> f32 + Clone + Send + Sync + 'static,
{
    pub fn new(dimension: usize, f: F) -> Self {
        Self { dimension, f }
    }
}

impl<F> fmt::Debug for FnFunction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunction")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl<F> Function for FnFunction<F>
where
    F: Fn(&[f32]) -> f32 + Clone + Send + Sync + 'static,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn map(&self, from: &[f32]) -> f32 {
        (self.f)(from)
    }

    fn clone_box(&self) -> Box<dyn Function> {
        Box::new(self.clone())
    }
}
