#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, StructuralError};

/// A sampled vector trajectory: `values[k]` is the sample taken at `times[k]`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeSeries {
    times: Vec<f32>,
    values: Vec<Vec<f32>>,
}

impl TimeSeries {
    /// One value vector per time sample, all of the same width.
    pub fn new(times: Vec<f32>, values: Vec<Vec<f32>>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(StructuralError::DimensionMismatch {
                context: "time series samples",
                expected: times.len(),
                got: values.len(),
            }
            .into());
        }
        let width = values.first().map_or(0, Vec::len);
        if let Some(bad) = values.iter().find(|v| v.len() != width) {
            return Err(StructuralError::DimensionMismatch {
                context: "time series sample width",
                expected: width,
                got: bad.len(),
            }
            .into());
        }
        Ok(Self { times, values })
    }

    pub fn single(time: f32, values: Vec<f32>) -> Self {
        Self {
            times: vec![time],
            values: vec![values],
        }
    }

    pub fn times(&self) -> &[f32] {
        &self.times
    }

    pub fn values(&self) -> &[Vec<f32>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// Value of dimension `dim` at time `t`, linearly interpolated and held
    /// constant outside the recorded range. `None` for an empty series or a
    /// dimension the samples do not have.
    pub fn interpolate(&self, dim: usize, t: f32) -> Option<f32> {
        let at = |k: usize| self.values.get(k).and_then(|v| v.get(dim)).copied();
        let (first, last) = (*self.times.first()?, *self.times.last()?);
        if t <= first {
            return at(0);
        }
        if t >= last {
            return at(self.times.len() - 1);
        }
        let hi = self.times.partition_point(|&x| x <= t);
        let lo = hi - 1;
        let span = self.times[hi] - self.times[lo];
        if span <= 0.0 {
            return at(lo);
        }
        let w = (t - self.times[lo]) / span;
        Some(at(lo)? * (1.0 - w) + at(hi)? * w)
    }

    /// First-order low-pass of every dimension with time constant `tau`,
    /// starting from a zero state.
    pub fn filter(&self, tau: f32) -> TimeSeries {
        let dim = self.dimension();
        let mut state = vec![0.0f32; dim];
        let mut out = Vec::with_capacity(self.values.len());
        let mut prev_t = self.times.first().copied().unwrap_or(0.0);

        for (k, sample) in self.values.iter().enumerate() {
            let dt = if k == 0 {
                self.times.get(1).map_or(0.0, |t1| t1 - prev_t)
            } else {
                self.times[k] - prev_t
            };
            prev_t = self.times[k];

            let decay = if tau > 0.0 { (-dt / tau).exp() } else { 0.0 };
            for (s, &x) in state.iter_mut().zip(sample) {
                *s = decay * *s + (1.0 - decay) * x;
            }
            out.push(state.clone());
        }

        TimeSeries {
            times: self.times.clone(),
            values: out,
        }
    }
}
