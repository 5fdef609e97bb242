//! Narrow interfaces to the network an ensemble is embedded in.
//!
//! Origins that fit decoders from simulated data drive an external network
//! to completion and read the result back through a probe. The core only
//! needs the handful of operations below.

use crate::error::Result;
use crate::function::{ConstantFunction, Function};
use crate::time_series::TimeSeries;

/// A source node whose output is a vector of functions of time.
#[derive(Debug, Clone)]
pub struct FunctionInput {
    name: String,
    functions: Vec<Box<dyn Function>>,
}

impl FunctionInput {
    /// Name of the single origin every function input exposes.
    pub const ORIGIN: &'static str = "origin";

    pub fn new(name: impl Into<String>, functions: Vec<Box<dyn Function>>) -> Self {
        Self {
            name: name.into(),
            functions,
        }
    }

    /// One constant function per component of `values`.
    pub fn constant(name: impl Into<String>, values: &[f32]) -> Self {
        let functions = values
            .iter()
            .map(|&v| Box::new(ConstantFunction::new(1, v)) as Box<dyn Function>)
            .collect();
        Self::new(name, functions)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.functions.len()
    }

    /// Output at time `t`.
    pub fn values(&self, t: f32) -> Vec<f32> {
        self.functions.iter().map(|f| f.map(&[t])).collect()
    }
}

/// Where a projection lands: a termination on a named node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminationAddress {
    pub node: String,
    pub termination: String,
}

impl TerminationAddress {
    pub fn new(node: impl Into<String>, termination: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            termination: termination.into(),
        }
    }
}

/// The network a decoder-fitting sub-simulation runs in.
///
/// Implementations report their failures as [`crate::SimulationError`]s;
/// runs are blocking and are not retried.
pub trait Environment {
    fn add_node(&mut self, node: FunctionInput) -> Result<()>;

    fn remove_node(&mut self, name: &str) -> Result<()>;

    fn add_projection(&mut self, origin_node: &str, origin: &str, termination: &TerminationAddress) -> Result<()>;

    fn remove_projection(&mut self, termination: &TerminationAddress) -> Result<()>;

    fn run(&mut self, start: f32, end: f32) -> Result<()>;
}

/// Recorder of one simulated signal.
pub trait Probe {
    fn reset(&mut self);

    fn data(&self) -> TimeSeries;
}
