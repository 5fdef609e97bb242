//! Decodable ensembles for Neural Engineering Framework simulations.
//!
//! A [`ensemble::DecodableEnsemble`] wraps a population of units with named
//! decoded origins (linear read-outs of functions of the represented value)
//! and decoded terminations (transformed, filtered inputs). Decoders are fit
//! by regularized least squares or a sign-constrained variant, either on
//! steady-state rates or on activity recorded from a simulated network.

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/time_series.rs"]
pub mod time_series;

#[path = "core/function.rs"]
pub mod function;

#[path = "core/dynamics.rs"]
pub mod dynamics;

#[path = "core/integrator.rs"]
pub mod integrator;

#[path = "core/approximator.rs"]
pub mod approximator;

#[path = "core/population.rs"]
pub mod population;

#[path = "core/named.rs"]
pub mod named;

#[path = "core/termination.rs"]
pub mod termination;

#[path = "core/origin.rs"]
pub mod origin;

#[path = "core/bias.rs"]
pub mod bias;

#[path = "core/environment.rs"]
pub mod environment;

#[path = "core/ensemble.rs"]
pub mod ensemble;

#[path = "core/config.rs"]
pub mod config;

pub mod observer;

pub use error::{NefError, Result, SimulationError, StructuralError};

/// Commonly used types.
pub mod prelude {
    pub use crate::approximator::{ApproximatorConfig, Constraint, LinearApproximator};
    pub use crate::bias::BiasOrigin;
    pub use crate::config::NefConfig;
    pub use crate::dynamics::LinearSystem;
    pub use crate::ensemble::{DecodableEnsemble, OriginRef, TerminationRef};
    pub use crate::environment::{Environment, FunctionInput, Probe, TerminationAddress};
    pub use crate::error::{NefError, Result, SimulationError, StructuralError};
    pub use crate::function::{ConstantFunction, FnFunction, Function, IdentityFunction, TimeSeriesFunction};
    pub use crate::named::Named;
    pub use crate::observer::{EnsembleAdapter, EnsembleSnapshot};
    pub use crate::origin::{DecodedOrigin, Origin};
    pub use crate::population::{ExecutionTier, LifPopulation, Population, PopulationConfig, SimulationMode, AXON};
    pub use crate::termination::{DecodedTermination, TerminationDynamics};
    pub use crate::time_series::TimeSeries;
}
