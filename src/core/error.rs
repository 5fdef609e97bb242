use thiserror::Error;

/// Invalid configuration, detectable without running a simulation.
///
/// Raised at the point of misuse; the ensemble's origin and termination maps
/// are left exactly as they were before the failing call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error("the ensemble already contains an origin named {name}")]
    DuplicateOrigin { name: String },

    #[error("the ensemble already contains a termination named {name}")]
    DuplicateTermination { name: String },

    #[error("origin {name} does not exist or is not a decoded origin")]
    MissingOrigin { name: String },

    #[error("termination {name} does not exist or is not a decoded termination")]
    MissingTermination { name: String },

    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("invalid transfer function: {reason}")]
    InvalidTransferFunction { reason: &'static str },

    #[error("invalid state-space system: {reason}")]
    InvalidSystem { reason: &'static str },

    #[error("bias decoder undefined: summed constant outputs never exceed zero")]
    DegenerateBias,

    #[error("no samples supplied for {context}")]
    EmptySamples { context: &'static str },

    #[error("scaling reference {peer} of termination {name} does not resolve")]
    UnresolvedScaling { name: String, peer: String },

    #[error("invalid integration step size {step}")]
    InvalidStepSize { step: f32 },
}

/// Failure while executing a dynamical step or a sub-simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("environment run failed: {reason}")]
    Environment { reason: String },

    #[error("eigen-decomposition of the state matrix did not converge")]
    EigenDecomposition,

    #[error("numerical failure: {reason}")]
    Numerical { reason: &'static str },

    #[error("probe returned no samples")]
    EmptyProbe,

    #[error("no probeable state named {name}")]
    UnknownState { name: String },

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NefError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

impl NefError {
    pub fn is_structural(&self) -> bool {
        matches!(self, NefError::Structural(_))
    }
}

pub type Result<T> = core::result::Result<T, NefError>;
