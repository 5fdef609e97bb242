//! Bias origins.
//!
//! A projection whose weights are forced to a single sign distorts the
//! signal it carries by a bias term proportional to the summed activity of
//! the sending units. A bias origin decodes exactly that term with a uniform
//! decoder, and owns a small population of sign-selective interneurons
//! through which the correction is routed in parallel with the main
//! projection. See Parisien, Anderson & Eliasmith (2008).

use nalgebra::DMatrix;
use tracing::info;

use crate::approximator::ApproximatorConfig;
use crate::ensemble::DecodableEnsemble;
use crate::error::{Result, StructuralError};
use crate::function::{ConstantFunction, FnFunction, Function, IdentityFunction};
use crate::origin::DecodedOrigin;
use crate::population::{LifPopulation, PopulationConfig, SimulationMode, AXON};

/// Termination on the interneurons driven by the bias signal.
pub const INTERNEURON_INPUT: &str = "input";

/// Origin on the interneurons carrying the sign-corrected signal.
pub const INTERNEURON_OUTPUT: &str = "X";

const INTERNEURON_TAU_PSC: f32 = 0.005;

#[derive(Debug, Clone)]
pub struct BiasOrigin {
    origin: DecodedOrigin,
    interneurons: DecodableEnsemble<LifPopulation>,
    excitatory: bool,
}

impl BiasOrigin {
    /// Uniform decoder `±1 / max_i Σ_j outputs[i][j]` that makes the summed
    /// activity peak at exactly `1` (excitatory) or `-1` (inhibitory) over
    /// the sample set. `constant_outputs` has one row per sample and one
    /// column per unit.
    pub fn bias_decoder(constant_outputs: &DMatrix<f32>, excitatory: bool) -> Result<f32> {
        let peak = constant_outputs
            .row_iter()
            .map(|row| row.sum())
            .fold(0.0f32, f32::max);
        if peak <= 0.0 || !peak.is_finite() {
            return Err(StructuralError::DegenerateBias.into());
        }
        Ok(if excitatory { 1.0 / peak } else { -1.0 / peak })
    }

    pub fn new(
        name: &str,
        node_origin: &str,
        constant_outputs: &DMatrix<f32>,
        interneuron_count: usize,
        excitatory: bool,
        eval_point_count: usize,
        seed: u64,
    ) -> Result<Self> {
        let decoder = Self::bias_decoder(constant_outputs, excitatory)?;
        let decoders = DMatrix::from_element(constant_outputs.ncols(), 1, decoder);
        // The bias does not depend on the represented value.
        let functions: Vec<Box<dyn Function>> = vec![Box::new(ConstantFunction::new(0, 0.0))];
        let origin = DecodedOrigin::new(name, node_origin, functions, decoders)?;

        let interneurons = build_interneurons(
            &format!("{name}_interneurons"),
            interneuron_count,
            excitatory,
            eval_point_count,
            seed,
        )?;
        info!(
            origin = name,
            interneurons = interneuron_count,
            excitatory,
            decoder,
            "built bias origin"
        );

        Ok(Self {
            origin,
            interneurons,
            excitatory,
        })
    }

    pub fn origin(&self) -> &DecodedOrigin {
        &self.origin
    }

    pub fn origin_mut(&mut self) -> &mut DecodedOrigin {
        &mut self.origin
    }

    pub fn is_excitatory(&self) -> bool {
        self.excitatory
    }

    /// Population through which this origin must also project to cancel
    /// the bias of a single-sign projection.
    pub fn interneurons(&self) -> &DecodableEnsemble<LifPopulation> {
        &self.interneurons
    }

    pub fn interneurons_mut(&mut self) -> &mut DecodableEnsemble<LifPopulation> {
        &mut self.interneurons
    }

    /// Decodes the bias signal and drives the interneurons with it.
    pub fn run(&mut self, activities: &[f32], represented: &[f32], start: f32, end: f32) -> Result<()> {
        self.origin.run(activities, represented, end)?;
        let signal: Vec<f32> = self.origin.values().iter().copied().collect();
        self.interneurons.set_input(INTERNEURON_INPUT, &signal)?;
        self.interneurons.run(start, end)
    }

    pub fn set_mode(&mut self, mode: SimulationMode) {
        self.origin.set_mode(mode);
        self.interneurons.set_mode(mode);
    }

    pub fn reset(&mut self, randomize: bool) {
        self.origin.reset();
        self.interneurons.reset(randomize);
    }
}

/// One-dimensional LIF population with rectified encoders, evaluation
/// points centred on `±1` and non-negative decoders.
fn build_interneurons(
    name: &str,
    count: usize,
    excitatory: bool,
    eval_point_count: usize,
    seed: u64,
) -> Result<DecodableEnsemble<LifPopulation>> {
    let (intercept, max_rate) = if excitatory {
        ((-0.1, 0.99), (200.0, 500.0))
    } else {
        ((-0.99, 0.1), (400.0, 800.0))
    };
    let cfg = PopulationConfig {
        tau_rc: 0.02,
        tau_ref: 0.001,
        max_rate,
        intercept,
        rectified_encoders: true,
        eval_point_radius: 0.5,
        eval_point_bias: if excitatory { 1.0 } else { -1.0 },
        ..PopulationConfig::with_size(count, 1).with_seed(seed)
    };

    let population = LifPopulation::new(cfg)?;
    let mut ensemble = DecodableEnsemble::new(
        name,
        population,
        ApproximatorConfig::non_negative(),
        eval_point_count,
        seed,
    )?;

    let x: Box<dyn Function> = if excitatory {
        Box::new(IdentityFunction::new(1, 0))
    } else {
        Box::new(FnFunction::new(1, |x: &[f32]| 1.0 + x[0]))
    };
    ensemble.add_decoded_origin(INTERNEURON_OUTPUT, vec![x], AXON)?;
    ensemble.add_decoded_termination(INTERNEURON_INPUT, DMatrix::identity(1, 1), INTERNEURON_TAU_PSC, false)?;
    ensemble.done_origins();
    Ok(ensemble)
}
