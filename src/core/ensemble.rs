//! The decodable ensemble: a population plus its named decoded origins and
//! terminations.
//!
//! One tick runs strictly in this order:
//! 1. every termination filters its stored input (scaled by its peer's
//!    output from the previous tick, if it has a scaling reference);
//! 2. the population is stepped with the summed non-modulatory drive;
//! 3. every origin decodes the resulting activity.

use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::approximator::{make_approximator, ApproximatorConfig, LinearApproximator};
use crate::bias::BiasOrigin;
use crate::config::NefConfig;
use crate::environment::{Environment, FunctionInput, Probe, TerminationAddress};
use crate::error::{Result, SimulationError, StructuralError};
use crate::function::{Function, TimeSeriesFunction};
use crate::named::{Named, NamedMap};
use crate::origin::{DecodedOrigin, Origin};
use crate::population::{LifPopulation, Population, SimulationMode};
use crate::prng::Prng;
use crate::termination::{DecodedTermination, TerminationDynamics};
use crate::time_series::TimeSeries;

/// Share of each transient run, taken from the end, that is averaged into
/// one activity sample. Tunable.
pub const TRANSIENT_AVERAGE_FRACTION: f64 = 0.1;

/// Share of a filtered recording skipped before its samples are used for
/// fitting. Tunable.
pub const FILTERED_DATA_START_FRACTION: f64 = 0.5;

/// Probe-name suffix selecting an origin's plasticity resources.
pub const STP_SUFFIX: &str = ":STP";

const DECODING_INPUT: &str = "DECODING SIMULATION INPUT";

/// An origin as listed by [`DecodableEnsemble::origins`].
#[derive(Debug, Clone, Copy)]
pub enum OriginRef<'a> {
    Node(&'static str),
    Decoded(&'a Origin),
}

impl OriginRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            OriginRef::Node(name) => name,
            OriginRef::Decoded(o) => o.name(),
        }
    }
}

/// A termination as listed by [`DecodableEnsemble::terminations`].
#[derive(Debug, Clone, Copy)]
pub enum TerminationRef<'a> {
    Node(&'static str),
    Decoded(&'a DecodedTermination),
}

impl TerminationRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            TerminationRef::Node(name) => name,
            TerminationRef::Decoded(t) => t.name(),
        }
    }
}

#[derive(Debug)]
pub struct DecodableEnsemble<P: Population> {
    name: String,
    population: P,
    origins: NamedMap<Origin>,
    terminations: NamedMap<DecodedTermination>,
    approximator_config: ApproximatorConfig,
    // Keyed by node origin; all share `eval_points`.
    approximators: HashMap<String, Box<dyn LinearApproximator>>,
    eval_points: Vec<Vec<f32>>,
    time: f32,
    rng: Prng,
}

impl<P: Population> DecodableEnsemble<P> {
    /// `seed` drives the randomized termination resets and the seeds handed
    /// to bias interneurons.
    pub fn new(
        name: impl Into<String>,
        mut population: P,
        approximator_config: ApproximatorConfig,
        eval_point_count: usize,
        seed: u64,
    ) -> Result<Self> {
        if eval_point_count == 0 {
            return Err(StructuralError::EmptySamples {
                context: "evaluation points",
            }
            .into());
        }
        let eval_points = population.eval_points(eval_point_count);
        Ok(Self {
            name: name.into(),
            population,
            origins: NamedMap::new(),
            terminations: NamedMap::new(),
            approximator_config,
            approximators: HashMap::new(),
            eval_points,
            time: 0.0,
            rng: Prng::new(seed),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn population(&self) -> &P {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut P {
        &mut self.population
    }

    pub fn unit_count(&self) -> usize {
        self.population.len()
    }

    pub fn dimension(&self) -> usize {
        self.population.dimension()
    }

    /// End time of the last tick.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn eval_points(&self) -> &[Vec<f32>] {
        &self.eval_points
    }

    pub fn approximator_config(&self) -> &ApproximatorConfig {
        &self.approximator_config
    }

    pub fn mode(&self) -> SimulationMode {
        self.population.mode()
    }

    /// Sets the mode of the population and of every origin.
    pub fn set_mode(&mut self, mode: SimulationMode) {
        self.population.set_mode(mode);
        for origin in self.origins.iter_mut() {
            origin.set_mode(mode);
        }
    }

    // ---- origins ----

    /// Adds an origin decoding `functions` of the represented value, fitted
    /// over the ensemble's own evaluation points.
    pub fn add_decoded_origin(
        &mut self,
        name: &str,
        functions: Vec<Box<dyn Function>>,
        node_origin: &str,
    ) -> Result<&Origin> {
        self.ensure_origin_free(name)?;
        self.ensure_node_origin(node_origin)?;
        check_functions(&functions, self.population.dimension())?;

        let origin = {
            let approximator = self.approximator(node_origin)?;
            DecodedOrigin::fit(name, node_origin, functions, approximator)?
        };
        self.insert_origin(Origin::Decoded(origin))
    }

    /// Adds an origin fitted on externally gathered samples: one activity
    /// row per evaluation point, one column per unit.
    pub fn add_decoded_origin_from_samples(
        &mut self,
        name: &str,
        functions: Vec<Box<dyn Function>>,
        node_origin: &str,
        eval_points: Vec<Vec<f32>>,
        activities: DMatrix<f32>,
    ) -> Result<&Origin> {
        self.ensure_origin_free(name)?;
        self.ensure_node_origin(node_origin)?;
        if activities.ncols() != self.population.len() {
            return Err(StructuralError::DimensionMismatch {
                context: "activity samples per unit",
                expected: self.population.len(),
                got: activities.ncols(),
            }
            .into());
        }
        if let Some(point) = eval_points.first() {
            check_functions(&functions, point.len())?;
        }

        let approximator = make_approximator(&self.approximator_config, eval_points, activities)?;
        let origin = DecodedOrigin::fit(name, node_origin, functions, approximator.as_ref())?;
        self.insert_origin(Origin::Decoded(origin))
    }

    /// Runs `environment` over `[start, end]` and fits on the probe's
    /// recording of unit activity. Each recorded time is an evaluation
    /// point, so `functions` are functions of time.
    #[allow(clippy::too_many_arguments)]
    pub fn add_decoded_origin_from_probe(
        &mut self,
        name: &str,
        functions: Vec<Box<dyn Function>>,
        node_origin: &str,
        environment: &mut dyn Environment,
        probe: &mut dyn Probe,
        start: f32,
        end: f32,
    ) -> Result<&Origin> {
        self.ensure_origin_free(name)?;
        self.ensure_node_origin(node_origin)?;
        check_functions(&functions, 1)?;

        probe.reset();
        environment.run(start, end)?;
        let data = probe.data();
        if data.is_empty() {
            return Err(SimulationError::EmptyProbe.into());
        }

        let eval_points = data.times().iter().map(|&t| vec![t]).collect();
        let activities = series_rows(&data, 0, self.population.len())?;
        self.add_decoded_origin_from_samples(name, functions, node_origin, eval_points, activities)
    }

    /// Drives `termination` with each evaluation point as a constant input
    /// for `transient_time` and averages the tail of each run into one
    /// activity sample.
    #[allow(clippy::too_many_arguments)]
    pub fn add_decoded_origin_from_transients(
        &mut self,
        name: &str,
        functions: Vec<Box<dyn Function>>,
        node_origin: &str,
        environment: &mut dyn Environment,
        probe: &mut dyn Probe,
        termination: &TerminationAddress,
        eval_points: &[Vec<f32>],
        transient_time: f32,
    ) -> Result<&Origin> {
        self.ensure_origin_free(name)?;
        self.ensure_node_origin(node_origin)?;
        if eval_points.is_empty() {
            return Err(StructuralError::EmptySamples {
                context: "evaluation points",
            }
            .into());
        }
        let dimension = self.population.dimension();
        check_functions(&functions, dimension)?;
        if let Some(bad) = eval_points.iter().find(|p| p.len() != dimension) {
            return Err(StructuralError::DimensionMismatch {
                context: "evaluation point dimension",
                expected: dimension,
                got: bad.len(),
            }
            .into());
        }

        let mut rows = Vec::with_capacity(eval_points.len());
        for point in eval_points {
            let data = run_transient(environment, probe, termination, point, transient_time)?;
            rows.push(tail_average(&data)?);
        }

        let units = self.population.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != units) {
            return Err(StructuralError::DimensionMismatch {
                context: "transient probe dimension",
                expected: units,
                got: bad.len(),
            }
            .into());
        }
        let activities = DMatrix::from_fn(rows.len(), units, |i, j| rows[i][j]);
        debug!(ensemble = %self.name, origin = name, points = rows.len(), "collected transient samples");
        self.add_decoded_origin_from_samples(name, functions, node_origin, eval_points.to_vec(), activities)
    }

    /// Runs `environment` over `[start, end]`, low-passes the activity
    /// recording with time constant `tau` and fits on its later part. The
    /// evaluation points are read from `state` at the same times, so the
    /// functions must take the state's dimension; that match can only be
    /// checked once the state has been recorded.
    #[allow(clippy::too_many_arguments)]
    pub fn add_decoded_origin_filtered(
        &mut self,
        name: &str,
        functions: Vec<Box<dyn Function>>,
        node_origin: &str,
        environment: &mut dyn Environment,
        probe: &mut dyn Probe,
        state: &mut dyn Probe,
        start: f32,
        end: f32,
        tau: f32,
    ) -> Result<&Origin> {
        self.ensure_origin_free(name)?;
        self.ensure_node_origin(node_origin)?;
        if let Some(first) = functions.first() {
            check_functions(&functions, first.dimension())?;
        }

        probe.reset();
        state.reset();
        environment.run(start, end)?;

        let filtered = probe.data().filter(tau);
        let state_data = Arc::new(state.data());
        if filtered.is_empty() || state_data.is_empty() {
            return Err(SimulationError::EmptyProbe.into());
        }

        let first = fraction_count(filtered.len(), FILTERED_DATA_START_FRACTION);
        if first >= filtered.len() {
            return Err(StructuralError::EmptySamples {
                context: "filtered recording",
            }
            .into());
        }

        let trajectory = (0..state_data.dimension())
            .map(|d| TimeSeriesFunction::new(Arc::clone(&state_data), d))
            .collect::<Result<Vec<_>>>()?;
        let eval_points = filtered.times()[first..]
            .iter()
            .map(|&t| trajectory.iter().map(|f| f.map(&[t])).collect())
            .collect();
        let activities = series_rows(&filtered, first, self.population.len())?;
        self.add_decoded_origin_from_samples(name, functions, node_origin, eval_points, activities)
    }

    /// Adds a bias origin whose uniform decoder is derived from the
    /// population's activity over the ensemble's evaluation points, together
    /// with its interneuron population.
    pub fn add_bias_origin(
        &mut self,
        name: &str,
        node_origin: &str,
        interneuron_count: usize,
        excitatory: bool,
    ) -> Result<&Origin> {
        self.ensure_origin_free(name)?;
        self.ensure_node_origin(node_origin)?;

        let constant_outputs = self.activity_samples(&self.eval_points);
        let seed = u64::from(self.rng.next_u32());
        let bias = BiasOrigin::new(
            name,
            node_origin,
            &constant_outputs,
            interneuron_count,
            excitatory,
            self.eval_points.len(),
            seed,
        )?;
        self.insert_origin(Origin::Bias(Box::new(bias)))
    }

    pub fn remove_decoded_origin(&mut self, name: &str) -> Result<Origin> {
        let removed = self
            .origins
            .remove(name)
            .ok_or_else(|| StructuralError::MissingOrigin { name: name.to_string() })?;
        debug!(ensemble = %self.name, origin = name, "removed decoded origin");
        Ok(removed)
    }

    /// Drops the cached approximators once no more origins will be added.
    pub fn done_origins(&mut self) {
        self.approximators.clear();
    }

    // ---- terminations ----

    /// Adds a termination filtered by a unit-integral low-pass with
    /// time constant `tau`.
    pub fn add_decoded_termination(
        &mut self,
        name: &str,
        transform: DMatrix<f32>,
        tau: f32,
        modulatory: bool,
    ) -> Result<&mut DecodedTermination> {
        self.add_decoded_termination_with_dynamics(name, transform, TerminationDynamics::LowPass { tau }, modulatory)
    }

    /// Adds a termination filtered by `numerator(s) / denominator(s) +
    /// passthrough`, coefficients in descending powers of `s`.
    pub fn add_decoded_termination_tf(
        &mut self,
        name: &str,
        transform: DMatrix<f32>,
        numerator: &[f32],
        denominator: &[f32],
        passthrough: f32,
        modulatory: bool,
    ) -> Result<&mut DecodedTermination> {
        let dynamics = TerminationDynamics::TransferFunction {
            numerator: numerator.to_vec(),
            denominator: denominator.to_vec(),
            passthrough,
        };
        self.add_decoded_termination_with_dynamics(name, transform, dynamics, modulatory)
    }

    /// `transform` maps the upstream signal (columns) onto the represented
    /// space (rows); the row count is free only for modulatory terminations.
    pub fn add_decoded_termination_with_dynamics(
        &mut self,
        name: &str,
        transform: DMatrix<f32>,
        dynamics: TerminationDynamics,
        modulatory: bool,
    ) -> Result<&mut DecodedTermination> {
        if self.terminations.contains(name) {
            return Err(StructuralError::DuplicateTermination { name: name.to_string() }.into());
        }
        if !modulatory && transform.nrows() != self.population.dimension() {
            return Err(StructuralError::DimensionMismatch {
                context: "termination transform rows",
                expected: self.population.dimension(),
                got: transform.nrows(),
            }
            .into());
        }

        let seed = u64::from(self.rng.next_u32());
        let mut termination = DecodedTermination::new(name, transform, dynamics, modulatory, seed)?;
        termination.activate();
        debug!(
            ensemble = %self.name,
            termination = name,
            step = termination.integrator().step_size(),
            modulatory,
            "added decoded termination"
        );
        self.terminations
            .insert(termination)
            .map_err(|t| StructuralError::DuplicateTermination { name: t.name().to_string() }.into())
    }

    /// Removes a termination. Peers scaled by it lose their scaling
    /// reference.
    pub fn remove_decoded_termination(&mut self, name: &str) -> Result<DecodedTermination> {
        let mut removed = self
            .terminations
            .remove(name)
            .ok_or_else(|| StructuralError::MissingTermination { name: name.to_string() })?;
        removed.mark_removed();
        for t in self.terminations.iter_mut() {
            if t.scaling() == Some(name) {
                t.set_scaling(None);
            }
        }
        debug!(ensemble = %self.name, termination = name, "removed decoded termination");
        Ok(removed)
    }

    /// Scales `termination`'s drive by the first output component of `peer`
    /// from the previous tick, or removes the scaling with `None`.
    pub fn set_scaling(&mut self, termination: &str, peer: Option<&str>) -> Result<()> {
        if !self.terminations.contains(termination) {
            return Err(StructuralError::MissingTermination {
                name: termination.to_string(),
            }
            .into());
        }
        if let Some(p) = peer {
            if !self.terminations.contains(p) {
                return Err(StructuralError::UnresolvedScaling {
                    name: termination.to_string(),
                    peer: p.to_string(),
                }
                .into());
            }
        }
        if let Some(t) = self.terminations.get_mut(termination) {
            t.set_scaling(peer.map(str::to_string));
        }
        Ok(())
    }

    /// Stores the upstream value a termination filters on the next tick.
    pub fn set_input(&mut self, termination: &str, values: &[f32]) -> Result<()> {
        self.terminations
            .get_mut(termination)
            .ok_or_else(|| StructuralError::MissingTermination {
                name: termination.to_string(),
            })?
            .set_input(values)
    }

    // ---- simulation ----

    pub fn run(&mut self, start: f32, end: f32) -> Result<()> {
        let dt = end - start;

        let scales: Vec<Option<f32>> = self
            .terminations
            .iter()
            .map(|t| {
                t.scaling()
                    .and_then(|peer| self.terminations.get(peer))
                    .and_then(|peer| peer.output().iter().next().copied())
            })
            .collect();

        let mut drive = vec![0.0f32; self.population.dimension()];
        for (termination, scale) in self.terminations.iter_mut().zip(scales) {
            let modulatory = termination.is_modulatory();
            let output = termination.run(dt, scale)?;
            if !modulatory {
                for (d, y) in drive.iter_mut().zip(output.iter()) {
                    *d += y;
                }
            }
        }

        self.population.step(start, end, &drive)?;

        let activities = self.population.activities().to_vec();
        let represented = self.population.represented().to_vec();
        for origin in self.origins.iter_mut() {
            origin.run(&activities, &represented, start, end)?;
        }

        self.time = end;
        Ok(())
    }

    pub fn reset(&mut self, randomize: bool) {
        self.population.reset(randomize);
        for termination in self.terminations.iter_mut() {
            termination.reset(randomize);
        }
        for origin in self.origins.iter_mut() {
            origin.reset(randomize);
        }
        self.approximators.clear();
        self.time = 0.0;
    }

    // ---- listing and lookup ----

    /// Node-level origins followed by decoded origins in insertion order.
    pub fn origins(&self) -> Vec<OriginRef<'_>> {
        self.population
            .node_origins()
            .iter()
            .map(|&n| OriginRef::Node(n))
            .chain(self.origins.iter().map(OriginRef::Decoded))
            .collect()
    }

    /// Node-level terminations followed by decoded terminations in
    /// insertion order.
    pub fn terminations(&self) -> Vec<TerminationRef<'_>> {
        self.population
            .node_terminations()
            .iter()
            .map(|&n| TerminationRef::Node(n))
            .chain(self.terminations.iter().map(TerminationRef::Decoded))
            .collect()
    }

    /// Looks up an origin, preferring decoded origins over node-level ones.
    pub fn origin(&self, name: &str) -> Result<OriginRef<'_>> {
        if let Some(o) = self.origins.get(name) {
            return Ok(OriginRef::Decoded(o));
        }
        self.population
            .node_origins()
            .iter()
            .find(|&&n| n == name)
            .map(|&n| OriginRef::Node(n))
            .ok_or_else(|| StructuralError::MissingOrigin { name: name.to_string() }.into())
    }

    /// Looks up a termination, preferring decoded terminations over
    /// node-level ones.
    pub fn termination(&self, name: &str) -> Result<TerminationRef<'_>> {
        if let Some(t) = self.terminations.get(name) {
            return Ok(TerminationRef::Decoded(t));
        }
        self.population
            .node_terminations()
            .iter()
            .find(|&&n| n == name)
            .map(|&n| TerminationRef::Node(n))
            .ok_or_else(|| StructuralError::MissingTermination { name: name.to_string() }.into())
    }

    pub fn decoded_origin(&self, name: &str) -> Option<&Origin> {
        self.origins.get(name)
    }

    /// Latest output of a decoded origin.
    pub fn origin_values(&self, name: &str) -> Result<Vec<f32>> {
        self.origins
            .get(name)
            .map(|o| o.values().iter().copied().collect())
            .ok_or_else(|| StructuralError::MissingOrigin { name: name.to_string() }.into())
    }

    pub fn decoded_origin_mut(&mut self, name: &str) -> Option<&mut Origin> {
        self.origins.get_mut(name)
    }

    pub fn decoded_termination(&self, name: &str) -> Option<&DecodedTermination> {
        self.terminations.get(name)
    }

    pub fn decoded_termination_mut(&mut self, name: &str) -> Option<&mut DecodedTermination> {
        self.terminations.get_mut(name)
    }

    // ---- probing ----

    /// Latest value of a probeable state.
    ///
    /// Names resolve against decoded origins, then decoded terminations,
    /// then `<origin>:STP`, then the population's own states. Probing an
    /// origin marks it as required on the accelerator until
    /// [`DecodableEnsemble::stop_probing`].
    pub fn history(&mut self, state: &str) -> Result<TimeSeries> {
        let shadowed = self.terminations.contains(state);
        if let Some(origin) = self.origins.get_mut(state) {
            if shadowed {
                warn!(
                    ensemble = %self.name,
                    state,
                    "origin and termination share this name; probing the origin"
                );
            }
            let origin = origin.decoded_mut();
            origin.set_required_on_accelerator(true);
            return Ok(TimeSeries::single(self.time, origin.values().iter().copied().collect()));
        }

        if let Some(termination) = self.terminations.get(state) {
            return Ok(termination.history());
        }

        if let Some(base) = state.strip_suffix(STP_SUFFIX) {
            return match self.origins.get(base) {
                Some(origin) => Ok(origin.decoded().stp_history()),
                None => Err(SimulationError::from(StructuralError::MissingOrigin { name: base.to_string() }).into()),
            };
        }

        self.population
            .history(state)
            .ok_or_else(|| SimulationError::UnknownState { name: state.to_string() }.into())
    }

    /// Every probeable state as `(name, description)`.
    pub fn list_states(&self) -> Vec<(String, String)> {
        let mut states = self.population.list_states();
        for t in self.terminations.iter() {
            states.push((t.name().to_string(), format!("Output of termination {}", t.name())));
        }
        for o in self.origins.iter() {
            states.push((o.name().to_string(), "Function of ensemble state".to_string()));
            if o.decoded().stp().is_some() {
                states.push((
                    format!("{}{}", o.name(), STP_SUFFIX),
                    format!("Plasticity resources of origin {}", o.name()),
                ));
            }
        }
        states
    }

    pub fn stop_probing(&mut self, state: &str) {
        if let Some(origin) = self.origins.get_mut(state) {
            origin.decoded_mut().set_required_on_accelerator(false);
        }
    }

    // ---- internals ----

    fn ensure_origin_free(&self, name: &str) -> Result<()> {
        if self.origins.contains(name) {
            return Err(StructuralError::DuplicateOrigin { name: name.to_string() }.into());
        }
        Ok(())
    }

    fn ensure_node_origin(&self, node_origin: &str) -> Result<()> {
        if !self.population.node_origins().iter().any(|&n| n == node_origin) {
            return Err(StructuralError::MissingOrigin {
                name: node_origin.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Steady-state activity: one row per point, one column per unit.
    fn activity_samples(&self, points: &[Vec<f32>]) -> DMatrix<f32> {
        let rates: Vec<Vec<f32>> = points.iter().map(|p| self.population.rates(p)).collect();
        DMatrix::from_fn(points.len(), self.population.len(), |i, j| rates[i][j])
    }

    fn approximator(&mut self, node_origin: &str) -> Result<&dyn LinearApproximator> {
        if !self.approximators.contains_key(node_origin) {
            let activities = self.activity_samples(&self.eval_points);
            let approximator = make_approximator(&self.approximator_config, self.eval_points.clone(), activities)?;
            self.approximators.insert(node_origin.to_string(), approximator);
        }
        self.approximators
            .get(node_origin)
            .map(|a| a.as_ref())
            .ok_or_else(|| StructuralError::MissingOrigin { name: node_origin.to_string() }.into())
    }

    fn insert_origin(&mut self, mut origin: Origin) -> Result<&Origin> {
        origin.set_mode(self.population.mode());
        debug!(
            ensemble = %self.name,
            origin = origin.name(),
            outputs = origin.decoded().dimension(),
            "added decoded origin"
        );
        match self.origins.insert(origin) {
            Ok(o) => Ok(o),
            Err(o) => Err(StructuralError::DuplicateOrigin { name: o.name().to_string() }.into()),
        }
    }
}

impl<P: Population + Clone> Clone for DecodableEnsemble<P> {
    /// Deep copy. Origins start from a reset state, cached approximators are
    /// not carried over, and scaling references (held by name) resolve
    /// inside the copy.
    fn clone(&self) -> Self {
        let mut origins = self.origins.clone();
        for origin in origins.iter_mut() {
            origin.reset(false);
        }

        let mut terminations = self.terminations.clone();
        let names: Vec<String> = terminations.names().map(str::to_string).collect();
        for t in terminations.iter_mut() {
            let dangling = t.scaling().is_some_and(|peer| !names.iter().any(|n| n == peer));
            if dangling {
                t.set_scaling(None);
            }
        }

        Self {
            name: self.name.clone(),
            population: self.population.clone(),
            origins,
            terminations,
            approximator_config: self.approximator_config,
            approximators: HashMap::new(),
            eval_points: self.eval_points.clone(),
            time: self.time,
            rng: self.rng.clone(),
        }
    }
}

impl DecodableEnsemble<LifPopulation> {
    /// LIF ensemble built from a bundled configuration.
    pub fn from_config(name: impl Into<String>, config: &NefConfig) -> Result<Self> {
        let population = LifPopulation::new(config.population)?;
        Self::new(
            name,
            population,
            config.approximator,
            config.eval_point_count,
            config.population.seed.unwrap_or(1),
        )
    }
}

fn check_functions(functions: &[Box<dyn Function>], dimension: usize) -> Result<()> {
    if let Some(f) = functions.iter().find(|f| f.dimension() != dimension) {
        return Err(StructuralError::DimensionMismatch {
            context: "function input dimension",
            expected: dimension,
            got: f.dimension(),
        }
        .into());
    }
    Ok(())
}

/// `ceil(len * fraction)`, computed by dividing by the reciprocal so that
/// exact fractions such as 1/10 do not round up.
fn fraction_count(len: usize, fraction: f64) -> usize {
    (len as f64 / fraction.recip()).ceil() as usize
}

/// Per-dimension mean over the last `ceil(len * TRANSIENT_AVERAGE_FRACTION)`
/// samples.
fn tail_average(series: &TimeSeries) -> Result<Vec<f32>> {
    if series.is_empty() {
        return Err(SimulationError::EmptyProbe.into());
    }
    let count = fraction_count(series.len(), TRANSIENT_AVERAGE_FRACTION).max(1);
    let tail = &series.values()[series.len() - count..];
    let mut mean = vec![0.0f32; series.dimension()];
    for sample in tail {
        for (m, x) in mean.iter_mut().zip(sample) {
            *m += x;
        }
    }
    for m in &mut mean {
        *m /= count as f32;
    }
    Ok(mean)
}

/// Samples from `first` onwards as a matrix, one row per sample. Every
/// sample must hold exactly `width` values.
fn series_rows(series: &TimeSeries, first: usize, width: usize) -> Result<DMatrix<f32>> {
    let rows = series.values().get(first..).unwrap_or_default();
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(StructuralError::DimensionMismatch {
            context: "recorded activity per unit",
            expected: width,
            got: bad.len(),
        }
        .into());
    }
    Ok(DMatrix::from_fn(rows.len(), width, |i, j| rows[i][j]))
}

/// One constant-input run. The input node and its projection are removed
/// again whether or not the run succeeded.
fn run_transient(
    environment: &mut dyn Environment,
    probe: &mut dyn Probe,
    termination: &TerminationAddress,
    point: &[f32],
    transient_time: f32,
) -> Result<TimeSeries> {
    environment.add_node(FunctionInput::constant(DECODING_INPUT, point))?;

    let outcome = match environment.add_projection(DECODING_INPUT, FunctionInput::ORIGIN, termination) {
        Ok(()) => {
            probe.reset();
            let run = environment.run(0.0, transient_time);
            let unprojected = environment.remove_projection(termination);
            run.and(unprojected).map(|()| probe.data())
        }
        Err(e) => Err(e),
    };
    let removed = environment.remove_node(DECODING_INPUT);

    let data = outcome?;
    removed?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::f32::consts::PI;
    use std::rc::Rc;

    use super::*;
    use crate::function::{ConstantFunction, FnFunction, IdentityFunction};
    use crate::population::{PopulationConfig, AXON, VOLTAGE};

    fn config(units: usize, eval_points: usize) -> NefConfig {
        NefConfig {
            population: PopulationConfig {
                mode: SimulationMode::Rate,
                ..PopulationConfig::with_size(units, 1).with_seed(7)
            },
            approximator: ApproximatorConfig::default(),
            eval_point_count: eval_points,
        }
    }

    fn ensemble(units: usize, eval_points: usize) -> DecodableEnsemble<LifPopulation> {
        DecodableEnsemble::from_config("ens", &config(units, eval_points)).unwrap()
    }

    fn identity() -> Vec<Box<dyn Function>> {
        vec![Box::new(IdentityFunction::new(1, 0))]
    }

    fn scalar(v: f32) -> DMatrix<f32> {
        DMatrix::from_element(1, 1, v)
    }

    /// Shared recording written by the fake network and read by its probes.
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<(Vec<f32>, Vec<Vec<f32>>)>>);

    impl Recorder {
        fn push(&self, t: f32, values: Vec<f32>) {
            let mut rec = self.0.borrow_mut();
            rec.0.push(t);
            rec.1.push(values);
        }
    }

    impl Probe for Recorder {
        fn reset(&mut self) {
            let mut rec = self.0.borrow_mut();
            rec.0.clear();
            rec.1.clear();
        }

        fn data(&self) -> TimeSeries {
            let rec = self.0.borrow();
            TimeSeries::new(rec.0.clone(), rec.1.clone()).unwrap()
        }
    }

    /// A network holding a copy of the ensemble's units, driven either by an
    /// attached input node or by `signal(t)`. Records unit rates and the
    /// represented value at `samples` evenly spaced times per run.
    struct FakeNetwork {
        population: LifPopulation,
        signal: fn(f32) -> f32,
        samples: usize,
        /// Leading samples of each run recorded as silence.
        settle: usize,
        /// What the state recorder sees for a represented value.
        state_of: fn(f32) -> Vec<f32>,
        nodes: Vec<FunctionInput>,
        projections: Vec<TerminationAddress>,
        activity: Recorder,
        state: Recorder,
        runs: usize,
        fail: bool,
    }

    impl FakeNetwork {
        fn new(population: &LifPopulation, signal: fn(f32) -> f32, samples: usize) -> Self {
            Self {
                population: population.clone(),
                signal,
                samples,
                settle: 0,
                state_of: |x| vec![x],
                nodes: Vec::new(),
                projections: Vec::new(),
                activity: Recorder::default(),
                state: Recorder::default(),
                runs: 0,
                fail: false,
            }
        }
    }

    impl Environment for FakeNetwork {
        fn add_node(&mut self, node: FunctionInput) -> Result<()> {
            self.nodes.push(node);
            Ok(())
        }

        fn remove_node(&mut self, name: &str) -> Result<()> {
            self.nodes.retain(|n| n.name() != name);
            Ok(())
        }

        fn add_projection(&mut self, _origin_node: &str, _origin: &str, termination: &TerminationAddress) -> Result<()> {
            self.projections.push(termination.clone());
            Ok(())
        }

        fn remove_projection(&mut self, termination: &TerminationAddress) -> Result<()> {
            self.projections.retain(|t| t != termination);
            Ok(())
        }

        fn run(&mut self, start: f32, end: f32) -> Result<()> {
            self.runs += 1;
            if self.fail {
                return Err(SimulationError::Environment {
                    reason: "network diverged".to_string(),
                }
                .into());
            }
            let dt = (end - start) / self.samples as f32;
            for k in 0..self.samples {
                let t = start + k as f32 * dt;
                let x = match self.nodes.first() {
                    Some(node) => node.values(t)[0],
                    None => (self.signal)(t),
                };
                let rates = if k < self.settle {
                    vec![0.0; self.population.len()]
                } else {
                    self.population.rates(&[x])
                };
                self.activity.push(t, rates);
                self.state.push(t, (self.state_of)(x));
            }
            Ok(())
        }
    }

    fn decode_at(ens: &DecodableEnsemble<LifPopulation>, origin: &str, x: f32) -> f32 {
        let rates = ens.population().rates(&[x]);
        ens.decoded_origin(origin).unwrap().decoded().evaluate(&rates).unwrap()[0]
    }

    #[test]
    fn constant_origin_on_three_units_is_three_by_one() {
        let mut ens = ensemble(3, 5);
        let functions: Vec<Box<dyn Function>> = vec![Box::new(ConstantFunction::new(1, 0.5))];
        let origin = ens.add_decoded_origin("const", functions, AXON).unwrap();
        assert_eq!(origin.decoded().decoders().shape(), (3, 1));
        assert_eq!(origin.decoded().evaluate(&[0.0; 3]).unwrap()[0], 0.0);
    }

    #[test]
    fn low_pass_termination_has_expected_pole_and_step() {
        let mut ens = ensemble(10, 20);
        let term = ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        assert!((term.system().a()[(0, 0)] + 100.0).abs() < 1e-3);
        assert!((term.system().c()[(0, 0)] - 100.0).abs() < 1e-3);
        assert!((term.integrator().step_size() - 0.001).abs() < 1e-7);
    }

    #[test]
    fn removing_unknown_termination_names_it() {
        let mut ens = ensemble(10, 20);
        let err = ens.remove_decoded_termination("ghost").unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("ghost"));
        assert!(ens.remove_decoded_origin("ghost").unwrap_err().is_structural());
    }

    #[test]
    fn duplicate_names_leave_existing_entities_unchanged() {
        let mut ens = ensemble(20, 50);
        ens.add_decoded_origin("x", identity(), AXON).unwrap();
        let before = ens.decoded_origin("x").unwrap().decoded().decoders().clone();
        let square: Vec<Box<dyn Function>> = vec![Box::new(FnFunction::new(1, |x: &[f32]| x[0] * x[0]))];
        assert!(ens.add_decoded_origin("x", square, AXON).unwrap_err().is_structural());
        assert_eq!(ens.decoded_origin("x").unwrap().decoded().decoders(), &before);

        ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        let err = ens.add_decoded_termination("in", scalar(2.0), 0.05, false).unwrap_err();
        assert!(err.is_structural());
        let term = ens.decoded_termination("in").unwrap();
        assert_eq!(term.transform()[(0, 0)], 1.0);
        assert!((term.integrator().step_size() - 0.001).abs() < 1e-7);
        assert_eq!(ens.terminations().len(), 1);
    }

    #[test]
    fn duplicate_origin_fails_before_any_simulation() {
        let mut ens = ensemble(20, 50);
        ens.add_decoded_origin("x", identity(), AXON).unwrap();
        let mut net = FakeNetwork::new(ens.population(), |t| t, 10);
        let mut probe = net.activity.clone();
        let mut state = net.state.clone();
        let target = TerminationAddress::new("ens", "in");

        assert!(ens
            .add_decoded_origin_from_probe("x", identity(), AXON, &mut net, &mut probe, 0.0, 1.0)
            .is_err());
        assert!(ens
            .add_decoded_origin_from_transients("x", identity(), AXON, &mut net, &mut probe, &target, &[vec![0.0]], 0.1)
            .is_err());
        assert!(ens
            .add_decoded_origin_filtered("x", identity(), AXON, &mut net, &mut probe, &mut state, 0.0, 1.0, 0.01)
            .is_err());
        assert_eq!(net.runs, 0);
    }

    #[test]
    fn non_modulatory_transform_must_match_dimension() {
        let mut ens = ensemble(10, 20);
        let wide = DMatrix::from_element(2, 1, 1.0);
        assert!(ens.add_decoded_termination("in", wide.clone(), 0.01, false).unwrap_err().is_structural());
        assert!(ens.decoded_termination("in").is_none());
        ens.add_decoded_termination("mod", wide, 0.01, true).unwrap();
    }

    #[test]
    fn listing_puts_node_ports_first_then_insertion_order() {
        let mut ens = ensemble(10, 20);
        ens.add_decoded_origin("b", identity(), AXON).unwrap();
        ens.add_decoded_origin("a", identity(), AXON).unwrap();
        let names: Vec<String> = ens.origins().iter().map(|o| o.name().to_string()).collect();
        assert_eq!(names, vec![AXON, "b", "a"]);

        assert!(matches!(ens.origin(AXON).unwrap(), OriginRef::Node(_)));
        assert!(matches!(ens.origin("a").unwrap(), OriginRef::Decoded(_)));
        assert!(ens.origin("zzz").unwrap_err().is_structural());
        assert!(ens.termination("zzz").unwrap_err().is_structural());
    }

    #[test]
    fn communication_channel_tracks_input() {
        let mut ens = ensemble(50, 200);
        ens.add_decoded_origin("X", identity(), AXON).unwrap();
        ens.add_decoded_termination("in", scalar(1.0), 0.005, false).unwrap();
        ens.done_origins();
        ens.set_input("in", &[0.5]).unwrap();

        let dt = 0.001;
        for k in 0..100 {
            ens.run(k as f32 * dt, (k + 1) as f32 * dt).unwrap();
        }
        let x = ens.decoded_origin("X").unwrap().values()[0];
        assert!((x - 0.5).abs() < 0.1, "decoded {x}");
        assert!((ens.time() - 0.1).abs() < 1e-5);
    }

    #[test]
    fn direct_mode_bypasses_units() {
        let mut ens = ensemble(10, 20);
        let square: Vec<Box<dyn Function>> = vec![Box::new(FnFunction::new(1, |x: &[f32]| x[0] * x[0]))];
        ens.add_decoded_origin("sq", square, AXON).unwrap();
        ens.add_decoded_termination("in", scalar(1.0), 0.001, false).unwrap();
        ens.set_mode(SimulationMode::Direct);
        ens.set_input("in", &[0.6]).unwrap();
        for k in 0..50 {
            ens.run(k as f32 * 0.001, (k + 1) as f32 * 0.001).unwrap();
        }
        let y = ens.decoded_origin("sq").unwrap().values()[0];
        assert!((y - 0.36).abs() < 1e-3, "direct {y}");
        assert_eq!(ens.decoded_origin("sq").unwrap().decoded().mode(), SimulationMode::Direct);
    }

    #[test]
    fn scaling_reads_peer_output_from_previous_tick() {
        let mut ens = ensemble(10, 20);
        ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        ens.add_decoded_termination("gain", scalar(1.0), 0.01, true).unwrap();
        assert!(ens.set_scaling("in", Some("nope")).unwrap_err().is_structural());
        ens.set_scaling("in", Some("gain")).unwrap();
        ens.set_input("in", &[1.0]).unwrap();
        ens.set_input("gain", &[1.0]).unwrap();

        ens.run(0.0, 0.001).unwrap();
        assert_eq!(ens.decoded_termination("in").unwrap().output()[0], 0.0);
        for k in 1..20 {
            ens.run(k as f32 * 0.001, (k + 1) as f32 * 0.001).unwrap();
        }
        assert!(ens.decoded_termination("in").unwrap().output()[0] > 0.0);

        ens.remove_decoded_termination("gain").unwrap();
        assert_eq!(ens.decoded_termination("in").unwrap().scaling(), None);
    }

    #[test]
    fn clone_is_independent_and_scaling_stays_inside() {
        let mut ens = ensemble(20, 50);
        ens.add_decoded_origin("x", identity(), AXON).unwrap();
        ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        ens.add_decoded_termination("gain", scalar(1.0), 0.01, true).unwrap();
        ens.set_scaling("in", Some("gain")).unwrap();

        let mut copy = ens.clone();
        let original = ens.decoded_origin("x").unwrap().decoded().decoders().clone();
        let zeros = DMatrix::zeros(original.nrows(), original.ncols());
        copy.decoded_origin_mut("x").unwrap().decoded_mut().set_decoders(zeros).unwrap();
        assert_eq!(ens.decoded_origin("x").unwrap().decoded().decoders(), &original);

        assert_eq!(copy.decoded_termination("in").unwrap().scaling(), Some("gain"));
        copy.set_input("gain", &[1.0]).unwrap();
        copy.set_input("in", &[1.0]).unwrap();
        for k in 0..10 {
            copy.run(k as f32 * 0.001, (k + 1) as f32 * 0.001).unwrap();
        }
        assert!(copy.decoded_termination("in").unwrap().output()[0] > 0.0);
        assert_eq!(ens.decoded_termination("gain").unwrap().output()[0], 0.0);
        assert_eq!(ens.decoded_termination("in").unwrap().output()[0], 0.0);

        // Removing the peer in the copy leaves the original's link intact.
        copy.remove_decoded_termination("gain").unwrap();
        assert_eq!(ens.decoded_termination("in").unwrap().scaling(), Some("gain"));
    }

    #[test]
    fn history_resolves_origin_then_termination_then_plasticity() {
        let mut ens = ensemble(10, 20);
        let pair: Vec<Box<dyn Function>> = vec![
            Box::new(IdentityFunction::new(1, 0)),
            Box::new(ConstantFunction::new(1, 1.0)),
        ];
        ens.add_decoded_origin("dup", pair, AXON).unwrap();
        ens.add_decoded_termination("dup", scalar(1.0), 0.01, false).unwrap();
        ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        ens.run(0.0, 0.001).unwrap();

        let h = ens.history("dup").unwrap();
        assert_eq!(h.dimension(), 2);
        assert_eq!(h.times(), &[0.001f32]);
        assert!(ens.decoded_origin("dup").unwrap().decoded().required_on_accelerator());
        ens.stop_probing("dup");
        assert!(!ens.decoded_origin("dup").unwrap().decoded().required_on_accelerator());

        assert_eq!(ens.history("in").unwrap().dimension(), 1);
        assert_eq!(ens.history("dup:STP").unwrap().values()[0], vec![1.0; 10]);
        assert_eq!(ens.history(VOLTAGE).unwrap().dimension(), 10);

        let missing = ens.history("gone:STP").unwrap_err();
        assert!(!missing.is_structural());
        assert!(missing.to_string().contains("gone"));
        assert!(matches!(
            ens.history("nothing"),
            Err(crate::error::NefError::Simulation(SimulationError::UnknownState { .. }))
        ));
    }

    #[test]
    fn list_states_covers_every_probe_target() {
        let mut ens = ensemble(10, 20);
        ens.add_decoded_origin("x", identity(), AXON).unwrap();
        ens.decoded_origin_mut("x").unwrap().decoded_mut().set_stp(Some((0.2, 0.1))).unwrap();
        ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        let names: Vec<String> = ens.list_states().into_iter().map(|(n, _)| n).collect();
        for expected in [AXON, VOLTAGE, "in", "x", "x:STP"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn reset_zeroes_dynamics_and_time() {
        let mut ens = ensemble(10, 20);
        ens.add_decoded_origin("x", identity(), AXON).unwrap();
        ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
        ens.set_input("in", &[1.0]).unwrap();
        for k in 0..10 {
            ens.run(k as f32 * 0.001, (k + 1) as f32 * 0.001).unwrap();
        }
        ens.reset(false);
        assert_eq!(ens.time(), 0.0);
        assert_eq!(ens.decoded_termination("in").unwrap().output()[0], 0.0);
        assert_eq!(ens.decoded_origin("x").unwrap().values()[0], 0.0);
    }

    #[test]
    fn probe_recording_fits_functions_of_time() {
        let mut ens = ensemble(30, 10);
        let mut net = FakeNetwork::new(ens.population(), |t| (2.0 * PI * t).sin(), 1000);
        let mut probe = net.activity.clone();
        let target: Vec<Box<dyn Function>> = vec![Box::new(FnFunction::new(1, |t: &[f32]| (2.0 * PI * t[0]).sin()))];

        ens.add_decoded_origin_from_probe("sine", target, AXON, &mut net, &mut probe, 0.0, 1.0)
            .unwrap();
        assert_eq!(net.runs, 1);
        assert_eq!(ens.decoded_origin("sine").unwrap().decoded().decoders().shape(), (30, 1));
        for x in [-0.5f32, 0.0, 0.4] {
            let y = decode_at(&ens, "sine", x);
            assert!((y - x).abs() < 0.15, "decoded {y} for {x}");
        }
    }

    #[test]
    fn transient_origin_averages_last_tenth() {
        let mut ens = ensemble(30, 10);
        let mut net = FakeNetwork::new(ens.population(), |_| 0.0, 20);
        // Only the last 2 of 20 samples carry activity; averaging more
        // than ceil(20 / 10) would dilute them.
        net.settle = 18;
        let mut probe = net.activity.clone();
        let target = TerminationAddress::new("ens", "in");
        let points: Vec<Vec<f32>> = (0..41).map(|i| vec![-1.0 + i as f32 * 0.05]).collect();

        ens.add_decoded_origin_from_transients("x", identity(), AXON, &mut net, &mut probe, &target, &points, 0.1)
            .unwrap();
        assert_eq!(net.runs, points.len());
        assert!(net.nodes.is_empty());
        assert!(net.projections.is_empty());
        for x in [-0.6f32, 0.1, 0.7] {
            let y = decode_at(&ens, "x", x);
            assert!((y - x).abs() < 0.15, "decoded {y} for {x}");
        }
    }

    #[test]
    fn failed_transient_run_cleans_up_and_adds_nothing() {
        let mut ens = ensemble(10, 10);
        let mut net = FakeNetwork::new(ens.population(), |_| 0.0, 10);
        net.fail = true;
        let mut probe = net.activity.clone();
        let target = TerminationAddress::new("ens", "in");

        let err = ens
            .add_decoded_origin_from_transients("x", identity(), AXON, &mut net, &mut probe, &target, &[vec![0.0]], 0.1)
            .unwrap_err();
        assert!(!err.is_structural());
        assert!(net.nodes.is_empty());
        assert!(net.projections.is_empty());
        assert!(ens.decoded_origin("x").is_none());
    }

    #[test]
    fn filtered_origin_uses_later_half_and_state_trajectory() {
        let mut ens = ensemble(30, 10);
        let mut net = FakeNetwork::new(ens.population(), |t| 2.0 * t - 1.0, 1000);
        let mut probe = net.activity.clone();
        let mut state = net.state.clone();

        ens.add_decoded_origin_filtered("x", identity(), AXON, &mut net, &mut probe, &mut state, 0.0, 1.0, 0.001)
            .unwrap();
        // The later half of the ramp covers [0, 1).
        for x in [0.2f32, 0.5, 0.8] {
            let y = decode_at(&ens, "x", x);
            assert!((y - x).abs() < 0.15, "decoded {y} for {x}");
        }
    }

    #[test]
    fn seed_decides_randomized_reset() {
        let population = LifPopulation::new(config(10, 20).population).unwrap();
        let build = |seed: u64| {
            let mut ens =
                DecodableEnsemble::new("ens", population.clone(), ApproximatorConfig::default(), 20, seed).unwrap();
            ens.add_decoded_termination("in", scalar(1.0), 0.01, false).unwrap();
            ens.reset(true);
            ens.decoded_termination("in").unwrap().output()[0]
        };
        assert_eq!(build(3), build(3));
        assert_ne!(build(3), build(4));

        let a = DecodableEnsemble::from_config("a", &config(10, 20)).unwrap();
        let mut other = config(10, 20);
        other.population.seed = Some(8);
        let b = DecodableEnsemble::from_config("b", &other).unwrap();
        assert_ne!(a.eval_points(), b.eval_points());
    }

    #[test]
    fn unknown_node_origin_fails_before_any_simulation() {
        let mut ens = ensemble(20, 50);
        let mut net = FakeNetwork::new(ens.population(), |t| t, 10);
        let mut probe = net.activity.clone();
        let mut state = net.state.clone();
        let target = TerminationAddress::new("ens", "in");
        let points: Vec<Vec<f32>> = (0..25).map(|i| vec![-1.0 + i as f32 * 0.08]).collect();

        let err = ens
            .add_decoded_origin_from_probe("x", identity(), "BOGUS", &mut net, &mut probe, 0.0, 1.0)
            .unwrap_err();
        assert!(err.is_structural());
        let err = ens
            .add_decoded_origin_from_transients("x", identity(), "BOGUS", &mut net, &mut probe, &target, &points, 0.1)
            .unwrap_err();
        assert!(err.is_structural());
        let err = ens
            .add_decoded_origin_filtered("x", identity(), "BOGUS", &mut net, &mut probe, &mut state, 0.0, 1.0, 0.01)
            .unwrap_err();
        assert!(err.is_structural());
        assert_eq!(net.runs, 0);
        assert!(ens.decoded_origin("x").is_none());
    }

    #[test]
    fn mismatched_functions_and_points_fail_before_any_simulation() {
        let mut ens = ensemble(20, 50);
        let mut net = FakeNetwork::new(ens.population(), |t| t, 10);
        let mut probe = net.activity.clone();
        let mut state = net.state.clone();
        let target = TerminationAddress::new("ens", "in");
        let wide = || -> Vec<Box<dyn Function>> { vec![Box::new(IdentityFunction::new(2, 0))] };

        // Functions of time take one input.
        assert!(ens
            .add_decoded_origin_from_probe("x", wide(), AXON, &mut net, &mut probe, 0.0, 1.0)
            .unwrap_err()
            .is_structural());
        assert!(ens
            .add_decoded_origin_from_transients("x", wide(), AXON, &mut net, &mut probe, &target, &[vec![0.0]], 0.1)
            .unwrap_err()
            .is_structural());
        // Points outside the represented space.
        assert!(ens
            .add_decoded_origin_from_transients("x", identity(), AXON, &mut net, &mut probe, &target, &[vec![0.0, 1.0]], 0.1)
            .unwrap_err()
            .is_structural());
        // Functions that disagree on their input dimension.
        let mixed: Vec<Box<dyn Function>> = vec![
            Box::new(IdentityFunction::new(1, 0)),
            Box::new(IdentityFunction::new(2, 1)),
        ];
        assert!(ens
            .add_decoded_origin_filtered("x", mixed, AXON, &mut net, &mut probe, &mut state, 0.0, 1.0, 0.01)
            .unwrap_err()
            .is_structural());
        assert_eq!(net.runs, 0);
    }

    #[test]
    fn recording_of_the_wrong_width_is_rejected() {
        let mut ens = ensemble(10, 10);
        let other = LifPopulation::new(config(12, 10).population).unwrap();
        let mut net = FakeNetwork::new(&other, |t| t, 20);
        let mut probe = net.activity.clone();

        let err = ens
            .add_decoded_origin_from_probe("x", identity(), AXON, &mut net, &mut probe, 0.0, 1.0)
            .unwrap_err();
        assert!(err.is_structural());
        assert!(ens.decoded_origin("x").is_none());

        let series = TimeSeries::new(vec![0.0, 1.0], vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(series_rows(&series, 0, 3).is_err());
        assert_eq!(series_rows(&series, 1, 2).unwrap().shape(), (1, 2));
    }

    #[test]
    fn filtered_origin_reads_multi_dimensional_state() {
        let mut ens = ensemble(30, 10);
        let mut net = FakeNetwork::new(ens.population(), |t| 2.0 * t - 1.0, 1000);
        net.state_of = |x| vec![x, 0.5 * x];
        let mut probe = net.activity.clone();
        let mut state = net.state.clone();
        let half: Vec<Box<dyn Function>> = vec![Box::new(IdentityFunction::new(2, 1))];

        ens.add_decoded_origin_filtered("half", half, AXON, &mut net, &mut probe, &mut state, 0.0, 1.0, 0.001)
            .unwrap();
        assert_eq!(ens.decoded_origin("half").unwrap().decoded().decoders().shape(), (30, 1));
        for x in [0.2f32, 0.5, 0.8] {
            let y = decode_at(&ens, "half", x);
            assert!((y - 0.5 * x).abs() < 0.1, "decoded {y} for {x}");
        }

        // A one-dimensional function cannot read a two-dimensional state.
        let err = ens
            .add_decoded_origin_filtered("x", identity(), AXON, &mut net, &mut probe, &mut state, 0.0, 1.0, 0.001)
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn fraction_counts_are_exact_for_round_lengths() {
        assert_eq!(fraction_count(30, TRANSIENT_AVERAGE_FRACTION), 3);
        assert_eq!(fraction_count(31, TRANSIENT_AVERAGE_FRACTION), 4);
        assert_eq!(fraction_count(7, FILTERED_DATA_START_FRACTION), 4);
    }
}
