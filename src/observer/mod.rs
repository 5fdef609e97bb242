#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ensemble::{DecodableEnsemble, OriginRef, TerminationRef};
use crate::origin::Origin;
use crate::population::{Population, SimulationMode};
use crate::termination::TerminationState;

/// A read-only snapshot of an ensemble's structure and latest outputs.
///
/// Observers cannot mutate the ensemble. Snapshotting allocates, so it is
/// meant for inspection between runs rather than inside the tick loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnsembleSnapshot {
    pub name: String,
    pub time: f32,
    pub mode: SimulationMode,
    pub unit_count: usize,
    pub dimension: usize,
    pub origins: Vec<OriginSnapshot>,
    pub terminations: Vec<TerminationSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OriginKind {
    Node,
    Decoded,
    Bias { excitatory: bool },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OriginSnapshot {
    pub name: String,
    pub kind: OriginKind,
    /// Empty for node-level origins.
    pub values: Vec<f32>,
    pub stp: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TerminationSnapshot {
    pub name: String,
    /// `None` for node-level terminations.
    pub lifecycle: Option<TerminationState>,
    pub modulatory: bool,
    pub scaling: Option<String>,
    pub output: Vec<f32>,
}

pub struct EnsembleAdapter<'a, P: Population> {
    ensemble: &'a DecodableEnsemble<P>,
}

impl<'a, P: Population> EnsembleAdapter<'a, P> {
    pub fn new(ensemble: &'a DecodableEnsemble<P>) -> Self {
        Self { ensemble }
    }

    pub fn snapshot(&self) -> EnsembleSnapshot {
        let ens = self.ensemble;
        EnsembleSnapshot {
            name: ens.name().to_string(),
            time: ens.time(),
            mode: ens.mode(),
            unit_count: ens.unit_count(),
            dimension: ens.dimension(),
            origins: ens.origins().iter().map(origin_snapshot).collect(),
            terminations: ens.terminations().iter().map(termination_snapshot).collect(),
        }
    }
}

fn origin_snapshot(origin: &OriginRef<'_>) -> OriginSnapshot {
    match origin {
        OriginRef::Node(name) => OriginSnapshot {
            name: name.to_string(),
            kind: OriginKind::Node,
            values: Vec::new(),
            stp: false,
        },
        OriginRef::Decoded(o) => OriginSnapshot {
            name: origin.name().to_string(),
            kind: match o {
                Origin::Decoded(_) => OriginKind::Decoded,
                Origin::Bias(b) => OriginKind::Bias {
                    excitatory: b.is_excitatory(),
                },
            },
            values: o.values().iter().copied().collect(),
            stp: o.decoded().stp().is_some(),
        },
    }
}

fn termination_snapshot(termination: &TerminationRef<'_>) -> TerminationSnapshot {
    match termination {
        TerminationRef::Node(name) => TerminationSnapshot {
            name: name.to_string(),
            lifecycle: None,
            modulatory: false,
            scaling: None,
            output: Vec::new(),
        },
        TerminationRef::Decoded(t) => TerminationSnapshot {
            name: termination.name().to_string(),
            lifecycle: Some(t.lifecycle()),
            modulatory: t.is_modulatory(),
            scaling: t.scaling().map(str::to_string),
            output: t.output().iter().copied().collect(),
        },
    }
}
