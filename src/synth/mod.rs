// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
mod ar;
mod cegis;
mod conflict;
mod hybrid;
mod parallel;

pub use ar::ArSynthesizer;
pub use cegis::CegisSynthesizer;
pub use conflict::{
    ConflictGeneration, ConflictGenerator, ConflictRequest, DtmcConflicts, MdpConflicts,
};
pub use hybrid::HybridSynthesizer;
pub use parallel::ParallelArSynthesizer;

pub use crate::quotient::SynthError;

use crate::check::ImprovingAssignment;
use crate::family::{Family, SmtBackend, SolverError, Z3_CMD};
use crate::quotient::Quotient;
use std::time::{Duration, Instant};

/// A synthesized family member: the singleton family and, for optimality
/// objectives, its value.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub assignment: Family,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// the design space was fully explored
    Complete,
    TimeLimit,
    MemoryLimit,
}

/// Exploration accounting reported by every driver.
#[derive(Debug, Clone)]
pub struct Stats {
    pub dtmc_checks: usize,
    pub mdp_checks: usize,
    pub ar_iterations: usize,
    pub cegis_iterations: usize,
    /// family members decided, as counted by the driver
    pub explored: u128,
    pub pruned_ar: u128,
    pub pruned_cegis: u128,
    pub optimum_updates: usize,
    pub optimum: Option<f64>,
    pub termination: Termination,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            dtmc_checks: 0,
            mdp_checks: 0,
            ar_iterations: 0,
            cegis_iterations: 0,
            explored: 0,
            pruned_ar: 0,
            pruned_cegis: 0,
            optimum_updates: 0,
            optimum: None,
            termination: Termination::Complete,
        }
    }
}

/// Soft resource budgets, consulted at loop heads only: an in-flight oracle
/// call is never interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    pub wall_time: Option<Duration>,
    pub memory_mb: Option<usize>,
}

impl Limits {
    pub fn breached(&self, start: Instant) -> Option<Termination> {
        if let Some(budget) = self.wall_time {
            if start.elapsed() > budget {
                return Some(Termination::TimeLimit);
            }
        }
        if let Some(budget_mb) = self.memory_mb {
            if let Some(usage) = memory_stats::memory_stats() {
                if usage.physical_mem / (1024 * 1024) > budget_mb {
                    return Some(Termination::MemoryLimit);
                }
            }
        }
        None
    }
}

/// Common driver interface.
pub trait Synthesizer {
    /// Explores the design space and returns the best assignment found, or
    /// `None` if no member satisfies the specification.
    fn run(&mut self) -> Result<Option<Candidate>, SynthError>;

    fn stats(&self) -> &Stats;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Ar,
    ParallelAr,
    Cegis,
    Hybrid,
}

pub struct Synthesis {
    pub best: Option<Candidate>,
    pub stats: Stats,
}

/// Runs the selected driver. CEGIS and the hybrid driver talk to `z3`
/// through the SMT backend; use the driver types directly to supply a
/// different backend.
pub fn synthesize(
    quotient: &mut Quotient,
    method: Method,
    limits: Limits,
) -> Result<Synthesis, SynthError> {
    match method {
        Method::Ar => {
            let mut driver = ArSynthesizer::new(quotient, limits);
            let best = driver.run()?;
            Ok(Synthesis {
                best,
                stats: driver.stats().clone(),
            })
        }
        Method::ParallelAr => {
            let mut driver = ParallelArSynthesizer::new(quotient, limits);
            let best = driver.run()?;
            Ok(Synthesis {
                best,
                stats: driver.stats().clone(),
            })
        }
        Method::Cegis => {
            let backend =
                SmtBackend::new(Z3_CMD).map_err(|e| SynthError::Solver(SolverError::Io(e)))?;
            let mut driver = CegisSynthesizer::new(quotient, backend, limits)?;
            let best = driver.run()?;
            Ok(Synthesis {
                best,
                stats: driver.stats().clone(),
            })
        }
        Method::Hybrid => {
            let backend =
                SmtBackend::new(Z3_CMD).map_err(|e| SynthError::Solver(SolverError::Io(e)))?;
            let mut driver = HybridSynthesizer::new(quotient, backend, limits)?;
            let best = driver.run()?;
            Ok(Synthesis {
                best,
                stats: driver.stats().clone(),
            })
        }
    }
}

/// Materializes an improving assignment as a candidate.
pub(crate) fn candidate(quotient: &Quotient, improving: &ImprovingAssignment) -> Candidate {
    Candidate {
        assignment: quotient.root_family().assignment_family(&improving.options),
        value: improving.value,
    }
}

/// Folds the oracle-call counters accumulated since `before` into the stats.
pub(crate) fn finish_stats(stats: &mut Stats, quotient: &Quotient, before: (usize, usize)) {
    let (dtmc, mdp) = quotient.counters().snapshot();
    stats.dtmc_checks = dtmc - before.0;
    stats.mdp_checks = mdp - before.1;
    stats.optimum = quotient.specification().current_optimum();
}
