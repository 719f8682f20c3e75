// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::conflict::{ensure_cegis_compatible, ConflictGeneration, ConflictGenerator, ConflictRequest};
use super::{candidate, finish_stats, Candidate, Limits, Stats, SynthError, Synthesizer};
use crate::check::{CompareOp, Direction, SpecificationResult};
use crate::family::{Family, FamilyBackend, FamilyEncoder};
use crate::model::Dtmc;
use crate::quotient::Quotient;
use std::time::Instant;

/// Counterexample-guided synthesis: pick unexplored assignments from the
/// SMT encoding, model-check the induced chain, and generalize violations
/// into conflicts that exclude whole sub-families.
pub struct CegisSynthesizer<'a, B: FamilyBackend> {
    quotient: &'a mut Quotient,
    encoder: FamilyEncoder<B>,
    generator: ConflictGenerator,
    root: Family,
    limits: Limits,
    stats: Stats,
    counters_before: (usize, usize),
}

impl<'a, B: FamilyBackend> CegisSynthesizer<'a, B> {
    pub fn new(
        quotient: &'a mut Quotient,
        backend: B,
        limits: Limits,
    ) -> Result<Self, SynthError> {
        ensure_cegis_compatible(quotient.specification())?;
        let root = quotient.root_family();
        let encoder = FamilyEncoder::new(backend, &root)?;
        let counters_before = quotient.counters().snapshot();
        Ok(Self {
            quotient,
            encoder,
            generator: ConflictGenerator::dtmc(),
            root,
            limits,
            stats: Stats::default(),
            counters_before,
        })
    }

    pub fn with_generator(mut self, generator: ConflictGenerator) -> Self {
        self.generator = generator;
        self
    }
}

impl<'a, B: FamilyBackend> Synthesizer for CegisSynthesizer<'a, B> {
    fn run(&mut self) -> Result<Option<Candidate>, SynthError> {
        let start = Instant::now();
        let mut best: Option<Candidate> = None;
        loop {
            if let Some(termination) = self.limits.breached(start) {
                self.stats.termination = termination;
                break;
            }
            let optimum = self.quotient.specification().current_optimum();
            let options = match self.encoder.pick_assignment(&mut self.root)? {
                Some(options) => options,
                // the encoding is exhausted: the whole family is decided
                None => {
                    self.stats.explored = self.root.size();
                    break;
                }
            };
            self.stats.cegis_iterations += 1;
            let singleton = self.root.assignment_family(&options);
            let (result, dtmc) = self.quotient.check_assignment(&singleton, optimum)?;
            if let Some(improving) = result.improving.clone() {
                match improving.value {
                    Some(value) => {
                        let updated = self
                            .quotient
                            .specification_mut()
                            .optimality_mut()
                            .expect("improving value without an optimality objective")
                            .update_optimum(value);
                        if updated {
                            self.stats.optimum_updates += 1;
                            best = Some(candidate(self.quotient, &improving));
                        }
                    }
                    None => {
                        best = Some(candidate(self.quotient, &improving));
                        break;
                    }
                }
            }
            let pruned = exclude_violations(
                self.quotient,
                &mut self.encoder,
                &self.generator,
                &self.root,
                &options,
                &result,
                &dtmc,
                optimum,
                None,
            )?;
            self.stats.pruned_cegis += pruned;
        }
        finish_stats(&mut self.stats, self.quotient, self.counters_before);
        Ok(best)
    }

    fn stats(&self) -> &Stats {
        &self.stats
    }
}

/// Generates and asserts one conflict per violated property of the
/// singleton's result. Returns the total pruning estimate.
#[allow(clippy::too_many_arguments)]
pub(crate) fn exclude_violations<B: FamilyBackend>(
    quotient: &Quotient,
    encoder: &mut FamilyEncoder<B>,
    generator: &ConflictGenerator,
    family: &Family,
    options: &[usize],
    result: &SpecificationResult,
    dtmc: &Dtmc,
    optimum: Option<f64>,
    family_result: Option<&SpecificationResult>,
) -> Result<u128, SynthError> {
    let spec = quotient.specification();
    let mut pruned = 0u128;
    for index in result.constraints.unsat_indices() {
        let prop = &spec.constraints[index];
        let entry = result.constraints.results[index].as_ref().unwrap();
        let bound = family_result
            .and_then(|fr| fr.constraints.results[index].as_ref())
            .map(|r| r.primary.state_values.as_slice());
        let request = ConflictRequest {
            formula: &prop.formula,
            op: prop.op,
            threshold: prop.threshold,
            state_values: &entry.primary.state_values,
            mdp_bound: bound,
        };
        let conflict = generator.construct(quotient, dtmc, &request)?;
        pruned = pruned.saturating_add(encoder.exclude_conflict(family, options, &conflict)?);
    }
    if let (Some(opt), Some(optimality)) = (spec.optimality(), result.optimality.as_ref()) {
        if !optimality.improves_optimum {
            match opt.threshold_for(optimum) {
                Some(threshold) => {
                    let op = if opt.direction() == Direction::Max {
                        CompareOp::Geq
                    } else {
                        CompareOp::Leq
                    };
                    let bound = family_result
                        .and_then(|fr| fr.optimality.as_ref())
                        .map(|r| r.primary.state_values.as_slice());
                    let request = ConflictRequest {
                        formula: &opt.formula,
                        op,
                        threshold,
                        state_values: &optimality.primary.state_values,
                        mdp_bound: bound,
                    };
                    let conflict = generator.construct(quotient, dtmc, &request)?;
                    pruned = pruned
                        .saturating_add(encoder.exclude_conflict(family, options, &conflict)?);
                }
                None => {
                    // no optimum yet and still not improving (undefined
                    // value): exclude just this assignment
                    let all: Vec<usize> = (0..family.num_holes()).collect();
                    pruned =
                        pruned.saturating_add(encoder.exclude_conflict(family, options, &all)?);
                }
            }
        }
    }
    Ok(pruned)
}
