// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::{candidate, finish_stats, Candidate, Limits, Stats, SynthError, Synthesizer};
use crate::check::Decision;
use crate::quotient::Quotient;
use std::time::Instant;

/// Abstraction-refinement synthesis: explore sub-families in DFS order,
/// decide whole sub-families with MDP bounds, split the undecided ones.
pub struct ArSynthesizer<'a> {
    quotient: &'a mut Quotient,
    limits: Limits,
    stats: Stats,
    counters_before: (usize, usize),
}

impl<'a> ArSynthesizer<'a> {
    pub fn new(quotient: &'a mut Quotient, limits: Limits) -> Self {
        let counters_before = quotient.counters().snapshot();
        Self {
            quotient,
            limits,
            stats: Stats::default(),
            counters_before,
        }
    }
}

impl<'a> Synthesizer for ArSynthesizer<'a> {
    fn run(&mut self) -> Result<Option<Candidate>, SynthError> {
        let start = Instant::now();
        let mut families = vec![self.quotient.root_family()];
        let mut best: Option<Candidate> = None;
        while let Some(mut family) = families.pop() {
            if let Some(termination) = self.limits.breached(start) {
                self.stats.termination = termination;
                break;
            }
            let optimum = self.quotient.specification().current_optimum();
            self.stats.ar_iterations += 1;
            let result = match self.quotient.check_family(&mut family, optimum) {
                Ok(result) => result,
                Err(SynthError::Oracle(_)) if !family.is_singleton() => {
                    // recover by splitting on the next best hole
                    families.extend(self.quotient.split(&family)?);
                    continue;
                }
                Err(e) => return Err(e),
            };
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
                        // plain feasibility: the first satisfying member wins
                        best = Some(candidate(self.quotient, &improving));
                        self.stats.explored += family.size();
                        self.stats.pruned_ar += family.size();
                        break;
                    }
                }
            }
            match result.decision() {
                Decision::Accept | Decision::Reject => {
                    self.stats.explored += family.size();
                    self.stats.pruned_ar += family.size();
                }
                Decision::Undecided => {
                    families.extend(self.quotient.split(&family)?);
                }
            }
        }
        finish_stats(&mut self.stats, self.quotient, self.counters_before);
        Ok(best)
    }

    fn stats(&self) -> &Stats {
        &self.stats
    }
}
