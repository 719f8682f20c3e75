// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::{candidate, finish_stats, Candidate, Limits, Stats, SynthError, Synthesizer};
use crate::check::Decision;
use crate::family::Family;
use crate::quotient::Quotient;
use rayon::prelude::*;
use std::time::Instant;

/// AR with the frontier dispatched to a worker pool. Every worker analyzes
/// one family against a snapshot of the optimum; the parent merges the
/// improving values monotonically and enqueues the children. No worker
/// holds state across calls and the SMT encoder is never shared, so this
/// driver performs no CEGIS.
pub struct ParallelArSynthesizer<'a> {
    quotient: &'a mut Quotient,
    limits: Limits,
    stats: Stats,
    counters_before: (usize, usize),
}

impl<'a> ParallelArSynthesizer<'a> {
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

impl<'a> Synthesizer for ParallelArSynthesizer<'a> {
    fn run(&mut self) -> Result<Option<Candidate>, SynthError> {
        let start = Instant::now();
        let mut frontier = vec![self.quotient.root_family()];
        let mut best: Option<Candidate> = None;
        'outer: while !frontier.is_empty() {
            if let Some(termination) = self.limits.breached(start) {
                self.stats.termination = termination;
                break;
            }
            let optimum = self.quotient.specification().current_optimum();
            let batch: Vec<Family> = std::mem::take(&mut frontier);
            let quotient: &Quotient = self.quotient;
            let outcomes: Vec<_> = batch
                .into_par_iter()
                .map(|mut family| {
                    let result = quotient.check_family(&mut family, optimum);
                    (family, result)
                })
                .collect();
            // merge sequentially, in batch order, so runs are reproducible
            for (family, result) in outcomes {
                let result = match result {
                    Ok(result) => result,
                    Err(SynthError::Oracle(_)) if !family.is_singleton() => {
                        frontier.extend(self.quotient.split(&family)?);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                self.stats.ar_iterations += 1;
                if let Some(improving) = result.improving.clone() {
                    match improving.value {
                        Some(value) => {
                            // workers ran against a stale snapshot; the
                            // monotonic update rejects anything the merged
                            // optimum has since overtaken
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
                            self.stats.explored += family.size();
                            self.stats.pruned_ar += family.size();
                            break 'outer;
                        }
                    }
                }
                match result.decision() {
                    Decision::Accept | Decision::Reject => {
                        self.stats.explored += family.size();
                        self.stats.pruned_ar += family.size();
                    }
                    Decision::Undecided => {
                        frontier.extend(self.quotient.split(&family)?);
                    }
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
