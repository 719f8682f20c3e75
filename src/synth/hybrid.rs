// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::cegis::exclude_violations;
use super::conflict::{ensure_cegis_compatible, ConflictGenerator};
use super::{candidate, finish_stats, Candidate, Limits, Stats, SynthError, Synthesizer};
use crate::check::Decision;
use crate::family::{Family, FamilyBackend, FamilyEncoder};
use crate::quotient::Quotient;
use std::time::{Duration, Instant};

enum EpisodeOutcome {
    /// the family was fully pruned by conflicts
    Decided,
    /// the time quantum elapsed first
    Undecided,
    /// an accepting assignment ends the search globally
    Accepting,
}

/// Adaptive interleaving of AR and CEGIS on one DFS stack: every popped
/// family gets one AR iteration; undecided families enter a time-boxed
/// CEGIS episode before they are split. CEGIS episodes are allowed while
/// `cegis_time <= ar_time * efficiency`, where the efficiency ratio
/// compares the measured pruning rates of the two stages.
pub struct HybridSynthesizer<'a, B: FamilyBackend> {
    quotient: &'a mut Quotient,
    encoder: Option<FamilyEncoder<B>>,
    generator: ConflictGenerator,
    limits: Limits,
    stats: Stats,
    counters_before: (usize, usize),
    /// duration of one CEGIS episode
    pub quantum: Duration,
    efficiency: f64,
    ar_time: Duration,
    cegis_time: Duration,
}

impl<'a, B: FamilyBackend> HybridSynthesizer<'a, B> {
    pub fn new(
        quotient: &'a mut Quotient,
        backend: B,
        limits: Limits,
    ) -> Result<Self, SynthError> {
        // maximizing reward properties silently disable the CEGIS stage
        let encoder = match ensure_cegis_compatible(quotient.specification()) {
            Ok(()) => Some(FamilyEncoder::new(backend, &quotient.root_family())?),
            Err(_) => None,
        };
        let counters_before = quotient.counters().snapshot();
        Ok(Self {
            quotient,
            encoder,
            generator: ConflictGenerator::mdp(),
            limits,
            stats: Stats::default(),
            counters_before,
            quantum: Duration::from_millis(50),
            efficiency: 1.0,
            ar_time: Duration::ZERO,
            cegis_time: Duration::ZERO,
        })
    }

    pub fn with_generator(mut self, generator: ConflictGenerator) -> Self {
        self.generator = generator;
        self
    }

    fn cegis_allowed(&self) -> bool {
        self.encoder.is_some()
            && self.cegis_time.as_secs_f64() <= self.ar_time.as_secs_f64() * self.efficiency
    }

    fn update_efficiency(&mut self) {
        let ar_rate = self.stats.pruned_ar as f64 / self.ar_time.as_secs_f64().max(1e-9);
        let cegis_rate = self.stats.pruned_cegis as f64 / self.cegis_time.as_secs_f64().max(1e-9);
        if ar_rate > 0.0 {
            self.efficiency = (cegis_rate / ar_rate).clamp(1e-3, 1e3);
        }
    }
}

impl<'a, B: FamilyBackend> Synthesizer for HybridSynthesizer<'a, B> {
    fn run(&mut self) -> Result<Option<Candidate>, SynthError> {
        let start = Instant::now();
        let mut stack = vec![self.quotient.root_family()];
        let mut best: Option<Candidate> = None;
        while let Some(mut family) = stack.pop() {
            if let Some(termination) = self.limits.breached(start) {
                self.stats.termination = termination;
                break;
            }
            let ar_start = Instant::now();
            let optimum = self.quotient.specification().current_optimum();
            self.stats.ar_iterations += 1;
            let result = match self.quotient.check_family(&mut family, optimum) {
                Ok(result) => result,
                Err(SynthError::Oracle(_)) if !family.is_singleton() => {
                    self.ar_time += ar_start.elapsed();
                    stack.extend(self.quotient.split(&family)?);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.ar_time += ar_start.elapsed();
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
                    let mut decided = false;
                    if self.cegis_allowed() {
                        let episode_start = Instant::now();
                        let outcome = run_episode(
                            self.quotient,
                            self.encoder.as_mut().unwrap(),
                            &self.generator,
                            &mut self.stats,
                            self.quantum,
                            &mut family,
                            &mut best,
                        )?;
                        self.cegis_time += episode_start.elapsed();
                        self.update_efficiency();
                        match outcome {
                            EpisodeOutcome::Decided => {
                                self.stats.explored += family.size();
                                decided = true;
                            }
                            EpisodeOutcome::Accepting => break,
                            EpisodeOutcome::Undecided => {}
                        }
                    }
                    if !decided {
                        stack.extend(self.quotient.split(&family)?);
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

/// One time-boxed CEGIS episode on an undecided family. The solver scope is
/// aligned with the family's DFS depth so that clauses learned here persist
/// for the family's subtree and are dropped on backtracking.
fn run_episode<B: FamilyBackend>(
    quotient: &mut Quotient,
    encoder: &mut FamilyEncoder<B>,
    generator: &ConflictGenerator,
    stats: &mut Stats,
    quantum: Duration,
    family: &mut Family,
    best: &mut Option<Candidate>,
) -> Result<EpisodeOutcome, SynthError> {
    encoder.set_level(family.depth)?;
    let priority = priority_subfamily(quotient, family);
    let episode_start = Instant::now();
    loop {
        if episode_start.elapsed() > quantum {
            return Ok(EpisodeOutcome::Undecided);
        }
        let optimum = quotient.specification().current_optimum();
        let picked = match priority.as_ref() {
            Some(p) => encoder.pick_assignment_priority(family, p)?,
            None => encoder.pick_assignment(family)?,
        };
        let options = match picked {
            Some(options) => options,
            None => return Ok(EpisodeOutcome::Decided),
        };
        stats.cegis_iterations += 1;
        let singleton = family.assignment_family(&options);
        let (result, dtmc) = quotient.check_assignment(&singleton, optimum)?;
        if let Some(improving) = result.improving.clone() {
            match improving.value {
                Some(value) => {
                    let updated = quotient
                        .specification_mut()
                        .optimality_mut()
                        .expect("improving value without an optimality objective")
                        .update_optimum(value);
                    if updated {
                        stats.optimum_updates += 1;
                        *best = Some(candidate(quotient, &improving));
                    }
                }
                None => {
                    *best = Some(candidate(quotient, &improving));
                    return Ok(EpisodeOutcome::Accepting);
                }
            }
        }
        let pruned = exclude_violations(
            quotient,
            encoder,
            generator,
            family,
            &options,
            &result,
            &dtmc,
            optimum,
            family.result.as_ref(),
        )?;
        stats.pruned_cegis += pruned;
    }
}

/// The sub-family induced by the primary scheduler of the undecided
/// property, searched first during an episode.
fn priority_subfamily(quotient: &Quotient, family: &Family) -> Option<Family> {
    let result = family.result.as_ref()?;
    let sub = family.sub.as_ref()?;
    let undecided = result.constraints.undecided();
    let output = match undecided.first() {
        Some(&index) => &result.constraints.results[index].as_ref().unwrap().primary,
        None => &result.optimality.as_ref()?.primary,
    };
    let scheduler = output.scheduler.as_ref()?;
    let selection = quotient.coloring().scheduler_selection(sub, scheduler);
    let mut priority = family.fork();
    let mut restricted = false;
    for (hole, options) in selection.iter().enumerate() {
        if !options.is_empty() && options.len() < family.options(hole).len() {
            priority.set_options(hole, options);
            restricted = true;
        }
    }
    if restricted {
        Some(priority)
    } else {
        None
    }
}
