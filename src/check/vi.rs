// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::formula::{Direction, Formula};
use super::oracle::{CheckError, CheckOutput, ModelChecker, Scheduler};
use crate::model::{Dtmc, Labeling, Mdp};

/// states with a reachability probability below `1 - PROB_ONE_TOL` are
/// treated as missing the target when computing expected rewards
const PROB_ONE_TOL: f64 = 1e-8;

/// Built-in probabilistic model checker based on value iteration.
///
/// Reachability probabilities are iterated from below. Expected total
/// rewards are iterated from below for maximizing queries and from above
/// (starting at infinity) for minimizing ones, so that zero-reward loops
/// cannot undercut the fixed point. States that miss the target with
/// positive probability get an infinite expected reward.
#[derive(Debug, Clone, Copy)]
pub struct ValueIteration {
    pub precision: f64,
    pub max_iterations: usize,
}

impl Default for ValueIteration {
    fn default() -> Self {
        Self {
            precision: 1e-10,
            max_iterations: 100_000,
        }
    }
}

fn target_mask(labeling: &Labeling, target: &str) -> Result<Vec<bool>, CheckError> {
    labeling
        .get(target)
        .map(|m| m.to_vec())
        .ok_or_else(|| CheckError::Unsupported(format!("unknown label `{target}`")))
}

/// absolute difference that treats two equal infinities as converged
fn value_delta(a: f64, b: f64) -> f64 {
    if a == b {
        0.0
    } else {
        (a - b).abs()
    }
}

impl ValueIteration {
    fn dtmc_reach_probability(
        &self,
        dtmc: &Dtmc,
        target: &[bool],
    ) -> Result<Vec<f64>, CheckError> {
        let n = dtmc.num_states();
        let mut values: Vec<f64> = (0..n).map(|s| if target[s] { 1.0 } else { 0.0 }).collect();
        for _ in 0..self.max_iterations {
            let mut delta: f64 = 0.0;
            for s in 0..n {
                if target[s] {
                    continue;
                }
                let mut x = 0.0;
                for t in dtmc.transitions(s) {
                    x += t.probability * values[t.target];
                }
                delta = delta.max(value_delta(x, values[s]));
                values[s] = x;
            }
            if delta <= self.precision {
                return Ok(values);
            }
        }
        Err(CheckError::NonConvergence(self.max_iterations))
    }

    fn dtmc_expected_reward(
        &self,
        dtmc: &Dtmc,
        target: &[bool],
        rewards: &[f64],
    ) -> Result<Vec<f64>, CheckError> {
        let n = dtmc.num_states();
        let reach = self.dtmc_reach_probability(dtmc, target)?;
        let mut values: Vec<f64> = (0..n)
            .map(|s| {
                if target[s] {
                    0.0
                } else if reach[s] < 1.0 - PROB_ONE_TOL {
                    f64::INFINITY
                } else {
                    0.0
                }
            })
            .collect();
        for _ in 0..self.max_iterations {
            let mut delta: f64 = 0.0;
            for s in 0..n {
                if target[s] || values[s].is_infinite() {
                    continue;
                }
                let mut x = rewards[s];
                for t in dtmc.transitions(s) {
                    x += t.probability * values[t.target];
                }
                delta = delta.max(value_delta(x, values[s]));
                values[s] = x;
            }
            if delta <= self.precision {
                return Ok(values);
            }
        }
        Err(CheckError::NonConvergence(self.max_iterations))
    }

    fn mdp_reach_probability(
        &self,
        mdp: &Mdp,
        target: &[bool],
        direction: Direction,
    ) -> Result<Vec<f64>, CheckError> {
        let n = mdp.num_states();
        let mut values: Vec<f64> = (0..n).map(|s| if target[s] { 1.0 } else { 0.0 }).collect();
        for _ in 0..self.max_iterations {
            let mut delta: f64 = 0.0;
            for s in 0..n {
                if target[s] {
                    continue;
                }
                let mut ext = f64::NAN;
                for choice in mdp.choices(s) {
                    let mut cv = 0.0;
                    for t in mdp.transitions(choice) {
                        cv += t.probability * values[t.target];
                    }
                    if ext.is_nan() || direction.better(cv, ext) {
                        ext = cv;
                    }
                }
                delta = delta.max(value_delta(ext, values[s]));
                values[s] = ext;
            }
            if delta <= self.precision {
                return Ok(values);
            }
        }
        Err(CheckError::NonConvergence(self.max_iterations))
    }

    fn mdp_expected_reward(
        &self,
        mdp: &Mdp,
        target: &[bool],
        rewards: &[f64],
        direction: Direction,
    ) -> Result<Vec<f64>, CheckError> {
        let n = mdp.num_states();
        // a state gets an infinite reward if the adversarial resolution of
        // the remaining choices misses the target with positive probability
        let guard = self.mdp_reach_probability(mdp, target, direction.opposite())?;
        let mut values: Vec<f64> = (0..n)
            .map(|s| {
                if target[s] {
                    0.0
                } else if guard[s] < 1.0 - PROB_ONE_TOL {
                    f64::INFINITY
                } else {
                    match direction {
                        Direction::Max => 0.0,
                        Direction::Min => f64::INFINITY,
                    }
                }
            })
            .collect();
        let frozen: Vec<bool> = (0..n)
            .map(|s| target[s] || guard[s] < 1.0 - PROB_ONE_TOL)
            .collect();
        for _ in 0..self.max_iterations {
            let mut delta: f64 = 0.0;
            for s in 0..n {
                if frozen[s] {
                    continue;
                }
                let mut ext = f64::NAN;
                for choice in mdp.choices(s) {
                    let mut cv = rewards[choice];
                    for t in mdp.transitions(choice) {
                        cv += t.probability * values[t.target];
                    }
                    if ext.is_nan() || direction.better(cv, ext) {
                        ext = cv;
                    }
                }
                delta = delta.max(value_delta(ext, values[s]));
                values[s] = ext;
            }
            if delta <= self.precision {
                return Ok(values);
            }
        }
        Err(CheckError::NonConvergence(self.max_iterations))
    }

    /// Greedy scheduler extraction once the state values have converged.
    /// Ties are broken towards the better continuation value, so that a
    /// zero-reward loop never wins against actual progress to the target.
    fn extract_scheduler(
        &self,
        mdp: &Mdp,
        values: &[f64],
        rewards: Option<&[f64]>,
        direction: Direction,
    ) -> Scheduler {
        let mut choices = Vec::with_capacity(mdp.num_states());
        for s in 0..mdp.num_states() {
            let mut best = mdp.choices(s).start;
            let mut best_value = f64::NAN;
            let mut best_continuation = f64::NAN;
            for choice in mdp.choices(s) {
                let mut continuation = 0.0;
                for t in mdp.transitions(choice) {
                    continuation += t.probability * values[t.target];
                }
                let cv = rewards.map(|r| r[choice]).unwrap_or(0.0) + continuation;
                let take = if best_value.is_nan() {
                    true
                } else if direction.better(cv, best_value) {
                    true
                } else {
                    cv == best_value && direction.better(continuation, best_continuation)
                };
                if take {
                    best_value = cv;
                    best_continuation = continuation;
                    best = choice;
                }
            }
            choices.push(best);
        }
        Scheduler { choices }
    }
}

impl ModelChecker for ValueIteration {
    fn check_dtmc(&self, dtmc: &Dtmc, formula: &Formula) -> Result<CheckOutput, CheckError> {
        let target = target_mask(dtmc.labeling(), &formula.target)?;
        let state_values = match &formula.reward_model {
            Some(model) => {
                let rewards = dtmc.reward_model(model).ok_or_else(|| {
                    CheckError::Unsupported(format!("unknown reward model `{model}`"))
                })?;
                self.dtmc_expected_reward(dtmc, &target, rewards)?
            }
            None => self.dtmc_reach_probability(dtmc, &target)?,
        };
        Ok(CheckOutput {
            value: state_values[dtmc.initial_state()],
            state_values,
            scheduler: None,
        })
    }

    fn check_mdp(&self, mdp: &Mdp, formula: &Formula) -> Result<CheckOutput, CheckError> {
        let target = target_mask(mdp.labeling(), &formula.target)?;
        let (state_values, rewards) = match &formula.reward_model {
            Some(model) => {
                let rewards = mdp.reward_model(model).ok_or_else(|| {
                    CheckError::Unsupported(format!("unknown reward model `{model}`"))
                })?;
                (
                    self.mdp_expected_reward(mdp, &target, rewards, formula.direction)?,
                    Some(rewards),
                )
            }
            None => (
                self.mdp_reach_probability(mdp, &target, formula.direction)?,
                None,
            ),
        };
        let scheduler = self.extract_scheduler(mdp, &state_values, rewards, formula.direction);
        Ok(CheckOutput {
            value: state_values[mdp.initial_state()],
            state_values,
            scheduler: Some(scheduler),
        })
    }

    fn expected_visits(&self, dtmc: &Dtmc) -> Result<Vec<f64>, CheckError> {
        let n = dtmc.num_states();
        let absorbing: Vec<bool> = (0..n)
            .map(|s| {
                let row = dtmc.transitions(s);
                row.len() == 1 && row[0].target == s
            })
            .collect();
        let mut visits = vec![0.0; n];
        let mut mass = vec![0.0; n];
        let mut reached_absorbing = vec![false; n];
        mass[dtmc.initial_state()] = 1.0;
        for _ in 0..self.max_iterations {
            let mut next = vec![0.0; n];
            let mut live = 0.0;
            for s in 0..n {
                if mass[s] <= 0.0 {
                    continue;
                }
                visits[s] += mass[s];
                if absorbing[s] {
                    // an absorbing state is visited forever once entered
                    reached_absorbing[s] = true;
                    continue;
                }
                for t in dtmc.transitions(s) {
                    next[t.target] += mass[s] * t.probability;
                    live += mass[s] * t.probability;
                }
            }
            mass = next;
            if live <= self.precision {
                break;
            }
        }
        for s in 0..n {
            // recurrent states keep circulating mass until the iteration cap
            if reached_absorbing[s] || mass[s] > self.precision {
                visits[s] = f64::INFINITY;
            }
        }
        Ok(visits)
    }
}
