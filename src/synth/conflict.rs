// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::SynthError;
use crate::check::{CompareOp, Formula};
use crate::model::{Dtmc, Labeling, MatrixBuilder, ModelError, StateId};
use crate::quotient::Quotient;
use indexmap::IndexMap;

/// One violated property of a singleton's Markov chain for which a conflict
/// is requested.
pub struct ConflictRequest<'a> {
    pub formula: &'a Formula,
    pub op: CompareOp,
    pub threshold: f64,
    /// per-state values of the violating chain
    pub state_values: &'a [f64],
    /// per-state bound of the enclosing sub-family, if available
    pub mdp_bound: Option<&'a [f64]>,
}

/// Generalizes a violating chain into a set of hole indices: every
/// assignment that agrees with the chain on these holes still violates the
/// property.
pub trait ConflictGeneration {
    fn construct(
        &self,
        quotient: &Quotient,
        dtmc: &Dtmc,
        request: &ConflictRequest,
    ) -> Result<Vec<usize>, SynthError>;
}

/// Witness construction against the worst-case completion of the chain.
pub struct DtmcConflicts;

/// Witness construction strengthened with the sub-family's MDP bound, which
/// accepts partial instantiations as conflicts earlier.
pub struct MdpConflicts;

impl ConflictGeneration for DtmcConflicts {
    fn construct(
        &self,
        quotient: &Quotient,
        dtmc: &Dtmc,
        request: &ConflictRequest,
    ) -> Result<Vec<usize>, SynthError> {
        expand_witness(quotient, dtmc, request, false)
    }
}

impl ConflictGeneration for MdpConflicts {
    fn construct(
        &self,
        quotient: &Quotient,
        dtmc: &Dtmc,
        request: &ConflictRequest,
    ) -> Result<Vec<usize>, SynthError> {
        expand_witness(quotient, dtmc, request, true)
    }
}

pub enum ConflictGenerator {
    Dtmc(DtmcConflicts),
    Mdp(MdpConflicts),
}

impl ConflictGenerator {
    pub fn dtmc() -> Self {
        ConflictGenerator::Dtmc(DtmcConflicts)
    }

    pub fn mdp() -> Self {
        ConflictGenerator::Mdp(MdpConflicts)
    }
}

impl ConflictGeneration for ConflictGenerator {
    fn construct(
        &self,
        quotient: &Quotient,
        dtmc: &Dtmc,
        request: &ConflictRequest,
    ) -> Result<Vec<usize>, SynthError> {
        match self {
            ConflictGenerator::Dtmc(g) => g.construct(quotient, dtmc, request),
            ConflictGenerator::Mdp(g) => g.construct(quotient, dtmc, request),
        }
    }
}

/// Grows a subsystem of the chain until the rewired chain alone certifies
/// the violation. States outside the subsystem are rewired to their
/// worst-case (or bounded) value, so the certificate holds for every
/// assignment that only differs on holes outside the subsystem.
fn expand_witness(
    quotient: &Quotient,
    dtmc: &Dtmc,
    request: &ConflictRequest,
    use_bound: bool,
) -> Result<Vec<usize>, SynthError> {
    let n = dtmc.num_states();
    let initial = dtmc.initial_state();
    let reachable = dtmc.reachable_states();
    // violations of a lower bound are witnessed by low-value states,
    // violations of an upper bound by high-value ones
    let ascending = request.op.is_lower_bound();
    let mut order: Vec<StateId> = (0..n).filter(|s| reachable[*s] && *s != initial).collect();
    order.sort_by(|&a, &b| {
        let cmp = request.state_values[a]
            .partial_cmp(&request.state_values[b])
            .unwrap_or(std::cmp::Ordering::Equal);
        let cmp = if ascending { cmp } else { cmp.reverse() };
        cmp.then(a.cmp(&b))
    });
    let mut in_subsystem = vec![false; n];
    in_subsystem[initial] = true;
    let mut remaining = order.into_iter();
    loop {
        let rewired = rewire(dtmc, &in_subsystem, request, use_bound)?;
        let output = quotient.check_dtmc_counted(&rewired, request.formula)?;
        if !request.op.holds(output.value, request.threshold) {
            break;
        }
        match remaining.next() {
            Some(state) => in_subsystem[state] = true,
            // the full reachable chain is the (always valid) fallback
            None => break,
        }
    }
    let mut conflict: Vec<usize> = Vec::new();
    for state in 0..n {
        if !in_subsystem[state] {
            continue;
        }
        for hole in quotient.coloring().state_holes(state) {
            if !conflict.contains(&(*hole as usize)) {
                conflict.push(*hole as usize);
            }
        }
    }
    conflict.sort_unstable();
    Ok(conflict)
}

/// The chain with all out-of-subsystem states replaced by boundary rows:
/// for probabilities a coin flip into a fresh target/sink pair weighted by
/// the boundary value, for rewards a one-step reward followed by the
/// target.
fn rewire(
    dtmc: &Dtmc,
    in_subsystem: &[bool],
    request: &ConflictRequest,
    use_bound: bool,
) -> Result<Dtmc, ModelError> {
    let n = dtmc.num_states();
    let aux_target = n;
    let sink = n + 1;
    let is_reward = request.formula.is_reward();
    let worst = if request.op.is_lower_bound() { 1.0 } else { 0.0 };
    let mut matrix = MatrixBuilder::new();
    let mut rewards: Vec<f64> = Vec::with_capacity(n + 2);
    let orig_rewards = match &request.formula.reward_model {
        Some(name) => dtmc.reward_model(name),
        None => None,
    };
    let mut scratch: Vec<(StateId, f64)> = Vec::new();
    for state in 0..n {
        if in_subsystem[state] {
            scratch.clear();
            scratch.extend(
                dtmc.transitions(state)
                    .iter()
                    .map(|t| (t.target, t.probability)),
            );
            matrix.add_row(&scratch)?;
            rewards.push(orig_rewards.map(|r| r[state]).unwrap_or(0.0));
        } else if is_reward {
            let bound = request
                .mdp_bound
                .filter(|_| use_bound)
                .map(|b| b[state])
                .filter(|b| b.is_finite() && *b > 0.0)
                .unwrap_or(0.0);
            matrix.add_row(&[(aux_target, 1.0)])?;
            rewards.push(bound);
        } else {
            let bound = request
                .mdp_bound
                .filter(|_| use_bound)
                .map(|b| b[state].clamp(0.0, 1.0))
                .unwrap_or(worst);
            if bound <= 0.0 {
                matrix.add_row(&[(sink, 1.0)])?;
            } else if bound >= 1.0 {
                matrix.add_row(&[(aux_target, 1.0)])?;
            } else {
                matrix.add_row(&[(aux_target, bound), (sink, 1.0 - bound)])?;
            }
            rewards.push(0.0);
        }
    }
    matrix.add_row(&[(aux_target, 1.0)])?;
    rewards.push(0.0);
    matrix.add_row(&[(sink, 1.0)])?;
    rewards.push(0.0);

    let mut labeling = Labeling::new(n + 2);
    let orig_targets = dtmc.labeling().get(&request.formula.target);
    let mut targets: Vec<StateId> = (0..n)
        .filter(|s| in_subsystem[*s] && orig_targets.map(|m| m[*s]).unwrap_or(false))
        .collect();
    targets.push(aux_target);
    labeling.add(&request.formula.target, &targets)?;

    let reward_models: IndexMap<String, Vec<f64>> = match &request.formula.reward_model {
        Some(name) => [(name.clone(), rewards)].into_iter().collect(),
        None => IndexMap::new(),
    };
    Dtmc::new(matrix.build(), dtmc.initial_state(), labeling, reward_models)
}

/// Rejects specifications that CEGIS cannot refute: the violation of a
/// maximizing reward property has no finite witness.
pub(crate) fn ensure_cegis_compatible(
    spec: &crate::check::Specification,
) -> Result<(), SynthError> {
    for prop in spec.constraints.iter() {
        if prop.maximizing_reward() {
            return Err(SynthError::Incompatible(format!(
                "no finite counterexamples for maximizing reward property {prop}"
            )));
        }
    }
    if let Some(opt) = spec.optimality() {
        if opt.maximizing_reward() {
            return Err(SynthError::Incompatible(
                "no finite counterexamples for a maximizing reward objective".to_string(),
            ));
        }
    }
    Ok(())
}
