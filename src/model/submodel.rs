// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::matrix::{ChoiceId, MatrixBuilder, StateId};
use super::mdp::{Dtmc, Mdp, ModelError};
use indexmap::IndexMap;

/// An MDP restricted to a subset of its choices, together with maps back
/// into the original model. All states are retained, so `state_map` is the
/// identity; it is materialized anyway so that callers never need to know.
#[derive(Debug, Clone)]
pub struct SubModel {
    pub mdp: Mdp,
    pub state_map: Vec<StateId>,
    pub choice_map: Vec<ChoiceId>,
}

/// Restricts `mdp` to the choices selected by `mask`. Every state must keep
/// at least one choice.
pub fn build_submodel(mdp: &Mdp, mask: &[bool]) -> Result<SubModel, ModelError> {
    assert_eq!(mask.len(), mdp.num_choices());
    let mut matrix = MatrixBuilder::new();
    let mut row_groups = vec![0];
    let mut choice_map = Vec::new();
    let mut scratch: Vec<(StateId, f64)> = Vec::new();
    for state in 0..mdp.num_states() {
        let mut kept = 0;
        for choice in mdp.choices(state) {
            if !mask[choice] {
                continue;
            }
            scratch.clear();
            scratch.extend(mdp.transitions(choice).iter().map(|t| (t.target, t.probability)));
            matrix.add_row(&scratch)?;
            choice_map.push(choice);
            kept += 1;
        }
        if kept == 0 {
            return Err(ModelError::new(format!(
                "state {state} has no selected choice"
            )));
        }
        row_groups.push(matrix.num_rows());
    }
    let rewards: IndexMap<String, Vec<f64>> = mdp
        .reward_models()
        .iter()
        .map(|(name, values)| {
            (
                name.clone(),
                choice_map.iter().map(|c| values[*c]).collect(),
            )
        })
        .collect();
    let sub = Mdp::new(
        matrix.build(),
        row_groups,
        mdp.initial_state(),
        mdp.labeling().clone(),
        rewards,
    )?;
    let state_map = (0..mdp.num_states()).collect();
    Ok(SubModel {
        mdp: sub,
        state_map,
        choice_map,
    })
}

/// Collapses `mdp` to a Markov chain using the first selected choice of
/// every state. Returns the chain and the map from state to the original
/// choice it kept.
pub fn collapse(mdp: &Mdp, mask: &[bool]) -> Result<(Dtmc, Vec<ChoiceId>), ModelError> {
    assert_eq!(mask.len(), mdp.num_choices());
    let mut matrix = MatrixBuilder::new();
    let mut choice_map = Vec::with_capacity(mdp.num_states());
    let mut scratch: Vec<(StateId, f64)> = Vec::new();
    for state in 0..mdp.num_states() {
        let choice = mdp
            .choices(state)
            .find(|c| mask[*c])
            .ok_or_else(|| ModelError::new(format!("state {state} has no selected choice")))?;
        scratch.clear();
        scratch.extend(mdp.transitions(choice).iter().map(|t| (t.target, t.probability)));
        matrix.add_row(&scratch)?;
        choice_map.push(choice);
    }
    let rewards: IndexMap<String, Vec<f64>> = mdp
        .reward_models()
        .iter()
        .map(|(name, values)| {
            (
                name.clone(),
                choice_map.iter().map(|c| values[*c]).collect(),
            )
        })
        .collect();
    let dtmc = Dtmc::new(
        matrix.build(),
        mdp.initial_state(),
        mdp.labeling().clone(),
        rewards,
    )?;
    Ok((dtmc, choice_map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MdpBuilder;

    fn two_choice_mdp() -> Mdp {
        let mut b = MdpBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        b.add_choice_rewarded(s0, &[(s1, 1.0)], &[("cost", 1.0)]);
        b.add_choice_rewarded(s0, &[(s0, 0.5), (s1, 0.5)], &[("cost", 3.0)]);
        b.add_choice(s1, &[(s1, 1.0)]);
        b.label(s1, "goal");
        b.build().unwrap()
    }

    #[test]
    fn submodel_keeps_all_states() {
        let mdp = two_choice_mdp();
        let sub = build_submodel(&mdp, &[false, true, true]).unwrap();
        assert_eq!(sub.mdp.num_states(), 2);
        assert_eq!(sub.mdp.num_choices(), 2);
        assert_eq!(sub.choice_map, vec![1, 2]);
        assert_eq!(sub.state_map, vec![0, 1]);
        assert_eq!(sub.mdp.reward_model("cost").unwrap(), &[3.0, 0.0]);
    }

    #[test]
    fn submodel_rejects_empty_state() {
        let mdp = two_choice_mdp();
        assert!(build_submodel(&mdp, &[false, false, true]).is_err());
    }

    #[test]
    fn collapse_picks_selected_choice() {
        let mdp = two_choice_mdp();
        let (dtmc, map) = collapse(&mdp, &[false, true, true]).unwrap();
        assert_eq!(map, vec![1, 2]);
        assert_eq!(dtmc.transitions(0).len(), 2);
        assert_eq!(dtmc.reward_model("cost").unwrap(), &[3.0, 0.0]);
        assert!(dtmc.labeling().is_labeled(1, "goal"));
    }
}
