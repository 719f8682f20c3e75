// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::matrix::{ChoiceId, MatrixBuilder, SparseMatrix, StateId, Transition};
use indexmap::IndexMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone)]
pub struct ModelError {
    msg: String,
}

impl ModelError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for ModelError {}

/// Maps label names to the set of states carrying the label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labeling {
    labels: IndexMap<String, Vec<bool>>,
    num_states: usize,
}

impl Labeling {
    pub fn new(num_states: usize) -> Self {
        Self {
            labels: IndexMap::new(),
            num_states,
        }
    }

    pub fn add(&mut self, name: &str, states: &[StateId]) -> Result<(), ModelError> {
        if self.labels.contains_key(name) {
            return Err(ModelError::new(format!("duplicate label `{name}`")));
        }
        let mut mask = vec![false; self.num_states];
        for state in states.iter() {
            if *state >= self.num_states {
                return Err(ModelError::new(format!(
                    "label `{name}` refers to invalid state {state}"
                )));
            }
            mask[*state] = true;
        }
        self.labels.insert(name.to_string(), mask);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[bool]> {
        self.labels.get(name).map(|m| m.as_slice())
    }

    pub fn is_labeled(&self, state: StateId, name: &str) -> bool {
        self.labels.get(name).map(|m| m[state]).unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(|k| k.as_str())
    }

    pub fn labels_of(&self, state: StateId) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|(_, m)| m[state])
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }
}

/// A Markov decision process in sparse form. Choices are numbered
/// consecutively in state order; `row_groups` maps each state to its
/// range of choices.
#[derive(Debug, Clone, PartialEq)]
pub struct Mdp {
    row_groups: Vec<usize>,
    matrix: SparseMatrix,
    initial_state: StateId,
    labeling: Labeling,
    /// choice-indexed action rewards
    rewards: IndexMap<String, Vec<f64>>,
    choice_to_state: Vec<StateId>,
}

impl Mdp {
    pub fn new(
        matrix: SparseMatrix,
        row_groups: Vec<usize>,
        initial_state: StateId,
        labeling: Labeling,
        rewards: IndexMap<String, Vec<f64>>,
    ) -> Result<Self, ModelError> {
        let num_states = row_groups.len().saturating_sub(1);
        let num_choices = matrix.num_rows();
        if row_groups.first() != Some(&0) || row_groups.last() != Some(&num_choices) {
            return Err(ModelError::new("row groups do not cover the matrix"));
        }
        if row_groups.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ModelError::new("every state needs at least one choice"));
        }
        if labeling.num_states() != num_states {
            return Err(ModelError::new("labeling does not match the state count"));
        }
        if initial_state >= num_states {
            return Err(ModelError::new("invalid initial state"));
        }
        if matrix.max_target().map(|t| t >= num_states).unwrap_or(false) {
            return Err(ModelError::new("transition to non-existent state"));
        }
        for (name, values) in rewards.iter() {
            if values.len() != num_choices {
                return Err(ModelError::new(format!(
                    "reward model `{name}` does not match the choice count"
                )));
            }
        }
        let mut choice_to_state = vec![0; num_choices];
        for state in 0..num_states {
            for choice in row_groups[state]..row_groups[state + 1] {
                choice_to_state[choice] = state;
            }
        }
        Ok(Self {
            row_groups,
            matrix,
            initial_state,
            labeling,
            rewards,
            choice_to_state,
        })
    }

    pub fn num_states(&self) -> usize {
        self.row_groups.len() - 1
    }

    pub fn num_choices(&self) -> usize {
        self.matrix.num_rows()
    }

    pub fn choices(&self, state: StateId) -> std::ops::Range<ChoiceId> {
        self.row_groups[state]..self.row_groups[state + 1]
    }

    pub fn state_of_choice(&self, choice: ChoiceId) -> StateId {
        self.choice_to_state[choice]
    }

    pub fn transitions(&self, choice: ChoiceId) -> &[Transition] {
        self.matrix.row(choice)
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    pub fn labeling(&self) -> &Labeling {
        &self.labeling
    }

    pub fn reward_model(&self, name: &str) -> Option<&[f64]> {
        self.rewards.get(name).map(|v| v.as_slice())
    }

    pub fn reward_models(&self) -> &IndexMap<String, Vec<f64>> {
        &self.rewards
    }
}

impl Display for Mdp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "mdp {} states {} choices initial {}",
            self.num_states(),
            self.num_choices(),
            self.initial_state
        )?;
        for state in 0..self.num_states() {
            let labels = self.labeling.labels_of(state);
            if labels.is_empty() {
                writeln!(f, "state {state}")?;
            } else {
                writeln!(f, "state {state} {{{}}}", labels.join(" "))?;
            }
            for choice in self.choices(state) {
                write!(f, "  ->")?;
                for t in self.transitions(choice) {
                    write!(f, " {}:{:.3}", t.target, t.probability)?;
                }
                for (name, values) in self.rewards.iter() {
                    if values[choice] != 0.0 {
                        write!(f, " [{name}={:.3}]", values[choice])?;
                    }
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Convenience constructor for MDPs, mostly used to set up models in tests
/// and front ends. Choices are numbered in the order they are added, grouped
/// by state.
pub struct MdpBuilder {
    choices: Vec<Vec<ChoiceSpec>>,
    initial_state: StateId,
    labels: IndexMap<String, Vec<StateId>>,
}

struct ChoiceSpec {
    transitions: Vec<(StateId, f64)>,
    rewards: Vec<(String, f64)>,
}

impl Default for MdpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MdpBuilder {
    pub fn new() -> Self {
        Self {
            choices: Vec::new(),
            initial_state: 0,
            labels: IndexMap::new(),
        }
    }

    pub fn add_state(&mut self) -> StateId {
        self.choices.push(Vec::new());
        self.choices.len() - 1
    }

    pub fn add_choice(&mut self, state: StateId, transitions: &[(StateId, f64)]) {
        self.add_choice_rewarded(state, transitions, &[]);
    }

    pub fn add_choice_rewarded(
        &mut self,
        state: StateId,
        transitions: &[(StateId, f64)],
        rewards: &[(&str, f64)],
    ) {
        self.choices[state].push(ChoiceSpec {
            transitions: transitions.to_vec(),
            rewards: rewards
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
        });
    }

    pub fn label(&mut self, state: StateId, name: &str) {
        self.labels.entry(name.to_string()).or_default().push(state);
    }

    pub fn set_initial(&mut self, state: StateId) {
        self.initial_state = state;
    }

    pub fn build(self) -> Result<Mdp, ModelError> {
        let num_states = self.choices.len();
        let mut matrix = MatrixBuilder::new();
        let mut row_groups = vec![0];
        let mut reward_names: Vec<String> = Vec::new();
        for state_choices in self.choices.iter() {
            for spec in state_choices.iter() {
                for (name, _) in spec.rewards.iter() {
                    if !reward_names.contains(name) {
                        reward_names.push(name.clone());
                    }
                }
            }
        }
        let mut rewards: IndexMap<String, Vec<f64>> = reward_names
            .into_iter()
            .map(|n| (n, Vec::new()))
            .collect();
        for state_choices in self.choices.iter() {
            for spec in state_choices.iter() {
                matrix.add_row(&spec.transitions)?;
                for (name, values) in rewards.iter_mut() {
                    let value = spec
                        .rewards
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| *v)
                        .unwrap_or(0.0);
                    values.push(value);
                }
            }
            row_groups.push(matrix.num_rows());
        }
        let mut labeling = Labeling::new(num_states);
        for (name, states) in self.labels.iter() {
            labeling.add(name, states)?;
        }
        Mdp::new(matrix.build(), row_groups, self.initial_state, labeling, rewards)
    }
}

/// A discrete time Markov chain, i.e., an MDP with exactly one choice per
/// state. Rewards are state-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dtmc {
    matrix: SparseMatrix,
    initial_state: StateId,
    labeling: Labeling,
    rewards: IndexMap<String, Vec<f64>>,
}

impl Dtmc {
    pub fn new(
        matrix: SparseMatrix,
        initial_state: StateId,
        labeling: Labeling,
        rewards: IndexMap<String, Vec<f64>>,
    ) -> Result<Self, ModelError> {
        let num_states = matrix.num_rows();
        if labeling.num_states() != num_states {
            return Err(ModelError::new("labeling does not match the state count"));
        }
        if initial_state >= num_states {
            return Err(ModelError::new("invalid initial state"));
        }
        if matrix.max_target().map(|t| t >= num_states).unwrap_or(false) {
            return Err(ModelError::new("transition to non-existent state"));
        }
        for (name, values) in rewards.iter() {
            if values.len() != num_states {
                return Err(ModelError::new(format!(
                    "reward model `{name}` does not match the state count"
                )));
            }
        }
        Ok(Self {
            matrix,
            initial_state,
            labeling,
            rewards,
        })
    }

    pub fn num_states(&self) -> usize {
        self.matrix.num_rows()
    }

    pub fn transitions(&self, state: StateId) -> &[Transition] {
        self.matrix.row(state)
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    pub fn labeling(&self) -> &Labeling {
        &self.labeling
    }

    pub fn reward_model(&self, name: &str) -> Option<&[f64]> {
        self.rewards.get(name).map(|v| v.as_slice())
    }

    /// States reachable from the initial state.
    pub fn reachable_states(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.num_states()];
        let mut todo = vec![self.initial_state];
        reachable[self.initial_state] = true;
        while let Some(state) = todo.pop() {
            for t in self.transitions(state) {
                if !reachable[t.target] {
                    reachable[t.target] = true;
                    todo.push(t.target);
                }
            }
        }
        reachable
    }
}

impl Display for Dtmc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "dtmc {} states initial {}",
            self.num_states(),
            self.initial_state
        )?;
        for state in 0..self.num_states() {
            let labels = self.labeling.labels_of(state);
            if labels.is_empty() {
                write!(f, "state {state} ->")?;
            } else {
                write!(f, "state {state} {{{}}} ->", labels.join(" "))?;
            }
            for t in self.transitions(state) {
                write!(f, " {}:{:.3}", t.target, t.probability)?;
            }
            for (name, values) in self.rewards.iter() {
                if values[state] != 0.0 {
                    write!(f, " [{name}={:.3}]", values[state])?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_small_mdp() {
        let mut b = MdpBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_state();
        b.add_choice(s0, &[(s1, 0.5), (s2, 0.5)]);
        b.add_choice_rewarded(s0, &[(s2, 1.0)], &[("cost", 2.0)]);
        b.add_choice(s1, &[(s1, 1.0)]);
        b.add_choice(s2, &[(s2, 1.0)]);
        b.label(s1, "goal");
        let mdp = b.build().unwrap();
        assert_eq!(mdp.num_states(), 3);
        assert_eq!(mdp.num_choices(), 4);
        assert_eq!(mdp.choices(0), 0..2);
        assert_eq!(mdp.state_of_choice(1), 0);
        assert_eq!(mdp.state_of_choice(3), 2);
        assert!(mdp.labeling().is_labeled(1, "goal"));
        assert_eq!(mdp.reward_model("cost").unwrap()[1], 2.0);
        assert_eq!(mdp.reward_model("cost").unwrap()[0], 0.0);
    }

    #[test]
    fn reject_state_without_choices() {
        let mut b = MdpBuilder::new();
        let s0 = b.add_state();
        let _s1 = b.add_state();
        b.add_choice(s0, &[(s0, 1.0)]);
        assert!(b.build().is_err());
    }

    #[test]
    fn labeling_rejects_duplicates_and_bad_states() {
        let mut l = Labeling::new(2);
        l.add("a", &[0]).unwrap();
        assert!(l.add("a", &[1]).is_err());
        assert!(l.add("b", &[7]).is_err());
        assert_eq!(l.labels_of(0), vec!["a"]);
    }
}
