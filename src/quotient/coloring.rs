// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::check::Scheduler;
use crate::family::{Family, Hole};
use crate::model::{ChoiceId, Mdp, ModelError, StateId, SubModel};
use smallvec::SmallVec;

/// One colored guard: the choice is only available while `hole` is assigned
/// `option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoleOption {
    pub hole: u32,
    pub option: u32,
}

/// Relates quotient-MDP choices to the hole assignments that enable them.
/// A choice with an empty assignment list is a default choice and always
/// enabled.
#[derive(Debug, Clone)]
pub struct Coloring {
    choice_assignments: Vec<SmallVec<[HoleOption; 2]>>,
    default_choices: Vec<bool>,
    state_to_holes: Vec<Vec<u32>>,
    hole_option_choices: Vec<Vec<Vec<ChoiceId>>>,
    simple: bool,
}

impl Coloring {
    pub fn new(
        mdp: &Mdp,
        holes: &[Hole],
        assignments: Vec<Vec<(usize, usize)>>,
    ) -> Result<Self, ModelError> {
        if assignments.len() != mdp.num_choices() {
            return Err(ModelError::new(
                "need one assignment list per quotient choice",
            ));
        }
        let mut choice_assignments = Vec::with_capacity(assignments.len());
        let mut default_choices = Vec::with_capacity(assignments.len());
        let mut hole_option_choices: Vec<Vec<Vec<ChoiceId>>> = holes
            .iter()
            .map(|h| vec![Vec::new(); h.num_options()])
            .collect();
        let mut state_to_holes: Vec<Vec<u32>> = vec![Vec::new(); mdp.num_states()];
        for (choice, pairs) in assignments.into_iter().enumerate() {
            let mut colored: SmallVec<[HoleOption; 2]> = SmallVec::new();
            for (hole, option) in pairs {
                if hole >= holes.len() {
                    return Err(ModelError::new(format!(
                        "choice {choice} refers to invalid hole {hole}"
                    )));
                }
                if option >= holes[hole].num_options() {
                    return Err(ModelError::new(format!(
                        "choice {choice} refers to invalid option {option} of hole {hole}"
                    )));
                }
                if colored.iter().any(|ho| ho.hole == hole as u32) {
                    return Err(ModelError::new(format!(
                        "choice {choice} constrains hole {hole} twice"
                    )));
                }
                colored.push(HoleOption {
                    hole: hole as u32,
                    option: option as u32,
                });
                hole_option_choices[hole][option].push(choice);
                let state = mdp.state_of_choice(choice);
                if !state_to_holes[state].contains(&(hole as u32)) {
                    state_to_holes[state].push(hole as u32);
                }
            }
            default_choices.push(colored.is_empty());
            choice_assignments.push(colored);
        }
        for holes_of_state in state_to_holes.iter_mut() {
            holes_of_state.sort_unstable();
        }
        let simple = state_to_holes.iter().all(|h| h.len() <= 1);
        Ok(Self {
            choice_assignments,
            default_choices,
            state_to_holes,
            hole_option_choices,
            simple,
        })
    }

    pub fn num_holes(&self) -> usize {
        self.hole_option_choices.len()
    }

    pub fn num_choices(&self) -> usize {
        self.choice_assignments.len()
    }

    /// True iff every state is influenced by at most one hole.
    pub fn is_simple(&self) -> bool {
        self.simple
    }

    pub fn assignment_of(&self, choice: ChoiceId) -> &[HoleOption] {
        &self.choice_assignments[choice]
    }

    pub fn is_default(&self, choice: ChoiceId) -> bool {
        self.default_choices[choice]
    }

    pub fn state_holes(&self, state: StateId) -> &[u32] {
        &self.state_to_holes[state]
    }

    pub fn choices_with(&self, hole: usize, option: usize) -> &[ChoiceId] {
        &self.hole_option_choices[hole][option]
    }

    fn choice_enabled(&self, family: &Family, choice: ChoiceId) -> bool {
        self.choice_assignments[choice]
            .iter()
            .all(|ho| family.hole(ho.hole as usize).contains(ho.option as usize))
    }

    /// Computes the selected-choice mask of a family: default choices plus
    /// every choice whose colors lie inside the family. For simple
    /// colorings the per-hole choice lists of the parent are reused and
    /// only the splitter's entry is recomputed.
    pub fn select_choices(&self, family: &Family) -> (Option<Vec<Vec<ChoiceId>>>, Vec<bool>) {
        if self.simple {
            let per_hole = match family.parent_info.as_ref() {
                Some(parent) if parent.per_hole_choices.is_some() => {
                    let mut per_hole = parent.per_hole_choices.clone().unwrap();
                    per_hole[parent.splitter] = self.hole_choices(family, parent.splitter);
                    per_hole
                }
                _ => (0..self.num_holes())
                    .map(|h| self.hole_choices(family, h))
                    .collect(),
            };
            let mut mask = self.default_choices.clone();
            for choices in per_hole.iter() {
                for choice in choices.iter() {
                    mask[*choice] = true;
                }
            }
            (Some(per_hole), mask)
        } else {
            let mut mask = vec![false; self.num_choices()];
            match family.parent_info.as_ref() {
                Some(parent) => {
                    for (choice, selected) in parent.mask.iter().enumerate() {
                        if *selected {
                            mask[choice] =
                                self.default_choices[choice] || self.choice_enabled(family, choice);
                        }
                    }
                }
                None => {
                    for choice in 0..self.num_choices() {
                        mask[choice] =
                            self.default_choices[choice] || self.choice_enabled(family, choice);
                    }
                }
            }
            (None, mask)
        }
    }

    fn hole_choices(&self, family: &Family, hole: usize) -> Vec<ChoiceId> {
        let mut choices = Vec::new();
        for option in family.options(hole) {
            choices.extend_from_slice(&self.hole_option_choices[hole][*option]);
        }
        choices
    }

    /// Lifts a scheduler on a restricted MDP to the per-hole options it
    /// uses, walking only states reachable under the scheduler. A scheduler
    /// is consistent iff every returned set has at most one element.
    pub fn scheduler_selection(&self, sub: &SubModel, scheduler: &Scheduler) -> Vec<Vec<usize>> {
        let mut selection: Vec<Vec<usize>> = vec![Vec::new(); self.num_holes()];
        let n = sub.mdp.num_states();
        let mut visited = vec![false; n];
        let mut todo = vec![sub.mdp.initial_state()];
        visited[sub.mdp.initial_state()] = true;
        while let Some(state) = todo.pop() {
            let local_choice = scheduler.choices[state];
            debug_assert!(sub.mdp.choices(state).contains(&local_choice));
            let quotient_choice = sub.choice_map[local_choice];
            for ho in self.choice_assignments[quotient_choice].iter() {
                let options = &mut selection[ho.hole as usize];
                if !options.contains(&(ho.option as usize)) {
                    options.push(ho.option as usize);
                }
            }
            for t in sub.mdp.transitions(local_choice) {
                if !visited[t.target] {
                    visited[t.target] = true;
                    todo.push(t.target);
                }
            }
        }
        for options in selection.iter_mut() {
            options.sort_unstable();
        }
        selection
    }

    /// Drops selected choices whose source state is unreachable via the
    /// selected choices, by forward search from the initial state.
    pub fn restrict_to_reachable(&self, mdp: &Mdp, mask: &[bool]) -> Vec<bool> {
        let mut reachable = vec![false; mdp.num_states()];
        let mut todo = vec![mdp.initial_state()];
        reachable[mdp.initial_state()] = true;
        while let Some(state) = todo.pop() {
            for choice in mdp.choices(state) {
                if !mask[choice] {
                    continue;
                }
                for t in mdp.transitions(choice) {
                    if !reachable[t.target] {
                        reachable[t.target] = true;
                        todo.push(t.target);
                    }
                }
            }
        }
        mask.iter()
            .enumerate()
            .map(|(choice, selected)| *selected && reachable[mdp.state_of_choice(choice)])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MdpBuilder;

    /// two holes, hole 0 at state 0, hole 1 at states 1 and 2
    fn simple_setup() -> (Mdp, Vec<Hole>, Coloring) {
        let mut b = MdpBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_state();
        let goal = b.add_state();
        b.add_choice(s0, &[(s1, 1.0)]); // c0: x=0
        b.add_choice(s0, &[(s2, 1.0)]); // c1: x=1
        b.add_choice(s1, &[(goal, 1.0)]); // c2: y=0
        b.add_choice(s1, &[(s1, 1.0)]); // c3: y=1
        b.add_choice(s2, &[(goal, 1.0)]); // c4: y=0
        b.add_choice(s2, &[(s2, 1.0)]); // c5: y=1
        b.add_choice(goal, &[(goal, 1.0)]); // c6: default
        b.label(goal, "goal");
        let mdp = b.build().unwrap();
        let holes = vec![
            Hole::new("x", vec!["0".into(), "1".into()]),
            Hole::new("y", vec!["0".into(), "1".into()]),
        ];
        let assignments = vec![
            vec![(0, 0)],
            vec![(0, 1)],
            vec![(1, 0)],
            vec![(1, 1)],
            vec![(1, 0)],
            vec![(1, 1)],
            vec![],
        ];
        let coloring = Coloring::new(&mdp, &holes, assignments).unwrap();
        (mdp, holes, coloring)
    }

    #[test]
    fn construction_builds_consistent_maps() {
        let (_mdp, _holes, coloring) = simple_setup();
        assert!(coloring.is_simple());
        assert!(coloring.is_default(6));
        assert_eq!(coloring.choices_with(1, 0), &[2, 4]);
        assert_eq!(coloring.state_holes(0), &[0]);
        assert_eq!(coloring.state_holes(1), &[1]);
        assert_eq!(coloring.state_holes(3), &[] as &[u32]);
    }

    #[test]
    fn rejects_double_constrained_choices() {
        let (mdp, holes, _) = simple_setup();
        let mut assignments = vec![vec![]; mdp.num_choices()];
        assignments[0] = vec![(0, 0), (0, 1)];
        assert!(Coloring::new(&mdp, &holes, assignments).is_err());
    }

    #[test]
    fn select_choices_respects_the_family() {
        let (_mdp, holes, coloring) = simple_setup();
        let mut family = Family::new(holes);
        family.set_options(1, &[0]);
        let (per_hole, mask) = coloring.select_choices(&family);
        assert!(per_hole.is_some());
        assert_eq!(mask, vec![true, true, true, false, true, false, true]);
        // selected choices only depend on options inside the family
        for (choice, selected) in mask.iter().enumerate() {
            if *selected && !coloring.is_default(choice) {
                for ho in coloring.assignment_of(choice) {
                    assert!(family.hole(ho.hole as usize).contains(ho.option as usize));
                }
            }
        }
    }

    #[test]
    fn incremental_selection_matches_fresh_selection() {
        let (_mdp, holes, coloring) = simple_setup();
        let parent = Family::new(holes);
        let (per_hole, mask) = coloring.select_choices(&parent);
        let mut child = parent.fork();
        child.set_options(1, &[1]);
        child.parent_info = Some(crate::family::ParentInfo {
            mask,
            per_hole_choices: per_hole,
            splitter: 1,
            decision: crate::check::Decision::Undecided,
            depth: 1,
        });
        let (_, incremental) = coloring.select_choices(&child);
        let mut fresh_child = child.fork();
        fresh_child.parent_info = None;
        let (_, fresh) = coloring.select_choices(&fresh_child);
        assert_eq!(incremental, fresh);
    }

    #[test]
    fn reachability_restriction_drops_orphaned_choices() {
        let (mdp, holes, coloring) = simple_setup();
        let mut family = Family::new(holes);
        family.set_options(0, &[0]);
        let (_, mask) = coloring.select_choices(&family);
        let restricted = coloring.restrict_to_reachable(&mdp, &mask);
        // state 2 is only reachable via x=1
        assert!(!restricted[4]);
        assert!(!restricted[5]);
        assert!(restricted[2]);
    }
}
