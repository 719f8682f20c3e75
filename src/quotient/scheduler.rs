// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::coloring::Coloring;
use crate::check::{CheckOutput, Direction, Formula, ModelChecker};
use crate::model::{collapse, SubModel};

/// The per-hole option selection of a scheduler together with an
/// inconsistency score per hole, used to pick a splitter.
#[derive(Debug, Clone)]
pub struct SchedulerAnalysis {
    /// options observed along the scheduler's reachable choices
    pub selection: Vec<Vec<usize>>,
    /// value-difference score; zero for consistent holes
    pub scores: Vec<f64>,
}

impl SchedulerAnalysis {
    pub fn consistent(&self) -> bool {
        self.selection.iter().all(|options| options.len() <= 1)
    }

    pub fn inconsistent_holes(&self) -> Vec<usize> {
        self.selection
            .iter()
            .enumerate()
            .filter(|(_, options)| options.len() > 1)
            .map(|(hole, _)| hole)
            .collect()
    }
}

/// Analyzes the scheduler attached to `output` against the coloring.
///
/// The score of an inconsistent hole averages, over all affected states,
/// the gap between the best and worst choice value among the hole's
/// inconsistent options, weighted by the expected number of visits of the
/// state in the chain induced by the scheduler.
pub fn analyze_scheduler(
    coloring: &Coloring,
    sub: &SubModel,
    output: &CheckOutput,
    formula: &Formula,
    oracle: &dyn ModelChecker,
) -> SchedulerAnalysis {
    let scheduler = match output.scheduler.as_ref() {
        Some(s) => s,
        None => {
            return SchedulerAnalysis {
                selection: vec![Vec::new(); coloring.num_holes()],
                scores: vec![0.0; coloring.num_holes()],
            }
        }
    };
    let selection = coloring.scheduler_selection(sub, scheduler);
    let mut scores = vec![0.0; coloring.num_holes()];
    let analysis = SchedulerAnalysis {
        selection,
        scores: scores.clone(),
    };
    if analysis.consistent() {
        return analysis;
    }
    let selection = analysis.selection;

    let visits = expected_visits_or_default(sub, scheduler, formula, oracle);
    let choice_values = compute_choice_values(sub, output, formula);

    for hole in 0..coloring.num_holes() {
        if selection[hole].len() <= 1 {
            continue;
        }
        let mut sum = 0.0;
        let mut affected = 0usize;
        for state in 0..sub.mdp.num_states() {
            let mut min = f64::NAN;
            let mut max = f64::NAN;
            let mut options_seen: Vec<usize> = Vec::new();
            for choice in sub.mdp.choices(state) {
                let quotient_choice = sub.choice_map[choice];
                for ho in coloring.assignment_of(quotient_choice) {
                    if ho.hole as usize != hole
                        || !selection[hole].contains(&(ho.option as usize))
                    {
                        continue;
                    }
                    let value = choice_values[choice];
                    if !value.is_finite() {
                        continue;
                    }
                    if !options_seen.contains(&(ho.option as usize)) {
                        options_seen.push(ho.option as usize);
                    }
                    if min.is_nan() || value < min {
                        min = value;
                    }
                    if max.is_nan() || value > max {
                        max = value;
                    }
                }
            }
            if options_seen.len() >= 2 {
                sum += (max - min) * visits[state];
                affected += 1;
            }
        }
        if affected > 0 {
            scores[hole] = sum / affected as f64;
        }
    }
    SchedulerAnalysis { selection, scores }
}

/// Choice value: immediate reward plus the probability-weighted value of
/// the successors under the primary bound.
fn compute_choice_values(sub: &SubModel, output: &CheckOutput, formula: &Formula) -> Vec<f64> {
    let rewards = formula
        .reward_model
        .as_ref()
        .and_then(|name| sub.mdp.reward_model(name));
    let mut values = Vec::with_capacity(sub.mdp.num_choices());
    for choice in 0..sub.mdp.num_choices() {
        let mut value = rewards.map(|r| r[choice]).unwrap_or(0.0);
        for t in sub.mdp.transitions(choice) {
            if t.probability > 0.0 {
                value += t.probability * output.state_values[t.target];
            }
        }
        values.push(value);
    }
    values
}

/// Expected visits under the scheduler; undefined entries are replaced by
/// the mean of the defined values for minimizing objectives and by zero for
/// maximizing ones, so scores stay finite.
fn expected_visits_or_default(
    sub: &SubModel,
    scheduler: &crate::check::Scheduler,
    formula: &Formula,
    oracle: &dyn ModelChecker,
) -> Vec<f64> {
    let n = sub.mdp.num_states();
    let mut mask = vec![false; sub.mdp.num_choices()];
    for state in 0..n {
        mask[scheduler.choices[state]] = true;
    }
    let visits = collapse(&sub.mdp, &mask)
        .ok()
        .and_then(|(dtmc, _)| oracle.expected_visits(&dtmc).ok())
        .unwrap_or_else(|| vec![1.0; n]);
    let defined: Vec<f64> = visits.iter().copied().filter(|v| v.is_finite()).collect();
    let default = match formula.direction {
        Direction::Min if !defined.is_empty() => {
            defined.iter().sum::<f64>() / defined.len() as f64
        }
        _ => 0.0,
    };
    visits
        .into_iter()
        .map(|v| if v.is_finite() { v } else { default })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Scheduler, ValueIteration};
    use crate::family::{Family, Hole};
    use crate::model::{build_submodel, MdpBuilder};

    /// one hole coloring two states with conflicting optima
    fn conflicted_setup() -> (crate::model::Mdp, Vec<Hole>, Coloring) {
        let mut b = MdpBuilder::new();
        let s0 = b.add_state();
        let a = b.add_state();
        let bb = b.add_state();
        let goal = b.add_state();
        let sink = b.add_state();
        b.add_choice(s0, &[(a, 0.5), (bb, 0.5)]); // c0 default
        b.add_choice(a, &[(goal, 0.9), (sink, 0.1)]); // c1: x=0
        b.add_choice(a, &[(goal, 0.1), (sink, 0.9)]); // c2: x=1
        b.add_choice(bb, &[(goal, 0.1), (sink, 0.9)]); // c3: x=0
        b.add_choice(bb, &[(goal, 0.9), (sink, 0.1)]); // c4: x=1
        b.add_choice(goal, &[(goal, 1.0)]); // c5
        b.add_choice(sink, &[(sink, 1.0)]); // c6
        b.label(goal, "goal");
        let mdp = b.build().unwrap();
        let holes = vec![Hole::new("x", vec!["0".into(), "1".into()])];
        let assignments = vec![
            vec![],
            vec![(0, 0)],
            vec![(0, 1)],
            vec![(0, 0)],
            vec![(0, 1)],
            vec![],
            vec![],
        ];
        let coloring = Coloring::new(&mdp, &holes, assignments).unwrap();
        (mdp, holes, coloring)
    }

    #[test]
    fn detects_inconsistency_and_scores_it() {
        let (mdp, holes, coloring) = conflicted_setup();
        let family = Family::new(holes);
        let (_, mask) = coloring.select_choices(&family);
        let sub = build_submodel(&mdp, &mask).unwrap();
        let vi = ValueIteration::default();
        let formula = Formula::probability(Direction::Max, "goal");
        let output = vi.check_mdp(&sub.mdp, &formula).unwrap();
        let analysis = analyze_scheduler(&coloring, &sub, &output, &formula, &vi);
        assert!(!analysis.consistent());
        assert_eq!(analysis.inconsistent_holes(), vec![0]);
        // both affected states see a 0.8 value gap and 0.5 expected visits
        assert!((analysis.scores[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn consistent_scheduler_has_no_scores() {
        let (mdp, holes, coloring) = conflicted_setup();
        let family = Family::new(holes);
        let (_, mask) = coloring.select_choices(&family);
        let sub = build_submodel(&mdp, &mask).unwrap();
        // hand-built scheduler that always picks x=0
        let mut choices = Vec::new();
        for state in 0..sub.mdp.num_states() {
            let choice = sub
                .mdp
                .choices(state)
                .find(|c| {
                    let qc = sub.choice_map[*c];
                    coloring
                        .assignment_of(qc)
                        .iter()
                        .all(|ho| ho.option == 0)
                })
                .unwrap();
            choices.push(choice);
        }
        let vi = ValueIteration::default();
        let formula = Formula::probability(Direction::Max, "goal");
        let mut output = vi.check_mdp(&sub.mdp, &formula).unwrap();
        output.scheduler = Some(Scheduler { choices });
        let analysis = analyze_scheduler(&coloring, &sub, &output, &formula, &vi);
        assert!(analysis.consistent());
        assert_eq!(analysis.scores, vec![0.0]);
    }
}
