// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
mod coloring;
mod scheduler;

pub use coloring::{Coloring, HoleOption};
pub use scheduler::{analyze_scheduler, SchedulerAnalysis};

use crate::check::{
    CheckError, CheckOutput, ConstraintsResult, Decision, Formula, ImprovingAssignment,
    ModelChecker, PropertyResult, Specification, SpecificationResult,
};
use crate::family::{Family, Hole, ParentInfo, SolverError};
use crate::model::{build_submodel, collapse, ChoiceId, Dtmc, Mdp, ModelError, StateId};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub enum SynthError {
    /// the specification contains constructs the core rejects
    Incompatible(String),
    /// the model-checking oracle failed
    Oracle(CheckError),
    /// the SMT solver process failed
    Solver(SolverError),
}

impl Display for SynthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthError::Incompatible(msg) => write!(f, "incompatible specification: {msg}"),
            SynthError::Oracle(e) => write!(f, "oracle failure: {e}"),
            SynthError::Solver(e) => write!(f, "solver failure: {e}"),
        }
    }
}

impl std::error::Error for SynthError {}

impl From<CheckError> for SynthError {
    fn from(value: CheckError) -> Self {
        SynthError::Oracle(value)
    }
}

impl From<SolverError> for SynthError {
    fn from(value: SolverError) -> Self {
        SynthError::Solver(value)
    }
}

impl From<ModelError> for SynthError {
    fn from(value: ModelError) -> Self {
        SynthError::Incompatible(value.msg().to_string())
    }
}

/// Counts oracle calls. Shared by reference between drivers and workers.
#[derive(Debug, Default)]
pub struct OracleCounters {
    pub dtmc_checks: AtomicUsize,
    pub mdp_checks: AtomicUsize,
}

impl OracleCounters {
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.dtmc_checks.load(Ordering::Relaxed),
            self.mdp_checks.load(Ordering::Relaxed),
        )
    }
}

/// Owns the quotient MDP, its coloring, the specification and the
/// model-checking oracle. Builds restricted MDPs for sub-families, Markov
/// chains for singletons, evaluates the specification against both, and
/// implements the splitting policy.
pub struct Quotient {
    mdp: Mdp,
    holes: Vec<Hole>,
    coloring: Coloring,
    specification: Specification,
    oracle: Box<dyn ModelChecker>,
    choice_destinations: Vec<Vec<StateId>>,
    counters: OracleCounters,
}

impl Quotient {
    pub fn new(
        mdp: Mdp,
        holes: Vec<Hole>,
        coloring: Coloring,
        specification: Specification,
        oracle: Box<dyn ModelChecker>,
    ) -> Result<Self, SynthError> {
        if coloring.num_holes() != holes.len() {
            return Err(SynthError::Incompatible(
                "coloring and hole list disagree".to_string(),
            ));
        }
        if coloring.num_choices() != mdp.num_choices() {
            return Err(SynthError::Incompatible(
                "coloring and quotient MDP disagree".to_string(),
            ));
        }
        let mut formulas: Vec<&Formula> = Vec::new();
        for prop in specification.constraints.iter() {
            formulas.push(&prop.formula);
        }
        if let Some(opt) = specification.optimality() {
            formulas.push(&opt.formula);
        }
        for formula in formulas {
            if mdp.labeling().get(&formula.target).is_none() {
                return Err(SynthError::Incompatible(format!(
                    "the quotient MDP has no label `{}`",
                    formula.target
                )));
            }
            if let Some(model) = &formula.reward_model {
                if mdp.reward_model(model).is_none() {
                    return Err(SynthError::Incompatible(format!(
                        "the quotient MDP has no reward model `{model}`"
                    )));
                }
            }
        }
        let choice_destinations = (0..mdp.num_choices())
            .map(|choice| {
                let mut destinations = Vec::new();
                for t in mdp.transitions(choice) {
                    if !destinations.contains(&t.target) {
                        destinations.push(t.target);
                    }
                }
                destinations
            })
            .collect();
        Ok(Self {
            mdp,
            holes,
            coloring,
            specification,
            oracle,
            choice_destinations,
            counters: OracleCounters::default(),
        })
    }

    pub fn mdp(&self) -> &Mdp {
        &self.mdp
    }

    pub fn coloring(&self) -> &Coloring {
        &self.coloring
    }

    pub fn specification(&self) -> &Specification {
        &self.specification
    }

    pub fn specification_mut(&mut self) -> &mut Specification {
        &mut self.specification
    }

    pub fn oracle(&self) -> &dyn ModelChecker {
        self.oracle.as_ref()
    }

    pub fn counters(&self) -> &OracleCounters {
        &self.counters
    }

    pub fn num_holes(&self) -> usize {
        self.holes.len()
    }

    pub fn choice_destinations(&self, choice: ChoiceId) -> &[StateId] {
        &self.choice_destinations[choice]
    }

    pub fn root_family(&self) -> Family {
        let mut family = Family::new(self.holes.clone());
        family.constraint_indices = (0..self.specification.num_constraints()).collect();
        family
    }

    /// Selects the family's choices and builds its restricted MDP. Both are
    /// cached on the family.
    pub fn build(&self, family: &mut Family) -> Result<(), SynthError> {
        if family.mask.is_none() {
            let (per_hole, mask) = self.coloring.select_choices(family);
            family.per_hole_choices = per_hole;
            family.mask = Some(mask);
        }
        if family.sub.is_none() {
            let mask = family.mask.as_ref().unwrap();
            family.sub = Some(build_submodel(&self.mdp, mask)?);
        }
        Ok(())
    }

    /// Builds the Markov chain of a singleton family, together with the map
    /// from chain state to the quotient choice it kept.
    pub fn build_assignment(&self, singleton: &Family) -> Result<(Dtmc, Vec<ChoiceId>), SynthError> {
        assert!(singleton.is_singleton());
        let (_, mask) = self.coloring.select_choices(singleton);
        Ok(collapse(&self.mdp, &mask)?)
    }

    fn check_mdp_counted(&self, mdp: &Mdp, formula: &Formula) -> Result<CheckOutput, SynthError> {
        self.counters.mdp_checks.fetch_add(1, Ordering::Relaxed);
        Ok(self.oracle.check_mdp(mdp, formula)?)
    }

    pub(crate) fn check_dtmc_counted(
        &self,
        dtmc: &Dtmc,
        formula: &Formula,
    ) -> Result<CheckOutput, SynthError> {
        self.counters.dtmc_checks.fetch_add(1, Ordering::Relaxed);
        Ok(self.oracle.check_dtmc(dtmc, formula)?)
    }

    /// Evaluates the specification against a single assignment. `optimum`
    /// is the optimum snapshot the optimality check compares against.
    pub fn check_assignment(
        &self,
        singleton: &Family,
        optimum: Option<f64>,
    ) -> Result<(SpecificationResult, Dtmc), SynthError> {
        let (dtmc, _) = self.build_assignment(singleton)?;
        let precision = self.specification.settings.precision;
        let mut results: Vec<Option<PropertyResult>> =
            vec![None; self.specification.num_constraints()];
        for &index in singleton.constraint_indices.iter() {
            let prop = &self.specification.constraints[index];
            let output = self.check_dtmc_counted(&dtmc, &prop.formula)?;
            results[index] = Some(PropertyResult {
                value: output.value,
                sat: Some(prop.sat(output.value)),
                improves_optimum: false,
                primary: output,
                secondary: None,
            });
        }
        let constraints = ConstraintsResult { results };
        let mut optimality = None;
        let mut optimality_value = None;
        let mut improves = false;
        if let Some(opt) = self.specification.optimality() {
            let output = self.check_dtmc_counted(&dtmc, &opt.formula)?;
            improves = opt.improves_over(output.value, optimum, precision);
            optimality_value = Some(output.value);
            optimality = Some(PropertyResult {
                value: output.value,
                sat: None,
                improves_optimum: improves,
                primary: output,
                secondary: None,
            });
        }
        let accepting =
            constraints.all_sat() && (self.specification.optimality().is_none() || improves);
        let improving = if accepting {
            Some(ImprovingAssignment {
                options: singleton.assignment().unwrap(),
                value: optimality_value,
            })
        } else {
            None
        };
        let result = SpecificationResult {
            constraints,
            optimality,
            improving,
            can_improve: false,
        };
        Ok((result, dtmc))
    }

    /// Evaluates the specification against a sub-family using primary and
    /// secondary bounds on its restricted MDP. A consistent improving
    /// scheduler is harvested as a singleton right away. The result is also
    /// cached on the family.
    pub fn check_family(
        &self,
        family: &mut Family,
        optimum: Option<f64>,
    ) -> Result<SpecificationResult, SynthError> {
        if family.is_singleton() {
            let (result, _) = self.check_assignment(family, optimum)?;
            family.result = Some(result.clone());
            return Ok(result);
        }
        self.build(family)?;
        let sub = family.sub.as_ref().unwrap();
        let precision = self.specification.settings.precision;
        let mut results: Vec<Option<PropertyResult>> =
            vec![None; self.specification.num_constraints()];
        let mut rejected = false;
        for &index in family.constraint_indices.iter() {
            let prop = &self.specification.constraints[index];
            let primary = self.check_mdp_counted(&sub.mdp, &prop.formula)?;
            if !prop.sat(primary.value) {
                // even the best member violates the constraint
                results[index] = Some(PropertyResult {
                    value: primary.value,
                    sat: Some(false),
                    improves_optimum: false,
                    primary,
                    secondary: None,
                });
                rejected = true;
                break;
            }
            let secondary = self.check_mdp_counted(&sub.mdp, &prop.formula_alt)?;
            let sat = if prop.sat(secondary.value) {
                Some(true)
            } else {
                None
            };
            results[index] = Some(PropertyResult {
                value: primary.value,
                sat,
                improves_optimum: false,
                primary,
                secondary: Some(secondary),
            });
        }
        let constraints = ConstraintsResult { results };
        let mut optimality = None;
        let mut improving = None;
        let mut can_improve = false;
        if !rejected {
            if let Some(opt) = self.specification.optimality() {
                let primary = self.check_mdp_counted(&sub.mdp, &opt.formula)?;
                can_improve = opt.improves_over(primary.value, optimum, precision);
                if can_improve {
                    if let Some(scheduler) = primary.scheduler.as_ref() {
                        let selection = self.coloring.scheduler_selection(sub, scheduler);
                        if selection.iter().all(|options| options.len() <= 1) {
                            let options: Vec<usize> = selection
                                .iter()
                                .enumerate()
                                .map(|(hole, options)| {
                                    options.first().copied().unwrap_or(family.options(hole)[0])
                                })
                                .collect();
                            let singleton = family.assignment_family(&options);
                            let (singleton_result, _) =
                                self.check_assignment(&singleton, optimum)?;
                            if singleton_result.decision() == Decision::Accept {
                                // the member attains the family bound
                                improving = singleton_result.improving;
                                can_improve = false;
                            }
                        }
                    }
                }
                optimality = Some(PropertyResult {
                    value: primary.value,
                    sat: None,
                    improves_optimum: can_improve,
                    primary,
                    secondary: None,
                });
            } else if constraints.all_sat() && constraints.undecided().is_empty() {
                improving = Some(ImprovingAssignment {
                    options: family.pick_any(),
                    value: None,
                });
            }
        }
        let result = SpecificationResult {
            constraints,
            optimality,
            improving,
            can_improve,
        };
        family.result = Some(result.clone());
        Ok(result)
    }

    /// Splits a family into children covering it exactly. The splitter is
    /// chosen among inconsistent holes, preferring action over decision
    /// over variable holes and breaking ties by scheduler-difference score;
    /// without an inconsistency the widest hole is halved.
    pub fn split(&self, family: &Family) -> Result<Vec<Family>, SynthError> {
        let analysis = self.analysis_for_split(family);
        let (splitter, suboptions) = self.choose_split(family, analysis.as_ref())?;
        let decision = family
            .result
            .as_ref()
            .map(|r| r.decision())
            .unwrap_or(Decision::Undecided);
        // constraints decided for the whole family are not re-checked below
        let child_indices: Vec<usize> = family
            .constraint_indices
            .iter()
            .copied()
            .filter(|&index| {
                !matches!(
                    family
                        .result
                        .as_ref()
                        .and_then(|r| r.constraints.results[index].as_ref()),
                    Some(r) if r.sat == Some(true)
                )
            })
            .collect();
        let mask = family
            .mask
            .clone()
            .unwrap_or_else(|| vec![true; self.mdp.num_choices()]);
        let mut children = Vec::with_capacity(suboptions.len());
        for subset in suboptions {
            let mut child = family.fork();
            child.constraint_indices = child_indices.clone();
            child.set_options(splitter, &subset);
            child.depth = family.depth + 1;
            child.parent_info = Some(ParentInfo {
                mask: mask.clone(),
                per_hole_choices: family.per_hole_choices.clone(),
                splitter,
                decision,
                depth: child.depth,
            });
            children.push(child);
        }
        Ok(children)
    }

    fn analysis_for_split(&self, family: &Family) -> Option<SchedulerAnalysis> {
        let result = family.result.as_ref()?;
        let sub = family.sub.as_ref()?;
        let undecided = result.constraints.undecided();
        let (output, formula) = if let Some(&index) = undecided.first() {
            let r = result.constraints.results[index].as_ref().unwrap();
            (&r.primary, &self.specification.constraints[index].formula)
        } else {
            let r = result.optimality.as_ref()?;
            (&r.primary, &self.specification.optimality()?.formula)
        };
        output.scheduler.as_ref()?;
        Some(analyze_scheduler(
            &self.coloring,
            sub,
            output,
            formula,
            self.oracle.as_ref(),
        ))
    }

    fn choose_split(
        &self,
        family: &Family,
        analysis: Option<&SchedulerAnalysis>,
    ) -> Result<(usize, Vec<Vec<usize>>), SynthError> {
        if let Some(analysis) = analysis {
            let inconsistent = analysis.inconsistent_holes();
            if !inconsistent.is_empty() {
                let splitter = inconsistent
                    .iter()
                    .copied()
                    .max_by(|&x, &y| {
                        family
                            .hole(x)
                            .kind
                            .cmp(&family.hole(y).kind)
                            .then(
                                analysis.scores[x]
                                    .partial_cmp(&analysis.scores[y])
                                    .unwrap_or(std::cmp::Ordering::Equal),
                            )
                            // lower index wins remaining ties
                            .then(y.cmp(&x))
                    })
                    .unwrap();
                let selection = &analysis.selection[splitter];
                if selection.len() >= 2 {
                    let others: Vec<usize> = family
                        .options(splitter)
                        .iter()
                        .copied()
                        .filter(|o| !selection.contains(o))
                        .collect();
                    let mut suboptions = Vec::new();
                    // the "other" group is explored last, cores DFS-first
                    if !others.is_empty() {
                        suboptions.push(others);
                    }
                    for option in selection.iter().rev() {
                        suboptions.push(vec![*option]);
                    }
                    return Ok((splitter, suboptions));
                }
            }
        }
        // no usable inconsistency: halve the widest hole
        let splitter = (0..family.num_holes())
            .filter(|&h| family.hole(h).num_options() > 1)
            .max_by(|&x, &y| {
                family
                    .hole(x)
                    .num_options()
                    .cmp(&family.hole(y).num_options())
                    .then(y.cmp(&x))
            })
            .ok_or_else(|| {
                SynthError::Incompatible("cannot split a singleton family".to_string())
            })?;
        let options = family.options(splitter);
        let mid = (options.len() + 1) / 2;
        Ok((
            splitter,
            vec![options[..mid].to_vec(), options[mid..].to_vec()],
        ))
    }

    /// Drops selected choices whose source state cannot be reached, using
    /// the precomputed choice destinations.
    pub fn reachable_choices(&self, mask: &[bool]) -> Vec<bool> {
        let mut reachable = vec![false; self.mdp.num_states()];
        let mut todo = vec![self.mdp.initial_state()];
        reachable[self.mdp.initial_state()] = true;
        while let Some(state) = todo.pop() {
            for choice in self.mdp.choices(state) {
                if !mask[choice] {
                    continue;
                }
                for target in self.choice_destinations[choice].iter() {
                    if !reachable[*target] {
                        reachable[*target] = true;
                        todo.push(*target);
                    }
                }
            }
        }
        mask.iter()
            .enumerate()
            .map(|(choice, selected)| *selected && reachable[self.mdp.state_of_choice(choice)])
            .collect()
    }
}
