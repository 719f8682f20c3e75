// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::family::Family;
use super::solver::{ExclusionClause, FamilyBackend, SolveOutcome, SolverError};

/// Incremental encoding of the design space. One encoder is shared across
/// all families of a synthesis run: conflict clauses accumulate at the
/// current scope level, sub-family restrictions are asserted only for the
/// duration of a single solver call.
pub struct FamilyEncoder<B: FamilyBackend> {
    backend: B,
    root_domains: Vec<Vec<usize>>,
    level: usize,
}

impl<B: FamilyBackend> FamilyEncoder<B> {
    pub fn new(mut backend: B, root: &Family) -> Result<Self, SolverError> {
        let root_domains: Vec<Vec<usize>> = (0..root.num_holes())
            .map(|h| root.options(h).to_vec())
            .collect();
        backend.declare(&root_domains)?;
        Ok(Self {
            backend,
            root_domains,
            level: 0,
        })
    }

    /// True if the hole is restricted below its root domain.
    fn is_restricted(&self, family: &Family, hole: usize) -> bool {
        family.options(hole).len() < self.root_domains[hole].len()
    }

    fn solve_for(&mut self, family: &Family) -> Result<SolveOutcome, SolverError> {
        self.backend.push()?;
        for hole in 0..family.num_holes() {
            if self.is_restricted(family, hole) {
                self.backend.restrict(hole, family.options(hole))?;
            }
        }
        let outcome = self.backend.solve();
        self.backend.pop()?;
        outcome
    }

    /// Picks an unexplored assignment from the family, or `None` once the
    /// family is exhausted. Exhaustion is sticky: further calls return
    /// `None` without consulting the solver.
    pub fn pick_assignment(
        &mut self,
        family: &mut Family,
    ) -> Result<Option<Vec<usize>>, SolverError> {
        if family.encoding_exhausted {
            return Ok(None);
        }
        match self.solve_for(family)? {
            SolveOutcome::Model(model) => Ok(Some(model)),
            SolveOutcome::Unsat => {
                family.encoding_exhausted = true;
                Ok(None)
            }
        }
    }

    /// Like [`Self::pick_assignment`], but tries the priority sub-family
    /// first.
    pub fn pick_assignment_priority(
        &mut self,
        family: &mut Family,
        priority: &Family,
    ) -> Result<Option<Vec<usize>>, SolverError> {
        if family.encoding_exhausted {
            return Ok(None);
        }
        if let SolveOutcome::Model(model) = self.solve_for(priority)? {
            return Ok(Some(model));
        }
        self.pick_assignment(family)
    }

    /// Excludes every assignment that agrees with `assignment` on the
    /// conflict holes and lies inside `family` on the remaining ones.
    /// Returns an estimate of the number of assignments pruned.
    pub fn exclude_conflict(
        &mut self,
        family: &Family,
        assignment: &[usize],
        conflict: &[usize],
    ) -> Result<u128, SolverError> {
        let mut clause = ExclusionClause {
            fixed: Vec::with_capacity(conflict.len()),
            ranges: Vec::new(),
        };
        let mut pruned = 1u128;
        for hole in 0..family.num_holes() {
            if conflict.contains(&hole) {
                clause.fixed.push((hole, assignment[hole]));
            } else {
                pruned = pruned.saturating_mul(family.options(hole).len() as u128);
                if self.is_restricted(family, hole) {
                    clause.ranges.push((hole, family.options(hole).to_vec()));
                }
            }
        }
        self.backend.exclude(&clause)?;
        Ok(pruned)
    }

    /// Aligns the solver's scope stack with the given DFS depth, so that
    /// clauses learned inside the current subtree persist and clauses
    /// outside of it are discarded on backtracking.
    pub fn set_level(&mut self, depth: usize) -> Result<(), SolverError> {
        while self.level > depth {
            self.backend.pop()?;
            self.level -= 1;
        }
        while self.level < depth {
            self.backend.push()?;
            self.level += 1;
        }
        Ok(())
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{EnumerationBackend, Hole};

    fn root() -> Family {
        Family::new(vec![
            Hole::new("x", vec!["0".into(), "1".into()]),
            Hole::new("y", vec!["0".into(), "1".into()]),
        ])
    }

    fn encoder(root: &Family) -> FamilyEncoder<EnumerationBackend> {
        FamilyEncoder::new(EnumerationBackend::new(), root).unwrap()
    }

    #[test]
    fn pick_until_exhausted() {
        let mut family = root();
        let mut enc = encoder(&family);
        let mut seen = Vec::new();
        while let Some(model) = enc.pick_assignment(&mut family).unwrap() {
            // excluding the full assignment walks every member exactly once
            enc.exclude_conflict(&family, &model, &[0, 1]).unwrap();
            seen.push(model);
            assert!(seen.len() <= 4);
        }
        assert_eq!(seen.len(), 4);
        // exhaustion is sticky
        assert!(enc.pick_assignment(&mut family).unwrap().is_none());
    }

    #[test]
    fn conflicts_generalize() {
        let mut family = root();
        let mut enc = encoder(&family);
        let model = enc.pick_assignment(&mut family).unwrap().unwrap();
        assert_eq!(model, vec![0, 0]);
        // conflict on hole 0 only: both y-options are pruned
        let pruned = enc.exclude_conflict(&family, &model, &[0]).unwrap();
        assert_eq!(pruned, 2);
        let next = enc.pick_assignment(&mut family).unwrap().unwrap();
        assert_eq!(next[0], 1);
    }

    #[test]
    fn restricted_families_solve_within_their_options() {
        let mut family = root();
        family.set_options(0, &[1]);
        let mut enc = encoder(&family);
        let model = enc.pick_assignment(&mut family).unwrap().unwrap();
        assert_eq!(model[0], 1);
    }

    #[test]
    fn priority_subfamily_is_tried_first() {
        let mut family = root();
        let mut priority = family.fork();
        priority.set_options(0, &[1]);
        priority.set_options(1, &[1]);
        let mut enc = encoder(&family);
        let model = enc
            .pick_assignment_priority(&mut family, &priority)
            .unwrap()
            .unwrap();
        assert_eq!(model, vec![1, 1]);
        // once the priority part is excluded we fall back to the rest
        enc.exclude_conflict(&family, &model, &[0, 1]).unwrap();
        let next = enc
            .pick_assignment_priority(&mut family, &priority)
            .unwrap()
            .unwrap();
        assert_ne!(next, vec![1, 1]);
    }

    #[test]
    fn levels_scope_learned_clauses() {
        let mut family = root();
        let mut enc = encoder(&family);
        enc.set_level(1).unwrap();
        let model = enc.pick_assignment(&mut family).unwrap().unwrap();
        enc.exclude_conflict(&family, &model, &[0, 1]).unwrap();
        let next = enc.pick_assignment(&mut family).unwrap().unwrap();
        assert_ne!(next, model);
        // backtracking above the level forgets the clause
        enc.set_level(0).unwrap();
        let again = enc.pick_assignment(&mut family).unwrap().unwrap();
        assert_eq!(again, model);
    }
}
