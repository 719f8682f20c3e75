// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum SolverError {
    Io(std::io::Error),
    Unexpected(String),
}

impl Display for SolverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::Io(e) => write!(f, "solver io error: {e}"),
            SolverError::Unexpected(msg) => write!(f, "unexpected solver response: {msg}"),
        }
    }
}

impl std::error::Error for SolverError {}

impl From<std::io::Error> for SolverError {
    fn from(value: std::io::Error) -> Self {
        SolverError::Io(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// one option index per hole
    Model(Vec<usize>),
    Unsat,
}

/// A generalized conflict: assignments matching all `fixed` equalities and
/// all `ranges` memberships are excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionClause {
    /// (hole, option) pairs that must match exactly
    pub fixed: Vec<(usize, usize)>,
    /// (hole, options) memberships for holes restricted below the root
    pub ranges: Vec<(usize, Vec<usize>)>,
}

impl ExclusionClause {
    pub fn excludes(&self, assignment: &[usize]) -> bool {
        self.fixed.iter().all(|(h, o)| assignment[*h] == *o)
            && self
                .ranges
                .iter()
                .all(|(h, options)| options.contains(&assignment[*h]))
    }
}

/// The solver seam of the family encoder. The production backend talks to
/// an SMT solver process; the enumeration backend searches exhaustively and
/// exists so that small problems and tests need no external solver.
pub trait FamilyBackend {
    /// Declares one variable per hole with the given root domains. Called
    /// exactly once.
    fn declare(&mut self, domains: &[Vec<usize>]) -> Result<(), SolverError>;
    fn push(&mut self) -> Result<(), SolverError>;
    fn pop(&mut self) -> Result<(), SolverError>;
    /// Restricts a hole within the current scope.
    fn restrict(&mut self, hole: usize, options: &[usize]) -> Result<(), SolverError>;
    /// Adds an exclusion clause within the current scope.
    fn exclude(&mut self, clause: &ExclusionClause) -> Result<(), SolverError>;
    fn solve(&mut self) -> Result<SolveOutcome, SolverError>;
}

#[derive(Debug, Default)]
struct Frame {
    restrictions: Vec<(usize, Vec<usize>)>,
    clauses: Vec<ExclusionClause>,
}

/// Exhaustive-search implementation of [`FamilyBackend`]. Assignments are
/// enumerated in lexicographic order over the hole domains.
#[derive(Debug, Default)]
pub struct EnumerationBackend {
    domains: Vec<Vec<usize>>,
    frames: Vec<Frame>,
}

impl EnumerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective_domain(&self, hole: usize) -> Vec<usize> {
        let mut domain = self.domains[hole].clone();
        for frame in self.frames.iter() {
            for (h, options) in frame.restrictions.iter() {
                if *h == hole {
                    domain.retain(|o| options.contains(o));
                }
            }
        }
        domain
    }

    fn excluded(&self, assignment: &[usize]) -> bool {
        self.frames
            .iter()
            .flat_map(|f| f.clauses.iter())
            .any(|c| c.excludes(assignment))
    }
}

impl FamilyBackend for EnumerationBackend {
    fn declare(&mut self, domains: &[Vec<usize>]) -> Result<(), SolverError> {
        self.domains = domains.to_vec();
        self.frames = vec![Frame::default()];
        Ok(())
    }

    fn push(&mut self) -> Result<(), SolverError> {
        self.frames.push(Frame::default());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        if self.frames.len() <= 1 {
            return Err(SolverError::Unexpected("pop without push".to_string()));
        }
        self.frames.pop();
        Ok(())
    }

    fn restrict(&mut self, hole: usize, options: &[usize]) -> Result<(), SolverError> {
        self.frames
            .last_mut()
            .unwrap()
            .restrictions
            .push((hole, options.to_vec()));
        Ok(())
    }

    fn exclude(&mut self, clause: &ExclusionClause) -> Result<(), SolverError> {
        self.frames.last_mut().unwrap().clauses.push(clause.clone());
        Ok(())
    }

    fn solve(&mut self) -> Result<SolveOutcome, SolverError> {
        let domains: Vec<Vec<usize>> = (0..self.domains.len())
            .map(|h| self.effective_domain(h))
            .collect();
        if domains.iter().any(|d| d.is_empty()) {
            return Ok(SolveOutcome::Unsat);
        }
        let mut indices = vec![0usize; domains.len()];
        loop {
            let assignment: Vec<usize> = indices
                .iter()
                .enumerate()
                .map(|(h, ii)| domains[h][*ii])
                .collect();
            if !self.excluded(&assignment) {
                return Ok(SolveOutcome::Model(assignment));
            }
            // advance the odometer
            let mut hole = domains.len();
            loop {
                if hole == 0 {
                    return Ok(SolveOutcome::Unsat);
                }
                hole -= 1;
                indices[hole] += 1;
                if indices[hole] < domains[hole].len() {
                    break;
                }
                indices[hole] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EnumerationBackend {
        let mut b = EnumerationBackend::new();
        b.declare(&[vec![0, 1], vec![0, 1, 2]]).unwrap();
        b
    }

    #[test]
    fn enumerates_in_lexicographic_order() {
        let mut b = backend();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![0, 0]));
        b.exclude(&ExclusionClause {
            fixed: vec![(0, 0), (1, 0)],
            ranges: vec![],
        })
        .unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![0, 1]));
    }

    #[test]
    fn generalized_clauses_prune_subfamilies() {
        let mut b = backend();
        // exclude everything with hole 0 = 0
        b.exclude(&ExclusionClause {
            fixed: vec![(0, 0)],
            ranges: vec![],
        })
        .unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![1, 0]));
        // exclude hole 0 = 1 while hole 1 is in {0, 1}
        b.exclude(&ExclusionClause {
            fixed: vec![(0, 1)],
            ranges: vec![(1, vec![0, 1])],
        })
        .unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![1, 2]));
    }

    #[test]
    fn scopes_discard_clauses_and_restrictions() {
        let mut b = backend();
        b.push().unwrap();
        b.restrict(1, &[2]).unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![0, 2]));
        b.exclude(&ExclusionClause {
            fixed: vec![(0, 0)],
            ranges: vec![],
        })
        .unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![1, 2]));
        b.pop().unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Model(vec![0, 0]));
        assert!(b.pop().is_err());
    }

    #[test]
    fn unsat_when_everything_is_excluded() {
        let mut b = EnumerationBackend::new();
        b.declare(&[vec![0, 1]]).unwrap();
        b.exclude(&ExclusionClause {
            fixed: vec![(0, 0)],
            ranges: vec![],
        })
        .unwrap();
        b.exclude(&ExclusionClause {
            fixed: vec![(0, 1)],
            ranges: vec![],
        })
        .unwrap();
        assert_eq!(b.solve().unwrap(), SolveOutcome::Unsat);
    }
}
