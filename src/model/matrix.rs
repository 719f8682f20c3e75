// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::mdp::ModelError;

pub type StateId = usize;
pub type ChoiceId = usize;

/// tolerance used when checking that a row is a probability distribution
const STOCHASTIC_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub target: StateId,
    pub probability: f64,
}

/// Row-major sparse probability matrix. For an MDP there is one row per
/// choice, for a Markov chain one row per state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseMatrix {
    row_starts: Vec<usize>,
    entries: Vec<Transition>,
}

impl SparseMatrix {
    pub fn num_rows(&self) -> usize {
        self.row_starts.len().saturating_sub(1)
    }

    pub fn row(&self, row: usize) -> &[Transition] {
        &self.entries[self.row_starts[row]..self.row_starts[row + 1]]
    }

    /// Largest state id referenced by any transition.
    pub fn max_target(&self) -> Option<StateId> {
        self.entries.iter().map(|t| t.target).max()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Transition]> + '_ {
        (0..self.num_rows()).map(|r| self.row(r))
    }
}

pub struct MatrixBuilder {
    row_starts: Vec<usize>,
    entries: Vec<Transition>,
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self {
            row_starts: vec![0],
            entries: Vec::new(),
        }
    }

    /// Appends a row and checks that it forms a probability distribution.
    pub fn add_row(&mut self, transitions: &[(StateId, f64)]) -> Result<usize, ModelError> {
        let mut sum = 0.0;
        for (target, probability) in transitions.iter() {
            if !probability.is_finite() || *probability <= 0.0 || *probability > 1.0 {
                return Err(ModelError::new(format!(
                    "invalid probability {} for transition to state {}",
                    probability, target
                )));
            }
            sum += probability;
            self.entries.push(Transition {
                target: *target,
                probability: *probability,
            });
        }
        if (sum - 1.0).abs() > STOCHASTIC_TOL {
            return Err(ModelError::new(format!(
                "row {} is not stochastic, probabilities sum to {}",
                self.row_starts.len() - 1,
                sum
            )));
        }
        self.row_starts.push(self.entries.len());
        Ok(self.row_starts.len() - 2)
    }

    pub fn num_rows(&self) -> usize {
        self.row_starts.len() - 1
    }

    pub fn build(self) -> SparseMatrix {
        SparseMatrix {
            row_starts: self.row_starts,
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_access_rows() {
        let mut b = MatrixBuilder::new();
        b.add_row(&[(1, 0.5), (2, 0.5)]).unwrap();
        b.add_row(&[(0, 1.0)]).unwrap();
        let m = b.build();
        assert_eq!(m.num_rows(), 2);
        assert_eq!(m.row(0).len(), 2);
        assert_eq!(m.row(1)[0].target, 0);
        assert_eq!(m.max_target(), Some(2));
    }

    #[test]
    fn reject_non_stochastic_row() {
        let mut b = MatrixBuilder::new();
        assert!(b.add_row(&[(1, 0.5), (2, 0.4)]).is_err());
        assert!(b.add_row(&[(1, 1.5)]).is_err());
        assert!(b.add_row(&[(1, -0.1), (2, 1.1)]).is_err());
    }
}
