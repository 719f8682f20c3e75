// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::oracle::CheckOutput;

/// Result of evaluating one property. For sub-family checks `sat` is
/// three-valued: `None` means the bounds could not decide the family.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyResult {
    pub value: f64,
    pub sat: Option<bool>,
    /// for optimality properties: could this analysis still improve the optimum
    pub improves_optimum: bool,
    pub primary: CheckOutput,
    pub secondary: Option<CheckOutput>,
}

/// Per-constraint results. An entry is `None` when the constraint was not
/// (re-)checked because an ancestor family already decided it or an earlier
/// constraint rejected the family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintsResult {
    pub results: Vec<Option<PropertyResult>>,
}

impl ConstraintsResult {
    pub fn all_sat(&self) -> bool {
        self.results
            .iter()
            .flatten()
            .all(|r| r.sat == Some(true))
    }

    pub fn any_unsat(&self) -> bool {
        self.results
            .iter()
            .flatten()
            .any(|r| r.sat == Some(false))
    }

    pub fn undecided(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Some(r) if r.sat.is_none()))
            .map(|(ii, _)| ii)
            .collect()
    }

    /// indices of constraints whose violation needs a conflict
    pub fn unsat_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Some(r) if r.sat == Some(false)))
            .map(|(ii, _)| ii)
            .collect()
    }
}

/// A family member that improves on the current optimum (or witnesses plain
/// feasibility), given as one option index per hole.
#[derive(Debug, Clone, PartialEq)]
pub struct ImprovingAssignment {
    pub options: Vec<usize>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    Undecided,
}

/// Combined result of evaluating the specification against a sub-family or
/// a single assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecificationResult {
    pub constraints: ConstraintsResult,
    pub optimality: Option<PropertyResult>,
    /// harvested improving member, if any
    pub improving: Option<ImprovingAssignment>,
    /// could some member of the family still improve the optimum
    pub can_improve: bool,
}

impl SpecificationResult {
    pub fn decision(&self) -> Decision {
        if self.constraints.any_unsat() {
            return Decision::Reject;
        }
        if self.optimality.is_some() {
            // harvesting an improving member means its value attains the
            // family bound, so no other member needs to be inspected
            if self.improving.is_some() {
                return Decision::Accept;
            }
            if !self.can_improve {
                return Decision::Reject;
            }
            return Decision::Undecided;
        }
        if !self.constraints.undecided().is_empty() {
            return Decision::Undecided;
        }
        Decision::Accept
    }
}
