// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::hole::Hole;
use crate::check::{Decision, SpecificationResult};
use crate::model::{ChoiceId, SubModel};
use rand::Rng;
use std::fmt::{Display, Formatter};

/// Split bookkeeping handed from a family to its children.
#[derive(Debug, Clone)]
pub struct ParentInfo {
    /// the parent's selected-choice mask over the quotient
    pub mask: Vec<bool>,
    /// the parent's per-hole choice lists (simple colorings only)
    pub per_hole_choices: Option<Vec<Vec<ChoiceId>>>,
    /// the hole the parent was split on
    pub splitter: usize,
    /// how the parent's last analysis ended
    pub decision: Decision,
    /// refinement depth of the child
    pub depth: usize,
}

/// A sub-family of the design space: one option subset per hole, plus the
/// analysis metadata attached while the family is being explored. Holes are
/// identified by their position, which is stable across refinement.
#[derive(Debug, Clone)]
pub struct Family {
    holes: Vec<Hole>,
    /// constraints that are still undecided for this family
    pub constraint_indices: Vec<usize>,
    pub parent_info: Option<ParentInfo>,
    /// selected-choice mask, filled in by the quotient
    pub mask: Option<Vec<bool>>,
    /// per-hole selected choices (simple colorings only)
    pub per_hole_choices: Option<Vec<Vec<ChoiceId>>>,
    /// restricted MDP, built lazily
    pub sub: Option<SubModel>,
    /// latest analysis result
    pub result: Option<SpecificationResult>,
    pub depth: usize,
    /// set once the encoder reported that no unexplored member remains
    pub(crate) encoding_exhausted: bool,
}

impl Family {
    pub fn new(holes: Vec<Hole>) -> Self {
        Self {
            holes,
            constraint_indices: Vec::new(),
            parent_info: None,
            mask: None,
            per_hole_choices: None,
            sub: None,
            result: None,
            depth: 0,
            encoding_exhausted: false,
        }
    }

    pub fn num_holes(&self) -> usize {
        self.holes.len()
    }

    pub fn hole(&self, hole: usize) -> &Hole {
        &self.holes[hole]
    }

    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    pub fn options(&self, hole: usize) -> &[usize] {
        self.holes[hole].options()
    }

    pub fn set_options(&mut self, hole: usize, subset: &[usize]) {
        self.holes[hole].restrict(subset);
    }

    /// Number of members, saturating at `u128::MAX`.
    pub fn size(&self) -> u128 {
        self.holes
            .iter()
            .fold(1u128, |acc, h| acc.saturating_mul(h.num_options() as u128))
    }

    pub fn is_singleton(&self) -> bool {
        self.holes.iter().all(|h| h.is_fixed())
    }

    /// The assignment of a singleton family.
    pub fn assignment(&self) -> Option<Vec<usize>> {
        if self.is_singleton() {
            Some(self.holes.iter().map(|h| h.fixed_option()).collect())
        } else {
            None
        }
    }

    /// An arbitrary member of the family.
    pub fn pick_any(&self) -> Vec<usize> {
        self.holes.iter().map(|h| h.options()[0]).collect()
    }

    /// A copy with independent option sets and cleared analysis metadata.
    pub fn fork(&self) -> Family {
        Family {
            holes: self.holes.clone(),
            constraint_indices: self.constraint_indices.clone(),
            parent_info: None,
            mask: None,
            per_hole_choices: None,
            sub: None,
            result: None,
            depth: self.depth,
            encoding_exhausted: false,
        }
    }

    /// The singleton sub-family for the given assignment.
    pub fn assignment_family(&self, options: &[usize]) -> Family {
        assert_eq!(options.len(), self.num_holes());
        let mut singleton = self.fork();
        for (hole, option) in options.iter().enumerate() {
            singleton.set_options(hole, &[*option]);
        }
        singleton
    }

    /// Draws a uniformly random member.
    pub fn sample(&self, rng: &mut impl Rng) -> Family {
        let options: Vec<usize> = self
            .holes
            .iter()
            .map(|h| h.options()[rng.gen_range(0..h.num_options())])
            .collect();
        self.assignment_family(&options)
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (ii, hole) in self.holes.iter().enumerate() {
            if ii > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{hole}")?;
        }
        write!(f, "]")
    }
}
