// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::formula::Formula;
use crate::model::{ChoiceId, Dtmc, Mdp};
use std::fmt::{Display, Formatter};

/// A memoryless deterministic scheduler: one choice per state. Choice ids
/// refer to the model that was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    pub choices: Vec<ChoiceId>,
}

/// Result of a single model-checking query.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutput {
    /// value at the initial state
    pub value: f64,
    /// value for every state of the model
    pub state_values: Vec<f64>,
    /// optimizing scheduler, attached for MDP queries
    pub scheduler: Option<Scheduler>,
}

#[derive(Debug, Clone)]
pub enum CheckError {
    /// the model lacks a label or reward model the formula refers to
    Unsupported(String),
    /// the iterative solver did not converge within its iteration budget
    NonConvergence(usize),
}

impl Display for CheckError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Unsupported(msg) => write!(f, "unsupported formula: {msg}"),
            CheckError::NonConvergence(iters) => {
                write!(f, "no convergence after {iters} iterations")
            }
        }
    }
}

impl std::error::Error for CheckError {}

/// The probabilistic model-checking oracle. The synthesizer core treats
/// model checking as an external service behind this trait; a
/// value-iteration implementation ships with the crate.
pub trait ModelChecker: Send + Sync {
    /// Checks a Markov chain. The formula direction is irrelevant.
    fn check_dtmc(&self, dtmc: &Dtmc, formula: &Formula) -> Result<CheckOutput, CheckError>;

    /// Checks an MDP in the formula's direction and extracts an optimizing
    /// scheduler.
    fn check_mdp(&self, mdp: &Mdp, formula: &Formula) -> Result<CheckOutput, CheckError>;

    /// Expected number of visits for every state of the chain. Entries may
    /// be infinite for states visited infinitely often.
    fn expected_visits(&self, dtmc: &Dtmc) -> Result<Vec<f64>, CheckError>;
}
