// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
mod matrix;
mod mdp;
mod submodel;

pub use matrix::{ChoiceId, MatrixBuilder, SparseMatrix, StateId, Transition};
pub use mdp::{Dtmc, Labeling, Mdp, MdpBuilder, ModelError};
pub use submodel::{build_submodel, collapse, SubModel};
