// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
mod encoder;
mod family;
mod hole;
mod smt;
mod solver;

pub use encoder::FamilyEncoder;
pub use family::{Family, ParentInfo};
pub use hole::{Hole, HoleKind};
pub use smt::{SmtBackend, SmtBackendOptions, SmtSolverCmd, CVC5_CMD, Z3_CMD};
pub use solver::{
    EnumerationBackend, ExclusionClause, FamilyBackend, SolveOutcome, SolverError,
};
