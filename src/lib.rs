// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

pub mod check;
pub mod family;
pub mod model;
pub mod quotient;
pub mod synth;
