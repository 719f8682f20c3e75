// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::fmt::{Display, Formatter};

/// What kind of decision a hole encodes. Front ends assign kinds; the
/// splitting heuristic prefers action over decision over variable holes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HoleKind {
    Variable,
    Decision,
    Action,
}

/// A discrete parameter of the sketch. Option indices are positions into
/// `option_labels` and are never renumbered; restricting a hole can only
/// drop indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Hole {
    pub name: String,
    pub kind: HoleKind,
    options: Vec<usize>,
    option_labels: Vec<String>,
}

impl Hole {
    pub fn new(name: &str, option_labels: Vec<String>) -> Self {
        Self::with_kind(name, option_labels, HoleKind::Variable)
    }

    pub fn with_kind(name: &str, option_labels: Vec<String>, kind: HoleKind) -> Self {
        assert!(!option_labels.is_empty(), "a hole needs at least one option");
        let options = (0..option_labels.len()).collect();
        Self {
            name: name.to_string(),
            kind,
            options,
            option_labels,
        }
    }

    pub fn options(&self) -> &[usize] {
        &self.options
    }

    pub fn num_options(&self) -> usize {
        self.options.len()
    }

    pub fn is_fixed(&self) -> bool {
        self.options.len() == 1
    }

    pub fn fixed_option(&self) -> usize {
        assert!(self.is_fixed());
        self.options[0]
    }

    pub fn contains(&self, option: usize) -> bool {
        self.options.binary_search(&option).is_ok()
    }

    pub fn label(&self, option: usize) -> &str {
        &self.option_labels[option]
    }

    /// Restricting to a subset of the current options is the only permitted
    /// mutation. The subset must be non-empty and ascending.
    pub fn restrict(&mut self, subset: &[usize]) {
        assert!(!subset.is_empty(), "hole `{}` must keep an option", self.name);
        assert!(
            subset.windows(2).all(|w| w[0] < w[1]),
            "options of `{}` must stay ascending",
            self.name
        );
        assert!(
            subset.iter().all(|o| self.contains(*o)),
            "options of `{}` must shrink",
            self.name
        );
        self.options = subset.to_vec();
    }
}

impl Display for Hole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_fixed() {
            write!(f, "{}={}", self.name, self.label(self.options[0]))
        } else {
            let labels: Vec<&str> = self.options.iter().map(|o| self.label(*o)).collect();
            write!(f, "{}={{{}}}", self.name, labels.join(","))
        }
    }
}
