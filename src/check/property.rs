// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::formula::{Direction, Formula};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    Leq,
    Greater,
    Geq,
}

impl CompareOp {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Less => value < threshold,
            CompareOp::Leq => value <= threshold,
            CompareOp::Greater => value > threshold,
            CompareOp::Geq => value >= threshold,
        }
    }

    /// `>` and `>=` ask for a lower bound on the value.
    pub fn is_lower_bound(self) -> bool {
        matches!(self, CompareOp::Greater | CompareOp::Geq)
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Less => write!(f, "<"),
            CompareOp::Leq => write!(f, "<="),
            CompareOp::Greater => write!(f, ">"),
            CompareOp::Geq => write!(f, ">="),
        }
    }
}

/// A constraint: a reachability or reward formula compared against a
/// threshold.
///
/// The primary formula carries the property's own (optimistic) direction:
/// minimizing for upper-bounded properties, maximizing for lower-bounded
/// ones. `formula_alt` carries the opposite direction and provides the
/// second bound used to decide whole sub-families.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub formula: Formula,
    pub formula_alt: Formula,
    pub op: CompareOp,
    pub threshold: f64,
}

impl Property {
    pub fn probability(op: CompareOp, threshold: f64, target: &str) -> Self {
        let direction = if op.is_lower_bound() {
            Direction::Max
        } else {
            Direction::Min
        };
        let formula = Formula::probability(direction, target);
        let formula_alt = formula.opposite();
        Self {
            formula,
            formula_alt,
            op,
            threshold,
        }
    }

    pub fn reward(op: CompareOp, threshold: f64, reward_model: &str, target: &str) -> Self {
        let direction = if op.is_lower_bound() {
            Direction::Max
        } else {
            Direction::Min
        };
        let formula = Formula::reward(direction, reward_model, target);
        let formula_alt = formula.opposite();
        Self {
            formula,
            formula_alt,
            op,
            threshold,
        }
    }

    pub fn minimizing(&self) -> bool {
        self.formula.direction == Direction::Min
    }

    pub fn is_reward(&self) -> bool {
        self.formula.is_reward()
    }

    /// No finite counterexample witnesses the violation of a maximizing
    /// reward property, which rules it out for conflict generation.
    pub fn maximizing_reward(&self) -> bool {
        self.is_reward() && self.op.is_lower_bound()
    }

    pub fn sat(&self, value: f64) -> bool {
        self.op.holds(value, self.threshold)
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.formula.reward_model {
            Some(model) => write!(
                f,
                "R[{}] {} {} [F \"{}\"]",
                model, self.op, self.threshold, self.formula.target
            ),
            None => write!(
                f,
                "P {} {} [F \"{}\"]",
                self.op, self.threshold, self.formula.target
            ),
        }
    }
}

/// An optimization objective with a relative tolerance and the best value
/// found so far. The optimum only ever moves in the objective direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimalityProperty {
    pub formula: Formula,
    pub formula_alt: Formula,
    pub epsilon: f64,
    optimum: Option<f64>,
}

impl OptimalityProperty {
    pub fn new(formula: Formula, epsilon: f64) -> Self {
        let formula_alt = formula.opposite();
        Self {
            formula,
            formula_alt,
            epsilon,
            optimum: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.formula.direction
    }

    pub fn optimum(&self) -> Option<f64> {
        self.optimum
    }

    pub fn maximizing_reward(&self) -> bool {
        self.formula.is_reward() && self.direction() == Direction::Max
    }

    /// The satisfaction threshold induced by an optimum value: improving
    /// assignments must beat `optimum * (1 ± epsilon)`.
    pub fn threshold_for(&self, optimum: Option<f64>) -> Option<f64> {
        optimum.map(|o| match self.direction() {
            Direction::Max => o * (1.0 + self.epsilon),
            Direction::Min => o * (1.0 - self.epsilon),
        })
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold_for(self.optimum)
    }

    /// Is `value` a meaningful improvement over the given optimum snapshot?
    /// Undefined values (NaN or infinite) never improve.
    pub fn improves_over(&self, value: f64, optimum: Option<f64>, precision: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.threshold_for(optimum) {
            None => true,
            Some(threshold) => match self.direction() {
                Direction::Max => value > threshold + precision,
                Direction::Min => value < threshold - precision,
            },
        }
    }

    pub fn improves(&self, value: f64, precision: f64) -> bool {
        self.improves_over(value, self.optimum, precision)
    }

    /// Monotonic update: values that do not improve on the stored optimum
    /// are ignored.
    pub fn update_optimum(&mut self, value: f64) -> bool {
        let better = match self.optimum {
            None => value.is_finite(),
            Some(current) => value.is_finite() && self.direction().better(value, current),
        };
        if better {
            self.optimum = Some(value);
        }
        better
    }
}

impl Display for OptimalityProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.formula)?;
        if let Some(optimum) = self.optimum {
            write!(f, " (optimum {optimum})")?;
        }
        Ok(())
    }
}

/// Configuration shared by all checks, created once at driver setup.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// two values closer than this are considered equal
    pub precision: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { precision: 1e-6 }
    }
}

/// An ordered list of constraints plus at most one optimization objective.
#[derive(Debug, Clone)]
pub struct Specification {
    pub constraints: Vec<Property>,
    optimality: Option<OptimalityProperty>,
    pub settings: Settings,
}

impl Specification {
    pub fn new(
        constraints: Vec<Property>,
        optimality: Option<OptimalityProperty>,
        settings: Settings,
    ) -> Self {
        Self {
            constraints,
            optimality,
            settings,
        }
    }

    pub fn has_optimality(&self) -> bool {
        self.optimality.is_some()
    }

    pub fn optimality(&self) -> Option<&OptimalityProperty> {
        self.optimality.as_ref()
    }

    pub fn optimality_mut(&mut self) -> Option<&mut OptimalityProperty> {
        self.optimality.as_mut()
    }

    pub fn current_optimum(&self) -> Option<f64> {
        self.optimality.as_ref().and_then(|o| o.optimum())
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }
}

impl Display for Specification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (ii, c) in self.constraints.iter().enumerate() {
            if ii > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        if let Some(opt) = &self.optimality {
            if !self.constraints.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{opt}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_direction_follows_the_comparison() {
        let p = Property::probability(CompareOp::Geq, 0.5, "goal");
        assert_eq!(p.formula.direction, Direction::Max);
        assert_eq!(p.formula_alt.direction, Direction::Min);
        assert!(!p.minimizing());
        let q = Property::reward(CompareOp::Leq, 2.0, "cost", "done");
        assert!(q.minimizing());
        assert!(!q.maximizing_reward());
        assert!(Property::reward(CompareOp::Geq, 2.0, "gain", "done").maximizing_reward());
    }

    #[test]
    fn optimum_updates_are_monotonic() {
        let mut opt = OptimalityProperty::new(Formula::probability(Direction::Max, "goal"), 0.0);
        assert!(opt.improves(0.3, 1e-6));
        assert!(opt.update_optimum(0.3));
        assert!(!opt.update_optimum(0.2));
        assert_eq!(opt.optimum(), Some(0.3));
        assert!(!opt.improves(0.3, 1e-6));
        assert!(opt.improves(0.4, 1e-6));
        assert!(!opt.improves(f64::INFINITY, 1e-6));
    }

    #[test]
    fn epsilon_scales_the_threshold() {
        let mut opt = OptimalityProperty::new(Formula::probability(Direction::Max, "goal"), 0.1);
        opt.update_optimum(0.5);
        assert_eq!(opt.threshold(), Some(0.55));
        assert!(!opt.improves(0.54, 1e-6));
        assert!(opt.improves(0.6, 1e-6));
        let mut min =
            OptimalityProperty::new(Formula::reward(Direction::Min, "cost", "done"), 0.1);
        min.update_optimum(10.0);
        assert_eq!(min.threshold(), Some(9.0));
        assert!(!min.improves(9.5, 1e-6));
        assert!(min.improves(8.0, 1e-6));
    }
}
