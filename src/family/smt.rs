// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::solver::{ExclusionClause, FamilyBackend, SolveOutcome, SolverError};
use easy_smt as smt;

#[derive(Debug, Clone, Copy)]
pub struct SmtSolverCmd {
    pub name: &'static str,
    pub args: &'static [&'static str],
}

pub const Z3_CMD: SmtSolverCmd = SmtSolverCmd {
    name: "z3",
    args: &["-smt2", "-in"],
};

pub const CVC5_CMD: SmtSolverCmd = SmtSolverCmd {
    name: "cvc5",
    args: &["--incremental", "--lang", "smt2"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SmtBackendOptions {
    /// If true, the communication with the SMT solver will be logged into a `replay.smt` file.
    pub save_replay: bool,
}

/// Family-solver backend over an external SMT process: one integer variable
/// per hole, domains and restrictions as disjunctions of equalities.
pub struct SmtBackend {
    ctx: smt::Context,
    vars: Vec<smt::SExpr>,
}

impl SmtBackend {
    pub fn new(solver: SmtSolverCmd) -> std::io::Result<Self> {
        Self::with_options(solver, SmtBackendOptions::default())
    }

    pub fn with_options(solver: SmtSolverCmd, opts: SmtBackendOptions) -> std::io::Result<Self> {
        let replay_file = if opts.save_replay {
            Some(std::fs::File::create("replay.smt")?)
        } else {
            None
        };
        let mut ctx = smt::ContextBuilder::new()
            .solver(solver.name, solver.args)
            .replay_file(replay_file)
            .build()?;
        // z3 is more permissive when the logic is left at ALL
        if solver.name != "z3" {
            ctx.set_logic("QF_LIA")?;
        }
        Ok(Self {
            ctx,
            vars: Vec::new(),
        })
    }

    fn membership(&mut self, hole: usize, options: &[usize]) -> smt::SExpr {
        let var = self.vars[hole];
        let disjuncts: Vec<smt::SExpr> = options
            .iter()
            .map(|o| {
                let value = self.ctx.numeral(*o as u64);
                self.ctx.eq(var, value)
            })
            .collect();
        self.ctx.or_many(disjuncts)
    }

    fn parse_option(&self, value: smt::SExpr) -> Result<usize, SolverError> {
        match self.ctx.get(value) {
            smt::SExprData::Atom(a) => a
                .parse::<usize>()
                .map_err(|_| SolverError::Unexpected(format!("not an option index: {a}"))),
            smt::SExprData::List(_) => {
                Err(SolverError::Unexpected("expected an integer atom".to_string()))
            }
        }
    }
}

impl FamilyBackend for SmtBackend {
    fn declare(&mut self, domains: &[Vec<usize>]) -> Result<(), SolverError> {
        assert!(self.vars.is_empty(), "declare may only be called once");
        for (hole, _) in domains.iter().enumerate() {
            let sort = self.ctx.int_sort();
            let var = self.ctx.declare_const(format!("h{hole}"), sort)?;
            self.vars.push(var);
        }
        for (hole, options) in domains.iter().enumerate() {
            let domain = self.membership(hole, options);
            self.ctx.assert(domain)?;
        }
        Ok(())
    }

    fn push(&mut self) -> Result<(), SolverError> {
        self.ctx.push_many(1)?;
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        self.ctx.pop_many(1)?;
        Ok(())
    }

    fn restrict(&mut self, hole: usize, options: &[usize]) -> Result<(), SolverError> {
        let membership = self.membership(hole, options);
        self.ctx.assert(membership)?;
        Ok(())
    }

    fn exclude(&mut self, clause: &ExclusionClause) -> Result<(), SolverError> {
        let mut conjuncts: Vec<smt::SExpr> = Vec::new();
        for (hole, option) in clause.fixed.iter() {
            let var = self.vars[*hole];
            let value = self.ctx.numeral(*option as u64);
            conjuncts.push(self.ctx.eq(var, value));
        }
        for (hole, options) in clause.ranges.iter() {
            let membership = self.membership(*hole, options);
            conjuncts.push(membership);
        }
        // an empty clause excludes everything
        let exclusion = if conjuncts.is_empty() {
            self.ctx.false_()
        } else {
            let conjunction = self.ctx.and_many(conjuncts);
            self.ctx.not(conjunction)
        };
        self.ctx.assert(exclusion)?;
        Ok(())
    }

    fn solve(&mut self) -> Result<SolveOutcome, SolverError> {
        match self.ctx.check()? {
            smt::Response::Unsat => Ok(SolveOutcome::Unsat),
            smt::Response::Unknown => {
                Err(SolverError::Unexpected("solver returned unknown".to_string()))
            }
            smt::Response::Sat => {
                let values = self.ctx.get_value(self.vars.clone())?;
                let mut model = Vec::with_capacity(values.len());
                for (_, value) in values {
                    model.push(self.parse_option(value)?);
                }
                Ok(SolveOutcome::Model(model))
            }
        }
    }
}
