use crate::ast::{BinOp, CaseBranch, Elsif, ElseBranch, Expr, Stmt};
use crate::environment::ScopeRef;
use crate::evaluator::{apply_binary, compare};
use crate::interpreter::{Interpreter, RuntimeError};
use crate::lexer::Token;
use crate::value::Value;
use log::trace;
use std::cmp::Ordering;
use std::io::{BufRead, Write};

impl<'io> Interpreter<'io> {
    pub fn exec_stmt(&mut self, stmt: &Stmt, scope: Option<&ScopeRef>) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Assign(target, value) => self.exec_assign(target, value, scope),
            Stmt::Call(name, args) => {
                if let Some(value) = self.dispatch_call(name, args, scope)? {
                    self.store_native_result(&name.lexeme, value, scope);
                }
                Ok(())
            }
            Stmt::If(condition, then_body, elsifs, else_branch) => {
                self.exec_if(condition, then_body, elsifs, else_branch.as_ref(), scope)
            }
            Stmt::While(condition, body) => {
                while self.eval_condition(condition, scope)? {
                    self.exec_block(body, scope)?;
                }
                Ok(())
            }
            Stmt::For(init, bound, step, body, line) => {
                self.exec_for(init, bound, step.as_ref(), body, *line, scope)
            }
            Stmt::Case(selector, branches, default) => {
                self.exec_case(selector, branches, default, scope)
            }
            Stmt::Read(name, indices) => self.exec_read(name, indices, scope),
            Stmt::Write(name, indices) => {
                let value = if indices.is_empty() {
                    self.eval_literal(name, scope)?
                } else {
                    let key = self.eval_indices(indices, scope)?;
                    self.read_element(name, &key, scope)?
                };
                writeln!(self.out, "{}", value).map_err(|e| RuntimeError::io(e, name.line))
            }
            // Evaluated for its effects; execution carries on after it.
            Stmt::Return(value) => self.eval_expr(value, scope).map(|_| ()),
            Stmt::Main(body) => self.exec_block(body, None),
            Stmt::Module(_)
            | Stmt::Import(..)
            | Stmt::Const(..)
            | Stmt::Var(_)
            | Stmt::VarArray(..)
            | Stmt::Procedure(_) => Ok(()),
        }
    }

    fn exec_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        let value = self.eval_expr(value, scope)?;
        match target {
            Expr::Literal(name) => self.write_variable(name, value, scope),
            Expr::ArrayAccess(name, indices) => {
                let key = self.eval_indices(indices, scope)?;
                self.write_element(name, key, value, scope)
            }
            other => Err(RuntimeError::TypeMismatch {
                expected: "variable or array element".to_string(),
                got: "expression".to_string(),
                line: other.line(),
            }),
        }
    }

    fn eval_condition(&mut self, condition: &Expr, scope: Option<&ScopeRef>) -> Result<bool, RuntimeError> {
        match self.eval_expr(condition, scope)? {
            Value::Boolean(b) => Ok(b),
            other => Err(RuntimeError::mismatch("BOOLEAN", &other, condition.line())),
        }
    }

    fn exec_if(
        &mut self,
        condition: &Expr,
        then_body: &[Stmt],
        elsifs: &[Elsif],
        else_branch: Option<&ElseBranch>,
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        if self.eval_condition(condition, scope)? {
            return self.exec_block(then_body, scope);
        }
        for elsif in elsifs {
            if self.eval_condition(&elsif.condition, scope)? {
                return self.exec_block(&elsif.body, scope);
            }
        }
        match else_branch {
            Some(branch) => self.exec_block(&branch.body, scope),
            None => Ok(()),
        }
    }

    fn exec_for(
        &mut self,
        init: &Stmt,
        bound: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
        line: usize,
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        let index = match init {
            Stmt::Assign(Expr::Literal(name), _) => name,
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "loop variable".to_string(),
                    got: "expression".to_string(),
                    line,
                })
            }
        };
        self.exec_stmt(init, scope)?;
        let bound = self.eval_expr(bound, scope)?;
        let step = match step {
            Some(step) => Some(self.eval_expr(step, scope)?),
            None => None,
        };

        let start = self.loop_value(index, scope)?;
        let ascending = match &step {
            Some(step) => match step.as_f64() {
                Some(s) if s > 0.0 => true,
                Some(s) if s < 0.0 => false,
                Some(_) => return Err(RuntimeError::ZeroStep { line }),
                None => return Err(RuntimeError::mismatch("NUMERIC step", step, line)),
            },
            None => loop_order(&start, &bound, line)? != Ordering::Greater,
        };
        let step = step.unwrap_or(Value::Integer(if ascending { 1 } else { -1 }));
        trace!(
            "FOR {} := {} TO {} BY {}",
            index.lexeme,
            start,
            bound,
            step
        );

        loop {
            let current = self.loop_value(index, scope)?;
            let order = loop_order(&current, &bound, line)?;
            let within = if ascending {
                order != Ordering::Greater
            } else {
                order != Ordering::Less
            };
            if !within {
                return Ok(());
            }
            self.exec_block(body, scope)?;

            // A step past the edge of the value range also passes the bound.
            let current = self.loop_value(index, scope)?;
            let next = match step_loop_value(&current, &step, line) {
                Err(RuntimeError::Overflow { .. }) => return Ok(()),
                next => next?,
            };
            self.write_variable(index, next, scope)?;
        }
    }

    fn loop_value(&self, index: &Token, scope: Option<&ScopeRef>) -> Result<Value, RuntimeError> {
        self.read_variable(&index.lexeme, scope)
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: index.lexeme.clone(),
                line: index.line,
            })
    }

    fn exec_case(
        &mut self,
        selector: &Token,
        branches: &[CaseBranch],
        default: &[Stmt],
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        let value = self.eval_literal(selector, scope)?;
        let key = value
            .as_ordinal()
            .ok_or_else(|| RuntimeError::mismatch("INTEGER selector", &value, selector.line))?;

        let mut matched = false;
        for branch in branches.iter().filter(|b| b.labels.contains(&key)) {
            trace!("CASE {} = {} matched", selector.lexeme, key);
            matched = true;
            self.exec_block(&branch.body, scope)?;
        }
        if !matched {
            self.exec_block(default, scope)?;
        }
        Ok(())
    }

    fn exec_read(
        &mut self,
        name: &Token,
        indices: &[Expr],
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| RuntimeError::io(e, name.line))?;
        if read == 0 {
            return Err(RuntimeError::EndOfInput {
                name: name.lexeme.clone(),
                line: name.line,
            });
        }
        let value = Value::from_input(&line);

        if indices.is_empty() {
            self.write_variable(name, value, scope)
        } else {
            let key = self.eval_indices(indices, scope)?;
            self.write_element(name, key, value, scope)
        }
    }
}

/// Compares a loop variable against its bound. Characters compare by
/// ordinal, so a `CHAR` loop may also use numeric bounds.
fn loop_order(current: &Value, bound: &Value, line: usize) -> Result<Ordering, RuntimeError> {
    compare(current, bound)
        .or_else(|| Some(current.as_ordinal()?.cmp(&bound.as_ordinal()?)))
        .ok_or_else(|| RuntimeError::IncompatibleTypes {
            op: "TO".to_string(),
            left: current.type_name().to_string(),
            right: bound.type_name().to_string(),
            line,
        })
}

fn step_loop_value(current: &Value, step: &Value, line: usize) -> Result<Value, RuntimeError> {
    match (current, step) {
        (Value::Char(c), step) => {
            let ordinal = step
                .as_ordinal()
                .and_then(|k| (*c as i64).checked_add(k))
                .ok_or_else(|| RuntimeError::mismatch("INTEGER step", step, line))?;
            u32::try_from(ordinal)
                .ok()
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or(RuntimeError::Overflow { line })
        }
        (current, step) => apply_binary(current, BinOp::Add, step, line),
    }
}
