use crate::ast::{Block, Expr, Procedure, Stmt};
use crate::environment::{ArrayError, CallScope, GlobalScope, ScopeRef, Variable};
use crate::lexer::Token;
use crate::library::{self, LibraryError};
use crate::types;
use crate::value::Value;
use log::{debug, trace};
use std::io::{BufRead, Write};
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("[line {line}] Error: Variable {name} is not declared")]
    UndefinedVariable { name: String, line: usize },
    #[error("[line {line}] Error: Array {name} is not declared")]
    UndefinedArray { name: String, line: usize },
    #[error("[line {line}] Error: Procedure {name} not found")]
    ProcedureNotFound { name: String, line: usize },
    #[error("[line {line}] Error: Cannot assign to constant {name}")]
    AssignToConstant { name: String, line: usize },
    #[error("[line {line}] Error at '{op}': Incompatible types {left} and {right}")]
    IncompatibleTypes {
        op: String,
        left: String,
        right: String,
        line: usize,
    },
    #[error("[line {line}] Error: Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        line: usize,
    },
    #[error("[line {line}] Error: Division by zero")]
    DivisionByZero { line: usize },
    #[error("[line {line}] Error: Integer overflow")]
    Overflow { line: usize },
    #[error("[line {line}] Error: Procedure {name} requires {expected} arguments but {got} were given")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
        line: usize,
    },
    #[error("[line {line}] Error: FOR step must not be zero")]
    ZeroStep { line: usize },
    #[error("[line {line}] Error: No input left to read into {name}")]
    EndOfInput { name: String, line: usize },
    #[error("[line {line}] Error: {source}")]
    Array { source: ArrayError, line: usize },
    #[error("[line {line}] Error: {source}")]
    Library { source: LibraryError, line: usize },
    #[error("[line {line}] Error: I/O failure: {message}")]
    Io { message: String, line: usize },
}

impl RuntimeError {
    pub(crate) fn mismatch(expected: &str, got: &Value, line: usize) -> Self {
        RuntimeError::TypeMismatch {
            expected: expected.to_string(),
            got: got.type_name().to_string(),
            line,
        }
    }

    pub(crate) fn io(err: std::io::Error, line: usize) -> Self {
        RuntimeError::Io {
            message: err.to_string(),
            line,
        }
    }
}

/// Tree-walking interpreter over one parsed module.
///
/// Statements and expressions are dispatched in `executor.rs` and
/// `evaluator.rs`; this file holds the bindings and the call machinery.
pub struct Interpreter<'io> {
    pub globals: GlobalScope,
    /// Activations currently executing, innermost last.
    frames: Vec<ScopeRef>,
    pub(crate) out: &'io mut dyn Write,
    pub(crate) input: &'io mut dyn BufRead,
}

impl<'io> Interpreter<'io> {
    pub fn new(block: &Block, out: &'io mut dyn Write, input: &'io mut dyn BufRead) -> Self {
        Interpreter {
            globals: GlobalScope::new(block),
            frames: Vec::new(),
            out,
            input,
        }
    }

    pub fn run(&mut self, block: &Block) -> Result<(), RuntimeError> {
        debug!(
            "running module {}",
            self.globals.module_name.as_deref().unwrap_or("<anonymous>")
        );
        for stmt in &block.statements {
            if let Stmt::Main(_) = stmt {
                self.exec_stmt(stmt, None)?;
            }
        }
        self.out.flush().map_err(|e| RuntimeError::io(e, 0))
    }

    pub fn into_globals(self) -> GlobalScope {
        self.globals
    }

    /// Executes a statement list, skipping the declarations mixed into
    /// procedure bodies.
    pub fn exec_block(&mut self, body: &[Stmt], scope: Option<&ScopeRef>) -> Result<(), RuntimeError> {
        for stmt in body.iter().filter(|stmt| !stmt.is_declaration()) {
            self.exec_stmt(stmt, scope)?;
        }
        Ok(())
    }

    // Variables

    /// Current value of a scalar: the call scope first, then the globals.
    pub(crate) fn read_variable(&self, name: &str, scope: Option<&ScopeRef>) -> Option<Value> {
        if let Some(scope) = scope {
            if let Some(value) = scope.borrow().variables.get(name).map(|v| v.value.clone()) {
                return Some(value);
            }
        }
        self.globals.variables.get(name).map(|v| v.value.clone())
    }

    /// Stores into every scope that declares `name`, global and local alike.
    pub(crate) fn write_variable(
        &mut self,
        name: &Token,
        value: Value,
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        let mut written = false;
        if let Some(var) = self.globals.variables.get_mut(&name.lexeme) {
            var.value = value.clone().conform(&var.declared_type);
            written = true;
        }
        if let Some(scope) = scope {
            if let Some(var) = scope.borrow_mut().variables.get_mut(&name.lexeme) {
                var.value = value.conform(&var.declared_type);
                written = true;
            }
        }

        if written {
            Ok(())
        } else if self.globals.constants.contains_key(&name.lexeme) {
            Err(RuntimeError::AssignToConstant {
                name: name.lexeme.clone(),
                line: name.line,
            })
        } else {
            Err(RuntimeError::UndefinedVariable {
                name: name.lexeme.clone(),
                line: name.line,
            })
        }
    }

    // Arrays

    fn array_error(source: ArrayError, line: usize) -> RuntimeError {
        RuntimeError::Array { source, line }
    }

    /// A stored global cell wins; otherwise the call scope's array is
    /// consulted before the global one.
    pub(crate) fn read_element(
        &self,
        name: &Token,
        key: &[i64],
        scope: Option<&ScopeRef>,
    ) -> Result<Value, RuntimeError> {
        let global = self.globals.arrays.get(&name.lexeme);
        if let Some(value) = global.and_then(|array| array.lookup(key)) {
            return Ok(value.clone());
        }
        if let Some(scope) = scope {
            let scope = scope.borrow();
            if let Some(array) = scope.arrays.get(&name.lexeme) {
                return array.get(key).map_err(|e| Self::array_error(e, name.line));
            }
        }
        match global {
            Some(array) => array.get(key).map_err(|e| Self::array_error(e, name.line)),
            None => Err(RuntimeError::UndefinedArray {
                name: name.lexeme.clone(),
                line: name.line,
            }),
        }
    }

    pub(crate) fn write_element(
        &mut self,
        name: &Token,
        key: Vec<i64>,
        value: Value,
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        if let Some(array) = self.globals.arrays.get_mut(&name.lexeme) {
            return array
                .set(key, value)
                .map_err(|e| Self::array_error(e, name.line));
        }
        if let Some(scope) = scope {
            if let Some(array) = scope.borrow_mut().arrays.get_mut(&name.lexeme) {
                return array
                    .set(key, value)
                    .map_err(|e| Self::array_error(e, name.line));
            }
        }
        Err(RuntimeError::UndefinedArray {
            name: name.lexeme.clone(),
            line: name.line,
        })
    }

    // Calls

    pub(crate) fn eval_args(
        &mut self,
        args: &[Expr],
        scope: Option<&ScopeRef>,
    ) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|arg| self.eval_expr(arg, scope)).collect()
    }

    /// Resolves and runs a call: native built-in, imported library
    /// procedure, nested procedure, then global procedure. Only natives
    /// produce a value.
    pub(crate) fn dispatch_call(
        &mut self,
        name: &Token,
        args: &[Expr],
        scope: Option<&ScopeRef>,
    ) -> Result<Option<Value>, RuntimeError> {
        let callee = name.lexeme.as_str();

        if types::is_native(callee) {
            let values = self.eval_args(args, scope)?;
            let result = library::call_native(callee, &values).map_err(|source| {
                RuntimeError::Library {
                    source,
                    line: name.line,
                }
            })?;
            trace!("{}(..) = {}", callee, result);
            return Ok(Some(result));
        }

        if library::is_terminal(callee) && self.globals.is_imported(callee) {
            let values = self.eval_args(args, scope)?;
            library::call_terminal(callee, &values, &mut *self.out).map_err(|source| {
                RuntimeError::Library {
                    source,
                    line: name.line,
                }
            })?;
            return Ok(None);
        }

        if let Some(nested) = self.find_nested(callee, scope) {
            debug!("call nested {} (depth {})", nested.borrow().name(), self.frames.len() + 1);
            let procedure = Rc::clone(&nested.borrow().procedure);
            self.enter(&nested, &procedure.body)?;
            return Ok(None);
        }

        if let Some(procedure) = self.globals.procedures.get(callee).cloned() {
            self.call_global(&procedure, name, args, scope)?;
            return Ok(None);
        }

        Err(RuntimeError::ProcedureNotFound {
            name: callee.to_string(),
            line: name.line,
        })
    }

    /// A call in expression position. Natives and imported library
    /// procedures behave as they do in statements. A user procedure runs its
    /// body against the caller's scope, with no activation of its own and no
    /// argument binding, and yields `NIL`.
    pub(crate) fn call_in_expression(
        &mut self,
        name: &Token,
        args: &[Expr],
        scope: Option<&ScopeRef>,
    ) -> Result<Value, RuntimeError> {
        let callee = name.lexeme.as_str();
        if types::is_native(callee) || (library::is_terminal(callee) && self.globals.is_imported(callee)) {
            return Ok(self.dispatch_call(name, args, scope)?.unwrap_or(Value::Null));
        }

        let procedure = match self.globals.procedures.get(callee) {
            Some(procedure) => Some(Rc::clone(procedure)),
            None => self.find_nested(callee, scope).map(|nested| {
                let procedure = Rc::clone(&nested.borrow().procedure);
                procedure
            }),
        };
        match procedure {
            Some(procedure) => {
                debug!("run {} in the caller's scope", callee);
                self.exec_block(&procedure.body, scope)?;
                Ok(Value::Null)
            }
            None => Err(RuntimeError::ProcedureNotFound {
                name: callee.to_string(),
                line: name.line,
            }),
        }
    }

    /// Nested procedures visible from `scope`: its own table first, then the
    /// tables of the enclosing activations, innermost first.
    fn find_nested(&self, name: &str, scope: Option<&ScopeRef>) -> Option<ScopeRef> {
        scope
            .into_iter()
            .chain(self.frames.iter().rev())
            .find_map(|frame| frame.borrow().nested.get(name).cloned())
    }

    fn call_global(
        &mut self,
        procedure: &Rc<Procedure>,
        name: &Token,
        args: &[Expr],
        scope: Option<&ScopeRef>,
    ) -> Result<(), RuntimeError> {
        if args.len() != procedure.params.len() {
            return Err(RuntimeError::ArgumentCount {
                name: name.lexeme.clone(),
                expected: procedure.params.len(),
                got: args.len(),
                line: name.line,
            });
        }
        // Arguments belong to the caller's scope.
        let values = self.eval_args(args, scope)?;

        let mut callee = CallScope::new(procedure);
        callee.bind(values);
        if let Some(caller) = scope {
            let inherited = callee
                .nested
                .iter()
                .map(|(name, nested)| (name.clone(), Rc::clone(nested)));
            caller.borrow_mut().nested.extend(inherited);
        }

        debug!("call {} (depth {})", name.lexeme, self.frames.len() + 1);
        let callee = callee.into_ref();
        self.enter(&callee, &procedure.body)
    }

    fn enter(&mut self, frame: &ScopeRef, body: &[Stmt]) -> Result<(), RuntimeError> {
        self.frames.push(Rc::clone(frame));
        let result = self.exec_block(body, Some(frame));
        self.frames.pop();
        result
    }

    /// A native called as a statement leaves its result in a variable named
    /// after the native, globally and in the active call scope.
    pub(crate) fn store_native_result(&mut self, name: &str, value: Value, scope: Option<&ScopeRef>) {
        let type_name = value.type_name();
        self.globals
            .variables
            .entry(name.to_string())
            .or_insert_with(|| Variable::declared(type_name))
            .value = value.clone();
        if let Some(scope) = scope {
            scope
                .borrow_mut()
                .variables
                .entry(name.to_string())
                .or_insert_with(|| Variable::declared(type_name))
                .value = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_module;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn run(source: &str) -> Result<(GlobalScope, String), RuntimeError> {
        let block = parse_module(tokenize(source).tokens).expect("valid module");
        let mut out = Vec::new();
        let mut input = Cursor::new(Vec::new());
        let mut interpreter = Interpreter::new(&block, &mut out, &mut input);
        interpreter.run(&block)?;
        let globals = interpreter.into_globals();
        Ok((globals, String::from_utf8(out).expect("utf8")))
    }

    fn global(globals: &GlobalScope, name: &str) -> Value {
        globals.variables[name].value.clone()
    }

    #[test]
    fn arguments_bind_positionally() {
        let (globals, _) = run(
            "MODULE A;
             VAR r: INTEGER;
             PROCEDURE Sub(a, b: INTEGER);
             BEGIN r := a - b END Sub;
             BEGIN Sub(10, 3) END A.",
        )
        .expect("runs");
        assert_eq!(global(&globals, "r"), Value::Integer(7));
    }

    #[test]
    fn wrong_argument_count() {
        let err = run(
            "MODULE A;
             PROCEDURE P(a: INTEGER); BEGIN END P;
             BEGIN P(1, 2) END A.",
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentCount { expected: 1, got: 2, .. }));
    }

    #[test]
    fn unknown_procedure() {
        let err = run("MODULE A; BEGIN Missing END A.").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ProcedureNotFound {
                name: "Missing".into(),
                line: 1
            }
        );
        assert_eq!(err.to_string(), "[line 1] Error: Procedure Missing not found");
    }

    #[test]
    fn terminal_needs_import() {
        let err = run("MODULE A; BEGIN WriteLn END A.").unwrap_err();
        assert!(matches!(err, RuntimeError::ProcedureNotFound { .. }));

        let (_, out) = run(
            "MODULE A; FROM Terminal2 IMPORT WriteString, WriteLn;
             BEGIN WriteString('hi'); WriteLn END A.",
        )
        .expect("runs");
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn native_statement_result_lands_in_named_variable() {
        let (globals, _) = run("MODULE A; VAR x: INTEGER; BEGIN x := 4; INC(x, 2) END A.")
            .expect("runs");
        assert_eq!(global(&globals, "x"), Value::Integer(4));
        assert_eq!(global(&globals, "INC"), Value::Integer(6));
    }

    #[test]
    fn expression_calls_run_in_the_callers_scope() {
        let (globals, _) = run(
            "MODULE E;
             VAR g, y: INTEGER;
             PROCEDURE F(n: INTEGER): INTEGER;
             BEGIN g := n; RETURN n END F;
             BEGIN F(5); y := F(7) END E.",
        )
        .expect("runs");
        // `n` is not bound at the top level, so it reads as its own text.
        assert_eq!(global(&globals, "g"), Value::Str("n".into()));
        assert_eq!(global(&globals, "y"), Value::Null);

        let (globals, _) = run(
            "MODULE E;
             VAR g, y: INTEGER;
             PROCEDURE F(n: INTEGER): INTEGER;
             BEGIN g := n END F;
             PROCEDURE Caller;
               VAR n: INTEGER;
             BEGIN n := 3; y := F(9) END Caller;
             BEGIN Caller END E.",
        )
        .expect("runs");
        assert_eq!(global(&globals, "g"), Value::Integer(3));
    }

    #[test]
    fn assigning_a_constant_fails() {
        let err = run("MODULE A; CONST k = 1; BEGIN k := 2 END A.").unwrap_err();
        assert!(matches!(err, RuntimeError::AssignToConstant { .. }));
    }

    #[test]
    fn local_arrays_are_per_activation() {
        let (globals, _) = run(
            "MODULE A;
             VAR seen: INTEGER;
             PROCEDURE Fill(v: INTEGER);
               VAR cell: [0..0] OF INTEGER;
             BEGIN
               seen := cell[0];
               cell[0] := v
             END Fill;
             BEGIN Fill(1); Fill(2) END A.",
        )
        .expect("runs");
        assert_eq!(global(&globals, "seen"), Value::Null);
    }
}
