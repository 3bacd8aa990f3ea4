//! Static checks run over the whole module before anything executes.
//!
//! Types are tracked only as [`TypeGroup`]s. `None` stands for a group that
//! cannot be inferred (a user procedure called in an expression) and is
//! compatible with everything.

use crate::ast::*;
use crate::lexer::{Token, TokenKind};
use crate::library;
use crate::types::{self, Returns, Signature, TypeGroup};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("[line {line}] Error{location}: {message}")]
pub struct SemanticError {
    pub line: usize,
    pub location: String,
    pub message: String,
}

impl SemanticError {
    fn at(token: &Token, message: impl Into<String>) -> Self {
        SemanticError {
            line: token.line,
            location: format!(" at '{}'", token.lexeme),
            message: message.into(),
        }
    }

    fn at_operator(op: BinOp, line: usize, message: impl Into<String>) -> Self {
        SemanticError {
            line,
            location: format!(" at '{}'", op.symbol()),
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, SemanticError>;

#[derive(Debug, Clone, PartialEq)]
enum Declaration {
    Variable { declared_type: String },
    Array { element_type: String, dimensions: usize },
    Constant { group: Option<TypeGroup> },
}

impl Declaration {
    fn variable(decl: &VarDecl) -> Self {
        Declaration::Variable {
            declared_type: decl.declared_type.lexeme.clone(),
        }
    }

    fn array(element: &Token, dimensions: &Dimensions) -> Self {
        Declaration::Array {
            element_type: element.lexeme.clone(),
            dimensions: dimensions.len(),
        }
    }
}

type Declarations = HashMap<String, Declaration>;

/// Names visible from one statement list. Procedure locals shadow module
/// declarations; enclosing procedures' locals are not visible.
struct Visible<'a> {
    local: Option<&'a Declarations>,
    module: &'a Declarations,
}

impl Visible<'_> {
    fn get(&self, name: &str) -> Option<&Declaration> {
        self.local
            .and_then(|local| local.get(name))
            .or_else(|| self.module.get(name))
    }
}

/// What a call resolved to.
enum Callee {
    Native(Option<TypeGroup>),
    Library,
    User,
}

#[derive(Default)]
pub struct Analyzer {
    module: Declarations,
    /// Every procedure in the module, nested ones included.
    procedures: HashMap<String, Rc<Procedure>>,
    imports: HashSet<String>,
}

pub fn analyze(block: &Block) -> Result<()> {
    Analyzer::default().check_block(block)
}

fn declare(scope: &mut Declarations, name: &Token, declaration: Declaration) -> Result<()> {
    if scope.contains_key(&name.lexeme) {
        return Err(SemanticError::at(
            name,
            format!("Variable {} is already declared", name.lexeme),
        ));
    }
    scope.insert(name.lexeme.clone(), declaration);
    Ok(())
}

fn check_type_name(type_name: &Token) -> Result<()> {
    match types::group_of(&type_name.lexeme) {
        Some(_) => Ok(()),
        None => Err(SemanticError::at(
            type_name,
            format!("Unknown type {}", type_name.lexeme),
        )),
    }
}

/// Sibling procedures must have distinct names that do not clash with the
/// variables and constants of the same declaration list.
fn check_procedure_names<'a>(
    procedures: impl Iterator<Item = &'a Rc<Procedure>>,
    scope: &Declarations,
) -> Result<()> {
    let mut seen = HashSet::new();
    for proc in procedures {
        let name = &proc.name;
        if !seen.insert(name.lexeme.as_str()) {
            return Err(SemanticError::at(
                name,
                format!("Procedure {} is already declared", name.lexeme),
            ));
        }
        if scope.contains_key(&name.lexeme) {
            return Err(SemanticError::at(
                name,
                format!("Procedure {} clashes with a variable of the same name", name.lexeme),
            ));
        }
    }
    Ok(())
}

fn literal_group(token: &Token) -> Option<TypeGroup> {
    match token.kind {
        TokenKind::Number => Some(TypeGroup::Numeric),
        TokenKind::Str => {
            let inner = token
                .lexeme
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''));
            match inner {
                Some(text) if text.chars().count() == 1 => Some(TypeGroup::Char),
                _ => Some(TypeGroup::Str),
            }
        }
        _ => None,
    }
}

fn groups_match(target: Option<TypeGroup>, value: Option<TypeGroup>) -> bool {
    match (target, value) {
        (Some(target), Some(value)) => {
            target == value || (target == TypeGroup::Str && value == TypeGroup::Char)
        }
        _ => true,
    }
}

fn describe(allowed: &[TypeGroup]) -> String {
    allowed
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

impl Analyzer {
    pub fn check_block(&mut self, block: &Block) -> Result<()> {
        self.collect_procedures(block.procedures());

        let mut module = Declarations::new();
        for stmt in &block.statements {
            match stmt {
                Stmt::Import(library, names) => self.check_import(library, names)?,
                Stmt::Const(name, value) => {
                    let visible = Visible {
                        local: None,
                        module: &module,
                    };
                    let group = self.expression_type(value, &visible)?;
                    declare(&mut module, name, Declaration::Constant { group })?;
                }
                Stmt::Var(decl) => {
                    check_type_name(&decl.declared_type)?;
                    declare(&mut module, &decl.name, Declaration::variable(decl))?;
                }
                Stmt::VarArray(name, element, dimensions) => {
                    check_type_name(element)?;
                    declare(&mut module, name, Declaration::array(element, dimensions))?;
                }
                _ => {}
            }
        }
        check_procedure_names(block.procedures(), &module)?;
        self.module = module;

        for proc in block.procedures() {
            self.check_procedure(proc)?;
        }
        if let Some(body) = block.main() {
            let visible = Visible {
                local: None,
                module: &self.module,
            };
            self.check_statements(body, &visible)?;
        }

        debug!(
            "analysis passed: {} declarations, {} procedures",
            self.module.len(),
            self.procedures.len()
        );
        Ok(())
    }

    fn collect_procedures<'a>(&mut self, procedures: impl Iterator<Item = &'a Rc<Procedure>>) {
        for proc in procedures {
            self.procedures
                .entry(proc.name.lexeme.clone())
                .or_insert_with(|| Rc::clone(proc));
            self.collect_procedures(proc.nested());
        }
    }

    fn check_import(&mut self, library: &Token, names: &[Token]) -> Result<()> {
        let published = library::library_procedures(&library.lexeme).ok_or_else(|| {
            SemanticError::at(library, format!("Library {} is not supported", library.lexeme))
        })?;
        for name in names {
            if !published.contains(&name.lexeme.as_str()) {
                return Err(SemanticError::at(
                    name,
                    format!(
                        "Procedure {} is not supported in library {}",
                        name.lexeme, library.lexeme
                    ),
                ));
            }
            self.imports.insert(name.lexeme.clone());
        }
        Ok(())
    }

    fn check_procedure(&self, proc: &Procedure) -> Result<()> {
        let mut locals = Declarations::new();
        for param in &proc.params {
            check_type_name(&param.declared_type)?;
            declare(&mut locals, &param.name, Declaration::variable(param))?;
        }
        if let Some(return_type) = &proc.return_type {
            check_type_name(return_type)?;
        }
        for stmt in &proc.body {
            match stmt {
                Stmt::Var(decl) => {
                    check_type_name(&decl.declared_type)?;
                    declare(&mut locals, &decl.name, Declaration::variable(decl))?;
                }
                Stmt::VarArray(name, element, dimensions) => {
                    check_type_name(element)?;
                    declare(&mut locals, name, Declaration::array(element, dimensions))?;
                }
                _ => {}
            }
        }
        check_procedure_names(proc.nested(), &locals)?;
        for nested in proc.nested() {
            self.check_procedure(nested)?;
        }

        let visible = Visible {
            local: Some(&locals),
            module: &self.module,
        };
        self.check_statements(&proc.body, &visible)
    }

    fn check_statements(&self, body: &[Stmt], visible: &Visible) -> Result<()> {
        body.iter()
            .filter(|stmt| !stmt.is_declaration())
            .try_for_each(|stmt| self.check_stmt(stmt, visible))
    }

    fn check_stmt(&self, stmt: &Stmt, visible: &Visible) -> Result<()> {
        match stmt {
            Stmt::Assign(target, value) => self.check_assign(target, value, visible).map(|_| ()),
            Stmt::Call(name, args) => self.check_call(name, args, visible).map(|_| ()),
            Stmt::If(condition, then_body, elsifs, else_branch) => {
                self.check_condition(condition, "IF", visible)?;
                self.check_statements(then_body, visible)?;
                for elsif in elsifs {
                    self.check_condition(&elsif.condition, "ELSIF", visible)?;
                    self.check_statements(&elsif.body, visible)?;
                }
                match else_branch {
                    Some(branch) => self.check_statements(&branch.body, visible),
                    None => Ok(()),
                }
            }
            Stmt::While(condition, body) => {
                self.check_condition(condition, "WHILE", visible)?;
                self.check_statements(body, visible)
            }
            Stmt::For(init, bound, step, body, line) => {
                self.check_for(init, bound, step.as_ref(), *line, visible)?;
                self.check_statements(body, visible)
            }
            Stmt::Case(selector, branches, default) => {
                match visible.get(&selector.lexeme) {
                    Some(Declaration::Variable { declared_type })
                        if types::group_of(declared_type) == Some(TypeGroup::Numeric) => {}
                    Some(_) => {
                        return Err(SemanticError::at(
                            selector,
                            format!("CASE selector {} must be NUMERIC", selector.lexeme),
                        ))
                    }
                    None => {
                        return Err(SemanticError::at(
                            selector,
                            format!("Variable {} is not declared", selector.lexeme),
                        ))
                    }
                }
                for branch in branches {
                    self.check_statements(&branch.body, visible)?;
                }
                self.check_statements(default, visible)
            }
            Stmt::Read(name, indices) => self.check_io_target(name, indices, false, visible),
            Stmt::Write(name, indices) => self.check_io_target(name, indices, true, visible),
            Stmt::Return(value) => match value {
                Expr::Empty => Ok(()),
                value => self.expression_type(value, visible).map(|_| ()),
            },
            Stmt::Main(body) => self.check_statements(body, visible),
            Stmt::Module(_)
            | Stmt::Import(..)
            | Stmt::Const(..)
            | Stmt::Var(_)
            | Stmt::VarArray(..)
            | Stmt::Procedure(_) => Ok(()),
        }
    }

    /// Checks an assignment and returns the group of its target.
    fn check_assign(&self, target: &Expr, value: &Expr, visible: &Visible) -> Result<Option<TypeGroup>> {
        let value_group = self.expression_type(value, visible)?;
        let (name, target_group) = match target {
            Expr::Literal(name) => (name, self.variable_group(name, visible)?),
            Expr::ArrayAccess(name, indices) => (name, self.element_group(name, indices, visible)?),
            other => {
                return Err(SemanticError {
                    line: other.line(),
                    location: String::new(),
                    message: "Invalid assignment target".to_string(),
                })
            }
        };
        if !groups_match(target_group, value_group) {
            return Err(SemanticError::at(
                name,
                format!(
                    "Cannot assign {} to {} of type {}",
                    value_group.map_or("?".to_string(), |g| g.to_string()),
                    name.lexeme,
                    target_group.map_or("?".to_string(), |g| g.to_string()),
                ),
            ));
        }
        Ok(target_group)
    }

    /// Group of an assignable scalar variable.
    fn variable_group(&self, name: &Token, visible: &Visible) -> Result<Option<TypeGroup>> {
        match visible.get(&name.lexeme) {
            Some(Declaration::Variable { declared_type }) => Ok(types::group_of(declared_type)),
            Some(Declaration::Constant { .. }) => Err(SemanticError::at(
                name,
                format!("Cannot assign to constant {}", name.lexeme),
            )),
            Some(Declaration::Array { .. }) => Err(SemanticError::at(
                name,
                format!("Array {} must be indexed", name.lexeme),
            )),
            None => Err(SemanticError::at(
                name,
                format!("Variable {} is not declared", name.lexeme),
            )),
        }
    }

    fn element_group(&self, name: &Token, indices: &[Expr], visible: &Visible) -> Result<Option<TypeGroup>> {
        let (element_type, dimensions) = match visible.get(&name.lexeme) {
            Some(Declaration::Array {
                element_type,
                dimensions,
            }) => (element_type, *dimensions),
            _ => {
                return Err(SemanticError::at(
                    name,
                    format!("Array {} is not declared", name.lexeme),
                ))
            }
        };
        if indices.len() != dimensions {
            return Err(SemanticError::at(
                name,
                format!(
                    "Array {} has {} dimensions but {} indices were given",
                    name.lexeme,
                    dimensions,
                    indices.len()
                ),
            ));
        }
        for index in indices {
            match self.expression_type(index, visible)? {
                None | Some(TypeGroup::Numeric) | Some(TypeGroup::Char) => {}
                Some(group) => {
                    return Err(SemanticError::at(
                        name,
                        format!("Array index must be NUMERIC, found {}", group),
                    ))
                }
            }
        }
        Ok(types::group_of(element_type))
    }

    fn check_condition(&self, condition: &Expr, keyword: &str, visible: &Visible) -> Result<()> {
        match self.expression_type(condition, visible)? {
            Some(TypeGroup::Boolean) => Ok(()),
            group => Err(SemanticError {
                line: condition.line(),
                location: format!(" at '{}'", keyword),
                message: format!(
                    "Condition must be BOOLEAN, found {}",
                    group.map_or("an untyped call".to_string(), |g| g.to_string())
                ),
            }),
        }
    }

    fn check_for(
        &self,
        init: &Stmt,
        bound: &Expr,
        step: Option<&Expr>,
        line: usize,
        visible: &Visible,
    ) -> Result<()> {
        let ordinal = |group: Option<TypeGroup>| {
            matches!(group, None | Some(TypeGroup::Numeric) | Some(TypeGroup::Char))
        };
        let for_error = |message: &str| SemanticError {
            line,
            location: " at 'FOR'".to_string(),
            message: message.to_string(),
        };

        let (index_group, start_group) = match init {
            Stmt::Assign(target, start) => (
                self.check_assign(target, start, visible)?,
                self.expression_type(start, visible)?,
            ),
            _ => return Err(for_error("FOR needs a loop variable")),
        };
        if !ordinal(index_group) || !ordinal(start_group) {
            return Err(for_error("FOR initial value must be NUMERIC or CHAR"));
        }
        if !ordinal(self.expression_type(bound, visible)?) {
            return Err(for_error("FOR bound must be NUMERIC or CHAR"));
        }
        if let Some(step) = step {
            match self.expression_type(step, visible)? {
                None | Some(TypeGroup::Numeric) => {}
                Some(_) => return Err(for_error("FOR step must be NUMERIC")),
            }
        }
        Ok(())
    }

    fn check_io_target(&self, name: &Token, indices: &[Expr], write: bool, visible: &Visible) -> Result<()> {
        if !indices.is_empty() {
            return self.element_group(name, indices, visible).map(|_| ());
        }
        match visible.get(&name.lexeme) {
            Some(Declaration::Variable { .. }) => Ok(()),
            Some(Declaration::Constant { .. }) if write => Ok(()),
            _ => self.variable_group(name, visible).map(|_| ()),
        }
    }

    fn check_signature(&self, name: &Token, signature: &Signature, groups: &[Option<TypeGroup>]) -> Result<()> {
        if !signature.accepts_count(groups.len()) {
            return Err(SemanticError::at(
                name,
                format!(
                    "Procedure {} requires {} arguments but {} were given",
                    name.lexeme,
                    signature.arity(),
                    groups.len()
                ),
            ));
        }
        for (position, (group, allowed)) in groups.iter().zip(signature.params).enumerate() {
            if let Some(group) = group {
                if !allowed.contains(group) {
                    return Err(SemanticError::at(
                        name,
                        format!(
                            "Argument {} of {} must be {}, found {}",
                            position + 1,
                            name.lexeme,
                            describe(allowed),
                            group
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resolves a call the way the interpreter does: natives, imported
    /// library procedures, then user procedures at any nesting depth.
    fn check_call(&self, name: &Token, args: &[Expr], visible: &Visible) -> Result<Callee> {
        let groups = args
            .iter()
            .map(|arg| self.expression_type(arg, visible))
            .collect::<Result<Vec<_>>>()?;
        let callee = name.lexeme.as_str();

        if let Some(signature) = types::native_signature(callee) {
            self.check_signature(name, &signature, &groups)?;
            let group = match signature.returns {
                Returns::Group(group) => Some(group),
                Returns::FirstArgument => groups.first().copied().flatten(),
                Returns::TypeArgument => match args.first() {
                    Some(Expr::Literal(type_name)) => types::group_of(&type_name.lexeme),
                    _ => None,
                },
                Returns::Nothing => None,
            };
            return Ok(Callee::Native(group));
        }

        if library::is_terminal(callee) && self.imports.contains(callee) {
            if let Some(signature) = library::terminal_signature(callee) {
                self.check_signature(name, &signature, &groups)?;
            }
            return Ok(Callee::Library);
        }

        if let Some(proc) = self.procedures.get(callee) {
            if proc.params.len() != groups.len() {
                return Err(SemanticError::at(
                    name,
                    format!(
                        "Procedure {} requires {} arguments but {} were given",
                        callee,
                        proc.params.len(),
                        groups.len()
                    ),
                ));
            }
            for (position, (param, group)) in proc.params.iter().zip(&groups).enumerate() {
                let expected = types::group_of(&param.declared_type.lexeme);
                if !groups_match(expected, *group) {
                    return Err(SemanticError::at(
                        name,
                        format!(
                            "Argument {} of {} must be {}",
                            position + 1,
                            callee,
                            param.declared_type.lexeme
                        ),
                    ));
                }
            }
            return Ok(Callee::User);
        }

        Err(SemanticError::at(
            name,
            format!("Procedure {} is not declared", callee),
        ))
    }

    /// Infers the group of an expression, reporting the first ill-typed or
    /// undeclared part.
    fn expression_type(&self, expr: &Expr, visible: &Visible) -> Result<Option<TypeGroup>> {
        match expr {
            Expr::Literal(token) => self.literal_type(token, visible),
            Expr::Grouping(inner) => self.expression_type(inner, visible),
            Expr::Negation(inner) => match self.expression_type(inner, visible)? {
                group @ (None | Some(TypeGroup::Numeric) | Some(TypeGroup::Boolean)) => Ok(group),
                Some(group) => Err(SemanticError {
                    line: inner.line(),
                    location: String::new(),
                    message: format!("Cannot negate a {} operand", group),
                }),
            },
            Expr::ArrayAccess(name, indices) => self.element_group(name, indices, visible),
            Expr::ProcedureCall(name, args) => match self.check_call(name, args, visible)? {
                Callee::Native(group) => Ok(group),
                Callee::User => Ok(None),
                Callee::Library => Err(SemanticError::at(
                    name,
                    format!("Procedure {} does not return a value", name.lexeme),
                )),
            },
            Expr::Binary(left, op, right, line) => {
                let left = self.expression_type(left, visible)?;
                let right = self.expression_type(right, visible)?;
                self.binary_type(left, *op, right, *line)
            }
            Expr::Empty => Ok(None),
        }
    }

    fn literal_type(&self, token: &Token, visible: &Visible) -> Result<Option<TypeGroup>> {
        if token.kind != TokenKind::Ident {
            return Ok(literal_group(token));
        }
        match token.lexeme.as_str() {
            "TRUE" | "FALSE" => return Ok(Some(TypeGroup::Boolean)),
            _ => {}
        }
        match visible.get(&token.lexeme) {
            Some(Declaration::Variable { declared_type }) => Ok(types::group_of(declared_type)),
            Some(Declaration::Constant { group }) => Ok(*group),
            Some(Declaration::Array { .. }) => Err(SemanticError::at(
                token,
                format!("Array {} must be indexed", token.lexeme),
            )),
            None if types::is_type_name(&token.lexeme) => Ok(Some(TypeGroup::Type)),
            None => Err(SemanticError::at(
                token,
                format!("Identifier {} is not declared", token.lexeme),
            )),
        }
    }

    fn binary_type(
        &self,
        left: Option<TypeGroup>,
        op: BinOp,
        right: Option<TypeGroup>,
        line: usize,
    ) -> Result<Option<TypeGroup>> {
        if let (Some(a), Some(b)) = (left, right) {
            if a != b {
                return Err(SemanticError::at_operator(
                    op,
                    line,
                    "Binary expression operands must be of the same type",
                ));
            }
        }
        let operand = left.or(right);

        if op.is_arithmetic() {
            return match operand {
                None | Some(TypeGroup::Numeric) => Ok(Some(TypeGroup::Numeric)),
                Some(group) => Err(SemanticError::at_operator(
                    op,
                    line,
                    format!("Operator {} requires NUMERIC operands, found {}", op.symbol(), group),
                )),
            };
        }

        let legal = match op {
            BinOp::And | BinOp::Or => matches!(operand, None | Some(TypeGroup::Boolean)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => matches!(
                operand,
                None | Some(TypeGroup::Numeric) | Some(TypeGroup::Char)
            ),
            _ => !matches!(operand, Some(TypeGroup::Type)),
        };
        if !legal {
            return Err(SemanticError::at_operator(
                op,
                line,
                format!(
                    "Operator {} cannot be applied to {} operands",
                    op.symbol(),
                    operand.map_or("?".to_string(), |g| g.to_string())
                ),
            ));
        }
        Ok(Some(TypeGroup::Boolean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_module;
    use pretty_assertions::assert_eq;

    fn check(source: &str) -> Result<()> {
        analyze(&parse_module(tokenize(source).tokens).expect("valid module"))
    }

    fn message(source: &str) -> String {
        check(source).expect_err("should be rejected").message
    }

    #[test]
    fn well_typed_module_passes() {
        check(
            "MODULE Ok;
             FROM Terminal2 IMPORT WriteInt, WriteLn, WriteString;
             CONST limit = 10; name = 'ok';
             VAR i, total: INTEGER; c: CHAR; done: BOOLEAN; r: REAL;
                 grid: [1..3][1..3] OF INTEGER;
             PROCEDURE Show(n: INTEGER);
               VAR copy: INTEGER;
             BEGIN copy := n; WriteInt(copy, 4); WriteLn END Show;
             BEGIN
               total := 0; done := FALSE; c := 'x'; r := FLOAT(limit);
               FOR i := 1 TO limit DO total := total + i END;
               grid[1][2] := ORD(c);
               IF total > 40 AND NOT done THEN Show(total) END;
               CASE i OF 1: done := TRUE ELSE done := FALSE END;
               WriteString(name);
               ?i; !total
             END Ok.",
        )
        .expect("module is well typed");
    }

    #[test]
    fn redeclaration_in_one_block() {
        assert_eq!(
            message("MODULE R; CONST x = 1; VAR x: INTEGER; BEGIN END R."),
            "Variable x is already declared"
        );
        assert_eq!(
            message("MODULE R; VAR a: [1..2] OF INTEGER; a: INTEGER; BEGIN END R."),
            "Variable a is already declared"
        );
        assert_eq!(
            message("MODULE R; PROCEDURE P(v: INTEGER); VAR v: REAL; BEGIN END P; BEGIN END R."),
            "Variable v is already declared"
        );
    }

    #[test]
    fn duplicate_sibling_procedures() {
        assert_eq!(
            message("MODULE R; PROCEDURE P; BEGIN END P; PROCEDURE P; BEGIN END P; BEGIN END R."),
            "Procedure P is already declared"
        );
    }

    #[test]
    fn locals_may_shadow_globals() {
        check(
            "MODULE S; VAR x: BOOLEAN;
             PROCEDURE P; VAR x: INTEGER; BEGIN x := 1 END P;
             BEGIN x := TRUE END S.",
        )
        .expect("shadowing is allowed");
    }

    #[test]
    fn assignment_type_mismatch() {
        let err = check("MODULE T; VAR x: INTEGER; BEGIN x := 'hello' END T.").unwrap_err();
        assert_eq!(err.message, "Cannot assign STRING to x of type NUMERIC");
        assert_eq!(
            err.to_string(),
            "[line 1] Error at 'x': Cannot assign STRING to x of type NUMERIC"
        );
    }

    #[test]
    fn binary_operands_must_agree() {
        assert_eq!(
            message("MODULE T; VAR b: BOOLEAN; BEGIN b := 1 = TRUE END T."),
            "Binary expression operands must be of the same type"
        );
        assert_eq!(
            message("MODULE T; VAR b: BOOLEAN; BEGIN b := b + b END T."),
            "Operator + requires NUMERIC operands, found BOOLEAN"
        );
        assert_eq!(
            message("MODULE T; VAR b: BOOLEAN; BEGIN b := 1 AND 2 END T."),
            "Operator AND cannot be applied to NUMERIC operands"
        );
    }

    #[test]
    fn conditions_must_be_boolean() {
        assert_eq!(
            message("MODULE T; VAR i: INTEGER; BEGIN IF i THEN END END T."),
            "Condition must be BOOLEAN, found NUMERIC"
        );
        assert_eq!(
            message("MODULE T; VAR i: INTEGER; BEGIN WHILE i + 1 DO END END T."),
            "Condition must be BOOLEAN, found NUMERIC"
        );
    }

    #[test]
    fn for_and_case_checks() {
        assert_eq!(
            message("MODULE T; VAR i: INTEGER; BEGIN FOR i := 1 TO TRUE DO END END T."),
            "FOR bound must be NUMERIC or CHAR"
        );
        assert_eq!(
            message("MODULE T; VAR i: INTEGER; BEGIN FOR i := 1 TO 3 BY 'a' DO END END T."),
            "FOR step must be NUMERIC"
        );
        assert_eq!(
            message("MODULE T; VAR c: CHAR; BEGIN CASE c OF 1: END END T."),
            "CASE selector c must be NUMERIC"
        );
        assert_eq!(
            message("MODULE T; BEGIN CASE q OF 1: END END T."),
            "Variable q is not declared"
        );
    }

    #[test]
    fn calls_are_resolved_and_checked() {
        assert_eq!(
            message(
                "MODULE C; PROCEDURE P(a, b: INTEGER); BEGIN END P; BEGIN P(1) END C."
            ),
            "Procedure P requires 2 arguments but 1 were given"
        );
        assert_eq!(
            message("MODULE C; PROCEDURE P(a: INTEGER); BEGIN END P; BEGIN P(TRUE) END C."),
            "Argument 1 of P must be INTEGER"
        );
        assert_eq!(
            message("MODULE C; VAR c: CHAR; BEGIN c := CHR('a') END C."),
            "Argument 1 of CHR must be NUMERIC, found CHAR"
        );
        assert_eq!(message("MODULE C; BEGIN Nowhere END C."), "Procedure Nowhere is not declared");
        assert_eq!(
            message("MODULE C; BEGIN WriteLn END C."),
            "Procedure WriteLn is not declared"
        );
    }

    #[test]
    fn nested_procedures_are_found() {
        check(
            "MODULE N;
             PROCEDURE Outer;
               PROCEDURE Inner(k: INTEGER); BEGIN END Inner;
             BEGIN Inner(1) END Outer;
             BEGIN Outer END N.",
        )
        .expect("nested call resolves");
    }

    #[test]
    fn native_return_groups() {
        check("MODULE V; VAR m: INTEGER; c: CHAR; BEGIN m := MAX(INTEGER); c := VAL(CHAR, 65); c := CAP(c) END V.")
            .expect("natives infer their groups");
        assert_eq!(
            message("MODULE V; VAR m: INTEGER; BEGIN m := MIN(CHAR) END V."),
            "Cannot assign CHAR to m of type NUMERIC"
        );
    }

    #[test]
    fn imports_are_validated() {
        assert_eq!(
            message("MODULE I; FROM Terminal2 IMPORT WriteBig; BEGIN END I."),
            "Procedure WriteBig is not supported in library Terminal2"
        );
        assert_eq!(
            message("MODULE I; FROM InOut IMPORT Write; BEGIN END I."),
            "Library InOut is not supported"
        );
    }

    #[test]
    fn undeclared_names_and_constants() {
        assert_eq!(
            message("MODULE U; VAR x: INTEGER; BEGIN x := y + 1 END U."),
            "Identifier y is not declared"
        );
        assert_eq!(
            message("MODULE U; CONST k = 1; BEGIN k := 2 END U."),
            "Cannot assign to constant k"
        );
        assert_eq!(message("MODULE U; BEGIN ?z END U."), "Variable z is not declared");
        assert_eq!(message("MODULE U; VAR x: WORD; BEGIN END U."), "Unknown type WORD");
    }

    #[test]
    fn array_access_is_checked() {
        assert_eq!(
            message("MODULE A; VAR a: [1..3] OF INTEGER; BEGIN a[1][2] := 0 END A."),
            "Array a has 1 dimensions but 2 indices were given"
        );
        assert_eq!(
            message("MODULE A; VAR a: [1..3] OF INTEGER; BEGIN a[1] := TRUE END A."),
            "Cannot assign BOOLEAN to a of type NUMERIC"
        );
        check("MODULE A; VAR a: [1..3] OF INTEGER; BEGIN a[4] := 1 END A.")
            .expect("range is checked at run time");
    }
}
