use crate::ast::{BinOp, Expr};
use crate::environment::ScopeRef;
use crate::interpreter::{Interpreter, RuntimeError};
use crate::lexer::{Token, TokenKind};
use crate::value::Value;
use std::cmp::Ordering;

impl<'io> Interpreter<'io> {
    pub fn eval_expr(&mut self, expr: &Expr, scope: Option<&ScopeRef>) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(token) => self.eval_literal(token, scope),
            Expr::Binary(left, op, right, line) => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                apply_binary(&left, *op, &right, *line)
            }
            Expr::Grouping(inner) => self.eval_expr(inner, scope),
            Expr::Negation(inner) => {
                let value = self.eval_expr(inner, scope)?;
                negate(value, inner.line())
            }
            Expr::ArrayAccess(name, indices) => {
                let key = self.eval_indices(indices, scope)?;
                self.read_element(name, &key, scope)
            }
            Expr::ProcedureCall(name, args) => self.call_in_expression(name, args, scope),
            Expr::Empty => Ok(Value::Null),
        }
    }

    /// Identifier lookup order: `TRUE`/`FALSE`, call scope, globals,
    /// constants, then the literal text itself.
    pub(crate) fn eval_literal(
        &mut self,
        token: &Token,
        scope: Option<&ScopeRef>,
    ) -> Result<Value, RuntimeError> {
        if token.kind != TokenKind::Ident {
            return Ok(Value::from_text(&token.lexeme));
        }
        match token.lexeme.as_str() {
            "TRUE" => return Ok(Value::Boolean(true)),
            "FALSE" => return Ok(Value::Boolean(false)),
            _ => {}
        }
        if let Some(value) = self.read_variable(&token.lexeme, scope) {
            return Ok(value);
        }
        if let Some(constant) = self.globals.constants.get(&token.lexeme).cloned() {
            return self.eval_expr(&constant, None);
        }
        Ok(Value::from_text(&token.lexeme))
    }

    pub(crate) fn eval_indices(
        &mut self,
        indices: &[Expr],
        scope: Option<&ScopeRef>,
    ) -> Result<Vec<i64>, RuntimeError> {
        indices
            .iter()
            .map(|index| {
                let value = self.eval_expr(index, scope)?;
                value
                    .as_ordinal()
                    .ok_or_else(|| RuntimeError::mismatch("INTEGER index", &value, index.line()))
            })
            .collect()
    }
}

pub fn negate(value: Value, line: usize) -> Result<Value, RuntimeError> {
    match value {
        Value::Boolean(b) => Ok(Value::Boolean(!b)),
        Value::Integer(n) => n
            .checked_neg()
            .map(Value::Integer)
            .ok_or(RuntimeError::Overflow { line }),
        Value::Real(r) => Ok(Value::Real(-r)),
        other => Err(RuntimeError::mismatch("NUMERIC or BOOLEAN", &other, line)),
    }
}

pub fn apply_binary(left: &Value, op: BinOp, right: &Value, line: usize) -> Result<Value, RuntimeError> {
    let incompatible = || RuntimeError::IncompatibleTypes {
        op: op.symbol().to_string(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
        line,
    };

    match op {
        BinOp::And | BinOp::Or => match (left, right) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(if op == BinOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(incompatible()),
        },
        BinOp::Eq => Ok(Value::Boolean(values_equal(left, right))),
        BinOp::Ne => Ok(Value::Boolean(!values_equal(left, right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(left, right).ok_or_else(incompatible)?;
            let result = match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Boolean(result))
        }
        _ => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(*a, op, *b, line),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.as_f64(), b.as_f64());
                match (a, b) {
                    (Some(a), Some(b)) => real_arithmetic(a, op, b, line),
                    _ => Err(incompatible()),
                }
            }
            (a, b) if op == BinOp::Add && a.is_text() && b.is_text() => {
                Ok(Value::Str(format!("{}{}", a, b)))
            }
            _ => Err(incompatible()),
        },
    }
}

fn integer_arithmetic(a: i64, op: BinOp, b: i64, line: usize) -> Result<Value, RuntimeError> {
    if matches!(op, BinOp::Div | BinOp::IntDiv | BinOp::Mod) && b == 0 {
        return Err(RuntimeError::DivisionByZero { line });
    }
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div | BinOp::IntDiv => a.checked_div(b),
        BinOp::Mod => a.checked_rem(b),
        _ => None,
    };
    result
        .map(Value::Integer)
        .ok_or(RuntimeError::Overflow { line })
}

fn real_arithmetic(a: f64, op: BinOp, b: f64, line: usize) -> Result<Value, RuntimeError> {
    if matches!(op, BinOp::Div | BinOp::IntDiv | BinOp::Mod) && b == 0.0 {
        return Err(RuntimeError::DivisionByZero { line });
    }
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::IntDiv => (a / b).trunc(),
        BinOp::Mod => a % b,
        _ => return Err(RuntimeError::Overflow { line }),
    };
    Ok(Value::Real(result))
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
        (Value::Char(c), Value::Str(s)) | (Value::Str(s), Value::Char(c)) => {
            let mut chars = s.chars();
            chars.next() == Some(*c) && chars.next().is_none()
        }
        (a, b) => a == b,
    }
}

/// Ordering of two values of a comparable kind: numbers (mixed allowed),
/// characters, or strings.
pub(crate) fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::{parse_module, Parser};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn eval(source: &str) -> Result<Value, RuntimeError> {
        let block = parse_module(tokenize("MODULE T; CONST ten = 10; VAR n: INTEGER; BEGIN END T.").tokens)
            .expect("module");
        let expr = Parser::new(tokenize(source).tokens)
            .parse_expr()
            .expect("expression");
        let mut out = Vec::new();
        let mut input = Cursor::new(Vec::new());
        let mut interpreter = Interpreter::new(&block, &mut out, &mut input);
        interpreter.eval_expr(&expr, None)
    }

    #[test]
    fn flat_precedence_is_evaluated_left_to_right() {
        assert_eq!(eval("2 + 3 * 4"), Ok(Value::Integer(20)));
        assert_eq!(eval("2 + (3 * 4)"), Ok(Value::Integer(14)));
    }

    #[test]
    fn integer_and_real_arithmetic() {
        assert_eq!(eval("7 / 2"), Ok(Value::Integer(3)));
        assert_eq!(eval("7 DIV 2"), Ok(Value::Integer(3)));
        assert_eq!(eval("7 MOD 3"), Ok(Value::Integer(1)));
        assert_eq!(eval("7.0 / 2"), Ok(Value::Real(3.5)));
        assert_eq!(eval("1 + 0.5"), Ok(Value::Real(1.5)));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval("1 DIV 0"), Err(RuntimeError::DivisionByZero { line: 1 }));
        assert_eq!(eval("1.5 / 0"), Err(RuntimeError::DivisionByZero { line: 1 }));
    }

    #[test]
    fn strings_concatenate() {
        assert_eq!(eval("'ab' + 'cd'"), Ok(Value::Str("abcd".into())));
        assert_eq!(eval("'ab' + 'c'"), Ok(Value::Str("abc".into())));
    }

    #[test]
    fn incompatible_operands() {
        let err = eval("TRUE + 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "[line 1] Error at '+': Incompatible types BOOLEAN and INTEGER"
        );
        assert!(eval("1 AND TRUE").is_err());
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("1 < 2 AND TRUE"), Ok(Value::Boolean(true)));
        assert_eq!(eval("3 = 3.0"), Ok(Value::Boolean(true)));
        assert_eq!(eval("'a' < 'b'"), Ok(Value::Boolean(true)));
        assert_eq!(eval("2 # 2"), Ok(Value::Boolean(false)));
        assert_eq!(eval("2 <> 3"), Ok(Value::Boolean(true)));
    }

    #[test]
    fn negation() {
        assert_eq!(eval("-5 + 2"), Ok(Value::Integer(-3)));
        assert_eq!(eval("NOT FALSE"), Ok(Value::Boolean(true)));
        assert!(eval("-'x'").is_err());
    }

    #[test]
    fn identifier_resolution() {
        assert_eq!(eval("ten + 1"), Ok(Value::Integer(11)));
        assert_eq!(eval("n"), Ok(Value::Null));
        assert_eq!(eval("INTEGER"), Ok(Value::Str("INTEGER".into())));
    }

    #[test]
    fn natives_produce_values() {
        assert_eq!(eval("ORD('A') + 1"), Ok(Value::Integer(66)));
        assert_eq!(eval("MAX(CARDINAL)"), Ok(Value::Integer(65535)));
    }
}
