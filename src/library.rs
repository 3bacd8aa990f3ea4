//! Built-in procedures: the native scalar functions (`CHR`, `ORD`, ...) and
//! the `Terminal2` console library.

use crate::types::{self, Returns, Signature, TypeGroup};
use crate::value::Value;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LibraryError {
    #[error("Procedure {name} requires {expected} arguments but {got} were given")]
    ArgumentCount {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("Invalid argument for {name}: {message}")]
    InvalidArgument { name: String, message: String },
    #[error("Unknown built-in procedure {0}")]
    Unknown(String),
    #[error("Output failed: {0}")]
    Io(String),
}

pub const TERMINAL: &str = "Terminal2";

pub const TERMINAL_PROCEDURES: [&str; 6] = [
    "WriteString",
    "WriteInt",
    "WriteLn",
    "WriteChar",
    "WriteCard",
    "WriteReal",
];

pub fn is_terminal(name: &str) -> bool {
    TERMINAL_PROCEDURES.contains(&name)
}

/// Procedures published by a library, `None` if the library is unknown.
pub fn library_procedures(library: &str) -> Option<&'static [&'static str]> {
    match library {
        TERMINAL => Some(&TERMINAL_PROCEDURES),
        _ => None,
    }
}

const NUMERIC: &[TypeGroup] = &[TypeGroup::Numeric];
const PRINTABLE_TEXT: &[TypeGroup] = &[TypeGroup::Str, TypeGroup::Char];
const CHARACTER: &[TypeGroup] = &[TypeGroup::Char, TypeGroup::Numeric];

pub fn terminal_signature(name: &str) -> Option<Signature> {
    let signature = match name {
        "WriteString" => Signature::new(&[PRINTABLE_TEXT], 1, Returns::Nothing),
        "WriteInt" | "WriteCard" | "WriteReal" => {
            Signature::new(&[NUMERIC, NUMERIC], 1, Returns::Nothing)
        }
        "WriteLn" => Signature::new(&[], 0, Returns::Nothing),
        "WriteChar" => Signature::new(&[CHARACTER], 1, Returns::Nothing),
        _ => return None,
    };
    Some(signature)
}

fn check_count(name: &str, signature: &Signature, args: &[Value]) -> Result<(), LibraryError> {
    if signature.accepts_count(args.len()) {
        Ok(())
    } else {
        Err(LibraryError::ArgumentCount {
            name: name.to_string(),
            expected: signature.arity(),
            got: args.len(),
        })
    }
}

fn invalid(name: &str, message: impl Into<String>) -> LibraryError {
    LibraryError::InvalidArgument {
        name: name.to_string(),
        message: message.into(),
    }
}

fn integer_arg(name: &str, value: &Value) -> Result<i64, LibraryError> {
    match value {
        Value::Integer(n) => Ok(*n),
        Value::Real(r) => Ok(r.trunc() as i64),
        other => Err(invalid(name, format!("expected a number, found {}", other.type_name()))),
    }
}

fn real_arg(name: &str, value: &Value) -> Result<f64, LibraryError> {
    value
        .as_f64()
        .ok_or_else(|| invalid(name, format!("expected a number, found {}", value.type_name())))
}

fn char_from(name: &str, ordinal: i64) -> Result<char, LibraryError> {
    u32::try_from(ordinal)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| invalid(name, format!("{} is not a character ordinal", ordinal)))
}

fn type_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, LibraryError> {
    match value {
        Value::Str(type_name) if types::is_type_name(type_name) => Ok(type_name),
        other => Err(invalid(name, format!("{} is not a type name", other))),
    }
}

/// Evaluates a native scalar function.
pub fn call_native(name: &str, args: &[Value]) -> Result<Value, LibraryError> {
    let signature =
        types::native_signature(name).ok_or_else(|| LibraryError::Unknown(name.to_string()))?;
    check_count(name, &signature, args)?;

    match name {
        "CHR" => Ok(Value::Char(char_from(name, integer_arg(name, &args[0])?)?)),
        "FLOAT" => Ok(Value::Real(real_arg(name, &args[0])?)),
        "TRUNC" => Ok(Value::Integer(integer_arg(name, &args[0])?)),
        "ORD" => match &args[0] {
            Value::Char(c) => Ok(Value::Integer(*c as i64)),
            Value::Str(s) => s
                .chars()
                .next()
                .map(|c| Value::Integer(c as i64))
                .ok_or_else(|| invalid(name, "empty string")),
            other => Err(invalid(name, format!("expected a character, found {}", other.type_name()))),
        },
        "CAP" => match &args[0] {
            Value::Char(c) => Ok(Value::Char(c.to_ascii_uppercase())),
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            other => Err(invalid(name, format!("expected text, found {}", other.type_name()))),
        },
        "VAL" => convert(type_arg(name, &args[0])?, &args[1]),
        "INC" | "DEC" => {
            let step = match args.get(1) {
                Some(step) => step.clone(),
                None => Value::Integer(1),
            };
            step_value(name, &args[0], &step, name == "INC")
        }
        "MIN" => bound(type_arg(name, &args[0])?, false),
        "MAX" => bound(type_arg(name, &args[0])?, true),
        _ => Err(LibraryError::Unknown(name.to_string())),
    }
}

fn convert(type_name: &str, value: &Value) -> Result<Value, LibraryError> {
    const NAME: &str = "VAL";
    let ordinal = |value: &Value| -> Result<i64, LibraryError> {
        match value {
            Value::Boolean(b) => Ok(*b as i64),
            Value::Char(c) => Ok(*c as i64),
            other => integer_arg(NAME, other),
        }
    };
    match type_name {
        "INTEGER" | "LONGINT" => Ok(Value::Integer(ordinal(value)?)),
        "CARDINAL" => match ordinal(value)? {
            n if n < 0 => Err(invalid(NAME, format!("{} is not a CARDINAL", n))),
            n => Ok(Value::Integer(n)),
        },
        "REAL" | "LONGREAL" => match value {
            Value::Char(c) => Ok(Value::Real(*c as u32 as f64)),
            other => Ok(Value::Real(real_arg(NAME, other)?)),
        },
        "CHAR" => match value {
            Value::Char(c) => Ok(Value::Char(*c)),
            other => Ok(Value::Char(char_from(NAME, ordinal(other)?)?)),
        },
        "BOOLEAN" => Ok(Value::Boolean(ordinal(value)? != 0)),
        "STRING" => Ok(Value::Str(value.to_string())),
        other => Err(invalid(NAME, format!("cannot convert to {}", other))),
    }
}

fn step_value(name: &str, value: &Value, step: &Value, up: bool) -> Result<Value, LibraryError> {
    let shift = |n: i64, k: i64| if up { n.checked_add(k) } else { n.checked_sub(k) };
    match (value, step) {
        (Value::Integer(n), Value::Integer(k)) => shift(*n, *k)
            .map(Value::Integer)
            .ok_or_else(|| invalid(name, "integer overflow")),
        (Value::Char(c), Value::Integer(k)) => {
            let ordinal =
                shift(*c as i64, *k).ok_or_else(|| invalid(name, "character out of range"))?;
            Ok(Value::Char(char_from(name, ordinal)?))
        }
        (value, step) if value.is_numeric() && step.is_numeric() => {
            let n = real_arg(name, value)?;
            let k = real_arg(name, step)?;
            Ok(Value::Real(if up { n + k } else { n - k }))
        }
        (value, _) => Err(invalid(name, format!("cannot step a {}", value.type_name()))),
    }
}

fn bound(type_name: &str, max: bool) -> Result<Value, LibraryError> {
    let value = match (type_name, max) {
        ("INTEGER", false) => Value::Integer(i32::MIN as i64),
        ("INTEGER", true) => Value::Integer(i32::MAX as i64),
        ("LONGINT", false) => Value::Integer(i64::MIN),
        ("LONGINT", true) => Value::Integer(i64::MAX),
        ("CARDINAL", false) => Value::Integer(0),
        ("CARDINAL", true) => Value::Integer(65535),
        ("REAL" | "LONGREAL", false) => Value::Real(f64::MIN),
        ("REAL" | "LONGREAL", true) => Value::Real(f64::MAX),
        ("CHAR", false) => Value::Char('\0'),
        ("CHAR", true) => Value::Char('\u{FFFF}'),
        ("BOOLEAN", upper) => Value::Boolean(upper),
        (other, _) => {
            let name = if max { "MAX" } else { "MIN" };
            return Err(invalid(name, format!("{} has no bounds", other)));
        }
    };
    Ok(value)
}

/// Widest field a `Terminal2` pad argument may ask for.
pub const MAX_PAD: usize = 1024;

/// Runs one `Terminal2` procedure against `out`.
pub fn call_terminal(name: &str, args: &[Value], out: &mut dyn Write) -> Result<(), LibraryError> {
    let signature =
        terminal_signature(name).ok_or_else(|| LibraryError::Unknown(name.to_string()))?;
    check_count(name, &signature, args)?;

    let width = match args.get(1) {
        Some(pad) => match usize::try_from(integer_arg(name, pad)?) {
            Ok(width) if width > MAX_PAD => {
                return Err(invalid(name, format!("pad width {} exceeds {}", width, MAX_PAD)))
            }
            Ok(width) => width,
            Err(_) => 0,
        },
        None => 0,
    };
    let text = match name {
        "WriteString" => args[0].to_string(),
        "WriteInt" => format!("{:>width$}", integer_arg(name, &args[0])?, width = width),
        // Negative values print as their unsigned 32-bit wrap.
        "WriteCard" => format!("{:>width$}", integer_arg(name, &args[0])? as u32, width = width),
        "WriteReal" => {
            let real = Value::Real(real_arg(name, &args[0])?);
            format!("{:>width$}", real.to_string(), width = width)
        }
        "WriteChar" => match &args[0] {
            Value::Char(c) => c.to_string(),
            other => char_from(name, integer_arg(name, other)?)?.to_string(),
        },
        "WriteLn" => "\n".to_string(),
        _ => return Err(LibraryError::Unknown(name.to_string())),
    };
    out.write_all(text.as_bytes())
        .map_err(|e| LibraryError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(name: &str, args: &[Value]) -> String {
        let mut out = Vec::new();
        call_terminal(name, args, &mut out).expect("terminal call");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn character_natives() {
        assert_eq!(call_native("CHR", &[Value::Integer(65)]), Ok(Value::Char('A')));
        assert_eq!(call_native("ORD", &[Value::Char('a')]), Ok(Value::Integer(97)));
        assert_eq!(call_native("ORD", &[Value::Str("bc".into())]), Ok(Value::Integer(98)));
        assert_eq!(call_native("CAP", &[Value::Str("abc".into())]), Ok(Value::Str("ABC".into())));
        assert_eq!(call_native("CAP", &[Value::Char('q')]), Ok(Value::Char('Q')));
    }

    #[test]
    fn numeric_natives() {
        assert_eq!(call_native("FLOAT", &[Value::Integer(3)]), Ok(Value::Real(3.0)));
        assert_eq!(call_native("TRUNC", &[Value::Real(-3.7)]), Ok(Value::Integer(-3)));
        assert_eq!(call_native("INC", &[Value::Integer(5)]), Ok(Value::Integer(6)));
        assert_eq!(
            call_native("DEC", &[Value::Integer(5), Value::Integer(3)]),
            Ok(Value::Integer(2))
        );
        assert_eq!(call_native("INC", &[Value::Char('a')]), Ok(Value::Char('b')));
    }

    #[test]
    fn type_natives() {
        let ty = |name: &str| Value::Str(name.to_string());
        assert_eq!(call_native("MAX", &[ty("INTEGER")]), Ok(Value::Integer(2147483647)));
        assert_eq!(call_native("MIN", &[ty("CARDINAL")]), Ok(Value::Integer(0)));
        assert_eq!(call_native("MAX", &[ty("CARDINAL")]), Ok(Value::Integer(65535)));
        assert_eq!(call_native("MAX", &[ty("REAL")]), Ok(Value::Real(f64::MAX)));
        assert_eq!(call_native("VAL", &[ty("INTEGER"), Value::Real(2.9)]), Ok(Value::Integer(2)));
        assert_eq!(call_native("VAL", &[ty("CHAR"), Value::Integer(66)]), Ok(Value::Char('B')));
        assert_eq!(call_native("VAL", &[ty("REAL"), Value::Integer(4)]), Ok(Value::Real(4.0)));
        assert!(call_native("VAL", &[ty("CARDINAL"), Value::Integer(-1)]).is_err());
        assert!(call_native("MAX", &[Value::Integer(1)]).is_err());
    }

    #[test]
    fn arity_is_enforced() {
        assert_eq!(
            call_native("CHR", &[]),
            Err(LibraryError::ArgumentCount {
                name: "CHR".into(),
                expected: "1".into(),
                got: 0
            })
        );
        let mut sink = Vec::new();
        assert!(call_terminal("WriteLn", &[Value::Integer(1)], &mut sink).is_err());
    }

    #[test]
    fn terminal_output() {
        assert_eq!(terminal("WriteString", &[Value::Str("hi".into())]), "hi");
        assert_eq!(terminal("WriteInt", &[Value::Integer(42), Value::Integer(5)]), "   42");
        assert_eq!(terminal("WriteCard", &[Value::Integer(-1), Value::Integer(0)]), "4294967295");
        assert_eq!(terminal("WriteReal", &[Value::Real(2.5)]), "2.5");
        assert_eq!(terminal("WriteChar", &[Value::Integer(72)]), "H");
        assert_eq!(terminal("WriteLn", &[]), "\n");
    }

    #[test]
    fn stepping_past_the_integer_range_is_an_error() {
        let min = Value::Integer(i64::MIN);
        assert!(matches!(
            call_native("DEC", &[Value::Integer(0), min.clone()]),
            Err(LibraryError::InvalidArgument { .. })
        ));
        assert_eq!(
            call_native("INC", &[Value::Integer(-1), min.clone()]),
            Err(invalid("INC", "integer overflow"))
        );
        assert_eq!(
            call_native("DEC", &[Value::Integer(-1), min.clone()]),
            Ok(Value::Integer(i64::MAX))
        );
        assert!(call_native("DEC", &[Value::Char('a'), min]).is_err());
        assert_eq!(
            call_native("DEC", &[Value::Char('c'), Value::Integer(2)]),
            Ok(Value::Char('a'))
        );
    }

    #[test]
    fn oversized_pad_is_rejected() {
        let mut sink = Vec::new();
        let err = call_terminal(
            "WriteInt",
            &[Value::Integer(1), Value::Integer(2_000_000_000_000)],
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument { .. }));
        assert!(sink.is_empty());
        assert_eq!(
            terminal("WriteInt", &[Value::Integer(1), Value::Integer(MAX_PAD as i64)]).len(),
            MAX_PAD
        );
    }

    #[test]
    fn only_terminal2_is_published() {
        assert_eq!(library_procedures("Terminal2").map(|p| p.len()), Some(6));
        assert!(library_procedures("InOut").is_none());
    }
}
