use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Char(char),
    Str(String),
    /// Declared but never assigned.
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{:?}", r),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Char(c) => write!(f, "{}", c),
            Value::Str(s) => write!(f, "{}", s),
            Value::Null => write!(f, "NIL"),
        }
    }
}

fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix(&['-', '+'][..]).unwrap_or(text);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Char(_) => "CHAR",
            Value::Str(_) => "STRING",
            Value::Null => "NIL",
        }
    }

    /// Coerces literal text: integer, then real, then a quoted single
    /// character, otherwise the text with surrounding quotes removed.
    pub fn from_text(text: &str) -> Value {
        if looks_numeric(text) {
            if let Ok(n) = text.parse::<i64>() {
                return Value::Integer(n);
            }
            if let Ok(r) = text.parse::<f64>() {
                return Value::Real(r);
            }
        }
        for quote in ['\'', '"'] {
            if let Some(inner) = text
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
            {
                let mut chars = inner.chars();
                return match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => Value::Str(inner.to_string()),
                };
            }
        }
        Value::Str(text.to_string())
    }

    /// Coerces one line typed at a `?x` prompt.
    pub fn from_input(line: &str) -> Value {
        match line.trim() {
            "TRUE" => Value::Boolean(true),
            "FALSE" => Value::Boolean(false),
            text => Value::from_text(text),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Integer view used for array indices, CASE selectors and ordinals.
    pub fn as_ordinal(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Char(c) => Some(*c as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Char(_))
    }

    /// Adjusts a value to the variable it is stored in: integers assigned to
    /// a `REAL` become reals.
    pub fn conform(self, declared_type: &str) -> Value {
        match self {
            Value::Integer(n) if crate::types::is_real_type(declared_type) => Value::Real(n as f64),
            other => other,
        }
    }
}
