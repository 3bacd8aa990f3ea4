use std::fmt;

/// Coarse static classification used by the analyzer in place of concrete
/// declared types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeGroup {
    Numeric,
    Boolean,
    Str,
    Char,
    /// A type name used as a value, e.g. the argument of `MAX(INTEGER)`.
    Type,
}

impl fmt::Display for TypeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeGroup::Numeric => "NUMERIC",
            TypeGroup::Boolean => "BOOLEAN",
            TypeGroup::Str => "STRING",
            TypeGroup::Char => "CHAR",
            TypeGroup::Type => "TYPE",
        };
        write!(f, "{}", name)
    }
}

pub const TYPE_NAMES: [&str; 8] = [
    "INTEGER", "CARDINAL", "LONGINT", "REAL", "LONGREAL", "BOOLEAN", "CHAR", "STRING",
];

pub fn is_type_name(name: &str) -> bool {
    TYPE_NAMES.contains(&name)
}

/// Group of a declared type name, `None` for names that are not types.
pub fn group_of(type_name: &str) -> Option<TypeGroup> {
    match type_name {
        "INTEGER" | "CARDINAL" | "LONGINT" | "REAL" | "LONGREAL" => Some(TypeGroup::Numeric),
        "BOOLEAN" => Some(TypeGroup::Boolean),
        "CHAR" => Some(TypeGroup::Char),
        "STRING" => Some(TypeGroup::Str),
        _ => None,
    }
}

pub fn is_real_type(type_name: &str) -> bool {
    matches!(type_name, "REAL" | "LONGREAL")
}

/// How the analyzer infers the group of a built-in call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Nothing,
    Group(TypeGroup),
    /// Group named by the leading type argument (`VAL`, `MIN`, `MAX`).
    TypeArgument,
    /// Same group as the first argument (`CAP`, `INC`, `DEC`).
    FirstArgument,
}

/// Fixed signature of a built-in: allowed groups per position, of which the
/// first `required` must be supplied.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub params: &'static [&'static [TypeGroup]],
    pub required: usize,
    pub returns: Returns,
}

impl Signature {
    pub const fn new(
        params: &'static [&'static [TypeGroup]],
        required: usize,
        returns: Returns,
    ) -> Self {
        Signature {
            params,
            required,
            returns,
        }
    }

    pub fn accepts_count(&self, count: usize) -> bool {
        count >= self.required && count <= self.params.len()
    }

    pub fn arity(&self) -> String {
        if self.required == self.params.len() {
            self.required.to_string()
        } else {
            format!("{} to {}", self.required, self.params.len())
        }
    }
}

const NUMERIC: &[TypeGroup] = &[TypeGroup::Numeric];
const ORDINAL: &[TypeGroup] = &[TypeGroup::Numeric, TypeGroup::Char];
const TEXT: &[TypeGroup] = &[TypeGroup::Char, TypeGroup::Str];
const TYPE: &[TypeGroup] = &[TypeGroup::Type];
const ANY: &[TypeGroup] = &[
    TypeGroup::Numeric,
    TypeGroup::Boolean,
    TypeGroup::Char,
    TypeGroup::Str,
];

pub const NATIVE_NAMES: [&str; 10] = [
    "CHR", "FLOAT", "TRUNC", "ORD", "CAP", "VAL", "INC", "DEC", "MIN", "MAX",
];

pub fn native_signature(name: &str) -> Option<Signature> {
    let signature = match name {
        "CHR" => Signature::new(&[NUMERIC], 1, Returns::Group(TypeGroup::Char)),
        "FLOAT" | "TRUNC" => Signature::new(&[NUMERIC], 1, Returns::Group(TypeGroup::Numeric)),
        "ORD" => Signature::new(&[TEXT], 1, Returns::Group(TypeGroup::Numeric)),
        "CAP" => Signature::new(&[TEXT], 1, Returns::FirstArgument),
        "VAL" => Signature::new(&[TYPE, ANY], 2, Returns::TypeArgument),
        "INC" | "DEC" => Signature::new(&[ORDINAL, NUMERIC], 1, Returns::FirstArgument),
        "MIN" | "MAX" => Signature::new(&[TYPE], 1, Returns::TypeArgument),
        _ => return None,
    };
    Some(signature)
}

pub fn is_native(name: &str) -> bool {
    NATIVE_NAMES.contains(&name)
}
