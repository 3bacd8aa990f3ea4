use crate::ast::{Block, Dimensions, Expr, Procedure, Stmt, VarDecl};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub declared_type: String,
}

impl Variable {
    pub fn declared(declared_type: &str) -> Self {
        Variable {
            value: Value::Null,
            declared_type: declared_type.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArrayError {
    #[error("Array {name} has {expected} dimensions but {got} indices were given")]
    DimensionMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("Index {index} is out of range for dimension {dimension} of array {name}")]
    OutOfRange {
        name: String,
        dimension: usize,
        index: i64,
    },
}

/// Sparse array keyed by the full tuple of indices. Unset cells read as `NIL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub name: String,
    pub dimensions: Dimensions,
    pub element_type: String,
    storage: BTreeMap<Vec<i64>, Value>,
}

impl Array {
    pub fn new(name: &str, element_type: &str, dimensions: Dimensions) -> Self {
        Array {
            name: name.to_string(),
            dimensions,
            element_type: element_type.to_string(),
            storage: BTreeMap::new(),
        }
    }

    fn check_key(&self, key: &[i64]) -> Result<(), ArrayError> {
        if key.len() != self.dimensions.len() {
            return Err(ArrayError::DimensionMismatch {
                name: self.name.clone(),
                expected: self.dimensions.len(),
                got: key.len(),
            });
        }
        for (dimension, index) in key.iter().enumerate() {
            let in_range = self
                .dimensions
                .get(&dimension)
                .is_some_and(|range| range.contains(index));
            if !in_range {
                return Err(ArrayError::OutOfRange {
                    name: self.name.clone(),
                    dimension,
                    index: *index,
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &[i64]) -> Result<Value, ArrayError> {
        self.check_key(key)?;
        Ok(self.storage.get(key).cloned().unwrap_or(Value::Null))
    }

    /// The stored cell, without falling back to `NIL`.
    pub fn lookup(&self, key: &[i64]) -> Option<&Value> {
        self.storage.get(key)
    }

    pub fn set(&mut self, key: Vec<i64>, value: Value) -> Result<(), ArrayError> {
        self.check_key(&key)?;
        let value = value.conform(&self.element_type);
        self.storage.insert(key, value);
        Ok(())
    }

    pub fn cells(&self) -> impl Iterator<Item = (&Vec<i64>, &Value)> {
        self.storage.iter()
    }
}

/// Process-wide bindings: everything declared at module level.
#[derive(Debug, Default)]
pub struct GlobalScope {
    pub module_name: Option<String>,
    /// Library name to the procedure names imported from it.
    pub imports: BTreeMap<String, Vec<String>>,
    pub constants: HashMap<String, Expr>,
    pub variables: BTreeMap<String, Variable>,
    pub arrays: BTreeMap<String, Array>,
    pub procedures: HashMap<String, Rc<Procedure>>,
}

impl GlobalScope {
    pub fn new(block: &Block) -> Self {
        let mut scope = GlobalScope::default();
        for stmt in &block.statements {
            match stmt {
                Stmt::Module(name) => scope.module_name = Some(name.lexeme.clone()),
                Stmt::Import(library, names) => scope
                    .imports
                    .entry(library.lexeme.clone())
                    .or_default()
                    .extend(names.iter().map(|n| n.lexeme.clone())),
                Stmt::Const(name, value) => {
                    scope.constants.insert(name.lexeme.clone(), value.clone());
                }
                Stmt::Var(VarDecl {
                    name,
                    declared_type,
                }) => {
                    scope.variables.insert(
                        name.lexeme.clone(),
                        Variable::declared(&declared_type.lexeme),
                    );
                }
                Stmt::VarArray(name, element, dimensions) => {
                    scope.arrays.insert(
                        name.lexeme.clone(),
                        Array::new(&name.lexeme, &element.lexeme, dimensions.clone()),
                    );
                }
                Stmt::Procedure(proc) => {
                    scope
                        .procedures
                        .insert(proc.name.lexeme.clone(), Rc::clone(proc));
                }
                _ => {}
            }
        }
        scope
    }

    pub fn is_imported(&self, name: &str) -> bool {
        self.imports
            .values()
            .any(|names| names.iter().any(|n| n == name))
    }

    /// Final state as `name = value` lines: scalars by name, then array
    /// cells by name and index tuple.
    pub fn dump(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .variables
            .iter()
            .map(|(name, var)| format!("{} = {}", name, var.value))
            .collect();
        for (name, array) in &self.arrays {
            for (key, value) in array.cells() {
                let index: String = key.iter().map(|i| format!("[{}]", i)).collect();
                lines.push(format!("{}{} = {}", name, index, value));
            }
        }
        lines
    }
}

pub type ScopeRef = Rc<RefCell<CallScope>>;

/// Bindings of one procedure activation.
#[derive(Debug)]
pub struct CallScope {
    pub procedure: Rc<Procedure>,
    pub variables: HashMap<String, Variable>,
    pub arrays: HashMap<String, Array>,
    /// Parameter names in positional order.
    pub params: Vec<String>,
    /// Every nested procedure reachable from this activation, flattened.
    /// Entries are shared, not copied, so a nested procedure keeps its
    /// locals between calls.
    pub nested: HashMap<String, ScopeRef>,
}

impl CallScope {
    pub fn new(procedure: &Rc<Procedure>) -> Self {
        let mut scope = CallScope {
            procedure: Rc::clone(procedure),
            variables: HashMap::new(),
            arrays: HashMap::new(),
            params: Vec::new(),
            nested: HashMap::new(),
        };

        for param in &procedure.params {
            scope.params.push(param.name.lexeme.clone());
            scope.variables.insert(
                param.name.lexeme.clone(),
                Variable::declared(&param.declared_type.lexeme),
            );
        }

        for stmt in &procedure.body {
            match stmt {
                Stmt::Var(decl) => {
                    scope.variables.insert(
                        decl.name.lexeme.clone(),
                        Variable::declared(&decl.declared_type.lexeme),
                    );
                }
                Stmt::VarArray(name, element, dimensions) => {
                    scope.arrays.insert(
                        name.lexeme.clone(),
                        Array::new(&name.lexeme, &element.lexeme, dimensions.clone()),
                    );
                }
                Stmt::Procedure(nested) => {
                    let child = CallScope::new(nested);
                    let inherited: Vec<(String, ScopeRef)> = child
                        .nested
                        .iter()
                        .map(|(name, scope)| (name.clone(), Rc::clone(scope)))
                        .collect();
                    scope
                        .nested
                        .insert(nested.name.lexeme.clone(), Rc::new(RefCell::new(child)));
                    scope.nested.extend(inherited);
                }
                _ => {}
            }
        }
        scope
    }

    /// Binds argument values to the parameters in declaration order.
    pub fn bind(&mut self, values: Vec<Value>) {
        for (param, value) in self.params.iter().zip(values) {
            if let Some(var) = self.variables.get_mut(param) {
                var.value = value.conform(&var.declared_type);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.procedure.name.lexeme
    }

    pub fn into_ref(self) -> ScopeRef {
        Rc::new(RefCell::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_module;
    use std::collections::BTreeSet;

    fn block(source: &str) -> Block {
        parse_module(tokenize(source).tokens).expect("valid module")
    }

    fn range(from: i64, to: i64) -> BTreeSet<i64> {
        (from..=to).collect()
    }

    #[test]
    fn array_cells_are_sparse_and_checked() {
        let mut dims = Dimensions::new();
        dims.insert(0, range(1, 3));
        let mut array = Array::new("a", "INTEGER", dims);

        array.set(vec![2], Value::Integer(5)).expect("in range");
        assert_eq!(array.get(&[2]), Ok(Value::Integer(5)));
        assert_eq!(array.get(&[1]), Ok(Value::Null));
        assert_eq!(
            array.get(&[4]),
            Err(ArrayError::OutOfRange {
                name: "a".into(),
                dimension: 0,
                index: 4
            })
        );
        assert!(matches!(
            array.get(&[1, 1]),
            Err(ArrayError::DimensionMismatch { expected: 1, got: 2, .. })
        ));
    }

    #[test]
    fn real_arrays_store_reals() {
        let mut dims = Dimensions::new();
        dims.insert(0, range(0, 1));
        let mut array = Array::new("r", "REAL", dims);
        array.set(vec![0], Value::Integer(2)).expect("in range");
        assert_eq!(array.lookup(&[0]), Some(&Value::Real(2.0)));
    }

    #[test]
    fn global_scope_collects_declarations() {
        let globals = GlobalScope::new(&block(
            "MODULE G;
             FROM Terminal2 IMPORT WriteInt;
             CONST k = 3;
             VAR x: INTEGER; m: [0..1][0..1] OF CHAR;
             PROCEDURE P; BEGIN END P;
             BEGIN END G.",
        ));
        assert_eq!(globals.module_name.as_deref(), Some("G"));
        assert!(globals.is_imported("WriteInt"));
        assert!(!globals.is_imported("WriteLn"));
        assert!(globals.constants.contains_key("k"));
        assert_eq!(globals.variables["x"], Variable::declared("INTEGER"));
        assert_eq!(globals.arrays["m"].dimensions.len(), 2);
        assert!(globals.procedures.contains_key("P"));
    }

    #[test]
    fn dump_is_sorted() {
        let mut globals = GlobalScope::new(&block(
            "MODULE D; VAR b, a: INTEGER; arr: [1..2] OF INTEGER; BEGIN END D.",
        ));
        if let Some(var) = globals.variables.get_mut("a") {
            var.value = Value::Integer(1);
        }
        if let Some(arr) = globals.arrays.get_mut("arr") {
            arr.set(vec![2], Value::Integer(7)).expect("in range");
            arr.set(vec![1], Value::Integer(6)).expect("in range");
        }
        assert_eq!(
            globals.dump(),
            vec!["a = 1", "b = NIL", "arr[1] = 6", "arr[2] = 7"]
        );
    }

    #[test]
    fn arguments_bind_in_parameter_order() {
        let globals = GlobalScope::new(&block(
            "MODULE B; PROCEDURE P(a: INTEGER; r: REAL; b: INTEGER); BEGIN END P; BEGIN END B.",
        ));
        let mut scope = CallScope::new(&globals.procedures["P"]);
        scope.bind(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(scope.variables["a"].value, Value::Integer(1));
        assert_eq!(scope.variables["r"].value, Value::Real(2.0));
        assert_eq!(scope.variables["b"].value, Value::Integer(3));
    }

    #[test]
    fn call_scope_flattens_nested_procedures() {
        let globals = GlobalScope::new(&block(
            "MODULE N;
             PROCEDURE Outer(p: INTEGER);
               VAR local: REAL;
               PROCEDURE Middle;
                 PROCEDURE Inner; BEGIN END Inner;
               BEGIN END Middle;
             BEGIN END Outer;
             BEGIN END N.",
        ));
        let scope = CallScope::new(&globals.procedures["Outer"]);
        assert_eq!(scope.name(), "Outer");
        assert_eq!(scope.params, vec!["p".to_string()]);
        assert!(scope.variables.contains_key("local"));
        let mut nested: Vec<_> = scope.nested.keys().cloned().collect();
        nested.sort();
        assert_eq!(nested, vec!["Inner", "Middle"]);

        // The flattened entry is the same scope Middle sees.
        let middle = scope.nested["Middle"].borrow();
        assert!(Rc::ptr_eq(&middle.nested["Inner"], &scope.nested["Inner"]));
    }
}
