use std::io::Cursor;

use modula::interpreter::RuntimeError;
use modula::{run_source, Error, Options};
use pretty_assertions::assert_eq;

struct Outcome {
    dump: Vec<String>,
    output: String,
}

fn run(src: &str, input: &str) -> Result<Outcome, Error> {
    let mut out = Vec::new();
    let mut input = Cursor::new(input.as_bytes().to_vec());
    let globals = run_source(src, &Options::default(), &mut out, &mut input)?;
    Ok(Outcome {
        dump: globals.dump(),
        output: String::from_utf8_lossy(&out).into_owned(),
    })
}

fn assert_success(src: &str) -> Outcome {
    match run(src, "") {
        Ok(outcome) => outcome,
        Err(e) => panic!("Program failed: {e}"),
    }
}

fn assert_failure(src: &str) -> Error {
    match run(src, "") {
        Ok(_) => panic!("Program succeeded but was expected to fail"),
        Err(e) => e,
    }
}

const CASES: &str = "
MODULE Cases;
FROM Terminal2 IMPORT WriteString;
VAR x: INTEGER;
BEGIN
  x := {};
  CASE x OF
    1: WriteString('A')
  | 2..4: WriteString('B')
  ELSE WriteString('C')
  END
END Cases.
";

#[test]
fn operators_fold_left_to_right() {
    let outcome = assert_success("MODULE P; VAR x: INTEGER; BEGIN x := 2 + 3 * 4 END P.");
    assert_eq!(outcome.dump, vec!["x = 20"]);

    let outcome = assert_success("MODULE P; VAR x: INTEGER; BEGIN x := 2 + (3 * 4) END P.");
    assert_eq!(outcome.dump, vec!["x = 14"]);
}

#[test]
fn runs_are_deterministic() {
    let src = "
MODULE Twice;
FROM Terminal2 IMPORT WriteInt, WriteLn;
VAR i, total: INTEGER; grid: [1..2][1..2] OF INTEGER;
BEGIN
  total := 0;
  FOR i := 1 TO 2 DO
    grid[i][i] := i * 10;
    total := total + i;
    WriteInt(total, 3); WriteLn
  END
END Twice.
";
    let first = assert_success(src);
    let second = assert_success(src);
    assert_eq!(first.dump, second.dump);
    assert_eq!(first.output, second.output);
    assert_eq!(first.output, "  1\n  3\n");
}

#[test]
fn array_cells_and_range_errors() {
    let outcome = assert_success(
        "MODULE Arr; VAR a: [1..3] OF INTEGER; x: INTEGER; BEGIN a[2] := 5; x := a[2] END Arr.",
    );
    assert_eq!(outcome.dump, vec!["x = 5", "a[2] = 5"]);

    let err = assert_failure(
        "MODULE Arr; VAR a: [1..3] OF INTEGER; x: INTEGER; BEGIN x := a[4] END Arr.",
    );
    assert!(matches!(err, Error::Runtime(RuntimeError::Array { .. })));
    assert_eq!(
        err.to_string(),
        "[line 1] Error: Index 4 is out of range for dimension 0 of array a"
    );
}

#[test]
fn for_loops_count_both_ways() {
    let up = assert_success(
        "MODULE Up; FROM Terminal2 IMPORT WriteInt; VAR i, n: INTEGER;
         BEGIN n := 0; FOR i := 1 TO 5 DO WriteInt(i, 0); n := n + 1 END END Up.",
    );
    assert_eq!(up.output, "12345");
    assert!(up.dump.contains(&"n = 5".to_string()));

    let down = assert_success(
        "MODULE Down; FROM Terminal2 IMPORT WriteInt; VAR i, n: INTEGER;
         BEGIN n := 0; FOR i := 5 TO 1 BY -1 DO WriteInt(i, 0); n := n + 1 END END Down.",
    );
    assert_eq!(down.output, "54321");
    assert!(down.dump.contains(&"n = 5".to_string()));
}

#[test]
fn case_picks_matching_branch_or_default() {
    let pick = |x: i64| assert_success(&CASES.replace("{}", &x.to_string())).output;
    assert_eq!(pick(3), "B");
    assert_eq!(pick(1), "A");
    assert_eq!(pick(99), "C");
}

#[test]
fn recursion_gets_fresh_activations() {
    let outcome = assert_success(
        "
MODULE Factorial;
FROM Terminal2 IMPORT WriteInt, WriteLn;
VAR result: INTEGER;

PROCEDURE Fact(n: INTEGER);
BEGIN
  IF n <= 1 THEN
    result := 1
  ELSE
    Fact(n - 1);
    result := result * n
  END;
  WriteInt(n, 0); WriteLn
END Fact;

BEGIN
  Fact(5)
END Factorial.
",
    );
    assert_eq!(outcome.output, "1\n2\n3\n4\n5\n");
    assert_eq!(outcome.dump, vec!["result = 120"]);
}

#[test]
fn redeclaration_fails_before_running() {
    let err = assert_failure(
        "MODULE Dup; FROM Terminal2 IMPORT WriteLn;
         CONST x = 1; VAR x: INTEGER;
         BEGIN WriteLn END Dup.",
    );
    assert!(matches!(err, Error::Semantic(_)));
    assert_eq!(
        err.to_string(),
        "[line 2] Error at 'x': Variable x is already declared"
    );

    let err = assert_failure("MODULE Dup; VAR a: [0..1] OF CHAR; a: CHAR; BEGIN END Dup.");
    assert!(matches!(err, Error::Semantic(_)));
}

#[test]
fn assignment_updates_global_and_local() {
    let outcome = assert_success(
        "
MODULE Dual;
VAR x: INTEGER;
PROCEDURE Bump(x: INTEGER);
BEGIN
  x := x + 1
END Bump;
BEGIN
  x := 10;
  Bump(1)
END Dual.
",
    );
    assert_eq!(outcome.dump, vec!["x = 2"]);
}

#[test]
fn nested_procedure_locals_persist() {
    let outcome = assert_success(
        "
MODULE Nest;
VAR first: BOOLEAN; seen: INTEGER;

PROCEDURE Outer;
  PROCEDURE Counter;
    VAR count: INTEGER;
  BEGIN
    IF first THEN count := 0; first := FALSE END;
    count := count + 1;
    seen := count
  END Counter;
BEGIN
  Counter; Counter; Counter
END Outer;

BEGIN
  first := TRUE;
  Outer
END Nest.
",
    );
    assert_eq!(outcome.dump, vec!["first = FALSE", "seen = 3"]);
}

#[test]
fn nested_procedure_parameters_are_not_rebound() {
    let outcome = assert_success(
        "
MODULE Params;
PROCEDURE Outer;
  PROCEDURE Inner(k: INTEGER);
  BEGIN
    !k;
    k := 7
  END Inner;
BEGIN
  Inner(1);
  Inner(2)
END Outer;

BEGIN
  Outer
END Params.
",
    );
    assert_eq!(outcome.output, "NIL\n7\n");
}

#[test]
fn expression_call_uses_the_callers_bindings() {
    let outcome = assert_success(
        "
MODULE Expr;
VAR g, y: INTEGER;

PROCEDURE Record(n: INTEGER): INTEGER;
BEGIN
  g := n;
  RETURN n
END Record;

PROCEDURE Caller;
  VAR n: INTEGER;
BEGIN
  n := 3;
  y := Record(5)
END Caller;

BEGIN
  Caller
END Expr.
",
    );
    assert_eq!(outcome.dump, vec!["g = 3", "y = NIL"]);
}

#[test]
fn stepping_below_the_range_fails_cleanly() {
    let err = assert_failure("MODULE P; VAR x: LONGINT; BEGIN x := 0; DEC(x, MIN(LONGINT)) END P.");
    assert!(matches!(err, Error::Runtime(RuntimeError::Library { .. })));
}

#[test]
fn for_loop_may_end_at_the_largest_integer() {
    let outcome = assert_success(
        "MODULE Edge; VAR i, n: LONGINT;
         BEGIN n := 0; FOR i := MAX(LONGINT) - 1 TO MAX(LONGINT) DO n := n + 1 END END Edge.",
    );
    assert!(outcome.dump.contains(&"n = 2".to_string()));
}

#[test]
fn read_and_write_statements() {
    let outcome = run(
        "MODULE IO; VAR x: INTEGER; r: REAL; BEGIN ?x; ?r; !x; !r END IO.",
        "42\n2.5\n",
    )
    .expect("program runs");
    assert_eq!(outcome.output, "42\n2.5\n");
    assert_eq!(outcome.dump, vec!["r = 2.5", "x = 42"]);
}

#[test]
fn native_statement_leaves_result_variable() {
    let outcome = assert_success("MODULE N; VAR n: INTEGER; BEGIN n := 1; INC(n) END N.");
    assert_eq!(outcome.dump, vec!["INC = 2", "n = 1"]);
}

#[test]
fn real_variables_hold_reals() {
    let outcome = assert_success(
        "MODULE R; VAR r: REAL; c: CHAR; BEGIN r := 1; c := CHR(65) END R.",
    );
    assert_eq!(outcome.dump, vec!["c = A", "r = 1.0"]);
}

#[test]
fn unterminated_comment_is_lexical() {
    let err = assert_failure("MODULE C; (* never closed\nBEGIN END C.");
    assert!(matches!(err, Error::Lex(_)));
}
