// End-to-end evaluation tests: programs run through the lexer, parser and
// evaluator with output captured in memory.

use pebble::error::{ErrorKind, PebbleError};
use pebble::evaluator::Evaluator;
use pebble::runner::{execute, global_scope};
use pebble::value::Value;
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

/// Writer whose contents stay readable after the evaluator takes ownership of a clone.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_with_input(source: &str, input: &str) -> (Result<Option<Value>, PebbleError>, String) {
    let buffer = SharedBuffer::default();
    let mut evaluator = Evaluator::with_io(
        global_scope(),
        Box::new(buffer.clone()),
        Box::new(Cursor::new(input.as_bytes().to_vec())),
    );
    let result = execute(source, "test.pb", &mut evaluator);
    let output = String::from_utf8(buffer.0.borrow().clone()).expect("utf-8 output");
    (result, output)
}

fn output_of(source: &str) -> String {
    let (result, output) = run_with_input(source, "");
    if let Err(error) = result {
        panic!("program failed:\n{}", error.as_string());
    }
    output
}

fn error_of(source: &str) -> PebbleError {
    match run_with_input(source, "").0 {
        Ok(_) => panic!("expected {:?} to fail", source),
        Err(error) => error,
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(output_of("puts(1 + 2 * 3);"), "7\n");
    assert_eq!(output_of("puts((1 + 2) * 3);"), "9\n");
    assert_eq!(output_of("puts(10 - 4 - 3);"), "3\n");
}

#[test]
fn variables_hold_their_values() {
    assert_eq!(output_of("let x = 5; puts(x);"), "5\n");
    assert_eq!(output_of("let a, b, c = 1, 2; puts(a, b, c);"), "122\n");
    assert_eq!(output_of("let z; puts(z);"), "0\n");
}

#[test]
fn string_subtraction_removes_occurrences() {
    assert_eq!(output_of("puts(\"ab\" - \"a\");"), "b\n");
    assert_eq!(output_of("puts(\"banana\" - \"an\");"), "ba\n");
}

#[test]
fn string_subtraction_that_empties_keeps_the_original() {
    assert_eq!(output_of("puts(\"aaa\" - \"a\");"), "aaa\n");
}

#[test]
fn for_loop_over_range_rebinds_the_variable() {
    assert_eq!(
        output_of("for (let i : range(3)) { puts(i); }"),
        "0\n1\n2\n"
    );
    assert_eq!(output_of("for (let c : \"ab\") { puts(c); }"), "a\nb\n");
}

#[test]
fn division_by_zero_points_at_the_divisor() {
    let error = error_of("puts(1 / 0);");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.message, "Division by zero");
    assert_eq!(error.span.start.column, 9);
    assert_eq!(error.span.end.column, 10);
    assert_eq!(
        error.as_string(),
        "Traceback (Most Recent Call Last):\n File test.pb, line 1, in <main>\n\
         Runtime Error: Division by zero\n\nputs(1 / 0);\n         ^"
    );
}

#[test]
fn modulo_by_zero_is_also_division_by_zero() {
    assert_eq!(error_of("let x = 0; puts(5 % x);").message, "Division by zero");
}

#[test]
fn closures_see_later_writes_to_captured_variables() {
    let source = "let outer = 1; let f = inline (x) -> x + outer; outer = 10; puts(f(1));";
    assert_eq!(output_of(source), "11\n");
}

#[test]
fn closures_capture_call_locals() {
    let source = "func adder(n) { ret inline (x) -> x + n; } let add2 = adder(2); puts(add2(3));";
    assert_eq!(output_of(source), "5\n");
}

#[test]
fn arity_mismatch_names_the_function_and_the_gap() {
    let error = error_of("func add(a, b) { ret a + b; } add(1);");
    assert_eq!(
        error.message,
        "Function 'add' requires 2 arguments, 1 provided, needs 1 more arguments"
    );

    let error = error_of("func add(a, b) { ret a + b; } add(1, 2, 3);");
    assert_eq!(error.message, "Function 'add' requires 2 arguments, 1 more provided");
}

#[test]
fn constants_are_immutable() {
    let error = error_of("const c = 1; c = 2;");
    assert_eq!(error.message, "Constant variable 'c' is immutable");

    let error = error_of("TRUE = 2;");
    assert_eq!(error.message, "Constant variable 'TRUE' is immutable");
}

#[test]
fn functions_are_hoisted_at_the_top_level() {
    assert_eq!(output_of("puts(twice(4)); func twice(n) { ret n * 2; }"), "8\n");
}

#[test]
fn recursion_and_early_return() {
    let source = "func fact(n) { if (n <= 1) { ret 1; } ret n * fact(n - 1); } puts(fact(10));";
    assert_eq!(output_of(source), "3628800\n");

    let source = "func first(l) { for (let x : l) { if (x > 1) { ret x; } } ret 0; } \
                  puts(first([1, 5, 7]));";
    assert_eq!(output_of(source), "5\n");
}

#[test]
fn deep_recursion_stops_at_the_call_depth_limit() {
    let source = "func down(n) { if (n == 0) { ret 0; } ret down(n - 1); } puts(down(500));";
    assert_eq!(output_of(source), "0\n");

    let error = error_of("func forever(n) { ret forever(n + 1); } forever(0);");
    assert_eq!(error.message, "Maximum recursion depth exceeded");
    assert!(error.as_string().contains("in forever"));
}

#[test]
fn huge_string_repetition_is_a_runtime_error() {
    let error = error_of("puts(\"ab\" * 9223372036854775807);");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.message, "Repeat count too large");
    assert_eq!(output_of("puts(\"ab\" * 3);"), "ababab\n");
}

#[test]
fn range_accepts_integral_floats_and_rejects_huge_bounds() {
    assert_eq!(output_of("puts(range(6 / 2));"), "[0, 1, 2]\n");
    assert_eq!(
        error_of("range(2.5);").message,
        "'range' function argument must be an integer"
    );
    assert!(error_of("range(9223372036854775807);")
        .message
        .starts_with("'range' argument must not exceed"));
}

#[test]
fn function_result_without_ret() {
    assert_eq!(output_of("func f() { 1 + 1; } puts(f());"), "2\n");
    assert_eq!(output_of("func g() { let x = 1; } puts(g());"), "null\n");
}

#[test]
fn numbers_keep_their_integer_or_float_form() {
    assert_eq!(output_of("puts(7 / 2); puts(4 / 2); puts(2 * 3);"), "3.5\n2.0\n6\n");
    assert_eq!(output_of("puts(-7 % 3); puts(0xbe, \" \", 0b101);"), "2\n190 5\n");
}

#[test]
fn integer_overflow_is_reported() {
    let error = error_of("puts(9223372036854775807 + 1);");
    assert_eq!(error.message, "Integer overflow");
}

#[test]
fn lists_concatenate_broadcast_and_index() {
    let source = "let l = [1, 2] .. [3]; puts(l); puts(l + 1); puts(#l); puts(l[2]);";
    assert_eq!(output_of(source), "[1, 2, 3]\n[2, 3, 4]\n3\n3\n");
    assert_eq!(output_of("puts([1, 2] + [10, 20]);"), "[11, 22]\n");
}

#[test]
fn mismatched_list_arithmetic_is_an_error() {
    assert!(error_of("puts([1, 2] + [1]);").message.contains("same size"));
}

#[test]
fn string_operations() {
    assert_eq!(output_of("puts(\"ab\" * 3, \"-\", \"x\" .. 1);"), "ababab-x1\n");
    assert_eq!(output_of("let s = \"abc\"; puts(s[1], #\"hello\");"), "b5\n");
}

#[test]
fn membership_and_equality() {
    assert_eq!(output_of("puts(2 in [1, 2, 3], \"z\" in \"abc\");"), "10\n");
    assert_eq!(output_of("puts([1, 2] == [1, 2], \"a\" != \"b\", 1 == 1.0);"), "111\n");
    assert_eq!(output_of("puts(1 && 0, 1 || 0, !0);"), "011\n");
}

#[test]
fn index_out_of_range_on_either_side() {
    assert_eq!(error_of("let l = [1]; puts(l[1]);").message, "Index out of range");
    assert_eq!(error_of("let l = [1]; puts(l[-1]);").message, "Index out of range");
}

#[test]
fn update_and_compound_assignment() {
    assert_eq!(output_of("let i = 0; i++; i++; i--; puts(i);"), "1\n");
    assert_eq!(
        output_of("let x = 10; x -= 3; x *= 2; x %= 5; puts(x);"),
        "4\n"
    );

    let error = error_of("let s = \"a\"; s++;");
    assert_eq!(error.message, "Variable 's' does not support update expression");
}

#[test]
fn while_and_if_chains() {
    assert_eq!(output_of("let n = 0; while (n < 3) { n += 1; } puts(n);"), "3\n");

    let source = "let x = 5; if (x < 3) { puts(\"small\"); } \
                  elif (x < 10) { puts(\"medium\"); } else { puts(\"large\"); }";
    assert_eq!(output_of(source), "medium\n");
}

#[test]
fn name_resolution_errors() {
    assert_eq!(error_of("puts(y);").message, "Unknown Variable or Function 'y'");
    assert_eq!(
        error_of("puts(x); let x = 1;").message,
        "Variable 'x' accessed before initialization"
    );
    assert_eq!(error_of("let x = 1; x();").message, "'1' is not callable");
}

#[test]
fn unsupported_operands_are_typed_errors() {
    assert_eq!(
        error_of("puts(1 + \"a\");").message,
        "Unsupported operation '+' between Number and String"
    );
}

#[test]
fn runtime_errors_inside_functions_carry_a_traceback() {
    let error = error_of("func f() { ret 1 / 0; }\nf();");
    assert!(error.as_string().starts_with(
        "Traceback (Most Recent Call Last):\n File test.pb, line 2, in <main>\n \
         File test.pb, line 1, in f\nRuntime Error: Division by zero"
    ));
}

#[test]
fn functions_display_with_their_names() {
    let source = "let sq = inline (x) -> x * x; puts(sq, sq(4)); puts(len);";
    assert_eq!(output_of(source), "<Function sq>16\n<Built-in function len>\n");
}

#[test]
fn postfix_chains_call_returned_functions() {
    let source = "func make() { ret inline (x) -> x * 10; } puts(make()(2));";
    assert_eq!(output_of(source), "20\n");
    assert_eq!(output_of("let m = [[1, 2], [3]]; puts(m[0][1]);"), "2\n");
}

#[test]
fn escapes_are_kept_as_text() {
    assert_eq!(output_of("puts(\"a\tb\");"), "a\\tb\n");
}

#[test]
fn predefined_constants() {
    assert_eq!(output_of("puts(TRUE, FALSE, NULL);"), "10null\n");
    assert_eq!(output_of("puts(MATH_PI > 3.14 && MATH_PI < 3.15);"), "1\n");
}

#[test]
fn type_inspection_builtins() {
    assert_eq!(
        output_of("puts(type(1), type(\"a\"), type([1]), type(len));"),
        "<Type Number><Type String><Type List><Type Function>\n"
    );
    assert_eq!(output_of("puts(is_number(1), is_string(1), is_list([]));"), "101\n");
}

#[test]
fn conversion_builtins() {
    assert_eq!(output_of("puts(to_number(\" 42 \") + 1);"), "43\n");
    assert_eq!(output_of("puts(to_number(\"2.5\"));"), "2.5\n");
    assert_eq!(output_of("puts(list(\"ab\"), string(12) .. \"!\");"), "[a, b]12!\n");
    assert_eq!(output_of("puts(len(\"hello\")); puts(len([1, 2])); puts(len(123));"), "5\n2\n3\n");

    assert_eq!(
        error_of("to_number([1]);").message,
        "Can not convert 'List' to Number."
    );
    assert_eq!(
        error_of("to_number(\"abc\");").message,
        "Can not convert 'abc' to type Number"
    );
    assert_eq!(
        error_of("range(\"a\");").message,
        "'range' function argument must be an integer"
    );
}

#[test]
fn input_and_prompt_read_lines() {
    let (result, output) = run_with_input("let name = input(); puts(\"hi \" .. name);", "bob\n");
    assert!(result.is_ok());
    assert_eq!(output, "hi bob\n");

    let (result, output) = run_with_input("let a = prompt(\"? \"); puts(a);", "x\n");
    assert!(result.is_ok());
    assert_eq!(output, "? x\n");
}

#[test]
fn random_stays_in_bounds() {
    for _ in 0..20 {
        assert_eq!(output_of("let r = random(6); puts(r >= 1 && r <= 6);"), "1\n");
    }
    assert_eq!(
        error_of("random(\"a\");").message,
        "'random' argument should be number"
    );
}

#[test]
fn program_value_is_the_last_expression() {
    let (result, _) = run_with_input("let x = 2; x * 21;", "");
    let value = result.ok().flatten().map(|v| v.to_string());
    assert_eq!(value.as_deref(), Some("42"));
}
