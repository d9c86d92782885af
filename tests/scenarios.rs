//! End-to-end tests running whole programs through the public pipeline,
//! covering the worked scenarios a Lox implementation is expected to get
//! right: arithmetic, string coercion, recursion, closures, inheritance,
//! initializers, division by zero, block scoping, and nested comments.

use lox::{run_source, Reporter, Source};

fn run(source: &str) -> (String, bool, bool) {
    let mut reporter = Reporter::new(Vec::new());
    run_source(Source::line(source), &mut reporter);
    let output = String::from_utf8(reporter.sink.clone()).expect("interpreter only writes UTF-8 text");
    (output, reporter.had_error(), reporter.had_runtime_error())
}

#[test]
fn addition() {
    let (out, had_error, had_runtime) = run("var a = 1; var b = 2; print a + b;");
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "3\n");
}

#[test]
fn string_coerces_number_on_plus() {
    let (out, had_error, had_runtime) = run(r#"var x = "hi "; x = x + 42; print x;"#);
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "hi 42\n");
}

#[test]
fn recursive_fibonacci() {
    let (out, had_error, had_runtime) = run(
        "fun fib(n) { if (n < 2) return n; return fib(n-1) + fib(n-2); } print fib(10);",
    );
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "55\n");
}

#[test]
fn closures_capture_shared_mutable_state() {
    let (out, had_error, had_runtime) = run(
        "fun make() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
         var c = make(); print c(); print c(); print c();",
    );
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn super_call_chains_into_the_parent_method() {
    let (out, had_error, had_runtime) = run(
        "class A { greet() { print \"hi\"; } } \
         class B < A { greet() { super.greet(); print \"there\"; } } \
         B().greet();",
    );
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "hi\nthere\n");
}

#[test]
fn initializer_sets_fields_and_returns_the_instance() {
    let (out, had_error, had_runtime) = run(
        "class P { init(x) { this.x = x; } } var p = P(7); print p.x;",
    );
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "7\n");
}

#[test]
fn returning_a_value_from_init_is_a_resolver_error() {
    let (_, had_error, _) = run("class P { init(x) { this.x = x; return x; } }");
    assert!(had_error);
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let (out, had_error, had_runtime) = run("print 1/0;");
    assert!(!had_error);
    assert!(had_runtime);
    assert!(out.contains("Cannot divide by 0"));
}

#[test]
fn nested_blocks_shadow_and_restore_outer_bindings() {
    let (out, had_error, had_runtime) =
        run(r#"var a = "outer"; { var a = "inner"; print a; } print a;"#);
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "inner\nouter\n");
}

#[test]
fn nested_block_comments_scan_as_a_single_comment() {
    let (out, had_error, had_runtime) = run("/* a /* b */ c */ print 1;");
    assert!(!had_error && !had_runtime);
    assert_eq!(out, "1\n");
}
