use super::{
    benchmark_functions, extract_instance_test_name, find_all_test_suite_runs, test_function_debug_args,
    test_functions, GoOutline, SymbolKind, SymbolProvider,
};

const CHECK_SUITE: &str = r#"package main_test

import (
	"io"
	"testing"

	. "gopkg.in/check.v1"
)

// Hook up gocheck into the "go test" runner.
func Test(t *testing.T) { TestingT(t) }

type MySuite struct{}

var _ = Suite(&MySuite{})

func (s *MySuite) TestHelloWorld(c *C) {
	c.Assert(io.ErrClosedPipe, ErrorMatches, "io: .*on closed pipe")
	c.Check(42, Equals, 42)
}

func (s MySuite) helper() {
}
"#;

const TESTIFY_SUITE: &str = r#"package widgets

import "testing"

func TestWidgets(t *testing.T) {
	suite.Run(t, new(WidgetSuite))
}

func TestPlain(t *testing.T) {
	if 1 != 1 {
		t.Fatal("math")
	}
}

func ExampleWidget() {
}

func BenchmarkWidget(b *testing.B) {
	for i := 0; i < b.N; i++ {
	}
}
"#;

fn names(symbols: &[super::DocumentSymbol]) -> Vec<&str> {
    symbols.iter().map(|symbol| symbol.name.as_str()).collect()
}

#[test]
fn outline_lists_imports_and_functions_in_order() {
    let symbols = GoOutline.provide_symbols(CHECK_SUITE);
    assert_eq!(
        names(&symbols),
        vec![
            "\"io\"",
            "\"testing\"",
            "\"gopkg.in/check.v1\"",
            "Test",
            "(*MySuite).TestHelloWorld",
            "(MySuite).helper",
        ]
    );
    assert_eq!(symbols[0].kind, SymbolKind::Namespace);
    assert_eq!(symbols[3].kind, SymbolKind::Function);
}

#[test]
fn outline_ranges_cover_the_function_body() {
    let symbols = GoOutline.provide_symbols(CHECK_SUITE);
    let method = &symbols[4];
    let body = &CHECK_SUITE[method.range.clone()];
    assert!(body.starts_with("func (s *MySuite) TestHelloWorld"));
    assert!(body.ends_with('}'));
    assert!(body.contains("c.Check(42, Equals, 42)"));
}

#[test]
fn suite_methods_count_as_tests_only_with_check_import() {
    let symbols = GoOutline.provide_symbols(CHECK_SUITE);
    assert_eq!(
        names(&test_functions(&symbols)),
        vec!["Test", "(*MySuite).TestHelloWorld"]
    );

    let without_import = CHECK_SUITE.replace(". \"gopkg.in/check.v1\"", "");
    let symbols = GoOutline.provide_symbols(&without_import);
    assert_eq!(names(&test_functions(&symbols)), vec!["Test"]);
}

#[test]
fn tests_examples_and_benchmarks_are_separated() {
    let symbols = GoOutline.provide_symbols(TESTIFY_SUITE);
    assert_eq!(
        names(&test_functions(&symbols)),
        vec!["TestWidgets", "TestPlain", "ExampleWidget"]
    );
    assert_eq!(names(&benchmark_functions(&symbols)), vec!["BenchmarkWidget"]);
}

#[test]
fn suite_runs_are_found_by_dispatch_call() {
    let symbols = GoOutline.provide_symbols(TESTIFY_SUITE);
    let tests = test_functions(&symbols);
    let runs = find_all_test_suite_runs(TESTIFY_SUITE, &tests);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].name, "TestWidgets");
}

#[test]
fn instance_test_name_is_extracted_from_suite_methods() {
    assert_eq!(extract_instance_test_name("(*S).TestFoo"), Some("TestFoo"));
    assert_eq!(extract_instance_test_name("(S).TestFoo"), Some("TestFoo"));
    assert_eq!(extract_instance_test_name("TestBar"), None);
    assert_eq!(extract_instance_test_name("(*S).helper"), None);
}

#[test]
fn debug_args_depend_on_function_kind() {
    assert_eq!(
        test_function_debug_args("BenchmarkX"),
        vec!["-test.bench", "^BenchmarkX$", "-test.run", "a^"]
    );
    assert_eq!(
        test_function_debug_args("(*S).TestFoo"),
        vec!["-check.f", "^TestFoo$"]
    );
    assert_eq!(
        test_function_debug_args("TestBar"),
        vec!["-test.run", "^TestBar$"]
    );
}
