// ABOUTME: Trybuild runner for compile-time type safety tests.
// ABOUTME: Verifies that invalid type usage fails to compile.

#[test]
fn id_types_not_interchangeable() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/id_not_interchangeable.rs");
}

#[test]
fn create_not_available_before_clear() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/create_before_clear.rs");
}

#[test]
fn discard_not_available_on_ready() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/discard_after_ready.rs");
}
