//! Data binding, system variables and donedata error handling.

use scxmlrt::builder::DocumentBuilder;
use scxmlrt::executable_content::{Action, If};
use scxmlrt::fsm::{BindingType, Parameter};
use scxmlrt::test::run_test;

/// With late binding a state-local \<data\> is unbound until the state is
/// entered for the first time.
#[test]
fn late_binding_assigns_on_first_entry() {
    let mut b = DocumentBuilder::new("late_binding");
    b.binding(BindingType::Late);
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    b.data_expr(Some(s1), "x", "'fromS1'");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");

    b.transition(s0, "", Some("!isDefined(x)"), &[s1]);
    b.transition(s0, "", None, &[fail]);
    b.transition(s1, "", Some("x == 'fromS1'"), &[pass]);
    b.transition(s1, "", None, &[fail]);

    assert!(run_test(
        "late_binding_assigns_on_first_entry",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// With early binding all \<data\> of the document is bound at start.
#[test]
fn early_binding_assigns_all_data_at_start() {
    let mut b = DocumentBuilder::new("early_binding");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    b.data_expr(Some(s1), "x", "'fromS1'");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.transition(s0, "", Some("x == 'fromS1'"), &[pass]);
    b.transition(s0, "", None, &[fail]);
    let _ = s1;

    assert!(run_test(
        "early_binding_assigns_all_data_at_start",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// Writing a system variable raises "error.execution"; "_name" carries
/// the document name.
#[test]
fn system_variables_are_read_only() {
    let mut b = DocumentBuilder::new("sysvars");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(s0, vec![Action::assign("_sessionid", "'hijacked'")]);
    b.transition(s0, "error.execution", None, &[s1]);
    b.transition(s0, "*", None, &[fail]);
    b.transition(s1, "", Some("_name == 'sysvars'"), &[pass]);
    b.transition(s1, "", None, &[fail]);

    assert!(run_test(
        "system_variables_are_read_only",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// "_ioprocessors" exposes the scxml processor with the session location.
#[test]
fn ioprocessors_expose_scxml_location() {
    let mut b = DocumentBuilder::new("ioprocessors");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.transition(
        s0,
        "",
        Some("_ioprocessors.scxml.location == '#_scxml_' + _sessionid"),
        &[pass],
    );
    b.transition(s0, "", None, &[fail]);

    assert!(run_test(
        "ioprocessors_expose_scxml_location",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// A \<param\> with an invalid location in \<donedata\> raises
/// "error.execution" and the done event is still delivered with empty
/// data.
#[test]
fn donedata_with_invalid_param_still_delivers_done() {
    let mut b = DocumentBuilder::new("donedata_error");
    let c = b.state(None, "c");
    let fin = b.final_state(Some(c), "fin");
    let s_err = b.state(None, "s_err");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.donedata(
        fin,
        None,
        Some(vec![Parameter {
            name: "p".to_string(),
            expr: String::new(),
            location: "noSuchLocation".to_string(),
        }]),
    );
    b.transition(c, "error.execution", None, &[s_err]);
    b.transition(s_err, "done.state.c", Some("_event.data == null"), &[pass]);
    b.transition(s_err, "done.state.c", None, &[fail]);
    b.transition(c, "done.state.c", None, &[fail]);

    assert!(run_test(
        "donedata_with_invalid_param_still_delivers_done",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// Assigning to an undeclared location stops the block and raises
/// "error.execution"; later blocks of the same state still run.
#[test]
fn failing_block_does_not_stop_later_blocks() {
    let mut b = DocumentBuilder::new("block_isolation");
    b.data_expr(None, "n", "0");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s0,
        vec![
            Action::assign("noSuchLocation", "1"),
            // Unreached, the block stops at the failing assign.
            Action::assign("n", "n + 100"),
        ],
    );
    b.on_entry(s0, vec![Action::assign("n", "n + 1")]);
    b.transition(s0, "error.execution", Some("n == 1"), &[pass]);
    b.transition(s0, "*", None, &[fail]);

    assert!(run_test(
        "failing_block_does_not_stop_later_blocks",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// \<if\>/\<else\> runs the first truthy branch; \<script\> and \<log\>
/// execute inside the same block.
#[test]
fn if_else_selects_the_truthy_branch() {
    let mut b = DocumentBuilder::new("if_else");
    b.data_expr(None, "n", "0");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");

    let then_block = b.block(vec![Action::assign("n", "n + 100")]);
    let else_block = b.block(vec![
        Action::script("n = n + 1"),
        Action::log("if_else", "'took the else branch'"),
    ]);
    b.on_entry(
        s0,
        vec![Action::If(If {
            condition: "n > 10".to_string(),
            content: then_block,
            else_content: else_block,
        })],
    );
    b.transition(s0, "", Some("n == 1"), &[pass]);
    b.transition(s0, "", None, &[fail]);

    assert!(run_test(
        "if_else_selects_the_truthy_branch",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// The "_event" of a loopback send carries origin and origintype of the
/// scxml processor.
#[test]
fn loopback_events_carry_origin() {
    let mut b = DocumentBuilder::new("event_origin");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(s0, vec![Action::send_named("hello")]);
    b.transition(
        s0,
        "hello",
        Some("_event.origin == '#_scxml_' + _sessionid"),
        &[pass],
    );
    b.transition(s0, "hello", None, &[fail]);

    assert!(run_test(
        "loopback_events_carry_origin",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}
