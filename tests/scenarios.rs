//! End-to-end scenarios for the interpreter core.

use scxmlrt::builder::DocumentBuilder;
use scxmlrt::executable_content::{Action, ForEach, SendParameters};
use scxmlrt::fsm::Event;
use scxmlrt::test::run_test;

/// Internal events preempt external ones: a \<send\> to '#_internal' is
/// consumed before a loopback \<send\> that was issued first.
#[test]
fn internal_queue_beats_external_queue() {
    let mut b = DocumentBuilder::new("s1_priority");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s0,
        vec![
            Action::send_named("ext"),
            Action::Send(SendParameters {
                event: "int".to_string(),
                target: "#_internal".to_string(),
                ..Default::default()
            }),
        ],
    );
    b.transition(s0, "int", None, &[pass]);
    b.transition(s0, "ext", None, &[fail]);

    assert!(run_test(
        "internal_queue_beats_external_queue",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// Eventless transitions win over everything that needs an event.
#[test]
fn eventless_transitions_have_precedence() {
    let mut b = DocumentBuilder::new("s2_eventless");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s1,
        vec![
            Action::raise("internalEvt"),
            Action::send_named("externalEvt"),
        ],
    );
    b.transition(s1, "", None, &[pass]);
    b.transition(s1, "internalEvt", None, &[fail]);
    b.transition(s1, "*", None, &[fail]);

    assert!(run_test(
        "eventless_transitions_have_precedence",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// Shallow history restores the last active direct child.
#[test]
fn shallow_history_restores_last_child() {
    let mut b = DocumentBuilder::new("s3_history");
    let s0 = b.state(None, "s0");
    let h = b.history(s0, "h", scxmlrt::fsm::HistoryType::Shallow);
    let s01 = b.state(Some(s0), "s01");
    let s02 = b.state(Some(s0), "s02");
    let outside = b.state(None, "outside");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");

    b.transition(h, "", None, &[s01]);
    b.transition(s01, "go", None, &[s02]);
    b.transition(s0, "leave", None, &[outside]);
    b.transition(outside, "back", None, &[h]);
    b.transition(s02, "check", None, &[pass]);
    b.transition(s0, "check", None, &[fail]);

    assert!(run_test(
        "shallow_history_restores_last_child",
        b.build().unwrap(),
        vec![
            Event::new_external("go"),
            Event::new_external("leave"),
            Event::new_external("back"),
            Event::new_external("check"),
        ],
        5000,
        &["pass"]
    ));
}

/// An invoked child that finishes immediately routes
/// "done.invoke.&lt;id&gt;" back to the parent.
#[test]
fn invoke_done_routing() {
    let mut child = DocumentBuilder::new("s4_child");
    child.final_state(None, "f");
    let child_doc = std::sync::Arc::new(child.build().unwrap());

    let mut b = DocumentBuilder::new("s4_invoke");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    let mut invoke = scxmlrt::fsm::Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content = Some(child_doc);
    b.invoke(s0, invoke);
    b.transition(s0, "done.invoke.kid", None, &[pass]);
    b.transition(s0, "*", None, &[fail]);

    assert!(run_test(
        "invoke_done_routing",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// \<foreach\> iterates over a copy: appending to the array inside the
/// body does not extend the loop.
#[test]
fn foreach_iterates_over_a_shallow_copy() {
    let mut b = DocumentBuilder::new("s5_foreach");
    b.data_expr(None, "arr", "[1,2,3]");
    b.data_expr(None, "n", "0");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");

    let body = b.block(vec![
        Action::assign("arr", "arr + 4"),
        Action::assign("n", "n + 1"),
    ]);
    b.on_entry(
        s0,
        vec![Action::ForEach(ForEach {
            array: "arr".to_string(),
            item: "item".to_string(),
            index: String::new(),
            content: body,
        })],
    );
    b.transition(s0, "", Some("n == 3"), &[pass]);
    b.transition(s0, "", None, &[fail]);

    assert!(run_test(
        "foreach_iterates_over_a_shallow_copy",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// A target expression that evaluates to undefined raises
/// "error.communication" before the safety timeout fires.
#[test]
fn unreachable_send_target_raises_error_communication() {
    let mut b = DocumentBuilder::new("s6_unreachable");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    // Separate blocks: the failing send stops only its own block.
    b.on_entry(
        s0,
        vec![Action::Send(SendParameters {
            event: "timeout".to_string(),
            delay_ms: 800,
            ..Default::default()
        })],
    );
    b.on_entry(
        s0,
        vec![Action::Send(SendParameters {
            event: "x".to_string(),
            target_expr: "undefined".to_string(),
            ..Default::default()
        })],
    );
    b.transition(s0, "error.communication", None, &[pass]);
    b.transition(s0, "timeout", None, &[fail]);

    assert!(run_test(
        "unreachable_send_target_raises_error_communication",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}
