//! Transition selection, conflict resolution and ordering behaviour.

use scxmlrt::builder::DocumentBuilder;
use scxmlrt::executable_content::{Action, SendParameters};
use scxmlrt::fsm::{Event, TransitionType};
use scxmlrt::test::run_test;

/// A targetless transition executes its content without exiting or
/// re-entering its source; the onexit handler must not run.
#[test]
fn targetless_transition_does_not_exit_source() {
    let mut b = DocumentBuilder::new("targetless");
    b.data_expr(None, "n", "0");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_exit(s0, vec![Action::assign("n", "n + 1")]);
    let t = b.transition(s0, "t", None, &[]);
    b.transition_content(t, vec![Action::assign("n", "n + 10")]);
    b.transition(s0, "check", Some("n == 10"), &[pass]);
    b.transition(s0, "check", None, &[fail]);

    assert!(run_test(
        "targetless_transition_does_not_exit_source",
        b.build().unwrap(),
        vec![Event::new_external("t"), Event::new_external("check")],
        5000,
        &["pass"]
    ));
}

/// An internal transition on an atomic source behaves like an external
/// one: the source exits, but the containing compound state does not.
#[test]
fn internal_transition_on_atomic_source_behaves_external() {
    let mut b = DocumentBuilder::new("internal_atomic");
    b.data_expr(None, "n", "0");
    b.data_expr(None, "m", "0");
    let p = b.state(None, "p");
    let s0 = b.state(Some(p), "ia_s0");
    let s1 = b.state(Some(p), "ia_s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_exit(p, vec![Action::assign("m", "m + 1")]);
    b.on_exit(s0, vec![Action::assign("n", "n + 1")]);
    b.transition_of_type(s0, "t", None, &[s1], TransitionType::Internal);
    b.transition(s1, "", Some("n == 1 && m == 0"), &[pass]);
    b.transition(s1, "", None, &[fail]);

    assert!(run_test(
        "internal_transition_on_atomic_source_behaves_external",
        b.build().unwrap(),
        vec![Event::new_external("t")],
        5000,
        &["pass"]
    ));
}

/// An internal transition on a compound source targeting a descendant
/// does not exit the source itself.
#[test]
fn internal_transition_on_compound_source_keeps_source_active() {
    let mut b = DocumentBuilder::new("internal_compound");
    b.data_expr(None, "m", "0");
    let p = b.state(None, "p");
    let s0 = b.state(Some(p), "ic_s0");
    let s1 = b.state(Some(p), "ic_s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_exit(p, vec![Action::assign("m", "m + 1")]);
    b.transition_of_type(p, "t", None, &[s1], TransitionType::Internal);
    b.transition(s1, "", Some("m == 0"), &[pass]);
    b.transition(s1, "", None, &[fail]);
    // Keep the default entry in s0.
    b.initial(p, &[s0]);

    assert!(run_test(
        "internal_transition_on_compound_source_keeps_source_active",
        b.build().unwrap(),
        vec![Event::new_external("t")],
        5000,
        &["pass"]
    ));
}

/// `raise X; raise Y` in one block is consumed in order X then Y.
#[test]
fn raised_events_are_consumed_in_order() {
    let mut b = DocumentBuilder::new("raise_order");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(s0, vec![Action::raise("X"), Action::raise("Y")]);
    b.transition(s0, "X", None, &[s1]);
    b.transition(s0, "Y", None, &[fail]);
    b.transition(s1, "Y", None, &[pass]);
    b.transition(s1, "X", None, &[fail]);

    assert!(run_test(
        "raised_events_are_consumed_in_order",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// Two loopback sends arrive in FIFO order.
#[test]
fn loopback_sends_are_fifo() {
    let mut b = DocumentBuilder::new("send_fifo");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(s0, vec![Action::send_named("A"), Action::send_named("B")]);
    b.transition(s0, "A", None, &[s1]);
    b.transition(s0, "B", None, &[fail]);
    b.transition(s1, "B", None, &[pass]);
    b.transition(s1, "A", None, &[fail]);

    assert!(run_test(
        "loopback_sends_are_fifo",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// When a transition leaving the parallel conflicts with one staying
/// inside a later region, the earlier one in document order preempts.
#[test]
fn conflicting_transition_is_preempted() {
    let mut b = DocumentBuilder::new("preemption");
    b.data_expr(None, "flag", "0");
    let p = b.parallel(None, "p");
    let r1 = b.state(Some(p), "r1");
    let s1 = b.state(Some(r1), "r1_s1");
    let r2 = b.state(Some(p), "r2");
    let s2 = b.state(Some(r2), "r2_s2");
    let s2b = b.state(Some(r2), "r2_s2b");
    let cont = b.state(None, "cont");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");

    b.on_entry(s2b, vec![Action::assign("flag", "1")]);
    b.transition(s1, "e", None, &[cont]);
    b.transition(s2, "e", None, &[s2b]);
    b.transition(cont, "", Some("flag == 0"), &[pass]);
    b.transition(cont, "", None, &[fail]);

    assert!(run_test(
        "conflicting_transition_is_preempted",
        b.build().unwrap(),
        vec![Event::new_external("e")],
        5000,
        &["pass"]
    ));
}

/// A parallel state generates "done.state.&lt;id&gt;" exactly when all its
/// regions reached a final state.
#[test]
fn parallel_completion_generates_done_state() {
    let mut b = DocumentBuilder::new("parallel_done");
    let p = b.parallel(None, "p");
    let ra = b.state(Some(p), "ra");
    let a0 = b.state(Some(ra), "a0");
    let af = b.final_state(Some(ra), "af");
    let rb = b.state(Some(p), "rb");
    let b0 = b.state(Some(rb), "b0");
    let bf = b.final_state(Some(rb), "bf");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");

    b.transition(a0, "go", None, &[af]);
    b.transition(b0, "go", None, &[bf]);
    b.transition(p, "done.state.p", None, &[pass]);
    b.transition(p, "done.state.ra", Some("!In('bf')"), &[fail]);

    assert!(run_test(
        "parallel_completion_generates_done_state",
        b.build().unwrap(),
        vec![Event::new_external("go")],
        5000,
        &["pass"]
    ));
}

/// The In() predicate resolves against the live configuration.
#[test]
fn in_predicate_sees_parallel_siblings() {
    let mut b = DocumentBuilder::new("in_predicate");
    let p = b.parallel(None, "p");
    let ra = b.state(Some(p), "ra");
    let a = b.state(Some(ra), "a");
    let rb = b.state(Some(p), "rb");
    let _bb = b.state(Some(rb), "b");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.transition(a, "", Some("In('b')"), &[pass]);
    b.transition(a, "", None, &[fail]);

    assert!(run_test(
        "in_predicate_sees_parallel_siblings",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// An invalid literal send target raises "error.execution" carrying the
/// sendid of the failed send.
#[test]
fn invalid_send_target_raises_error_execution_with_sendid() {
    let mut b = DocumentBuilder::new("invalid_target");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s0,
        vec![Action::Send(SendParameters {
            event: "x".to_string(),
            target: "!foo".to_string(),
            name: "myid".to_string(),
            ..Default::default()
        })],
    );
    b.transition(
        s0,
        "error.execution",
        Some("_event.sendid == 'myid'"),
        &[pass],
    );
    b.transition(s0, "error", None, &[fail]);

    assert!(run_test(
        "invalid_send_target_raises_error_execution_with_sendid",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// A send type that is not registered in "_ioprocessors" is unsupported
/// and raises "error.execution".
#[test]
fn unsupported_send_type_raises_error_execution() {
    let mut b = DocumentBuilder::new("unsupported_type");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s0,
        vec![Action::Send(SendParameters {
            event: "x".to_string(),
            type_value: "http://www.example.com/noSuchProcessor".to_string(),
            ..Default::default()
        })],
    );
    b.transition(s0, "error.execution", None, &[pass]);
    b.transition(s0, "*", None, &[fail]);

    assert!(run_test(
        "unsupported_send_type_raises_error_execution",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// A delayed send is cancelled by its sendid; a later uncancelled send
/// still fires.
#[test]
fn cancel_removes_delayed_send() {
    let mut b = DocumentBuilder::new("cancel_send");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s0,
        vec![
            Action::Send(SendParameters {
                event: "slow".to_string(),
                delay_ms: 300,
                name: "slowid".to_string(),
                ..Default::default()
            }),
            Action::Cancel(scxmlrt::executable_content::Cancel {
                send_id: "slowid".to_string(),
                send_id_expr: String::new(),
            }),
            Action::Send(SendParameters {
                event: "fast".to_string(),
                delay_ms: 50,
                ..Default::default()
            }),
        ],
    );
    b.transition(s0, "slow", None, &[fail]);
    b.transition(s0, "fast", None, &[pass]);

    assert!(run_test(
        "cancel_removes_delayed_send",
        b.build().unwrap(),
        vec![],
        8000,
        &["pass"]
    ));
}

/// Guard evaluation errors disable the transition and raise
/// "error.execution".
#[test]
fn guard_errors_disable_the_transition() {
    let mut b = DocumentBuilder::new("guard_error");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.transition(s0, "go", Some("noSuchVariable > 3"), &[fail]);
    b.transition(s0, "go", None, &[pass]);

    assert!(run_test(
        "guard_errors_disable_the_transition",
        b.build().unwrap(),
        vec![Event::new_external("go")],
        5000,
        &["pass"]
    ));
}
