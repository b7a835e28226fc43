//! Invoke lifecycle: child sessions, finalize, autoforward, cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use scxmlrt::builder::{DocumentBuilder, DocumentFactory};
use scxmlrt::executable_content::{Action, SendParameters};
use scxmlrt::fsm::{CommonContent, Document, Event, Invoke};
use scxmlrt::fsm_executor::FsmExecutor;
use scxmlrt::test::{run_test, run_test_with_executor};

/// Child that immediately reaches its top-level final state, returning
/// the given value as donedata.
fn immediate_child(name: &str, done_value: i64) -> Arc<Document> {
    let mut b = DocumentBuilder::new(name);
    let f = b.final_state(None, "f");
    b.donedata(
        f,
        Some(CommonContent::from_value(scxmlrt::datamodel::Data::Integer(
            done_value,
        ))),
        None,
    );
    Arc::new(b.build().unwrap())
}

/// Child that reports an event to its parent on startup and then idles.
fn reporting_child(name: &str, event: &str) -> Arc<Document> {
    let mut b = DocumentBuilder::new(name);
    let c0 = b.state(None, "c0");
    b.on_entry(
        c0,
        vec![Action::Send(SendParameters {
            event: event.to_string(),
            target: "#_parent".to_string(),
            ..Default::default()
        })],
    );
    Arc::new(b.build().unwrap())
}

/// "done.invoke.&lt;id&gt;" carries the donedata of the child's top-level
/// final state.
#[test]
fn done_invoke_carries_child_donedata() {
    let mut b = DocumentBuilder::new("invoke_donedata");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content = Some(immediate_child("invoke_donedata_child", 42));
    b.invoke(s0, invoke);
    b.transition(s0, "done.invoke.kid", Some("_event.data == 42"), &[pass]);
    b.transition(s0, "*", None, &[fail]);

    assert!(run_test(
        "done_invoke_carries_child_donedata",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// The matching \<finalize\> runs before transitions are selected for an
/// event from the invoked child.
#[test]
fn finalize_runs_before_transition_selection() {
    let mut b = DocumentBuilder::new("invoke_finalize");
    b.data_expr(None, "seen", "0");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    let finalize = b.block(vec![Action::assign("seen", "seen + 1")]);
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content = Some(reporting_child("invoke_finalize_child", "fromChild"));
    invoke.finalize = finalize;
    b.invoke(s0, invoke);
    b.transition(s0, "fromChild", Some("seen == 1"), &[pass]);
    b.transition(s0, "fromChild", None, &[fail]);

    assert!(run_test(
        "finalize_runs_before_transition_selection",
        b.build().unwrap(),
        vec![],
        5000,
        &["pass"]
    ));
}

/// External events are forwarded to autoforwarding children.
#[test]
fn autoforward_forwards_external_events() {
    let mut child = DocumentBuilder::new("autoforward_child");
    let c0 = child.state(None, "c0");
    let cf = child.final_state(None, "cf");
    child.transition(c0, "ping", None, &[cf]);
    let child_doc = Arc::new(child.build().unwrap());

    let mut b = DocumentBuilder::new("invoke_autoforward");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(
        s0,
        vec![Action::Send(SendParameters {
            event: "timeout".to_string(),
            delay_ms: 2000,
            ..Default::default()
        })],
    );
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content = Some(child_doc);
    invoke.autoforward = true;
    b.invoke(s0, invoke);
    b.transition(s0, "done.invoke.kid", None, &[pass]);
    b.transition(s0, "timeout", None, &[fail]);

    assert!(run_test(
        "autoforward_forwards_external_events",
        b.build().unwrap(),
        vec![Event::new_external("ping")],
        8000,
        &["pass"]
    ));
}

/// Entering and exiting the invoking state within the same macrostep
/// discards the pending invoke without starting it.
#[test]
fn invoke_is_discarded_when_state_exits_in_same_macrostep() {
    let mut b = DocumentBuilder::new("invoke_discard");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    b.on_entry(s0, vec![Action::raise("leave")]);
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content = Some(reporting_child("invoke_discard_child", "child.started"));
    b.invoke(s0, invoke);
    b.transition(s0, "leave", None, &[s1]);
    b.on_entry(
        s1,
        vec![Action::Send(SendParameters {
            event: "timeout".to_string(),
            delay_ms: 250,
            ..Default::default()
        })],
    );
    b.transition(s1, "child.started", None, &[fail]);
    b.transition(s1, "timeout", None, &[pass]);

    assert!(run_test(
        "invoke_is_discarded_when_state_exits_in_same_macrostep",
        b.build().unwrap(),
        vec![],
        8000,
        &["pass"]
    ));
}

/// Exiting the invoking state cancels the child; events the child already
/// queued are filtered afterwards.
#[test]
fn cancelled_invoke_events_are_filtered() {
    let mut b = DocumentBuilder::new("invoke_cancel_filter");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content = Some(reporting_child("invoke_cancel_child", "childToParent"));
    b.invoke(s0, invoke);
    b.transition(s0, "leave", None, &[s1]);
    b.transition(s0, "childToParent", None, &[fail]);
    b.on_entry(
        s1,
        vec![Action::Send(SendParameters {
            event: "timeout".to_string(),
            delay_ms: 250,
            ..Default::default()
        })],
    );
    b.transition(s1, "childToParent", None, &[fail]);
    b.transition(s1, "timeout", None, &[pass]);

    // "leave" is queued before the child session can start up, so the
    // child event (if any) arrives only after the invoke was cancelled.
    assert!(run_test(
        "cancelled_invoke_events_are_filtered",
        b.build().unwrap(),
        vec![Event::new_external("leave")],
        8000,
        &["pass"]
    ));
}

struct TestFactory {
    documents: HashMap<String, Arc<Document>>,
}

impl DocumentFactory for TestFactory {
    fn parse(&self, text: &str) -> Result<Arc<Document>, String> {
        self.documents
            .get(text)
            .cloned()
            .ok_or_else(|| format!("Unknown content '{}'", text))
    }

    fn load(&self, uri: &str) -> Result<Arc<Document>, String> {
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| format!("Unknown uri '{}'", uri))
    }
}

/// An invoke with a content expression resolves the document through the
/// injected factory at execution time.
#[test]
fn invoke_content_expression_uses_document_factory() {
    let mut documents = HashMap::new();
    documents.insert(
        "child_marker".to_string(),
        immediate_child("hybrid_child", 1),
    );
    let mut executor = FsmExecutor::new();
    executor.set_document_factory(Arc::new(TestFactory { documents }));

    let mut b = DocumentBuilder::new("invoke_content_expr");
    let s0 = b.state(None, "s0");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.content_expr = "'child_marker'".to_string();
    b.invoke(s0, invoke);
    b.transition(s0, "done.invoke.kid", None, &[pass]);
    b.transition(s0, "*", None, &[fail]);

    assert!(run_test_with_executor(
        executor,
        "invoke_content_expression_uses_document_factory",
        Arc::new(b.build().unwrap()),
        vec![],
        5000,
        &["pass"]
    ));
}

/// An invoke with "src" loads the document through the factory; an
/// unknown uri raises "error.communication".
#[test]
fn invoke_src_loads_through_document_factory() {
    let mut documents = HashMap::new();
    documents.insert("test://child".to_string(), immediate_child("src_child", 1));
    let mut executor = FsmExecutor::new();
    executor.set_document_factory(Arc::new(TestFactory { documents }));

    let mut b = DocumentBuilder::new("invoke_src");
    let s0 = b.state(None, "s0");
    let s1 = b.state(None, "s1");
    let pass = b.final_state(None, "pass");
    let fail = b.final_state(None, "fail");
    let mut invoke = Invoke::new();
    invoke.invoke_id = "kid".to_string();
    invoke.src = "test://child".to_string();
    b.invoke(s0, invoke);
    b.transition(s0, "done.invoke.kid", None, &[s1]);
    b.transition(s0, "error", None, &[fail]);

    let mut broken = Invoke::new();
    broken.invoke_id = "kid2".to_string();
    broken.src = "test://no-such-document".to_string();
    b.invoke(s1, broken);
    b.transition(s1, "error.communication", None, &[pass]);
    b.transition(s1, "done.invoke.kid2", None, &[fail]);

    assert!(run_test_with_executor(
        executor,
        "invoke_src_loads_through_document_factory",
        Arc::new(b.build().unwrap()),
        vec![],
        5000,
        &["pass"]
    ));
}
