//! Helpers to run documents and verify their final configuration,
//! used by the integration tests.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(test)]
use std::{println as info, println as error};

#[cfg(not(test))]
use log::{error, info};

use crate::common::init_logging;
use crate::fsm::{Document, Event, FinishMode, ScxmlSession};
use crate::fsm_executor::FsmExecutor;

/// Runs the document in a fresh executor, feeds the events in order, waits
/// for termination and verifies that the final configuration contains the
/// expected states.
pub fn run_test(
    name: &str,
    document: Document,
    events: Vec<Event>,
    timeout_ms: u64,
    expected_states: &[&str],
) -> bool {
    run_test_with_executor(
        FsmExecutor::new(),
        name,
        Arc::new(document),
        events,
        timeout_ms,
        expected_states,
    )
}

pub fn run_test_with_executor(
    executor: FsmExecutor,
    name: &str,
    document: Arc<Document>,
    events: Vec<Event>,
    timeout_ms: u64,
    expected_states: &[&str],
) -> bool {
    init_logging();
    let session =
        match executor.execute_with_finish_mode(document, FinishMode::KeepConfiguration) {
            Ok(session) => session,
            Err(err) => {
                error!("[{}] ==> Can't start: {}", name, err);
                return false;
            }
        };

    let watchdog = start_watchdog(&session, timeout_ms);
    for event in events {
        let _ = session.sender.send(Box::new(event));
    }

    info!("[{}] FSM started. Waiting to terminate...", name);
    if let Some(thread) = session.session_thread {
        let _ = thread.join();
    }
    disable_watchdog(&watchdog);

    let guard = session.global_data.lock();
    match &guard.final_configuration {
        None => {
            error!("[{}] ==> Final configuration not available", name);
            false
        }
        Some(final_configuration) => {
            match verify_final_configuration(expected_states, final_configuration.as_slice()) {
                Ok(states) => {
                    info!("[{}] ==> Final configuration '{}' reached", name, states);
                    true
                }
                Err(state) => {
                    error!(
                        "[{}] ==> Expected final state '{}' not reached. Final configuration: {}",
                        name,
                        state,
                        final_configuration.join(",")
                    );
                    false
                }
            }
        }
    }
}

/// Cancels the session if the test takes too long, so a misbehaving
/// document fails its assertion instead of hanging the test run.
pub fn start_watchdog(session: &ScxmlSession, timeout_ms: u64) -> Sender<()> {
    let (watchdog_sender, watchdog_receiver) = channel();
    let session_sender = session.sender.clone();
    let _ = thread::Builder::new()
        .name("test_watchdog".to_string())
        .spawn(move || {
            if let Err(RecvTimeoutError::Timeout) =
                watchdog_receiver.recv_timeout(Duration::from_millis(timeout_ms))
            {
                let _ = session_sender.send(Box::new(Event::cancel_session()));
            }
        });
    watchdog_sender
}

/// Informs the watchdog that the test has finished.
pub fn disable_watchdog(watchdog_sender: &Sender<()>) {
    let _ = watchdog_sender.send(());
}

/// Verifies that the configuration contains all expected states.\
/// The configuration may contain more than the required states.
pub fn verify_final_configuration(
    expected_states: &[&str],
    fsm_config: &[String],
) -> Result<String, String> {
    for expected in expected_states {
        if !fsm_config.iter().any(|s| s == expected) {
            return Err(expected.to_string());
        }
    }
    Ok(expected_states.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_configuration_verification() {
        let config = vec!["pass".to_string(), "outer".to_string()];
        assert!(verify_final_configuration(&["pass"], &config).is_ok());
        assert!(verify_final_configuration(&["pass", "outer"], &config).is_ok());
        assert_eq!(
            verify_final_configuration(&["fail"], &config),
            Err("fail".to_string())
        );
    }
}
