//! Implementation of the SCXML event I/O processor.\
//! Processor for type "<http://www.w3.org/TR/scxml/#SCXMLEventProcessor>" (or short-cut "scxml").
//! See [W3C: SCXML Event I/O Processor](https://www.w3.org/TR/scxml/#SCXMLEventProcessor).

use std::fmt::Debug;

#[cfg(test)]
use std::println as error;

#[cfg(not(test))]
use log::error;

use crate::datamodel::{GlobalDataArc, GlobalDataLock, SCXML_EVENT_PROCESSOR};
use crate::event_io_processor::EventIOProcessor;
use crate::fsm::{Event, EventType, SessionId};

/// SCXML processor specific target:\
/// If the target is the special term '#_internal', the Processor must add the event to the
/// internal event queue of the sending session.
pub const SCXML_TARGET_INTERNAL: &str = "#_internal";

/// SCXML processor specific target:\
/// If the target is the special term '#_scxml_sessionid', where sessionid is the id of an SCXML
/// session that is accessible to the Processor, the Processor must add the event to the external
/// queue of that session.
pub const SCXML_TARGET_SESSION_ID_PREFIX: &str = "#_scxml_";

/// SCXML processor specific target:\
/// If the target is the special term '#_parent', the Processor must add the event to the external
/// event queue of the SCXML session that invoked the sending session, if there is one.
pub const SCXML_TARGET_PARENT: &str = "#_parent";

/// SCXML processor specific target:\
/// If the target is the special term '#_invokeid', where invokeid is the invokeid of an SCXML
/// session that the sending session has created by \<invoke\>, the Processor must add the event
/// to the external queue of that session.\
/// This value is a prefix of the other SCXML targets and needs special care.
pub const SCXML_TARGET_INVOKE_ID_PREFIX: &str = "#_";

/// Short-cut for the SCXML I/O processor type.
pub const SCXML_EVENT_PROCESSOR_SHORT_TYPE: &str = "scxml";

const TYPES: &[&str] = &[SCXML_EVENT_PROCESSOR, SCXML_EVENT_PROCESSOR_SHORT_TYPE];

#[derive(Debug, Default)]
pub struct ScxmlEventIOProcessor {
    pub location: String,
}

impl ScxmlEventIOProcessor {
    pub fn new() -> ScxmlEventIOProcessor {
        ScxmlEventIOProcessor {
            location: SCXML_TARGET_SESSION_ID_PREFIX.to_string(),
        }
    }

    fn send_to_session(
        &mut self,
        global_lock: &mut GlobalDataLock,
        session_id: SessionId,
        event: Event,
    ) -> bool {
        match &global_lock.executor {
            None => {
                error!("Executor not available");
                global_lock.enqueue_internal(Event::error_communication(&event));
                false
            }
            Some(executor) => match executor.send_to_session(session_id, event.clone()) {
                Ok(_) => true,
                Err(err) => {
                    // W3C: If the sending SCXML session specifies a session that does not
                    // exist or is inaccessible, the SCXML Processor must place the error
                    // "error.communication" on the internal event queue of the sending session.
                    error!("Can't send to session {}. {}", session_id, err);
                    global_lock.enqueue_internal(Event::error_communication(&event));
                    false
                }
            },
        }
    }
}

impl EventIOProcessor for ScxmlEventIOProcessor {
    fn get_location(&self, id: SessionId) -> String {
        format!("{}{}", self.location, id)
    }

    fn get_types(&self) -> &[&str] {
        TYPES
    }

    /// W3C (the relevant parts):\
    /// The 'origin' field of the event raised in the receiving session must match the value of
    /// the 'location' field inside the entry for the SCXML Event I/O Processor in the
    /// _ioprocessors system variable in the sending session.\
    /// The 'origintype' field of the event raised in the receiving session must have the value
    /// "scxml".\
    /// SCXML Processors must support the special targets '#_internal', '#_scxml_sessionid',
    /// '#_parent' and '#_invokeid' for \<send\>. If neither the 'target' nor the 'targetexpr'
    /// attribute is specified, the SCXML Processor must add the event to the external event
    /// queue of the sending session.
    fn send(&mut self, global: &GlobalDataArc, target: &str, mut event: Event) -> bool {
        let mut global_lock = global.lock();
        event.origin_type = Some(SCXML_EVENT_PROCESSOR.to_string());
        if event.origin.is_none() {
            event.origin = Some(self.get_location(global_lock.session_id));
        }

        match target {
            "" => {
                global_lock.external_queue.enqueue(Box::new(event));
                true
            }
            SCXML_TARGET_INTERNAL => {
                event.etype = EventType::Internal;
                global_lock.enqueue_internal(event);
                true
            }
            SCXML_TARGET_PARENT => match global_lock.parent_session_id {
                Some(session_id) => self.send_to_session(&mut global_lock, session_id, event),
                None => {
                    error!("Send to '#_parent' without calling session");
                    global_lock.enqueue_internal(Event::error_communication(&event));
                    false
                }
            },
            _ => {
                if let Some(session_id_text) = target.strip_prefix(SCXML_TARGET_SESSION_ID_PREFIX)
                {
                    match session_id_text.parse::<SessionId>() {
                        Ok(session_id) => {
                            self.send_to_session(&mut global_lock, session_id, event)
                        }
                        Err(_) => {
                            error!("Send target '{}' has wrong format.", target);
                            global_lock.enqueue_internal(Event::error_communication(&event));
                            false
                        }
                    }
                } else if let Some(invoke_id) = target.strip_prefix(SCXML_TARGET_INVOKE_ID_PREFIX)
                {
                    let session_id = match global_lock.child_sessions.get(invoke_id) {
                        None => {
                            error!("InvokeId '{}' of target '{}' is not available.", invoke_id, target);
                            global_lock.enqueue_internal(Event::error_communication(&event));
                            return false;
                        }
                        Some(child) => child.session.session_id,
                    };
                    self.send_to_session(&mut global_lock, session_id, event)
                } else {
                    // W3C says:
                    // If the value ... is not supported or invalid, the Processor MUST place
                    // the error error.execution on the internal event queue.
                    error!("Send target '{}' is invalid.", target);
                    global_lock
                        .enqueue_internal(Event::error_execution(&event.sendid, &event.invoke_id));
                    false
                }
            }
        }
    }

    /// This processor doesn't really need a shutdown.
    /// The implementation does nothing.
    fn shutdown(&mut self) {}
}
