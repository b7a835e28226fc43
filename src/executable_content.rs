//! Implementation of the "executable content" elements.\
//! See [W3C: Executable Content](https://www.w3.org/TR/scxml/#executable).
//!
//! The action kinds form a closed variant and the interpreter is a match
//! over them. Every action reports failures as `Err(ActionError)`; the
//! block runner enqueues the corresponding error event and short-circuits
//! only the current block (W3C 3.8/3.9).

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::Ordering;

#[cfg(test)]
use std::println as error;

#[cfg(not(test))]
use log::error;

#[cfg(all(feature = "Debug", not(test)))]
use log::debug;
#[cfg(all(feature = "Debug", test))]
use std::println as debug;

use crate::datamodel::{data_to_string, Data, Datamodel, SCXML_EVENT_PROCESSOR};
use crate::event_io_processor::scxml_event_io_processor::{
    SCXML_EVENT_PROCESSOR_SHORT_TYPE, SCXML_TARGET_INTERNAL,
};
use crate::expression_engine::lexer::{ExpressionLexer, Token};
use crate::fsm::{
    CommonContent, Document, Event, EventType, ExecutableContentId, InvokeId, ParamPair,
    Parameter, PLATFORM_ID_COUNTER,
};

/// Error raised by a failing action.\
/// `event` carries the error event to enqueue; it is `None` when the
/// failure was already signalled further down (e.g. by a nested block).
pub struct ActionError {
    pub message: String,
    pub event: Option<Event>,
}

impl ActionError {
    pub fn execution(message: &str) -> ActionError {
        ActionError {
            message: message.to_string(),
            event: Some(Event::error_execution(&None, &None)),
        }
    }

    pub fn execution_for(
        message: &str,
        send_id: &Option<String>,
        invoke_id: &Option<InvokeId>,
    ) -> ActionError {
        ActionError {
            message: message.to_string(),
            event: Some(Event::error_execution(send_id, invoke_id)),
        }
    }

    pub fn communication(message: &str, event: &Event) -> ActionError {
        ActionError {
            message: message.to_string(),
            event: Some(Event::error_communication(event)),
        }
    }

    /// The failure was already reported, the block just has to stop.
    pub fn reported(message: &str) -> ActionError {
        ActionError {
            message: message.to_string(),
            event: None,
        }
    }
}

pub type ActionResult = Result<(), ActionError>;

/// Executes one block of executable content.\
/// Returns false if the block was aborted by a failing action. The error
/// event, if any, is placed on the internal queue here.
pub fn execute_block(
    doc: &Document,
    content_id: ExecutableContentId,
    datamodel: &mut dyn Datamodel,
) -> bool {
    if content_id == 0 {
        return true;
    }
    for action in doc.block(content_id) {
        if let Err(err) = action.execute(datamodel, doc) {
            error!("Executable content failed: {}", err.message);
            if let Some(event) = err.event {
                datamodel.global_s().lock().enqueue_internal(event);
            }
            return false;
        }
    }
    true
}

/// The closed set of action kinds.
#[derive(Debug)]
pub enum Action {
    Raise(Raise),
    Send(SendParameters),
    Cancel(Cancel),
    Assign(Assign),
    Script(Script),
    If(If),
    ForEach(ForEach),
    Log(Log),
}

impl Action {
    pub fn raise(event: &str) -> Action {
        Action::Raise(Raise {
            event: event.to_string(),
        })
    }

    pub fn assign(location: &str, expr: &str) -> Action {
        Action::Assign(Assign {
            location: location.to_string(),
            expr: expr.to_string(),
        })
    }

    pub fn script(content: &str) -> Action {
        Action::Script(Script {
            content: content.to_string(),
        })
    }

    pub fn log(label: &str, expression: &str) -> Action {
        Action::Log(Log {
            label: label.to_string(),
            expression: expression.to_string(),
        })
    }

    /// A \<send\> with only an event name, routed to the external queue of
    /// the own session.
    pub fn send_named(event: &str) -> Action {
        Action::Send(SendParameters {
            event: event.to_string(),
            ..Default::default()
        })
    }

    pub fn execute(&self, datamodel: &mut dyn Datamodel, doc: &Document) -> ActionResult {
        match self {
            Action::Raise(a) => a.execute(datamodel),
            Action::Send(a) => a.execute(datamodel),
            Action::Cancel(a) => a.execute(datamodel),
            Action::Assign(a) => a.execute(datamodel),
            Action::Script(a) => a.execute(datamodel),
            Action::If(a) => a.execute(datamodel, doc),
            Action::ForEach(a) => a.execute(datamodel, doc),
            Action::Log(a) => a.execute(datamodel),
        }
    }
}

/// *W3C says*:\
/// The \<raise\> element raises an event in the current SCXML session.\
/// Note that the event will not be processed until the current block of
/// executable content has completed and all events that are already in the
/// internal event queue have been processed.
#[derive(Debug, Default)]
pub struct Raise {
    pub event: String,
}

impl Raise {
    fn execute(&self, datamodel: &mut dyn Datamodel) -> ActionResult {
        let event = Event::new_simple(self.event.as_str());
        datamodel.global_s().lock().enqueue_internal(event);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Log {
    pub label: String,
    pub expression: String,
}

impl Log {
    /// \<log\> never aborts the block; an invalid expression still raises
    /// "error.execution".
    fn execute(&self, datamodel: &mut dyn Datamodel) -> ActionResult {
        if self.expression.is_empty() {
            datamodel.log(self.label.as_str(), "");
        } else {
            match datamodel.execute(self.expression.as_str()) {
                Ok(value) => {
                    datamodel.log(self.label.as_str(), data_to_string(&value).as_str());
                }
                Err(err) => {
                    error!("log expression '{}' failed: {}", self.expression, err);
                    datamodel.internal_error_execution();
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Assign {
    pub location: String,
    pub expr: String,
}

impl Assign {
    /// *W3C says*:\
    /// If the location expression does not denote a valid location in the
    /// data model or if the value specified (by 'expr' or children) is not
    /// a legal value for the location specified, the SCXML Processor must
    /// place the error 'error.execution' in the internal event queue.
    fn execute(&self, datamodel: &mut dyn Datamodel) -> ActionResult {
        match datamodel.assign(self.location.as_str(), self.expr.as_str()) {
            Ok(()) => Ok(()),
            Err(err) => Err(ActionError::execution(
                format!("Can't assign {}={}: {}", self.location, self.expr, err).as_str(),
            )),
        }
    }
}

/// A \<script\> element.
#[derive(Debug, Default)]
pub struct Script {
    pub content: String,
}

impl Script {
    fn execute(&self, datamodel: &mut dyn Datamodel) -> ActionResult {
        match datamodel.execute(self.content.as_str()) {
            Ok(_) => Ok(()),
            Err(err) => Err(ActionError::execution(
                format!("Script failed: {}", err).as_str(),
            )),
        }
    }
}

/// An \<if\> element. \<elseif\> chains are compiled into nested `If`
/// actions inside the else block.
#[derive(Debug, Default)]
pub struct If {
    pub condition: String,
    pub content: ExecutableContentId,
    pub else_content: ExecutableContentId,
}

impl If {
    fn execute(&self, datamodel: &mut dyn Datamodel, doc: &Document) -> ActionResult {
        let condition = match datamodel.execute_condition(self.condition.as_str()) {
            Ok(value) => value,
            Err(err) => {
                // W3C: a cond error raises error.execution and is treated
                // as false.
                error!("Condition '{}' can't be evaluated: {}", self.condition, err);
                datamodel.internal_error_execution();
                false
            }
        };
        let branch = if condition {
            self.content
        } else {
            self.else_content
        };
        if branch != 0 && !execute_block(doc, branch, datamodel) {
            return Err(ActionError::reported("if branch aborted"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ForEach {
    pub array: String,
    pub item: String,
    pub index: String,
    pub content: ExecutableContentId,
}

impl ForEach {
    fn execute(&self, datamodel: &mut dyn Datamodel, doc: &Document) -> ActionResult {
        let content = self.content;
        let result = datamodel.execute_for_each(
            self.array.as_str(),
            self.item.as_str(),
            self.index.as_str(),
            &mut |dm| execute_block(doc, content, dm),
        );
        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(ActionError::reported("foreach body aborted")),
            Err(err) => Err(ActionError::execution(
                format!("foreach over '{}' failed: {}", self.array, err).as_str(),
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct Cancel {
    pub send_id: String,
    pub send_id_expr: String,
}

impl Cancel {
    /// *W3C says*:\
    /// The \<cancel\> element is used to cancel a delayed \<send\> event.\
    /// The SCXML Processor MUST NOT allow \<cancel\> to affect events that
    /// were not raised in the same session. The Processor SHOULD make its
    /// best attempt to cancel all delayed events with the specified id.
    /// Note, however, that it can not be guaranteed to succeed, for example
    /// if the event has already been delivered by the time the \<cancel\>
    /// tag executes.
    fn execute(&self, datamodel: &mut dyn Datamodel) -> ActionResult {
        let send_id = match datamodel
            .get_expression_alternative_value(self.send_id.as_str(), self.send_id_expr.as_str())
        {
            Ok(value) => data_to_string(&value),
            Err(err) => {
                return Err(ActionError::execution(
                    format!("Can't evaluate sendid: {}", err).as_str(),
                ));
            }
        };
        // Guards of other sessions are unreachable from here, cross-session
        // cancel is structurally a no-op.
        datamodel
            .global_s()
            .lock()
            .cancel_delayed_send(send_id.as_str());
        Ok(())
    }
}

/// Holds all parameters of a \<send\> call.
#[derive(Default)]
pub struct SendParameters {
    /// SCXML \<send\> attribute 'idlocation'.
    pub name_location: String,
    /// SCXML \<send\> attribute 'id'.
    pub name: String,
    /// In case the id is generated, the parent state of the send.
    pub parent_state_name: String,
    /// SCXML \<send\> attribute 'event'.
    pub event: String,
    /// SCXML \<send\> attribute 'eventexpr'.
    pub event_expr: String,
    /// SCXML \<send\> attribute 'target'.
    pub target: String,
    /// SCXML \<send\> attribute 'targetexpr'.
    pub target_expr: String,
    /// SCXML \<send\> attribute 'type'.
    pub type_value: String,
    /// SCXML \<send\> attribute 'typeexpr'.
    pub type_expr: String,
    /// SCXML \<send\> attribute 'delay' in milliseconds.
    pub delay_ms: u64,
    /// SCXML \<send\> attribute 'delayexpr'.
    pub delay_expr: String,
    /// SCXML \<send\> attribute 'namelist'. Must not be specified in
    /// conjunction with 'content'.
    pub name_list: Vec<String>,
    /// \<param\> children.
    pub params: Option<Vec<Parameter>>,
    pub content: Option<CommonContent>,
}

impl Debug for SendParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Send")
            .field("event", &self.event)
            .field("target", &self.target)
            .finish()
    }
}

impl SendParameters {
    /// Evaluates all attributes and routes the event.\
    /// If the event cannot be dispatched, "error.communication" is placed
    /// in the internal queue. If the target or type is not supported,
    /// "error.execution" is placed in the internal queue.
    fn execute(&self, datamodel: &mut dyn Datamodel) -> ActionResult {
        let global_arc = datamodel.global_s().clone();
        let invoke_id = { global_arc.lock().caller_invoke_id.clone() };

        let send_id = if !self.name_location.is_empty() {
            // W3C says:
            // If 'idlocation' is present, the SCXML Processor MUST generate an
            // id when the parent <send> element is evaluated and store it in
            // this location. The automatically generated id for <invoke> has a
            // special format, see 6.4.1; all other ids can use any format, as
            // long as they are unique.
            let generated = format!(
                "{}.{}",
                self.parent_state_name,
                PLATFORM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
            );
            datamodel.set(self.name_location.as_str(), Data::String(generated.clone()));
            Some(generated)
        } else if self.name.is_empty() {
            None
        } else {
            Some(self.name.clone())
        };

        let target_data = match datamodel
            .get_expression_alternative_value(self.target.as_str(), self.target_expr.as_str())
        {
            Ok(value) => value,
            Err(err) => {
                return Err(ActionError::execution_for(
                    format!("Can't evaluate send target: {}", err).as_str(),
                    &send_id,
                    &invoke_id,
                ));
            }
        };
        // A target expression that evaluates to undefined/null denotes an
        // unreachable runtime target.
        let target_undefined = matches!(target_data, Data::None() | Data::Null());
        let target = if target_undefined {
            String::new()
        } else {
            data_to_string(&target_data)
        };

        let event_name = match datamodel
            .get_expression_alternative_value(self.event.as_str(), self.event_expr.as_str())
        {
            Ok(value) => data_to_string(&value),
            Err(err) => {
                return Err(ActionError::execution_for(
                    format!("Can't evaluate send event: {}", err).as_str(),
                    &send_id,
                    &invoke_id,
                ));
            }
        };

        let type_name = match datamodel
            .get_expression_alternative_value(self.type_value.as_str(), self.type_expr.as_str())
        {
            Ok(value) => data_to_string(&value),
            Err(err) => {
                return Err(ActionError::execution_for(
                    format!("Can't evaluate send type: {}", err).as_str(),
                    &send_id,
                    &invoke_id,
                ));
            }
        };
        // W3C: If the SCXML Processor does not support the type that is
        // specified, it must place the event error.execution on the internal
        // event queue (test 199 semantics: a type absent from _ioprocessors
        // is unsupported).
        let processor_key = if type_name.is_empty()
            || type_name.eq_ignore_ascii_case(SCXML_EVENT_PROCESSOR_SHORT_TYPE)
            || type_name == SCXML_EVENT_PROCESSOR
        {
            SCXML_EVENT_PROCESSOR_SHORT_TYPE.to_string()
        } else {
            type_name.clone()
        };
        let processor = {
            global_arc
                .lock()
                .io_processors
                .get(processor_key.as_str())
                .cloned()
        };
        let processor = match processor {
            Some(processor) => processor,
            None => {
                return Err(ActionError::execution_for(
                    format!("Unsupported send type '{}'", type_name).as_str(),
                    &send_id,
                    &invoke_id,
                ));
            }
        };

        let delay_ms: i64 = if !self.delay_expr.is_empty() {
            match datamodel.execute(self.delay_expr.as_str()) {
                Ok(Data::Integer(ms)) => ms,
                Ok(value) => parse_duration_to_milliseconds(data_to_string(&value).as_str()),
                Err(err) => {
                    return Err(ActionError::execution_for(
                        format!("Can't evaluate send delay: {}", err).as_str(),
                        &send_id,
                        &invoke_id,
                    ));
                }
            }
        } else {
            self.delay_ms as i64
        };
        if delay_ms < 0 {
            return Err(ActionError::execution_for(
                format!("Send delay '{}' is invalid", self.delay_expr).as_str(),
                &send_id,
                &invoke_id,
            ));
        }
        if delay_ms > 0 && target == SCXML_TARGET_INTERNAL {
            return Err(ActionError::execution_for(
                "Send with delay can't use the internal queue",
                &send_id,
                &invoke_id,
            ));
        }

        // A conformant document MUST NOT specify "namelist" or <param>
        // together with <content>.
        let mut param_values: Vec<ParamPair> = Vec::new();
        let mut content: Option<Data> = None;
        if self.content.is_some() {
            content = datamodel.evaluate_content(&self.content);
        } else {
            datamodel.evaluate_params(&self.params, &mut param_values);
            for name in &self.name_list {
                match datamodel.get_by_location(name.as_str()) {
                    Ok(value) => {
                        param_values.push(ParamPair::new(name.as_str(), &value));
                    }
                    Err(err) => {
                        // W3C: the send is discarded.
                        return Err(ActionError::execution_for(
                            format!("Can't evaluate namelist '{}': {}", name, err).as_str(),
                            &send_id,
                            &invoke_id,
                        ));
                    }
                }
            }
        }

        let event = Event {
            name: event_name,
            etype: EventType::External,
            sendid: send_id.clone(),
            origin: None,
            origin_type: None,
            invoke_id: invoke_id.clone(),
            param_values: if param_values.is_empty() {
                None
            } else {
                Some(param_values)
            },
            content,
        };

        if target_undefined {
            return Err(ActionError::communication(
                format!("Send target '{}' is unreachable", self.target_expr).as_str(),
                &event,
            ));
        }

        if delay_ms > 0 {
            let scheduler = { global_arc.lock().scheduler.clone() };
            let scheduler = match scheduler {
                Some(scheduler) => scheduler,
                None => {
                    return Err(ActionError::execution_for(
                        "No scheduler available for delayed send",
                        &send_id,
                        &invoke_id,
                    ));
                }
            };
            #[cfg(feature = "Debug")]
            debug!("schedule '{}' for {} ms", event, delay_ms);
            // Guards are keyed by sendid so <cancel> and session teardown
            // find them; sends without explicit id get an internal key.
            let key = send_id.clone().unwrap_or_else(|| {
                format!(
                    "$send.{}",
                    PLATFORM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
                )
            });
            let key_clone = key.clone();
            let global_clone = global_arc.clone();
            let guard = scheduler.schedule(delay_ms, move || {
                {
                    global_clone.lock().delayed_send.remove(&key_clone);
                }
                // The delivery callback enqueues and returns, it must not
                // wait on the scheduler.
                processor
                    .lock()
                    .unwrap()
                    .send(&global_clone, target.as_str(), event.clone());
            });
            global_arc.lock().delayed_send.insert(key, guard);
            Ok(())
        } else {
            #[cfg(feature = "Debug")]
            debug!("send '{}' to '{}'", event, target);
            if processor
                .lock()
                .unwrap()
                .send(&global_arc, target.as_str(), event)
            {
                Ok(())
            } else {
                // The processor already placed the error event.
                Err(ActionError::reported("send failed"))
            }
        }
    }
}

/// Parses a duration per CSS2 notation: `\d*(\.\d+)?(ms|s|m|h|d)`.\
/// A bare number counts as milliseconds; -1 is returned for malformed
/// input.
pub fn parse_duration_to_milliseconds(d: &str) -> i64 {
    if d.is_empty() {
        return 0;
    }
    let mut lexer = ExpressionLexer::new(d.to_string());
    let value = match lexer.next_number() {
        Ok(value) => value.as_double(),
        Err(_) => return -1,
    };
    let unit = lexer.next_name().unwrap_or_default();
    let factor = match unit.to_lowercase().as_str() {
        "d" => 24.0 * 60.0 * 60.0 * 1000.0,
        "h" => 60.0 * 60.0 * 1000.0,
        "m" => 60000.0,
        "s" => 1000.0,
        "ms" | "" => 1.0,
        _ => return -1,
    };
    if lexer.next_token() != Token::EOE {
        return -1;
    }
    (value * factor).round() as i64
}
