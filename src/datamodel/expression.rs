//! Implements the SCXML datamodel on top of the expression engine.

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use std::println as error;

#[cfg(not(test))]
use log::error;

#[cfg(all(feature = "Debug", not(test)))]
use log::debug;
#[cfg(all(feature = "Debug", test))]
use std::println as debug;

use crate::actions::{add_default_actions, InAction};
use crate::common::info;
use crate::datamodel::{
    data_to_boolean, data_to_string, Data, Datamodel, GlobalDataArc, EVENT_VARIABLE_FIELD_DATA,
    EVENT_VARIABLE_FIELD_INVOKE_ID, EVENT_VARIABLE_FIELD_NAME, EVENT_VARIABLE_FIELD_ORIGIN,
    EVENT_VARIABLE_FIELD_ORIGIN_TYPE, EVENT_VARIABLE_FIELD_SEND_ID, EVENT_VARIABLE_FIELD_TYPE,
    EVENT_VARIABLE_NAME,
};
use crate::event_io_processor::SYS_IO_PROCESSORS;
use crate::expression_engine::expressions::{assign_value, Expr};
use crate::expression_engine::lexer::is_valid_identifier;
use crate::expression_engine::parser::ExpressionParser;
use crate::fsm::{Document, Event, StateId};

pub const EXPRESSION_DATAMODEL: &str = "EXPRESSION";
pub const EXPRESSION_DATAMODEL_LC: &str = "expression";

/// Datamodel backed by the built-in expression engine.\
/// It covers the subset of ECMAScript that conformant documents typically
/// need: literals, arrays, maps, member and index access, arithmetic,
/// comparisons, boolean operators, assignments and function calls, including
/// the mandatory `In()` predicate.
pub struct ExpressionDatamodel {
    pub global_data: GlobalDataArc,
    compilations: HashMap<String, Expr>,
}

impl ExpressionDatamodel {
    pub fn new(global_data: GlobalDataArc) -> ExpressionDatamodel {
        ExpressionDatamodel {
            global_data,
            compilations: HashMap::new(),
        }
    }

    /// Compiles an expression, re-using earlier compilations.
    fn compile(&mut self, source: &str) -> Result<Expr, String> {
        match self.compilations.get(source) {
            Some(expression) => Ok(expression.clone()),
            None => {
                let expression = ExpressionParser::parse(source.to_string())?;
                self.compilations
                    .insert(source.to_string(), expression.clone());
                Ok(expression)
            }
        }
    }

    fn execute_internal(&mut self, script: &str) -> Result<Data, String> {
        let expression = self.compile(script)?;
        let result = expression.execute(&mut self.global_data.lock());
        #[cfg(feature = "Debug")]
        debug!("execute: {} => {:?}", script, result);
        result
    }

    fn option_to_data_value(val: &Option<String>) -> Data {
        match val {
            Some(s) => Data::String(s.clone()),
            None => Data::Null(),
        }
    }
}

impl Datamodel for ExpressionDatamodel {
    fn global(&mut self) -> &mut GlobalDataArc {
        &mut self.global_data
    }

    fn global_s(&self) -> &GlobalDataArc {
        &self.global_data
    }

    fn get_name(&self) -> &str {
        EXPRESSION_DATAMODEL
    }

    fn add_functions(&mut self, doc: &Document) {
        let mut guard = self.global_data.lock();
        add_default_actions(&mut guard.actions);
        guard
            .actions
            .add_action("In", Arc::new(InAction::from_document(doc)));
    }

    fn initialize_data_model(&mut self, doc: &Document, state: StateId, set_data: bool) {
        let items = doc.state(state).data.clone();
        for item in items {
            if !set_data {
                self.set(item.name.as_str(), Data::None());
                continue;
            }
            match &item.expr {
                Some(expr) => match self.execute_internal(expr.as_str()) {
                    Ok(value) => {
                        self.set(item.name.as_str(), value);
                    }
                    Err(err) => {
                        error!("Error on initialize of '{}': {}", item.name, err);
                        // W3C says:
                        // If the value specified for a <data> element (by 'src', children, or
                        // the environment) is not a legal data value, the SCXML Processor MUST
                        // place error.execution in the internal event queue and MUST
                        // create an empty data element in the data model with the specified id.
                        self.set(item.name.as_str(), Data::None());
                        self.internal_error_execution();
                    }
                },
                None => match &item.content {
                    Some(value) => self.set(item.name.as_str(), value.clone()),
                    None => self.set(item.name.as_str(), Data::Null()),
                },
            }
        }
    }

    fn initialize_read_only(&mut self, name: &str, value: Data) {
        let mut guard = self.global_data.lock();
        guard.data.set(name, value);
        guard.data.set_read_only(name, true);
    }

    fn set_ioprocessors(&mut self) {
        // Collect the processor handles first; the processor mutex is
        // always taken before the global one (same order as the send path).
        let (session_id, handles) = {
            let guard = self.global_data.lock();
            (
                guard.session_id,
                guard
                    .io_processors
                    .iter()
                    .map(|(name, p)| (name.clone(), p.clone()))
                    .collect::<Vec<_>>(),
            )
        };
        let mut processors = HashMap::new();
        for (name, processor) in handles {
            let mut processor_data = HashMap::new();
            processor_data.insert(
                "location".to_string(),
                Data::String(processor.lock().unwrap().get_location(session_id)),
            );
            processors.insert(name, Data::Map(processor_data));
        }
        let mut guard = self.global_data.lock();
        guard.data.set(SYS_IO_PROCESSORS, Data::Map(processors));
        guard.data.set_read_only(SYS_IO_PROCESSORS, true);
    }

    fn set(&mut self, name: &str, data: Data) {
        self.global_data.lock().data.set(name, data);
    }

    fn set_event(&mut self, event: &Event) {
        let data_value = match &event.param_values {
            None => match &event.content {
                None => Data::Null(),
                Some(content) => content.clone(),
            },
            Some(pairs) => {
                let mut data = HashMap::with_capacity(pairs.len());
                for pair in pairs.iter() {
                    data.insert(pair.name.clone(), pair.value.clone());
                }
                Data::Map(data)
            }
        };

        let mut event_props = HashMap::with_capacity(7);
        event_props.insert(
            EVENT_VARIABLE_FIELD_NAME.to_string(),
            Data::String(event.name.clone()),
        );
        event_props.insert(
            EVENT_VARIABLE_FIELD_TYPE.to_string(),
            Data::String(event.etype.name().to_string()),
        );
        event_props.insert(
            EVENT_VARIABLE_FIELD_SEND_ID.to_string(),
            Self::option_to_data_value(&event.sendid),
        );
        event_props.insert(
            EVENT_VARIABLE_FIELD_ORIGIN.to_string(),
            Self::option_to_data_value(&event.origin),
        );
        event_props.insert(
            EVENT_VARIABLE_FIELD_ORIGIN_TYPE.to_string(),
            Self::option_to_data_value(&event.origin_type),
        );
        event_props.insert(
            EVENT_VARIABLE_FIELD_INVOKE_ID.to_string(),
            Self::option_to_data_value(&event.invoke_id),
        );
        event_props.insert(EVENT_VARIABLE_FIELD_DATA.to_string(), data_value);

        let mut guard = self.global_data.lock();
        guard.data.set_read_only(EVENT_VARIABLE_NAME, false);
        guard.data.set(EVENT_VARIABLE_NAME, Data::Map(event_props));
        guard.data.set_read_only(EVENT_VARIABLE_NAME, true);
    }

    fn assign(&mut self, left_expr: &str, right_expr: &str) -> Result<(), String> {
        if left_expr.trim().is_empty() {
            return Err("Empty assign location".to_string());
        }
        let lhs = self.compile(left_expr)?;
        if !lhs.is_assignable() {
            return Err(format!("Can't assign to '{}'", left_expr));
        }
        let value = self.execute_internal(right_expr)?;
        assign_value(&mut self.global_data.lock(), &lhs, value, false)
    }

    fn get_by_location(&mut self, location: &str) -> Result<Data, String> {
        self.execute_internal(location)
    }

    fn clear(&mut self) {
        self.compilations.clear();
        self.global_data.lock().data.clear();
    }

    fn log(&mut self, label: &str, msg: &str) {
        if label.is_empty() {
            info!("{}", msg);
        } else {
            info!("{}: {}", label, msg);
        }
    }

    fn execute(&mut self, script: &str) -> Result<Data, String> {
        self.execute_internal(script)
    }

    fn execute_for_each(
        &mut self,
        array_expression: &str,
        item: &str,
        index: &str,
        execute_body: &mut dyn FnMut(&mut dyn Datamodel) -> bool,
    ) -> Result<bool, String> {
        // W3C says:
        // If 'item' does not specify a legal variable name, the SCXML Processor
        // MUST place the error error.execution on the internal event queue and
        // MUST NOT evaluate the <foreach> element.
        if !is_valid_identifier(item) {
            return Err(format!("'{}' is no legal variable name", item));
        }
        if !index.is_empty() && !is_valid_identifier(index) {
            return Err(format!("'{}' is no legal variable name", index));
        }
        // The evaluated collection is a copy, the body never observes
        // mutations of the underlying value.
        let collection = self.execute_internal(array_expression)?;
        let items: Vec<Data> = match collection {
            Data::Array(a) => a,
            Data::Map(m) => m.into_values().collect(),
            other => {
                return Err(format!("Value '{}' is not iterable", other));
            }
        };
        {
            let guard = self.global_data.lock();
            if guard.data.is_read_only(item) || (!index.is_empty() && guard.data.is_read_only(index))
            {
                return Err("Loop variable is read-only".to_string());
            }
        }
        for (idx, value) in items.into_iter().enumerate() {
            {
                let mut guard = self.global_data.lock();
                guard.data.set(item, value);
                if !index.is_empty() {
                    guard.data.set(index, Data::Integer(idx as i64));
                }
            }
            if !execute_body(self) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn execute_condition(&mut self, script: &str) -> Result<bool, String> {
        // W3C B.2.3: conditional expressions are converted to their effective
        // boolean value with the ToBoolean operator.
        Ok(data_to_boolean(&self.execute_internal(script)?))
    }
}
