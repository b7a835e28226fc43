//! Named functions callable from datamodel expressions.\
//! The datamodel registers the mandatory "In" predicate and a small standard
//! library here; clients may add their own actions before a session starts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datamodel::{data_to_string, Data};
use crate::fsm::{Document, GlobalData, StateId};

/// Trait to inject custom functions into the datamodel.
pub trait Action: Send + Sync {
    /// Executes the action with the already evaluated arguments.
    fn execute(&self, arguments: &[Data], global: &mut GlobalData) -> Result<Data, String>;
}

/// The per-session registry of named actions.
#[derive(Clone, Default)]
pub struct ActionWrapper {
    pub actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionWrapper {
    pub fn new() -> ActionWrapper {
        ActionWrapper {
            actions: HashMap::new(),
        }
    }

    pub fn add_action(&mut self, name: &str, action: Arc<dyn Action>) {
        self.actions.insert(name.to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }
}

/// Registers the datamodel-independent standard functions.
pub fn add_default_actions(wrapper: &mut ActionWrapper) {
    wrapper.add_action("indexOf", Arc::new(IndexOfAction {}));
    wrapper.add_action("length", Arc::new(LengthAction {}));
    wrapper.add_action("isDefined", Arc::new(IsDefinedAction {}));
    wrapper.add_action("abs", Arc::new(AbsAction {}));
    wrapper.add_action("toString", Arc::new(ToStringAction {}));
}

/// Action to implement the mandatory SCXML datamodel function "In".
pub struct InAction {
    pub state_name_to_id: HashMap<String, StateId>,
}

impl InAction {
    pub fn from_document(doc: &Document) -> InAction {
        let mut state_name_to_id = HashMap::new();
        for state in doc.states.as_slice() {
            state_name_to_id.insert(state.name.clone(), state.id);
        }
        InAction { state_name_to_id }
    }
}

impl Action for InAction {
    fn execute(&self, arguments: &[Data], global: &mut GlobalData) -> Result<Data, String> {
        if arguments.len() != 1 {
            return Err("Wrong arguments for 'In'.".to_string());
        }
        match &arguments[0] {
            Data::String(state_name) => {
                let r = match self.state_name_to_id.get(state_name) {
                    None => false,
                    Some(state_id) => global.configuration.is_member(state_id),
                };
                Ok(Data::Boolean(r))
            }
            _ => Err("Illegal argument type for 'In'".to_string()),
        }
    }
}

pub struct ToStringAction {}

impl Action for ToStringAction {
    fn execute(&self, arguments: &[Data], _global: &mut GlobalData) -> Result<Data, String> {
        if arguments.len() == 1 {
            Ok(Data::String(data_to_string(&arguments[0])))
        } else {
            Err("Wrong number of arguments for 'toString'.".to_string())
        }
    }
}

pub struct IndexOfAction {}

impl Action for IndexOfAction {
    fn execute(&self, arguments: &[Data], _global: &mut GlobalData) -> Result<Data, String> {
        if arguments.len() != 2 {
            return Err("Wrong arguments for 'indexOf'.".to_string());
        }
        match (&arguments[0], &arguments[1]) {
            (Data::String(s1), Data::String(s2)) => {
                let r = match s1.find(s2) {
                    None => -1,
                    Some(idx) => idx as i64,
                };
                Ok(Data::Integer(r))
            }
            (_, _) => Err("Illegal argument types for 'indexOf'".to_string()),
        }
    }
}

pub struct LengthAction {}

impl Action for LengthAction {
    fn execute(&self, arguments: &[Data], _global: &mut GlobalData) -> Result<Data, String> {
        if arguments.len() != 1 {
            return Err("Wrong number of arguments for 'length'.".to_string());
        }
        let r = match &arguments[0] {
            Data::String(s) => s.len(),
            Data::Array(a) => a.len(),
            Data::Map(m) => m.len(),
            _ => {
                return Err("Wrong argument type for 'length'.".to_string());
            }
        };
        Ok(Data::Integer(r as i64))
    }
}

pub struct AbsAction {}

impl Action for AbsAction {
    fn execute(&self, arguments: &[Data], _global: &mut GlobalData) -> Result<Data, String> {
        if arguments.len() != 1 {
            return Err("Wrong number of arguments for 'abs'.".to_string());
        }
        match &arguments[0] {
            Data::Integer(value) => Ok(Data::Integer(value.abs())),
            Data::Double(value) => Ok(Data::Double(value.abs())),
            _ => Err("Wrong argument type for 'abs'.".to_string()),
        }
    }
}

pub struct IsDefinedAction {}

impl Action for IsDefinedAction {
    fn execute(&self, arguments: &[Data], _global: &mut GlobalData) -> Result<Data, String> {
        if arguments.len() != 1 {
            return Err("Wrong number of arguments for 'isDefined'.".to_string());
        }
        match &arguments[0] {
            Data::None() => Ok(Data::Boolean(false)),
            _ => Ok(Data::Boolean(true)),
        }
    }
}
