//! Defines the API used to access the data models.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
use std::println as error;

#[cfg(not(test))]
use log::error;

use lazy_static::lazy_static;
use regex::Regex;

use crate::fsm::{
    CommonContent, Document, Event, GlobalData, InvokeId, ParamPair, Parameter, StateId,
};

pub mod expression;

pub const NULL_DATAMODEL: &str = "NULL";
pub const NULL_DATAMODEL_LC: &str = "null";

pub const SCXML_INVOKE_TYPE: &str = "http://www.w3.org/TR/scxml/";

/// W3C: Processors MAY define short form notations as an authoring convenience
/// (e.g., "scxml" as equivalent to http://www.w3.org/TR/scxml/).
pub const SCXML_INVOKE_TYPE_SHORT: &str = "scxml";

pub const SCXML_EVENT_PROCESSOR: &str = "http://www.w3.org/TR/scxml/#SCXMLEventProcessor";

/// Name of system variable "_sessionid".\
/// *W3C says*:\
/// The SCXML Processor MUST bind the variable _sessionid at load time to the system-generated id
/// for the current SCXML session. (This is of type NMTOKEN.) The Processor MUST keep the variable
/// bound to this value until the session terminates.
pub const SESSION_ID_VARIABLE_NAME: &str = "_sessionid";

/// Name of system variable "_name".\
/// *W3C says*:\
/// The SCXML Processor MUST bind the variable _name at load time to the value of the 'name'
/// attribute of the \<scxml\> element. The Processor MUST keep the variable bound to this
/// value until the session terminates.
pub const SESSION_NAME_VARIABLE_NAME: &str = "_name";

/// Name of system variable "_event" for events
pub const EVENT_VARIABLE_NAME: &str = "_event";

/// Name of field "name" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_NAME: &str = "name";

/// Name of field "type" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_TYPE: &str = "type";

/// Name of field "sendid" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_SEND_ID: &str = "sendid";

/// Name of field "origin" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_ORIGIN: &str = "origin";

/// Name of field "origintype" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_ORIGIN_TYPE: &str = "origintype";

/// Name of field "invokeid" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_INVOKE_ID: &str = "invokeid";

/// Name of field "data" of system variable "_event"
pub const EVENT_VARIABLE_FIELD_DATA: &str = "data";

/// Gets the global data store from the datamodel.
#[macro_export]
macro_rules! get_global {
    ($x:expr) => {
        $x.global().lock()
    };
}

pub type GlobalDataLock<'a> = MutexGuard<'a, GlobalData>;

/// Currently we assume that we need access to the global-data via a mutex.
/// If not, change this type to "GlobalData" and adapt implementation.
#[derive(Clone)]
pub struct GlobalDataArc {
    arc: Arc<Mutex<GlobalData>>,
}

impl Default for GlobalDataArc {
    fn default() -> Self {
        GlobalDataArc::new()
    }
}

impl GlobalDataArc {
    pub fn new() -> GlobalDataArc {
        GlobalDataArc {
            arc: Arc::new(Mutex::new(GlobalData::new())),
        }
    }

    pub fn lock(&self) -> GlobalDataLock {
        self.arc.lock().unwrap()
    }
}

/// Data variant used to handle values in a type-safe but
/// datamodel-agnostic way.
#[derive(Clone, PartialEq)]
pub enum Data {
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    Array(Vec<Data>),
    Map(HashMap<String, Data>),
    Null(),
    /// An unbound ("undefined") value.
    None(),
}

impl Data {
    /// Converts a JSON value. Numbers keep integer precision where possible.
    pub fn from_json(value: &serde_json::Value) -> Data {
        match value {
            serde_json::Value::Null => Data::Null(),
            serde_json::Value::Bool(b) => Data::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Data::Integer(i)
                } else {
                    Data::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Data::String(s.clone()),
            serde_json::Value::Array(a) => Data::Array(a.iter().map(Data::from_json).collect()),
            serde_json::Value::Object(o) => Data::Map(
                o.iter()
                    .map(|(k, v)| (k.clone(), Data::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Data, String> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => Ok(Data::from_json(&value)),
            Err(err) => Err(err.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Data::Integer(i) => serde_json::Value::from(*i),
            Data::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Data::String(s) => serde_json::Value::from(s.clone()),
            Data::Boolean(b) => serde_json::Value::from(*b),
            Data::Array(a) => serde_json::Value::Array(a.iter().map(Data::to_json).collect()),
            Data::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Data::Null() | Data::None() => serde_json::Value::Null,
        }
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

impl Debug for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Data::String(s) => write!(f, "'{}'", s),
            other => write!(f, "{}", other),
        }
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Data::String(s) => write!(f, "{}", s),
            Data::Integer(i) => write!(f, "{}", i),
            Data::Double(d) => write!(f, "{}", d),
            Data::Boolean(b) => write!(f, "{}", b),
            Data::Array(_) | Data::Map(_) => write!(f, "{}", self.to_json_string()),
            Data::Null() => write!(f, "null"),
            Data::None() => write!(f, "undefined"),
        }
    }
}

/// Plain string rendering of a value, as used by \<log\> and string contexts.
pub fn data_to_string(data: &Data) -> String {
    match data {
        Data::Array(a) => {
            let texts: Vec<String> = a.iter().map(data_to_string).collect();
            texts.join(",")
        }
        other => format!("{}", other),
    }
}

/// ECMAScript-like "ToBoolean" of a value.\
/// undefined, null, 0, NaN and the empty string are false, everything
/// else is true.
pub fn data_to_boolean(data: &Data) -> bool {
    match data {
        Data::Integer(i) => *i != 0,
        Data::Double(d) => !(d.is_nan() || *d == 0f64),
        Data::String(s) => !s.is_empty(),
        Data::Boolean(b) => *b,
        Data::Array(_) | Data::Map(_) => true,
        Data::Null() | Data::None() => false,
    }
}

pub fn numeric_to_integer(data: &Data) -> Option<i64> {
    match data {
        Data::Integer(i) => Some(*i),
        Data::Double(d) => Some(*d as i64),
        _ => None,
    }
}

fn as_double(data: &Data) -> Option<f64> {
    match data {
        Data::Integer(i) => Some(*i as f64),
        Data::Double(d) => Some(*d),
        _ => None,
    }
}

pub fn operation_plus(left: &Data, right: &Data) -> Result<Data, String> {
    match (left, right) {
        (Data::Integer(l), Data::Integer(r)) => Ok(Data::Integer(l + r)),
        // "+" on collections appends resp. merges.
        (Data::Array(l), Data::Array(r)) => {
            let mut v = l.clone();
            v.extend(r.iter().cloned());
            Ok(Data::Array(v))
        }
        (Data::Array(l), r) => {
            let mut v = l.clone();
            v.push(r.clone());
            Ok(Data::Array(v))
        }
        (Data::Map(l), Data::Map(r)) => {
            let mut m = l.clone();
            for (k, v) in r {
                m.insert(k.clone(), v.clone());
            }
            Ok(Data::Map(m))
        }
        (Data::String(l), r) => Ok(Data::String(format!("{}{}", l, data_to_string(r)))),
        (l, Data::String(r)) => Ok(Data::String(format!("{}{}", data_to_string(l), r))),
        (l, r) => match (as_double(l), as_double(r)) {
            (Some(lv), Some(rv)) => Ok(Data::Double(lv + rv)),
            _ => Err(format!("Can't add '{}' and '{}'", left, right)),
        },
    }
}

macro_rules! numeric_operation {
    ($name:ident, $op:tt, $verb:literal) => {
        pub fn $name(left: &Data, right: &Data) -> Result<Data, String> {
            match (left, right) {
                (Data::Integer(l), Data::Integer(r)) => Ok(Data::Integer(l $op r)),
                (l, r) => match (as_double(l), as_double(r)) {
                    (Some(lv), Some(rv)) => Ok(Data::Double(lv $op rv)),
                    _ => Err(format!(concat!("Can't ", $verb, " '{}' and '{}'"), left, right)),
                },
            }
        }
    };
}

numeric_operation!(operation_minus, -, "subtract");
numeric_operation!(operation_multiply, *, "multiply");

pub fn operation_divide(left: &Data, right: &Data) -> Result<Data, String> {
    match (left, right) {
        (Data::Integer(l), Data::Integer(r)) => {
            if *r == 0 {
                Err("Division by zero".to_string())
            } else {
                Ok(Data::Integer(l / r))
            }
        }
        (l, r) => match (as_double(l), as_double(r)) {
            (Some(lv), Some(rv)) => {
                if rv == 0f64 {
                    Err("Division by zero".to_string())
                } else {
                    Ok(Data::Double(lv / rv))
                }
            }
            _ => Err(format!("Can't divide '{}' and '{}'", left, right)),
        },
    }
}

pub fn operation_modulus(left: &Data, right: &Data) -> Result<Data, String> {
    match (left, right) {
        (Data::Integer(l), Data::Integer(r)) => {
            if *r == 0 {
                Err("Division by zero".to_string())
            } else {
                Ok(Data::Integer(l % r))
            }
        }
        (l, r) => match (as_double(l), as_double(r)) {
            (Some(lv), Some(rv)) => {
                if rv == 0f64 {
                    Err("Division by zero".to_string())
                } else {
                    Ok(Data::Double(lv % rv))
                }
            }
            _ => Err(format!("Can't compute '{}' % '{}'", left, right)),
        },
    }
}

macro_rules! compare_operation {
    ($name:ident, $op:tt) => {
        pub fn $name(left: &Data, right: &Data) -> Result<Data, String> {
            match (left, right) {
                (Data::String(l), Data::String(r)) => Ok(Data::Boolean(l $op r)),
                (l, r) => match (as_double(l), as_double(r)) {
                    (Some(lv), Some(rv)) => Ok(Data::Boolean(lv $op rv)),
                    _ => Err(format!("Can't compare '{}' and '{}'", left, right)),
                },
            }
        }
    };
}

compare_operation!(operation_less, <);
compare_operation!(operation_less_equal, <=);
compare_operation!(operation_greater, >);
compare_operation!(operation_greater_equal, >=);

fn data_equals(left: &Data, right: &Data) -> bool {
    match (as_double(left), as_double(right)) {
        // Numeric compare, so 2 == 2.0 holds.
        (Some(lv), Some(rv)) => lv == rv,
        _ => left == right,
    }
}

pub fn operation_equal(left: &Data, right: &Data) -> Result<Data, String> {
    Ok(Data::Boolean(data_equals(left, right)))
}

pub fn operation_not_equal(left: &Data, right: &Data) -> Result<Data, String> {
    Ok(Data::Boolean(!data_equals(left, right)))
}

pub fn operation_and(left: &Data, right: &Data) -> Result<Data, String> {
    Ok(Data::Boolean(data_to_boolean(left) && data_to_boolean(right)))
}

pub fn operation_or(left: &Data, right: &Data) -> Result<Data, String> {
    Ok(Data::Boolean(data_to_boolean(left) || data_to_boolean(right)))
}

/// The variable store of one session, including the read-only marks
/// used for system variables.
#[derive(Debug, Default)]
pub struct DataStore {
    pub values: HashMap<String, Data>,
    read_only: HashSet<String>,
}

impl DataStore {
    pub fn new() -> DataStore {
        DataStore {
            values: HashMap::new(),
            read_only: HashSet::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Data> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Data> {
        self.values.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: &str, data: Data) {
        self.values.insert(key.to_string(), data);
    }

    pub fn is_read_only(&self, key: &str) -> bool {
        self.read_only.contains(key)
    }

    pub fn set_read_only(&mut self, key: &str, read_only: bool) {
        if read_only {
            self.read_only.insert(key.to_string());
        } else {
            self.read_only.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.read_only.clear();
    }
}

/// Data model interface trait.\
/// *W3C says*:\
/// The Data Model offers the capability of storing, reading, and modifying a set of data that is
/// internal to the state machine. This specification does not mandate any specific data model,
/// but instead defines a set of abstract capabilities that can be realized by various languages,
/// such as ECMAScript or XML/XPath. Implementations may choose the set of data models that
/// they support. In addition to the underlying data structure, the data model defines a set of
/// expressions as described in 5.9 Expressions. These expressions are used to refer to specific
/// locations in the data model, to compute values to assign to those locations, and to evaluate
/// boolean conditions.\
/// Finally, the data model includes a set of system variables, as defined in 5.10 System
/// Variables, which are automatically maintained by the SCXML processor.
pub trait Datamodel: Send {
    /// Returns the global data.\
    /// As the data model needs access to other global variables and rust doesn't like
    /// accessing data of parents (the FSM in this case) from inside a member (the actual
    /// datamodel), most global data is stored in the "GlobalData" struct that is owned by
    /// the data model.
    fn global(&mut self) -> &mut GlobalDataArc;

    fn global_s(&self) -> &GlobalDataArc;

    /// Get the name of the data model as defined by the \<scxml\> attribute "datamodel".
    fn get_name(&self) -> &str;

    /// Adds the "In" and the other built-in functions.
    fn add_functions(&mut self, doc: &Document);

    /// Initialize the data model for one data-store.
    /// This method is called for the global data and for the data of each state.
    fn initialize_data_model(&mut self, doc: &Document, state: StateId, set_data: bool);

    /// Initialize a global read-only variable.
    fn initialize_read_only(&mut self, name: &str, value: Data);

    /// Sets the system variable "_ioprocessors" from the registered
    /// event-I/O-processors. Datamodels without variables ignore this.
    fn set_ioprocessors(&mut self) {}

    /// Sets a variable, declaring it if unknown.
    fn set(&mut self, name: &str, data: Data);

    /// Sets system variable "_event".
    fn set_event(&mut self, event: &Event);

    /// Executes an assignment. The left-hand-side must be a declared,
    /// writable location.
    fn assign(&mut self, left_expr: &str, right_expr: &str) -> Result<(), String>;

    /// Gets a variable by a location expression.
    fn get_by_location(&mut self, location: &str) -> Result<Data, String>;

    /// Convenient function to retrieve an attribute that has an alternative
    /// "...expr" variant. If the expression form is empty, the literal value
    /// is returned.
    fn get_expression_alternative_value(
        &mut self,
        value: &str,
        value_expression: &str,
    ) -> Result<Data, String> {
        if value_expression.is_empty() {
            Ok(Data::String(value.to_string()))
        } else {
            self.execute(value_expression)
        }
    }

    /// Clear all data.
    fn clear(&mut self);

    /// "log" function, used for \<log\> content.
    fn log(&mut self, label: &str, msg: &str);

    /// Evaluates a script/expression and returns the resulting value.
    fn execute(&mut self, script: &str) -> Result<Data, String>;

    /// Executes a for-each loop over a *copy* of the array or map, so
    /// mutations of the underlying collection are not observed by the loop.\
    /// Returns Ok(false) if the body aborted the loop, Err for illegal
    /// item names or non-iterable collections.
    fn execute_for_each(
        &mut self,
        array_expression: &str,
        item: &str,
        index: &str,
        execute_body: &mut dyn FnMut(&mut dyn Datamodel) -> bool,
    ) -> Result<bool, String>;

    /// *W3C says*:\
    /// The set of operators in conditional expressions varies depending on the data model,
    /// but all data models must support the 'In()' predicate, which takes a state ID as its
    /// argument and returns true if the state machine is in that state.\
    /// Conditional expressions in conformant SCXML documents should not have side effects.
    fn execute_condition(&mut self, script: &str) -> Result<bool, String>;

    /// *W3C says*:\
    /// Indicates that an error internal to the execution of the document has occurred, such as
    /// one arising from expression evaluation.
    fn internal_error_execution(&mut self) {
        get_global!(self).enqueue_internal(Event::error_execution(&None, &None));
    }

    /// *W3C says*:\
    /// Indicates that an error internal to the execution of the document has occurred, such as
    /// one arising from expression evaluation.
    fn internal_error_execution_for_event(
        &mut self,
        send_id: &Option<String>,
        invoke_id: &Option<InvokeId>,
    ) {
        get_global!(self).enqueue_internal(Event::error_execution(send_id, invoke_id));
    }

    /// *W3C says*:\
    /// Indicates that an error has occurred while trying to communicate with an external entity.
    fn internal_error_communication(&mut self, event: &Event) {
        get_global!(self).enqueue_internal(Event::error_communication(event));
    }

    /// Evaluates a content element.\
    /// Returns the static content or executes the expression.
    fn evaluate_content(&mut self, content: &Option<CommonContent>) -> Option<Data> {
        match content {
            None => None,
            Some(ct) => match &ct.content_expr {
                None => ct.content.clone(),
                Some(expr) => {
                    match self.execute(expr.as_str()) {
                        Err(msg) => {
                            // W3C:\
                            // If the evaluation of 'expr' produces an error, the Processor must place
                            // error.execution in the internal event queue and use the empty string as
                            // the value of the <content> element.
                            error!("content expr '{}' is invalid ({})", expr, msg);
                            self.internal_error_execution();
                            None
                        }
                        Ok(value) => Some(value),
                    }
                }
            },
        }
    }

    /// Evaluates a list of \<param\> elements and appends the resulting pairs.
    fn evaluate_params(
        &mut self,
        params: &Option<Vec<Parameter>>,
        values: &mut Vec<ParamPair>,
    ) {
        match params {
            None => {}
            Some(params) => {
                for param in params {
                    if !param.location.is_empty() {
                        match self.get_by_location(&param.location) {
                            Err(msg) => {
                                // W3C:\
                                // If the 'location' attribute does not refer to a valid location in
                                // the data model, ..., the SCXML Processor must place the error
                                // 'error.execution' on the internal event queue and must ignore the
                                // name and value.
                                error!("location of param {} is invalid ({})", param, msg);
                                self.internal_error_execution();
                            }
                            Ok(value) => {
                                values.push(ParamPair::new_moved(param.name.clone(), value));
                            }
                        }
                    } else if !param.expr.is_empty() {
                        match self.execute(param.expr.as_str()) {
                            Err(msg) => {
                                // W3C:\
                                // ...if the evaluation of the 'expr' produces an error, the SCXML
                                // Processor must place the error 'error.execution' on the internal
                                // event queue and must ignore the name and value.
                                error!("expr of param {} is invalid ({})", param, msg);
                                self.internal_error_execution();
                            }
                            Ok(value) => {
                                values.push(ParamPair::new_moved(param.name.clone(), value));
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Creates the datamodel with the specified name.\
/// Currently supported: the expression datamodel (also the default for an
/// empty name) and the Null datamodel.
pub fn create_datamodel(
    name: &str,
    global_data: GlobalDataArc,
) -> Result<Box<dyn Datamodel>, String> {
    match name.to_lowercase().as_str() {
        "" | expression::EXPRESSION_DATAMODEL_LC => {
            Ok(Box::new(expression::ExpressionDatamodel::new(global_data)))
        }
        NULL_DATAMODEL_LC => Ok(Box::new(NullDatamodel::new(global_data))),
        _ => Err(format!("Unsupported datamodel '{}'", name)),
    }
}

/// ## W3C says:
/// ### B.1 The Null Data Model
/// The value "null" for the 'datamodel' attribute results in an absent or empty data model.
/// In particular:
/// - B.1.1 Data Model
///
///   There is no underlying data model.
/// - B.1.2 Conditional Expressions
///
///   The boolean expression language consists of the In predicate only. It has the form 'In(id)',
///   where id is the id of a state in the enclosing state machine.
///   The predicate must return 'true' if and only if that state is in the current state
///   configuration.
/// - B.1.3 Location Expressions
///
///   There is no location expression language.
/// - B.1.4 Value Expressions
///
///   There is no value expression language.
/// - B.1.5 Scripting
///
///   There is no scripting language.
/// - B.1.6 System Variables
///
///   System variables are not accessible.
/// - B.1.7 Unsupported Elements
///
///   The \<foreach\> element and the elements defined in 5 Data Model and Data Manipulation are
///   not supported in the Null Data Model.
pub struct NullDatamodel {
    pub global: GlobalDataArc,
    pub state_name_to_id: HashMap<String, StateId>,
}

impl NullDatamodel {
    pub fn new(global_data: GlobalDataArc) -> NullDatamodel {
        NullDatamodel {
            global: global_data,
            state_name_to_id: HashMap::new(),
        }
    }
}

impl Datamodel for NullDatamodel {
    fn global(&mut self) -> &mut GlobalDataArc {
        &mut self.global
    }

    fn global_s(&self) -> &GlobalDataArc {
        &self.global
    }

    fn get_name(&self) -> &str {
        NULL_DATAMODEL
    }

    fn add_functions(&mut self, doc: &Document) {
        for state in doc.states.as_slice() {
            self.state_name_to_id.insert(state.name.clone(), state.id);
        }
    }

    fn initialize_data_model(&mut self, _doc: &Document, _state: StateId, _set_data: bool) {
        // nothing to do
    }

    fn initialize_read_only(&mut self, _name: &str, _value: Data) {
        // nothing to do
    }

    fn set(&mut self, _name: &str, _data: Data) {
        // nothing to do
    }

    fn set_event(&mut self, _event: &Event) {
        // nothing to do
    }

    fn assign(&mut self, _left_expr: &str, _right_expr: &str) -> Result<(), String> {
        Err("unimplemented".to_string())
    }

    fn get_by_location(&mut self, _location: &str) -> Result<Data, String> {
        Err("unimplemented".to_string())
    }

    fn clear(&mut self) {}

    fn log(&mut self, label: &str, msg: &str) {
        if label.is_empty() {
            println!("{}", msg);
        } else {
            println!("{}: {}", label, msg);
        }
    }

    fn execute(&mut self, _script: &str) -> Result<Data, String> {
        Err("unimplemented".to_string())
    }

    fn execute_for_each(
        &mut self,
        _array_expression: &str,
        _item: &str,
        _index: &str,
        _execute_body: &mut dyn FnMut(&mut dyn Datamodel) -> bool,
    ) -> Result<bool, String> {
        Err("unimplemented".to_string())
    }

    /// *W3C says*:\
    /// The boolean expression language consists of the In predicate only.
    /// It has the form 'In(id)', where id is the id of a state in the enclosing state machine.
    /// The predicate must return 'true' if and only if that state is in the current state
    /// configuration.
    fn execute_condition(&mut self, script: &str) -> Result<bool, String> {
        lazy_static! {
            static ref IN_RE: Regex = Regex::new(r"In\((.*)\)").unwrap();
        }

        let caps = IN_RE.captures(script);
        match caps {
            None => Ok(false),
            Some(caps) => {
                let mut value = caps.get(1).map_or("", |m| m.as_str()).trim();
                if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
                    value = &value[1..value.len() - 1];
                }
                match self.state_name_to_id.get(value) {
                    None => Ok(false),
                    Some(state_id) => Ok(self.global.lock().configuration.is_member(state_id)),
                }
            }
        }
    }
}
