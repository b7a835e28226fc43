//! The SCXML interpreter core.\
//! Implements the data structures and algorithms described in the W3C SCXML
//! recommendation. As reference, the central methods carry the W3C
//! description as documentation.
//! See <https://www.w3.org/TR/scxml/#AlgorithmforSCXMLInterpretation>

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Debug, Display, Formatter};
use std::slice::Iter;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;

#[cfg(test)]
use std::{println as info, println as warn, println as error};

#[cfg(not(test))]
use log::{error, info, warn};

#[cfg(all(feature = "Debug", not(test)))]
use log::debug;
#[cfg(all(feature = "Debug", test))]
use std::println as debug;

use crate::actions::ActionWrapper;
use crate::datamodel::{
    create_datamodel, Data, Datamodel, DataStore, GlobalDataArc, SCXML_EVENT_PROCESSOR,
    SCXML_INVOKE_TYPE, SCXML_INVOKE_TYPE_SHORT, SESSION_ID_VARIABLE_NAME,
    SESSION_NAME_VARIABLE_NAME,
};
use crate::event_io_processor::EventIOProcessor;
use crate::event_scheduler::EventScheduler;
use crate::executable_content::execute_block;
use crate::fsm_executor::FsmExecutor;

pub type StateId = u32;
pub type TransitionId = u32;
pub type ExecutableContentId = u32;
pub type SessionId = u32;
pub type InvokeId = String;

/// Counter for generated platform ids (sendids, invokeids).
pub static PLATFORM_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

static SESSION_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Platform event that cancels a session from outside,
/// used by \<invoke\> cancellation and executor shutdown.
pub const EVENT_CANCEL_SESSION: &str = "cancelSession";

pub const EVENT_DONE_STATE_PREFIX: &str = "done.state.";
pub const EVENT_DONE_INVOKE_PREFIX: &str = "done.invoke.";

/// Safety brake for documents that loop on eventless transitions.
const MAX_MICROSTEPS_PER_MACROSTEP: u32 = 4096;

////////////////////////////////////////////////////////////////////////////////
// ## General purpose data types.
// Structs and methods are designed to match the signatures in the
// W3C pseudo code.

/// Set datatype used by the algorithm.\
/// *W3C says*:\
/// Note that the algorithm assumes a Lisp-like semantics in which the empty
/// Set null is equivalent to boolean 'false' and all other entities are
/// equivalent to 'true'.
#[derive(Debug, Clone, Default)]
pub struct OrderedSet<T> {
    data: Vec<T>,
}

impl<T: Clone + PartialEq> OrderedSet<T> {
    pub fn new() -> OrderedSet<T> {
        OrderedSet { data: Vec::new() }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// *W3C says*:
    /// Adds e to the set if it is not already a member
    pub fn add(&mut self, e: T) {
        if !self.data.contains(&e) {
            self.data.push(e);
        }
    }

    /// *W3C says*:
    /// Deletes e from the set
    pub fn delete(&mut self, e: &T) {
        self.data.retain(|x| *x != *e);
    }

    /// *W3C says*:
    /// Adds all members of s that are not already members of the set
    pub fn union(&mut self, s: &OrderedSet<T>) {
        for e in &s.data {
            self.add(e.clone());
        }
    }

    /// *W3C says*:
    /// Is e a member of set?
    pub fn is_member(&self, e: &T) -> bool {
        self.data.contains(e)
    }

    /// *W3C says*:
    /// Returns true if some element in the set satisfies the predicate f.
    /// Returns false for an empty set.
    pub fn some<F: Fn(&T) -> bool>(&self, f: F) -> bool {
        self.data.iter().any(|e| f(e))
    }

    /// *W3C says*:
    /// Returns true if every element in the set satisfies the predicate f.
    /// Returns true for an empty set.
    pub fn every<F: Fn(&T) -> bool>(&self, f: F) -> bool {
        self.data.iter().all(|e| f(e))
    }

    /// *W3C says*:
    /// Returns true if this set and set s have at least one member in common
    pub fn has_intersection(&self, s: &OrderedSet<T>) -> bool {
        self.data.iter().any(|e| s.is_member(e))
    }

    /// *W3C says*:
    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// *W3C says*:
    /// Remove all elements from the set (make it empty)
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn iterator(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    /// Converts the set to a list that reflects the order in which the
    /// elements were originally added.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.clone()
    }
}

/// Queue datatype used by the algorithm.
#[derive(Debug, Default)]
pub struct Queue<T> {
    data: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Queue<T> {
        Queue {
            data: VecDeque::new(),
        }
    }

    /// *W3C says*:
    /// Puts e last in the queue
    pub fn enqueue(&mut self, e: T) {
        self.data.push_back(e);
    }

    /// *W3C says*:
    /// Removes and returns first element in queue
    pub fn dequeue(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    /// *W3C says*:
    /// Is the queue empty?
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Blocking queue datatype used by the algorithm for the external queue.\
/// External producers (scheduler callbacks, parent and child sessions, I/O
/// processors) enqueue through cloned senders; the driver is the only
/// consumer and blocks at macrostep quiescence.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    pub sender: Sender<T>,
    pub receiver: Arc<Mutex<Receiver<T>>>,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        BlockingQueue::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> BlockingQueue<T> {
        let (sender, receiver) = channel();
        BlockingQueue {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// *W3C says*:
    /// Puts e last in the queue
    pub fn enqueue(&mut self, e: T) {
        let _ = self.sender.send(e);
    }
}

////////////////////////////////////////////////////////////////////////////////
// ## Events

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventType {
    /// Platform internal events, e.g. errors, never visible on the
    /// external queue.
    Platform,
    /// Events raised by \<raise\> or \<send\> to '#_internal'.
    Internal,
    /// All other events.
    External,
}

impl EventType {
    /// The value of the "type" field of "_event".
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Platform => "platform",
            EventType::Internal => "internal",
            EventType::External => "external",
        }
    }
}

/// A name/value pair resulting from \<param\> or namelist evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamPair {
    pub name: String,
    pub value: Data,
}

impl ParamPair {
    pub fn new(name: &str, value: &Data) -> ParamPair {
        ParamPair {
            name: name.to_string(),
            value: value.clone(),
        }
    }

    pub fn new_moved(name: String, value: Data) -> ParamPair {
        ParamPair { name, value }
    }
}

/// A \<content\> child, either a literal value or an expression that is
/// evaluated when the surrounding element executes.
#[derive(Debug, Clone)]
pub struct CommonContent {
    pub content: Option<Data>,
    pub content_expr: Option<String>,
}

impl CommonContent {
    pub fn from_value(value: Data) -> CommonContent {
        CommonContent {
            content: Some(value),
            content_expr: None,
        }
    }

    pub fn from_expression(expr: &str) -> CommonContent {
        CommonContent {
            content: None,
            content_expr: Some(expr.to_string()),
        }
    }
}

/// A \<param\> element of \<send\>, \<invoke\> or \<donedata\>.
#[derive(Debug, Clone, Default)]
pub struct Parameter {
    pub name: String,
    pub expr: String,
    pub location: String,
}

impl Display for Parameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parameter{{name:{} expr:{} location:{}}}",
            self.name, self.expr, self.location
        )
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub etype: EventType,
    pub sendid: Option<String>,
    pub origin: Option<String>,
    pub origin_type: Option<String>,
    pub invoke_id: Option<InvokeId>,
    pub param_values: Option<Vec<ParamPair>>,
    pub content: Option<Data>,
}

impl Event {
    pub fn new_simple(name: &str) -> Event {
        Event {
            name: name.to_string(),
            etype: EventType::Internal,
            sendid: None,
            origin: None,
            origin_type: None,
            invoke_id: None,
            param_values: None,
            content: None,
        }
    }

    pub fn new_external(name: &str) -> Event {
        Event {
            etype: EventType::External,
            ..Event::new_simple(name)
        }
    }

    /// The platform event that cancels a session from outside.
    pub fn cancel_session() -> Event {
        Event {
            etype: EventType::Platform,
            ..Event::new_simple(EVENT_CANCEL_SESSION)
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.etype == EventType::Platform && self.name == EVENT_CANCEL_SESSION
    }

    /// *W3C says*:\
    /// Indicates that an error internal to the execution of the document has
    /// occurred, such as one arising from expression evaluation.
    pub fn error_execution(send_id: &Option<String>, invoke_id: &Option<InvokeId>) -> Event {
        Event {
            name: "error.execution".to_string(),
            etype: EventType::Platform,
            sendid: send_id.clone(),
            origin: None,
            origin_type: None,
            invoke_id: invoke_id.clone(),
            param_values: None,
            content: None,
        }
    }

    /// *W3C says*:\
    /// Indicates that an error has occurred while trying to communicate with
    /// an external entity.
    pub fn error_communication(event: &Event) -> Event {
        Event::error_communication_for(&event.sendid, &event.invoke_id)
    }

    pub fn error_communication_for(
        send_id: &Option<String>,
        invoke_id: &Option<InvokeId>,
    ) -> Event {
        Event {
            name: "error.communication".to_string(),
            etype: EventType::Platform,
            sendid: send_id.clone(),
            origin: None,
            origin_type: None,
            invoke_id: invoke_id.clone(),
            param_values: None,
            content: None,
        }
    }

    /// The "done.state.&lt;id&gt;" event generated when a compound state is
    /// entered into a final child or a parallel completes.
    pub fn done_state(
        state_name: &str,
        param_values: Option<Vec<ParamPair>>,
        content: Option<Data>,
    ) -> Event {
        Event {
            name: format!("{}{}", EVENT_DONE_STATE_PREFIX, state_name),
            etype: EventType::Internal,
            sendid: None,
            origin: None,
            origin_type: None,
            invoke_id: None,
            param_values,
            content,
        }
    }

    /// The "done.invoke.&lt;invokeid&gt;" event sent to the parent session
    /// when an invoked child reaches its top-level final state.
    pub fn done_invoke(
        invoke_id: &InvokeId,
        param_values: Option<Vec<ParamPair>>,
        content: Option<Data>,
    ) -> Event {
        Event {
            name: format!("{}{}", EVENT_DONE_INVOKE_PREFIX, invoke_id),
            etype: EventType::External,
            sendid: None,
            origin: None,
            origin_type: Some(SCXML_EVENT_PROCESSOR.to_string()),
            invoke_id: Some(invoke_id.clone()),
            param_values,
            content,
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event{{name:{} type:{}}}", self.name, self.etype.name())
    }
}

/// *W3C says*:\
/// An event descriptor matches an event name if its string of tokens is an
/// exact match or a prefix of the set of tokens in the event's name. In all
/// cases, the token matching is case sensitive.
pub fn name_match(descriptors: &[String], name: &str) -> bool {
    descriptors.iter().any(|descriptor| {
        let mut d = descriptor.trim();
        if d == "*" {
            return true;
        }
        if let Some(stripped) = d.strip_suffix(".*") {
            d = stripped;
        }
        d = d.strip_suffix('.').unwrap_or(d);
        if d.is_empty() {
            return false;
        }
        name == d || (name.starts_with(d) && name[d.len()..].starts_with('.'))
    })
}

////////////////////////////////////////////////////////////////////////////////
// ## Document model (immutable after build)

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingType {
    Early,
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionType {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistoryType {
    None,
    Shallow,
    Deep,
}

/// A \<data\> declaration.
#[derive(Debug, Clone)]
pub struct DataItem {
    pub name: String,
    /// Expression evaluated at bind time.
    pub expr: Option<String>,
    /// Literal value, used when no expression is given.
    pub content: Option<Data>,
}

/// The \<donedata\> of a final state.
#[derive(Debug, Clone)]
pub struct DoneData {
    pub content: Option<CommonContent>,
    pub params: Option<Vec<Parameter>>,
}

/// An \<invoke\> specification.\
/// The child document is either inline (pre-parsed), loaded from "src" or
/// produced by a content expression that is evaluated and parsed at
/// execution time.
#[derive(Debug, Clone)]
pub struct Invoke {
    pub doc_id: u32,
    /// The explicit "id". Empty means a platform id is generated in the
    /// W3C format "stateid.platformid".
    pub invoke_id: String,
    pub id_location: String,
    pub type_name: String,
    pub src: String,
    pub src_expr: String,
    pub content: Option<Arc<Document>>,
    pub content_expr: String,
    pub namelist: Vec<String>,
    pub params: Option<Vec<Parameter>>,
    pub autoforward: bool,
    pub finalize: ExecutableContentId,
}

impl Invoke {
    pub fn new() -> Invoke {
        Invoke {
            doc_id: 0,
            invoke_id: String::new(),
            id_location: String::new(),
            type_name: String::new(),
            src: String::new(),
            src_expr: String::new(),
            content: None,
            content_expr: String::new(),
            namelist: Vec::new(),
            params: None,
            autoforward: false,
            finalize: 0,
        }
    }
}

impl Default for Invoke {
    fn default() -> Self {
        Invoke::new()
    }
}

/// Stores all data of a state node.\
/// Used for the SCXML elements \<state\>, \<parallel\>, \<final\>,
/// \<history\> and the \<scxml\> root.
#[derive(Debug)]
pub struct State {
    /// The internal id, index into the document arena.
    pub id: StateId,

    /// Document order index (pre-order DFS).
    pub doc_id: u32,

    /// The SCXML id attribute.
    pub name: String,

    /// The initial transition, 0 if the state has no children.
    pub initial: TransitionId,

    /// The child states in document order.
    pub states: Vec<StateId>,

    /// History children.
    pub history: Vec<StateId>,

    pub is_parallel: bool,
    pub is_final: bool,
    pub history_type: HistoryType,

    /// The \<onentry\> blocks in document order.
    pub on_entry: Vec<ExecutableContentId>,

    /// The \<onexit\> blocks in document order.
    pub on_exit: Vec<ExecutableContentId>,

    /// The outgoing transitions in document order.
    pub transitions: Vec<TransitionId>,

    pub invokes: Vec<Invoke>,

    pub data: Vec<DataItem>,

    /// 0 for the root.
    pub parent: StateId,

    pub donedata: Option<DoneData>,
}

#[derive(Debug)]
pub struct Transition {
    pub id: TransitionId,
    pub doc_id: u32,

    /// The event descriptors. Empty for eventless transitions.
    pub events: Vec<String>,
    pub cond: Option<String>,
    pub source: StateId,
    pub target: Vec<StateId>,
    pub transition_type: TransitionType,
    pub content: ExecutableContentId,
}

/// The immutable document tree, produced by the builder or an external
/// parser. All runtime state lives in the session, documents can be shared
/// between sessions.
#[derive(Debug)]
pub struct Document {
    pub name: String,
    pub datamodel_name: String,
    pub binding: BindingType,
    pub version: String,

    /// The artificial root state representing the \<scxml\> element.
    pub root: StateId,

    /// The state arena, `StateId` is index + 1.
    pub states: Vec<State>,
    /// The transition arena, `TransitionId` is index + 1.
    pub transitions: Vec<Transition>,
    /// Executable content blocks, `ExecutableContentId` is index + 1.
    pub executable: Vec<Vec<crate::executable_content::Action>>,

    pub state_names: HashMap<String, StateId>,

    /// The global \<script\> element, 0 if none.
    pub script: ExecutableContentId,
}

impl Document {
    pub fn state(&self, id: StateId) -> &State {
        &self.states[(id - 1) as usize]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[(id - 1) as usize]
    }

    pub fn block(&self, id: ExecutableContentId) -> &Vec<crate::executable_content::Action> {
        &self.executable[(id - 1) as usize]
    }

    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.state_names.get(name).map(|id| self.state(*id))
    }

    /// *W3C says*:\
    /// An atomic state is a \<state\> that has no \<state\>, \<parallel\> or
    /// \<final\> children, or a \<final\> state.
    pub fn is_atomic(&self, id: StateId) -> bool {
        let s = self.state(id);
        s.history_type == HistoryType::None && !s.is_parallel && s.states.is_empty()
    }

    /// *W3C says*:\
    /// A compound state is a \<state\> that has \<state\>, \<parallel\>, or
    /// \<final\> children (or a combination of these).
    pub fn is_compound(&self, id: StateId) -> bool {
        let s = self.state(id);
        s.history_type == HistoryType::None
            && !s.is_parallel
            && !s.is_final
            && !s.states.is_empty()
    }

    pub fn is_parallel(&self, id: StateId) -> bool {
        self.state(id).is_parallel
    }

    pub fn is_final(&self, id: StateId) -> bool {
        self.state(id).is_final
    }

    pub fn is_history(&self, id: StateId) -> bool {
        self.state(id).history_type != HistoryType::None
    }

    pub fn is_scxml_root(&self, id: StateId) -> bool {
        id == self.root
    }

    /// *W3C says*:\
    /// Returns 'true' if state1 is a descendant of state2 (a child, or a
    /// child of a child, etc.) Otherwise returns 'false'.
    pub fn is_descendant(&self, state1: StateId, state2: StateId) -> bool {
        if state1 == 0 || state2 == 0 {
            return false;
        }
        let mut parent = self.state(state1).parent;
        while parent != 0 {
            if parent == state2 {
                return true;
            }
            parent = self.state(parent).parent;
        }
        false
    }

    /// *W3C says*:\
    /// If state2 is null, returns the set of all ancestors of state1 in
    /// ancestry order (state1's parent followed by the parent's parent, etc.
    /// up to an including the \<scxml\> element). If state2 is non-null,
    /// returns in ancestry order the set of all ancestors of state1, up to
    /// but not including state2.
    pub fn proper_ancestors(&self, state1: StateId, state2: StateId) -> Vec<StateId> {
        let mut ancestors = Vec::new();
        let mut parent = self.state(state1).parent;
        while parent != 0 && parent != state2 {
            ancestors.push(parent);
            parent = self.state(parent).parent;
        }
        ancestors
    }

    /// *W3C says*:\
    /// Returns a list containing all \<state\>, \<final\>, and \<parallel\>
    /// children of state1.
    pub fn child_states(&self, id: StateId) -> &[StateId] {
        self.state(id).states.as_slice()
    }

    /// Sorts state ids in document order.
    pub fn sort_in_document_order(&self, states: &mut [StateId]) {
        states.sort_by_key(|id| self.state(*id).doc_id);
    }

    /// Sorts state ids in exit order (reverse document order).
    pub fn sort_in_exit_order(&self, states: &mut [StateId]) {
        states.sort_by_key(|id| std::cmp::Reverse(self.state(*id).doc_id));
    }
}

////////////////////////////////////////////////////////////////////////////////
// ## Session data

/// Handle to a running session.\
/// The executor registry and parent sessions hold clones without the
/// thread handle; only the handle returned by the start function can join.
pub struct ScxmlSession {
    pub session_id: SessionId,
    /// The invoke id, if this session was created by \<invoke\>.
    pub invoke_id: Option<InvokeId>,
    /// Sender into the external queue of the session.
    pub sender: Sender<Box<Event>>,
    pub session_thread: Option<JoinHandle<()>>,
    pub global_data: GlobalDataArc,
}

impl Clone for ScxmlSession {
    fn clone(&self) -> Self {
        ScxmlSession {
            session_id: self.session_id,
            invoke_id: self.invoke_id.clone(),
            sender: self.sender.clone(),
            session_thread: None,
            global_data: self.global_data.clone(),
        }
    }
}

impl Debug for ScxmlSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScxmlSession{{#{}}}", self.session_id)
    }
}

/// A child session started by \<invoke\>, tracked by the parent.
pub struct ChildSession {
    pub session: ScxmlSession,
    /// The state that executed the invoke; exiting it cancels the child.
    pub state_id: StateId,
    pub autoforward: bool,
    /// The \<finalize\> block of the invoke, 0 if none.
    pub finalize: ExecutableContentId,
}

/// What happens to the session data when the interpreter halts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinishMode {
    Dispose,
    /// Keep the final configuration for inspection, used by test harnesses.
    KeepConfiguration,
}

/// The runtime data of one session, shared behind a mutex between the
/// driver, the scheduler callbacks and producer threads.\
/// The configuration and data store are owned exclusively by the driver;
/// external producers only enqueue events.
pub struct GlobalData {
    pub session_id: SessionId,
    pub configuration: OrderedSet<StateId>,
    pub internal_queue: Queue<Event>,
    pub external_queue: BlockingQueue<Box<Event>>,
    pub history_value: HashMap<StateId, OrderedSet<StateId>>,
    pub data: DataStore,
    pub actions: ActionWrapper,
    pub io_processors: HashMap<String, Arc<Mutex<Box<dyn EventIOProcessor>>>>,
    pub executor: Option<Box<FsmExecutor>>,
    pub scheduler: Option<Arc<EventScheduler>>,
    /// Guards of pending delayed sends, keyed by sendid. Dropping a guard
    /// cancels the send.
    pub delayed_send: HashMap<String, timer::Guard>,
    pub parent_session_id: Option<SessionId>,
    pub caller_invoke_id: Option<InvokeId>,
    pub child_sessions: HashMap<InvokeId, ChildSession>,
    /// Invoke ids of cancelled children; queued events from them are dropped.
    pub cancelled_invoke_ids: HashSet<InvokeId>,
    pub final_configuration: Option<Vec<String>>,
}

impl Default for GlobalData {
    fn default() -> Self {
        GlobalData::new()
    }
}

impl GlobalData {
    pub fn new() -> GlobalData {
        GlobalData {
            session_id: 0,
            configuration: OrderedSet::new(),
            internal_queue: Queue::new(),
            external_queue: BlockingQueue::new(),
            history_value: HashMap::new(),
            data: DataStore::new(),
            actions: ActionWrapper::new(),
            io_processors: HashMap::new(),
            executor: None,
            scheduler: None,
            delayed_send: HashMap::new(),
            parent_session_id: None,
            caller_invoke_id: None,
            child_sessions: HashMap::new(),
            cancelled_invoke_ids: HashSet::new(),
            final_configuration: None,
        }
    }

    pub fn enqueue_internal(&mut self, event: Event) {
        self.internal_queue.enqueue(event);
    }

    /// Cancels the delayed send with the given sendid.
    /// Cross-session cancels never reach this point, the guards of other
    /// sessions live in their own global data.
    pub fn cancel_delayed_send(&mut self, send_id: &str) -> bool {
        self.delayed_send.remove(send_id).is_some()
    }

    /// Removes all pending delayed sends, used on session termination.
    pub fn cancel_all_delayed_sends(&mut self) -> usize {
        let count = self.delayed_send.len();
        self.delayed_send.clear();
        count
    }
}

////////////////////////////////////////////////////////////////////////////////
// ## Session start

/// Starts the FSM inside a worker thread.
pub fn start_fsm(
    document: Arc<Document>,
    executor: Box<FsmExecutor>,
) -> Result<ScxmlSession, String> {
    start_fsm_with_data_and_finish_mode(
        document,
        executor,
        &[],
        None,
        None,
        FinishMode::Dispose,
    )
}

pub fn start_fsm_with_data(
    document: Arc<Document>,
    executor: Box<FsmExecutor>,
    data: &[ParamPair],
) -> Result<ScxmlSession, String> {
    start_fsm_with_data_and_finish_mode(document, executor, data, None, None, FinishMode::Dispose)
}

pub fn start_fsm_with_data_and_finish_mode(
    document: Arc<Document>,
    executor: Box<FsmExecutor>,
    data: &[ParamPair],
    parent_session_id: Option<SessionId>,
    invoke_id: Option<InvokeId>,
    finish_mode: FinishMode,
) -> Result<ScxmlSession, String> {
    let session_id = SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let global = GlobalDataArc::new();
    let sender;
    {
        let mut guard = global.lock();
        guard.session_id = session_id;
        guard.parent_session_id = parent_session_id;
        guard.caller_invoke_id = invoke_id.clone();
        guard.scheduler = Some(executor.scheduler.clone());
        guard.io_processors = executor.processor_map();
        guard.executor = Some(executor.clone());
        sender = guard.external_queue.sender.clone();
    }
    let datamodel = create_datamodel(document.datamodel_name.as_str(), global.clone())?;

    let session = ScxmlSession {
        session_id,
        invoke_id,
        sender,
        session_thread: None,
        global_data: global.clone(),
    };
    executor.register_session(session.clone());

    let mut fsm = Fsm {
        document,
        datamodel,
        states_to_invoke: OrderedSet::new(),
        running: false,
        finish_mode,
        invoke_data: data.to_vec(),
        initialized_states: HashSet::new(),
    };

    let thread = thread::Builder::new()
        .name(format!("fsm_{}", session_id))
        .spawn(move || {
            fsm.interpret();
        })
        .map_err(|e| e.to_string())?;

    Ok(ScxmlSession {
        session_thread: Some(thread),
        ..session
    })
}

////////////////////////////////////////////////////////////////////////////////
// ## The interpreter

pub struct Fsm {
    pub document: Arc<Document>,
    pub datamodel: Box<dyn Datamodel>,
    pub states_to_invoke: OrderedSet<StateId>,
    pub running: bool,
    pub finish_mode: FinishMode,
    /// Data passed by the invoking parent; only declared \<data\> ids
    /// are bound (W3C 6.3.2).
    pub invoke_data: Vec<ParamPair>,
    /// States whose local data was already bound, relevant for late binding.
    initialized_states: HashSet<StateId>,
}

impl Fsm {
    /// *W3C says*:\
    /// The purpose of this procedure is to initialize the interpreter and to
    /// start processing.
    /// ```ignore
    /// procedure interpret(doc):
    ///     if not valid(doc): failWithError()
    ///     expandScxmlSource(doc)
    ///     configuration = new OrderedSet()
    ///     statesToInvoke = new OrderedSet()
    ///     internalQueue = new Queue()
    ///     externalQueue = new BlockingQueue()
    ///     historyValue = new HashTable()
    ///     datamodel = new Datamodel(doc)
    ///     if doc.binding == "early":
    ///         initializeDatamodel(datamodel, doc)
    ///     running = true
    ///     executeGlobalScriptElement(doc)
    ///     enterStates([doc.initial.transition])
    ///     mainEventLoop()
    /// ```
    pub fn interpret(&mut self) {
        let doc = self.document.clone();
        let session_id = self.datamodel.global_s().lock().session_id;
        info!("Session #{} starting ('{}')", session_id, doc.name);

        self.datamodel
            .initialize_read_only(SESSION_ID_VARIABLE_NAME, Data::String(session_id.to_string()));
        self.datamodel
            .initialize_read_only(SESSION_NAME_VARIABLE_NAME, Data::String(doc.name.clone()));
        self.datamodel.set_ioprocessors();
        self.datamodel.add_functions(&doc);
        self.initialize_data_models(&doc);

        self.running = true;
        if doc.script != 0 {
            execute_block(&doc, doc.script, self.datamodel.as_mut());
        }
        let initial_transition = doc.state(doc.root).initial;
        self.enter_states(&[initial_transition]);
        self.main_event_loop();
        self.exit_interpreter();
        info!("Session #{} finished", session_id);
    }

    /// Binds the \<data\> declarations.\
    /// Early binding assigns all values now; late binding declares them
    /// unbound and assigns state-local values on first entry.
    fn initialize_data_models(&mut self, doc: &Document) {
        let mut ids: Vec<StateId> = doc.states.iter().map(|s| s.id).collect();
        doc.sort_in_document_order(ids.as_mut_slice());
        let early = doc.binding == BindingType::Early;
        for id in ids {
            if early || id == doc.root {
                self.datamodel.initialize_data_model(doc, id, true);
                self.initialized_states.insert(id);
            } else {
                self.datamodel.initialize_data_model(doc, id, false);
            }
        }
        // Values passed by the invoking parent override declared ids.
        let pairs = std::mem::take(&mut self.invoke_data);
        for pair in &pairs {
            let declared = self
                .datamodel
                .global_s()
                .lock()
                .data
                .contains(pair.name.as_str());
            if declared {
                self.datamodel.set(pair.name.as_str(), pair.value.clone());
            }
        }
    }

    /// *W3C says*:\
    /// ## procedure mainEventLoop()
    /// This loop runs until we enter a top-level final state or an external
    /// entity cancels processing. In either case 'running' will be set to
    /// false. At the top of the loop, we have either just entered the state
    /// machine, or we have just processed an external event. Each iteration
    /// through the loop consists of four main steps:
    /// 1) Complete the macrostep by repeatedly taking any internally enabled
    ///    transitions, namely those that don't require an event or that are
    ///    triggered by an internal event.
    /// 2) When there are no more internally enabled transitions available,
    ///    the macrostep is done. Execute any \<invoke\> tags for states that
    ///    we entered on the last iteration through the loop.
    /// 3) If any internal events have been generated by the invokes, repeat
    ///    step 1 to handle any errors raised by the \<invoke\> elements.
    /// 4) When the internal event queue is empty, wait for an external event
    ///    and then execute any transitions that it triggers. Special
    ///    preliminary processing is applied to the event if the state has
    ///    executed any \<invoke\> elements: if this event was generated by an
    ///    invoked process, apply \<finalize\> processing to it; if any
    ///    \<invoke\> elements have autoforwarding set, forward the event to
    ///    them. These steps apply before the transitions are taken.
    ///
    /// This event loop thus enforces run-to-completion semantics, in which
    /// the system processes an external event and then takes all the
    /// 'follow-up' transitions that the processing has enabled before looking
    /// for another external event.
    fn main_event_loop(&mut self) {
        while self.running {
            // Here we handle eventless transitions and transitions
            // triggered by internal events until the macrostep is complete.
            let mut macrostep_done = false;
            let mut guard_tripped = false;
            let mut steps: u32 = 0;
            while self.running && !macrostep_done {
                steps += 1;
                if steps > MAX_MICROSTEPS_PER_MACROSTEP {
                    // A document that loops on eventless transitions or
                    // refills the internal queue from guard evaluation
                    // would never reach quiescence.
                    error!("Transition loop detected, aborting the macrostep");
                    self.datamodel.internal_error_execution();
                    guard_tripped = true;
                    break;
                }
                let mut enabled_transitions = self.select_eventless_transitions();
                if enabled_transitions.is_empty() {
                    let internal_event =
                        { self.datamodel.global_s().lock().internal_queue.dequeue() };
                    match internal_event {
                        None => {
                            macrostep_done = true;
                        }
                        Some(internal_event) => {
                            self.datamodel.set_event(&internal_event);
                            enabled_transitions = self.select_transitions(&internal_event);
                        }
                    }
                }
                if !enabled_transitions.is_empty() {
                    self.microstep(enabled_transitions.as_slice());
                }
            }
            // Either we're in a final state, and we break out of the loop...
            if !self.running {
                break;
            }
            // ...or we've completed a macrostep, so we start a new macrostep
            // by waiting for an external event.
            // Here we invoke whatever needs to be invoked.
            let mut to_invoke = self.states_to_invoke.to_vec();
            self.document.clone().sort_in_document_order(&mut to_invoke);
            self.states_to_invoke.clear();
            for state_id in to_invoke {
                let invokes = self.document.state(state_id).invokes.clone();
                for invoke in &invokes {
                    self.run_invoke(state_id, invoke);
                }
            }
            // Invoking may have raised internal error events;
            // iterate to handle them. After a tripped loop guard the
            // remaining internal events wait for the next external wakeup.
            if !guard_tripped && !self.datamodel.global_s().lock().internal_queue.is_empty() {
                continue;
            }
            // A blocking wait for an external event. If we have been invoked,
            // our parent session may also cancel us here.
            let external_event = match self.dequeue_external() {
                None => {
                    // All senders gone, nothing can wake us again.
                    warn!("External queue disconnected, stopping");
                    self.running = false;
                    continue;
                }
                Some(event) => event,
            };
            if external_event.is_cancel() {
                self.running = false;
                continue;
            }
            // Events queued by an already cancelled invoke are dropped.
            if let Some(invoke_id) = &external_event.invoke_id {
                if self
                    .datamodel
                    .global_s()
                    .lock()
                    .cancelled_invoke_ids
                    .contains(invoke_id)
                {
                    continue;
                }
            }
            self.datamodel.set_event(&external_event);
            self.apply_finalize_and_autoforward(&external_event);
            let enabled_transitions = self.select_transitions(&external_event);
            if !enabled_transitions.is_empty() {
                self.microstep(enabled_transitions.as_slice());
            }
        }
    }

    fn dequeue_external(&mut self) -> Option<Event> {
        let receiver = {
            self.datamodel
                .global_s()
                .lock()
                .external_queue
                .receiver
                .clone()
        };
        // The global lock is not held while blocking here; producers
        // enqueue through the channel sender.
        let result = receiver.lock().unwrap().recv();
        match result {
            Ok(event) => Some(*event),
            Err(_) => None,
        }
    }

    /// On each event received from an invoked child, the matching
    /// \<finalize\> block runs *before* transitions are selected; afterwards
    /// the event is forwarded to all children with autoforward set.
    fn apply_finalize_and_autoforward(&mut self, event: &Event) {
        let doc = self.document.clone();
        let mut finalize_block: ExecutableContentId = 0;
        let mut forward_senders: Vec<Sender<Box<Event>>> = Vec::new();
        {
            let guard = self.datamodel.global_s().lock();
            for (invoke_id, child) in &guard.child_sessions {
                if Some(invoke_id) == event.invoke_id.as_ref() && child.finalize != 0 {
                    finalize_block = child.finalize;
                }
                if child.autoforward {
                    forward_senders.push(child.session.sender.clone());
                }
            }
        }
        if finalize_block != 0 {
            execute_block(&doc, finalize_block, self.datamodel.as_mut());
        }
        for sender in forward_senders {
            // The event keeps its identity; a terminated child
            // silently drops it.
            let _ = sender.send(Box::new(event.clone()));
        }
    }

    /// *W3C says*:\
    /// # function selectEventlessTransitions()
    /// This function selects all transitions that are enabled in the current
    /// configuration that do not require an event trigger. First find a
    /// transition with no 'event' attribute whose condition evaluates to
    /// true. If multiple matching transitions are present, take the first in
    /// document order. If none are present, search in the state's ancestors
    /// in ancestry order until one is found. As soon as such a transition is
    /// found, add it to enabledTransitions, and proceed to the next atomic
    /// state in the configuration. If no such transition is found in the
    /// state or its ancestors, proceed to the next state in the
    /// configuration. When all atomic states have been visited and
    /// transitions selected, filter the set of enabled transitions, removing
    /// any that are preempted by other transitions, then return the
    /// resulting set.
    fn select_eventless_transitions(&mut self) -> Vec<TransitionId> {
        self.select_transitions_impl(None)
    }

    /// *W3C says*:\
    /// # function selectTransitions(event)
    /// The purpose of the selectTransitions() procedure is to collect the
    /// transitions that are enabled by this event in the current
    /// configuration.
    fn select_transitions(&mut self, event: &Event) -> Vec<TransitionId> {
        self.select_transitions_impl(Some(event))
    }

    fn select_transitions_impl(&mut self, event: Option<&Event>) -> Vec<TransitionId> {
        let doc = self.document.clone();
        let configuration = { self.datamodel.global_s().lock().configuration.clone() };
        let mut atomic_states: Vec<StateId> = configuration
            .iterator()
            .filter(|id| doc.is_atomic(**id))
            .cloned()
            .collect();
        doc.sort_in_document_order(atomic_states.as_mut_slice());

        let mut enabled_transitions: Vec<TransitionId> = Vec::new();
        for state_id in atomic_states {
            let mut chain = vec![state_id];
            chain.extend(doc.proper_ancestors(state_id, 0));
            'walk: for s in chain {
                for transition_id in &doc.state(s).transitions {
                    let t = doc.transition(*transition_id);
                    let matches = match event {
                        None => t.events.is_empty(),
                        Some(event) => {
                            !t.events.is_empty() && name_match(t.events.as_slice(), &event.name)
                        }
                    };
                    if matches && self.condition_match(t) {
                        enabled_transitions.push(*transition_id);
                        break 'walk;
                    }
                }
            }
        }
        self.remove_conflicting_transitions(enabled_transitions)
    }

    /// A transition is enabled only if its guard evaluates truthy.
    /// Guard evaluation errors raise "error.execution" and disable the
    /// transition.
    fn condition_match(&mut self, t: &Transition) -> bool {
        match &t.cond {
            None => true,
            Some(cond) => match self.datamodel.execute_condition(cond.as_str()) {
                Ok(value) => value,
                Err(err) => {
                    warn!("Condition '{}' can't be evaluated: {}", cond, err);
                    self.datamodel.internal_error_execution();
                    false
                }
            },
        }
    }

    /// *W3C says*:\
    /// # function removeConflictingTransitions(enabledTransitions)
    /// enabledTransitions will contain multiple transitions only if a
    /// parallel state is active. In that case, we may have one transition
    /// selected for each of its children. These transitions may conflict
    /// with each other in the sense that they have incompatible target
    /// states. The test that transitions have non-intersecting exit sets
    /// captures this requirement. When such a conflict occurs, then if the
    /// source state of one of the transitions is a descendant of the source
    /// state of the other, we select the transition in the descendant.
    /// Otherwise we prefer the transition that was selected by the earlier
    /// state in document order and discard the other transition. Note that
    /// targetless transitions have empty exit sets and thus do not conflict
    /// with any other transitions.
    fn remove_conflicting_transitions(&mut self, enabled: Vec<TransitionId>) -> Vec<TransitionId> {
        let doc = self.document.clone();
        let mut filtered: Vec<TransitionId> = Vec::new();
        for t1 in enabled {
            let mut t1_preempted = false;
            let mut transitions_to_remove: Vec<TransitionId> = Vec::new();
            let exit_set_1 = self.compute_exit_set(&[t1]);
            for t2 in &filtered {
                let exit_set_2 = self.compute_exit_set(&[*t2]);
                if exit_set_1.has_intersection(&exit_set_2) {
                    if doc.is_descendant(doc.transition(t1).source, doc.transition(*t2).source) {
                        transitions_to_remove.push(*t2);
                    } else {
                        t1_preempted = true;
                        break;
                    }
                }
            }
            if !t1_preempted {
                filtered.retain(|t| !transitions_to_remove.contains(t));
                filtered.push(t1);
            }
        }
        filtered
    }

    /// *W3C says*:\
    /// # procedure microstep(enabledTransitions)
    /// The purpose of the microstep procedure is to process a single set of
    /// transitions. The processing of the enabled transitions must be done
    /// in parallel ('lock step') in the sense that their source states must
    /// first be exited, then their actions must be executed, and finally
    /// their target states entered.
    fn microstep(&mut self, enabled_transitions: &[TransitionId]) {
        #[cfg(feature = "Debug")]
        debug!("microstep: {:?}", enabled_transitions);
        self.exit_states(enabled_transitions);
        self.execute_transition_content(enabled_transitions);
        self.enter_states(enabled_transitions);
    }

    /// *W3C says*:\
    /// # procedure exitStates(enabledTransitions)
    /// Compute the set of states to exit. Then remove all the states on
    /// statesToExit from the set of states that will have invoke processing
    /// done at the start of the next macrostep. Then convert statesToExit to
    /// a list and sort it in exitOrder.
    ///
    /// For each state s in the list, if s has a deep history state h, set
    /// the history value of h to be the list of all atomic descendants of s
    /// that are members in the current configuration, else set its value to
    /// be the list of all immediate children of s that are members of the
    /// current configuration. Again for each state s in the list, first
    /// execute any onexit handlers, then cancel any ongoing invocations, and
    /// finally remove s from the current configuration.
    fn exit_states(&mut self, enabled_transitions: &[TransitionId]) {
        let doc = self.document.clone();
        let states_to_exit = self.compute_exit_set(enabled_transitions);
        for s in states_to_exit.iterator() {
            self.states_to_invoke.delete(s);
        }
        let mut sorted = states_to_exit.to_vec();
        doc.sort_in_exit_order(sorted.as_mut_slice());

        // Record history from the pre-exit configuration, before any
        // onexit handler runs.
        {
            let mut guard = self.datamodel.global_s().lock();
            let configuration = guard.configuration.clone();
            for s in &sorted {
                for h in &doc.state(*s).history {
                    let mut recorded: OrderedSet<StateId> = OrderedSet::new();
                    match doc.state(*h).history_type {
                        HistoryType::Deep => {
                            for s0 in configuration.iterator() {
                                if doc.is_atomic(*s0) && doc.is_descendant(*s0, *s) {
                                    recorded.add(*s0);
                                }
                            }
                        }
                        _ => {
                            for s0 in configuration.iterator() {
                                if doc.state(*s0).parent == *s {
                                    recorded.add(*s0);
                                }
                            }
                        }
                    }
                    guard.history_value.insert(*h, recorded);
                }
            }
        }
        for s in &sorted {
            // On executable-content failure the affected block stops,
            // remaining blocks still run (W3C 3.9).
            for block in &doc.state(*s).on_exit {
                execute_block(&doc, *block, self.datamodel.as_mut());
            }
            self.cancel_invokes(*s);
            self.datamodel.global_s().lock().configuration.delete(s);
        }
    }

    /// *W3C says*:\
    /// # procedure executeTransitionContent(enabledTransitions)
    /// For each transition in the list of enabledTransitions, execute its
    /// executable content.
    fn execute_transition_content(&mut self, enabled_transitions: &[TransitionId]) {
        let doc = self.document.clone();
        for t in enabled_transitions {
            let content = doc.transition(*t).content;
            if content != 0 {
                execute_block(&doc, content, self.datamodel.as_mut());
            }
        }
    }

    /// *W3C says*:\
    /// ## procedure enterStates(enabledTransitions)
    /// First, compute the list of all the states that will be entered as a
    /// result of taking the transitions in enabledTransitions. Add them to
    /// statesToInvoke so that invoke processing can be done at the start of
    /// the next macrostep. Convert statesToEnter to a list and sort it in
    /// entryOrder. For each state s in the list, first add s to the current
    /// configuration. Then if we are using late binding, and this is the
    /// first time we have entered s, initialize its data model. Then execute
    /// any onentry handlers. If s's initial state is being entered by
    /// default, execute any executable content in the initial transition.
    /// If a history state in s was the target of a transition, and s has not
    /// been entered before, execute the content inside the history state's
    /// default transition. Finally, if s is a final state, generate relevant
    /// Done events. If we have reached a top-level final state, set running
    /// to false as a signal to stop processing.
    fn enter_states(&mut self, enabled_transitions: &[TransitionId]) {
        let doc = self.document.clone();
        let binding = doc.binding;
        let mut states_to_enter: OrderedSet<StateId> = OrderedSet::new();
        let mut states_for_default_entry: OrderedSet<StateId> = OrderedSet::new();
        // Temporary table for default content in history states.
        let mut default_history_content: HashMap<StateId, ExecutableContentId> = HashMap::new();
        self.compute_entry_set(
            enabled_transitions,
            &mut states_to_enter,
            &mut states_for_default_entry,
            &mut default_history_content,
        );
        let mut sorted = states_to_enter.to_vec();
        doc.sort_in_document_order(sorted.as_mut_slice());
        for s in sorted {
            self.datamodel.global_s().lock().configuration.add(s);
            self.states_to_invoke.add(s);
            if binding == BindingType::Late && !self.initialized_states.contains(&s) {
                self.initialized_states.insert(s);
                self.datamodel.initialize_data_model(&doc, s, true);
            }
            for block in &doc.state(s).on_entry {
                execute_block(&doc, *block, self.datamodel.as_mut());
            }
            if states_for_default_entry.is_member(&s) {
                let initial = doc.state(s).initial;
                if initial != 0 && doc.transition(initial).content != 0 {
                    execute_block(&doc, doc.transition(initial).content, self.datamodel.as_mut());
                }
            }
            if let Some(content) = default_history_content.get(&s) {
                execute_block(&doc, *content, self.datamodel.as_mut());
            }
            if doc.is_final(s) {
                let parent = doc.state(s).parent;
                if doc.is_scxml_root(parent) {
                    self.running = false;
                } else {
                    let (param_values, content) = self.evaluate_done_data(s);
                    {
                        let mut guard = self.datamodel.global_s().lock();
                        guard.enqueue_internal(Event::done_state(
                            doc.state(parent).name.as_str(),
                            param_values,
                            content,
                        ));
                    }
                    let grandparent = doc.state(parent).parent;
                    if grandparent != 0 && doc.is_parallel(grandparent) {
                        let configuration =
                            { self.datamodel.global_s().lock().configuration.clone() };
                        if doc
                            .child_states(grandparent)
                            .iter()
                            .all(|child| self.is_in_final_state(&doc, &configuration, *child))
                        {
                            self.datamodel.global_s().lock().enqueue_internal(
                                Event::done_state(doc.state(grandparent).name.as_str(), None, None),
                            );
                        }
                    }
                }
            }
        }
    }

    /// Evaluates the \<donedata\> of a final state.\
    /// Evaluation errors raise "error.execution" and the done event is
    /// delivered with empty data.
    fn evaluate_done_data(&mut self, s: StateId) -> (Option<Vec<ParamPair>>, Option<Data>) {
        match &self.document.clone().state(s).donedata {
            None => (None, None),
            Some(donedata) => {
                let content = self.datamodel.evaluate_content(&donedata.content);
                let mut pairs: Vec<ParamPair> = Vec::new();
                self.datamodel.evaluate_params(&donedata.params, &mut pairs);
                (if pairs.is_empty() { None } else { Some(pairs) }, content)
            }
        }
    }

    /// *W3C says*:\
    /// # procedure isInFinalState(s)
    /// Return true if s is a compound \<state\> and one of its children is
    /// an active \<final\> state (i.e. is a member of the current
    /// configuration), or if s is a \<parallel\> state and isInFinalState is
    /// true of all its children.
    fn is_in_final_state(
        &self,
        doc: &Document,
        configuration: &OrderedSet<StateId>,
        s: StateId,
    ) -> bool {
        if doc.is_compound(s) {
            doc.child_states(s)
                .iter()
                .any(|c| doc.is_final(*c) && configuration.is_member(c))
        } else if doc.is_parallel(s) {
            doc.child_states(s)
                .iter()
                .all(|c| self.is_in_final_state(doc, configuration, *c))
        } else {
            false
        }
    }

    /// *W3C says*:\
    /// # procedure computeExitSet(enabledTransitions)
    /// For each transition t in enabledTransitions, if t is targetless then
    /// do nothing, else compute the transition's domain. (This will be the
    /// source state in the case of internal transitions) or the least common
    /// compound ancestor state of the source state and target states of t
    /// (in the case of external transitions). Add to the statesToExit set
    /// all states in the configuration that are descendants of the domain.
    fn compute_exit_set(&mut self, transitions: &[TransitionId]) -> OrderedSet<StateId> {
        let doc = self.document.clone();
        let configuration = { self.datamodel.global_s().lock().configuration.clone() };
        let mut states_to_exit: OrderedSet<StateId> = OrderedSet::new();
        for t_id in transitions {
            let t = doc.transition(*t_id);
            if !t.target.is_empty() {
                let domain = self.get_transition_domain(*t_id);
                for s in configuration.iterator() {
                    if doc.is_descendant(*s, domain) {
                        states_to_exit.add(*s);
                    }
                }
            }
        }
        states_to_exit
    }

    /// *W3C says*:\
    /// # procedure computeEntrySet(transitions, statesToEnter, statesForDefaultEntry, defaultHistoryContent)
    /// Compute the complete set of states that will be entered as a result
    /// of taking 'transitions'. This value will be returned in
    /// 'statesToEnter' (which is modified by this procedure). Also place in
    /// 'statesForDefaultEntry' the set of all states whose default initial
    /// states were entered. First gather up all the target states in
    /// 'transitions'. Then add them and, for all that are not atomic states,
    /// add all of their (default) descendants until we reach one or more
    /// atomic states. Then add any ancestors that will be entered within the
    /// domain of the transition.
    fn compute_entry_set(
        &mut self,
        transitions: &[TransitionId],
        states_to_enter: &mut OrderedSet<StateId>,
        states_for_default_entry: &mut OrderedSet<StateId>,
        default_history_content: &mut HashMap<StateId, ExecutableContentId>,
    ) {
        let doc = self.document.clone();
        for t_id in transitions {
            for s in &doc.transition(*t_id).target {
                self.add_descendant_states_to_enter(
                    *s,
                    states_to_enter,
                    states_for_default_entry,
                    default_history_content,
                );
            }
            let ancestor = self.get_transition_domain(*t_id);
            for s in self.get_effective_target_states(*t_id).iterator() {
                self.add_ancestor_states_to_enter(
                    *s,
                    ancestor,
                    states_to_enter,
                    states_for_default_entry,
                    default_history_content,
                );
            }
        }
    }

    /// *W3C says*:\
    /// # procedure addDescendantStatesToEnter(state,statesToEnter,statesForDefaultEntry, defaultHistoryContent)
    /// The purpose of this procedure is to add to statesToEnter 'state' and
    /// any of its descendants that the state machine will end up entering
    /// when it enters 'state'. (N.B. If 'state' is a history pseudo-state,
    /// we dereference it and add the history value instead.)
    fn add_descendant_states_to_enter(
        &mut self,
        state: StateId,
        states_to_enter: &mut OrderedSet<StateId>,
        states_for_default_entry: &mut OrderedSet<StateId>,
        default_history_content: &mut HashMap<StateId, ExecutableContentId>,
    ) {
        let doc = self.document.clone();
        if doc.is_history(state) {
            let recorded = {
                self.datamodel
                    .global_s()
                    .lock()
                    .history_value
                    .get(&state)
                    .cloned()
            };
            match recorded {
                Some(history_value) => {
                    for s in history_value.iterator() {
                        self.add_descendant_states_to_enter(
                            *s,
                            states_to_enter,
                            states_for_default_entry,
                            default_history_content,
                        );
                    }
                    let parent = doc.state(state).parent;
                    for s in history_value.iterator() {
                        self.add_ancestor_states_to_enter(
                            *s,
                            parent,
                            states_to_enter,
                            states_for_default_entry,
                            default_history_content,
                        );
                    }
                }
                None => {
                    // History states have exactly one default transition.
                    let default_transition = doc.state(state).transitions[0];
                    let t = doc.transition(default_transition);
                    let parent = doc.state(state).parent;
                    if t.content != 0 {
                        default_history_content.insert(parent, t.content);
                    }
                    let targets = t.target.clone();
                    for s in &targets {
                        self.add_descendant_states_to_enter(
                            *s,
                            states_to_enter,
                            states_for_default_entry,
                            default_history_content,
                        );
                    }
                    for s in &targets {
                        self.add_ancestor_states_to_enter(
                            *s,
                            parent,
                            states_to_enter,
                            states_for_default_entry,
                            default_history_content,
                        );
                    }
                }
            }
        } else {
            states_to_enter.add(state);
            if doc.is_compound(state) {
                states_for_default_entry.add(state);
                let initial = doc.state(state).initial;
                let targets = doc.transition(initial).target.clone();
                for s in &targets {
                    self.add_descendant_states_to_enter(
                        *s,
                        states_to_enter,
                        states_for_default_entry,
                        default_history_content,
                    );
                }
                for s in &targets {
                    self.add_ancestor_states_to_enter(
                        *s,
                        state,
                        states_to_enter,
                        states_for_default_entry,
                        default_history_content,
                    );
                }
            } else if doc.is_parallel(state) {
                for child in doc.child_states(state).to_vec() {
                    if !states_to_enter.some(|s| doc.is_descendant(*s, child)) {
                        self.add_descendant_states_to_enter(
                            child,
                            states_to_enter,
                            states_for_default_entry,
                            default_history_content,
                        );
                    }
                }
            }
        }
    }

    /// *W3C says*:\
    /// # procedure addAncestorStatesToEnter(state, ancestor, statesToEnter, statesForDefaultEntry, defaultHistoryContent)
    /// Add to statesToEnter any ancestors of 'state' up to, but not
    /// including, 'ancestor' that must be entered in order to enter 'state'.
    /// If any of these ancestor states is a parallel state, we must fill in
    /// its descendants as well.
    fn add_ancestor_states_to_enter(
        &mut self,
        state: StateId,
        ancestor: StateId,
        states_to_enter: &mut OrderedSet<StateId>,
        states_for_default_entry: &mut OrderedSet<StateId>,
        default_history_content: &mut HashMap<StateId, ExecutableContentId>,
    ) {
        let doc = self.document.clone();
        for anc in doc.proper_ancestors(state, ancestor) {
            states_to_enter.add(anc);
            if doc.is_parallel(anc) {
                for child in doc.child_states(anc).to_vec() {
                    if !states_to_enter.some(|s| doc.is_descendant(*s, child)) {
                        self.add_descendant_states_to_enter(
                            child,
                            states_to_enter,
                            states_for_default_entry,
                            default_history_content,
                        );
                    }
                }
            }
        }
    }

    /// *W3C says*:\
    /// # function getTransitionDomain(transition)
    /// Return the compound state such that
    /// 1) all states that are exited or entered as a result of taking
    ///    'transition' are descendants of it
    /// 2) no descendant of it has this property.
    /// ```ignore
    /// function getTransitionDomain(t)
    ///     tstates = getEffectiveTargetStates(t)
    ///     if not tstates:
    ///         return null
    ///     elif t.type == "internal" and isCompoundState(t.source) and tstates.every(lambda s: isDescendant(s,t.source)):
    ///         return t.source
    ///     else:
    ///         return findLCCA([t.source].append(tstates))
    /// ```
    fn get_transition_domain(&mut self, t_id: TransitionId) -> StateId {
        let doc = self.document.clone();
        let t = doc.transition(t_id);
        let tstates = self.get_effective_target_states(t_id);
        if tstates.is_empty() {
            0
        } else if t.transition_type == TransitionType::Internal
            && doc.is_compound(t.source)
            && tstates.every(|s| doc.is_descendant(*s, t.source))
        {
            t.source
        } else {
            let mut states = vec![t.source];
            states.extend(tstates.to_vec());
            doc.find_lcca(states.as_slice())
        }
    }

    /// *W3C says*:\
    /// # function getEffectiveTargetStates(transition)
    /// Returns the states that will be the target when 'transition' is
    /// taken, dereferencing any history states.
    fn get_effective_target_states(&mut self, t_id: TransitionId) -> OrderedSet<StateId> {
        let doc = self.document.clone();
        let mut targets: OrderedSet<StateId> = OrderedSet::new();
        for s in &doc.transition(t_id).target {
            if doc.is_history(*s) {
                let recorded = {
                    self.datamodel
                        .global_s()
                        .lock()
                        .history_value
                        .get(s)
                        .cloned()
                };
                match recorded {
                    Some(history_value) => targets.union(&history_value),
                    None => {
                        // History states have exactly one default transition.
                        let default_transition = doc.state(*s).transitions[0];
                        targets.union(&self.get_effective_target_states(default_transition));
                    }
                }
            } else {
                targets.add(*s);
            }
        }
        targets
    }

    ////////////////////////////////////////////////////////////////////////////
    // ## Invoke handling

    /// Executes a pending invoke at macrostep quiescence (W3C 6.4).\
    /// States that were exited again before the macrostep settled never
    /// reach this point, their pending invokes were discarded.
    fn run_invoke(&mut self, state_id: StateId, invoke: &Invoke) {
        let doc = self.document.clone();
        let type_name = invoke.type_name.trim();
        if !(type_name.is_empty()
            || type_name.eq_ignore_ascii_case(SCXML_INVOKE_TYPE_SHORT)
            || type_name == SCXML_INVOKE_TYPE
            || type_name == SCXML_INVOKE_TYPE.trim_end_matches('/'))
        {
            error!("Unsupported invoke type '{}'", invoke.type_name);
            self.datamodel.internal_error_execution();
            return;
        }

        let invoke_id = if invoke.invoke_id.is_empty() {
            // W3C 6.4.1: generated ids have the form "stateid.platformid".
            format!(
                "{}.{}",
                doc.state(state_id).name,
                PLATFORM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
            )
        } else {
            invoke.invoke_id.clone()
        };
        if !invoke.id_location.is_empty() {
            self.datamodel
                .set(invoke.id_location.as_str(), Data::String(invoke_id.clone()));
        }

        let executor_opt = self.datamodel.global_s().lock().executor.clone();
        let executor = match executor_opt {
            Some(executor) => executor,
            None => {
                error!("No executor available, can't invoke");
                self.datamodel.internal_error_execution();
                return;
            }
        };

        // Materialise the child document.
        let child_document: Arc<Document> = if let Some(inline) = &invoke.content {
            inline.clone()
        } else if !invoke.content_expr.is_empty() {
            let text = match self.datamodel.execute(invoke.content_expr.as_str()) {
                Ok(value) => value.to_string(),
                Err(err) => {
                    error!("Invoke content expression failed: {}", err);
                    self.datamodel.internal_error_execution();
                    return;
                }
            };
            match executor.parse_document(text.as_str()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    error!("Invoke content can't be parsed: {}", err);
                    self.datamodel.internal_error_execution();
                    return;
                }
            }
        } else {
            let uri = if !invoke.src_expr.is_empty() {
                match self.datamodel.execute(invoke.src_expr.as_str()) {
                    Ok(value) => value.to_string(),
                    Err(err) => {
                        error!("Invoke src expression failed: {}", err);
                        self.datamodel.internal_error_execution();
                        return;
                    }
                }
            } else if !invoke.src.is_empty() {
                invoke.src.clone()
            } else {
                error!("Invoke without content or src");
                self.datamodel.internal_error_execution();
                return;
            };
            match executor.load_document(uri.as_str()) {
                Ok(loaded) => loaded,
                Err(err) => {
                    error!("Invoke src '{}' can't be loaded: {}", uri, err);
                    self.datamodel.global_s().lock().enqueue_internal(
                        Event::error_communication_for(&None, &Some(invoke_id)),
                    );
                    return;
                }
            }
        };

        // W3C 6.4: evaluation errors of namelist or params block the invoke.
        let mut pairs: Vec<ParamPair> = Vec::new();
        self.datamodel.evaluate_params(&invoke.params, &mut pairs);
        for name in &invoke.namelist {
            match self.datamodel.get_by_location(name.as_str()) {
                Err(err) => {
                    error!("Invoke namelist '{}' can't be evaluated: {}", name, err);
                    self.datamodel.internal_error_execution();
                    return;
                }
                Ok(value) => {
                    pairs.push(ParamPair::new(name.as_str(), &value));
                }
            }
        }

        let parent_session_id = { self.datamodel.global_s().lock().session_id };
        match executor.execute_invoke(
            child_document,
            pairs.as_slice(),
            parent_session_id,
            invoke_id.clone(),
        ) {
            Err(err) => {
                error!("Invoke '{}' can't be started: {}", invoke_id, err);
                self.datamodel.global_s().lock().enqueue_internal(
                    Event::error_communication_for(&None, &Some(invoke_id)),
                );
            }
            Ok(session) => {
                let mut guard = self.datamodel.global_s().lock();
                guard.child_sessions.insert(
                    invoke_id,
                    ChildSession {
                        session,
                        state_id,
                        autoforward: invoke.autoforward,
                        finalize: invoke.finalize,
                    },
                );
            }
        }
    }

    /// Cancels all running invocations owned by the state.\
    /// Cancelled children are remembered so that their queued events can be
    /// filtered.
    fn cancel_invokes(&mut self, state_id: StateId) {
        let mut cancelled: Vec<(InvokeId, Sender<Box<Event>>)> = Vec::new();
        {
            let mut guard = self.datamodel.global_s().lock();
            let ids: Vec<InvokeId> = guard
                .child_sessions
                .iter()
                .filter(|(_, child)| child.state_id == state_id)
                .map(|(id, _)| id.clone())
                .collect();
            for id in ids {
                if let Some(child) = guard.child_sessions.remove(&id) {
                    guard.cancelled_invoke_ids.insert(id.clone());
                    cancelled.push((id, child.session.sender.clone()));
                }
            }
        }
        #[allow(unused_variables)]
        for (id, sender) in cancelled {
            #[cfg(feature = "Debug")]
            debug!("Cancel invoke '{}'", id);
            let _ = sender.send(Box::new(Event::cancel_session()));
        }
    }

    /// *W3C says*:\
    /// # procedure exitInterpreter()
    /// The purpose of this procedure is to exit the current SCXML process by
    /// exiting all active states. If the machine is in a top-level final
    /// state, a Done event is generated. (Note that in this case, the final
    /// state will be the only active state.) The implementation of
    /// returnDoneEvent is platform-dependent, but if this session is the
    /// result of an \<invoke\> in another SCXML session, returnDoneEvent
    /// will cause the event done.invoke.\<id\> to be placed in the external
    /// event queue of that session, where \<id\> is the id generated in that
    /// session when the \<invoke\> was executed.
    fn exit_interpreter(&mut self) {
        let doc = self.document.clone();
        let mut states_to_exit = { self.datamodel.global_s().lock().configuration.to_vec() };
        doc.sort_in_exit_order(states_to_exit.as_mut_slice());

        if self.finish_mode == FinishMode::KeepConfiguration {
            let names: Vec<String> = states_to_exit
                .iter()
                .map(|s| doc.state(*s).name.clone())
                .collect();
            self.datamodel.global_s().lock().final_configuration = Some(names);
        }

        let mut done_data: Option<(Option<Vec<ParamPair>>, Option<Data>)> = None;
        for s in states_to_exit {
            for block in &doc.state(s).on_exit {
                execute_block(&doc, *block, self.datamodel.as_mut());
            }
            self.cancel_invokes(s);
            self.datamodel.global_s().lock().configuration.delete(&s);
            if doc.is_final(s) && doc.is_scxml_root(doc.state(s).parent) {
                done_data = Some(self.evaluate_done_data(s));
            }
        }

        let (session_id, parent, invoke_id, executor, cancelled_sends) = {
            let mut guard = self.datamodel.global_s().lock();
            (
                guard.session_id,
                guard.parent_session_id,
                guard.caller_invoke_id.clone(),
                guard.executor.clone(),
                guard.cancel_all_delayed_sends(),
            )
        };
        if cancelled_sends > 0 {
            #[cfg(feature = "Debug")]
            debug!("Cancelled {} pending delayed sends", cancelled_sends);
        }
        if let Some(executor) = executor {
            if let (Some(parent), Some(invoke_id)) = (parent, invoke_id) {
                let (param_values, content) = done_data.unwrap_or((None, None));
                let mut event = Event::done_invoke(&invoke_id, param_values, content);
                event.origin = Some(format!("#_scxml_{}", session_id));
                if executor.send_to_session(parent, event).is_err() {
                    // The parent session terminated first; nothing left to
                    // inform.
                    warn!("Parent session #{} is gone", parent);
                }
            }
            executor.remove_session(session_id);
        }
    }
}

/// *W3C says*:\
/// # function findLCCA(stateList)
/// The Least Common Compound Ancestor is the \<state\> or \<scxml\> element
/// s such that s is a proper ancestor of all states on stateList and no
/// descendant of s has this property. Note that there is guaranteed to be
/// such an element since the \<scxml\> wrapper element is a common ancestor
/// of all states. Note also that since we are speaking of proper ancestor
/// (parent or parent of a parent, etc.) the LCCA is never a member of
/// stateList.
impl Document {
    pub fn find_lcca(&self, state_list: &[StateId]) -> StateId {
        let head = state_list[0];
        for anc in self.proper_ancestors(head, 0) {
            if self.is_compound(anc) || self.is_scxml_root(anc) {
                if state_list[1..].iter().all(|s| self.is_descendant(*s, anc)) {
                    return anc;
                }
            }
        }
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_set_keeps_insert_order_and_uniqueness() {
        let mut set: OrderedSet<u32> = OrderedSet::new();
        set.add(3);
        set.add(1);
        set.add(3);
        set.add(2);
        assert_eq!(set.to_vec(), vec![3, 1, 2]);
        assert!(set.is_member(&1));
        set.delete(&1);
        assert!(!set.is_member(&1));
        assert_eq!(set.size(), 2);
    }

    #[test]
    fn ordered_set_union_and_intersection() {
        let mut a: OrderedSet<u32> = OrderedSet::new();
        a.add(1);
        a.add(2);
        let mut b: OrderedSet<u32> = OrderedSet::new();
        b.add(2);
        b.add(3);
        assert!(a.has_intersection(&b));
        a.union(&b);
        assert_eq!(a.to_vec(), vec![1, 2, 3]);
        let empty: OrderedSet<u32> = OrderedSet::new();
        assert!(!a.has_intersection(&empty));
        assert!(empty.every(|_| false));
        assert!(!empty.some(|_| true));
    }

    #[test]
    fn queue_is_fifo() {
        let mut q: Queue<u32> = Queue::new();
        assert!(q.is_empty());
        q.enqueue(1);
        q.enqueue(2);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn event_descriptors_match_token_aligned_prefixes() {
        let d = |s: &str| vec![s.to_string()];
        assert!(name_match(&d("error"), "error.execution"));
        assert!(name_match(&d("error.execution"), "error.execution"));
        assert!(name_match(&d("error."), "error.execution"));
        assert!(name_match(&d("error.*"), "error.execution"));
        assert!(name_match(&d("*"), "whatever"));
        assert!(!name_match(&d("error.exec"), "error.execution"));
        assert!(!name_match(&d("errors"), "error.execution"));
        assert!(!name_match(&d("error.execution.x"), "error.execution"));
        assert!(!name_match(&[], "error.execution"));
        assert!(name_match(
            &vec!["foo".to_string(), "done.state".to_string()],
            "done.state.s1"
        ));
    }

    #[test]
    fn cancel_event_is_platform_only() {
        let cancel = Event::cancel_session();
        assert!(cancel.is_cancel());
        let fake = Event::new_external(EVENT_CANCEL_SESSION);
        assert!(!fake.is_cancel());
    }

    #[test]
    fn error_events_carry_sendid() {
        let ev = Event::error_execution(&Some("send_1".to_string()), &None);
        assert_eq!(ev.name, "error.execution");
        assert_eq!(ev.etype, EventType::Platform);
        assert_eq!(ev.sendid, Some("send_1".to_string()));
    }
}
