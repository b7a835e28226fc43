//! Maintains the sessions of the process.\
//! The executor owns the event-I/O-processors, the delayed-send scheduler
//! and the registry of running sessions. Cross-session sends, invoke
//! creation and scheduler callbacks all resolve their targets here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[cfg(test)]
use std::println as info;

#[cfg(not(test))]
use log::info;

use crate::builder::DocumentFactory;
use crate::event_io_processor::scxml_event_io_processor::ScxmlEventIOProcessor;
use crate::event_io_processor::EventIOProcessor;
use crate::event_scheduler::EventScheduler;
use crate::fsm::{
    start_fsm_with_data_and_finish_mode, Document, Event, FinishMode, InvokeId, ParamPair,
    ScxmlSession, SessionId,
};

pub struct ExecuteState {
    pub processors: Vec<Arc<Mutex<Box<dyn EventIOProcessor>>>>,
    pub sessions: HashMap<SessionId, ScxmlSession>,
}

impl ExecuteState {
    pub fn new() -> ExecuteState {
        ExecuteState {
            processors: Vec::new(),
            sessions: HashMap::new(),
        }
    }
}

impl Default for ExecuteState {
    fn default() -> Self {
        ExecuteState::new()
    }
}

/// Executes FSM sessions in separate threads.\
/// The registry holds non-owning handles; a session removes itself
/// atomically with its termination.
#[derive(Clone)]
pub struct FsmExecutor {
    pub state: Arc<Mutex<ExecuteState>>,
    pub scheduler: Arc<EventScheduler>,
    pub document_factory: Option<Arc<dyn DocumentFactory>>,
}

impl Default for FsmExecutor {
    fn default() -> Self {
        FsmExecutor::new()
    }
}

impl FsmExecutor {
    pub fn new() -> FsmExecutor {
        let mut e = FsmExecutor {
            state: Arc::new(Mutex::new(ExecuteState::new())),
            scheduler: Arc::new(EventScheduler::new()),
            document_factory: None,
        };
        e.add_processor(Box::new(ScxmlEventIOProcessor::new()));
        e
    }

    pub fn add_processor(&mut self, processor: Box<dyn EventIOProcessor>) {
        self.state
            .lock()
            .unwrap()
            .processors
            .push(Arc::new(Mutex::new(processor)));
    }

    /// Sets the factory used to materialise \<invoke\> documents from
    /// "src" or runtime-evaluated content.
    pub fn set_document_factory(&mut self, factory: Arc<dyn DocumentFactory>) {
        self.document_factory = Some(factory);
    }

    /// Map of processor-type alias to processor, handed to each new session.
    pub fn processor_map(&self) -> HashMap<String, Arc<Mutex<Box<dyn EventIOProcessor>>>> {
        let mut map = HashMap::new();
        for processor in &self.state.lock().unwrap().processors {
            let types: Vec<String> = processor
                .lock()
                .unwrap()
                .get_types()
                .iter()
                .map(|t| t.to_string())
                .collect();
            for t in types {
                map.insert(t, processor.clone());
            }
        }
        map
    }

    /// Starts the document as a new top-level session.
    pub fn execute(&self, document: Arc<Document>) -> Result<ScxmlSession, String> {
        self.execute_with_finish_mode(document, FinishMode::Dispose)
    }

    pub fn execute_with_finish_mode(
        &self,
        document: Arc<Document>,
        finish_mode: FinishMode,
    ) -> Result<ScxmlSession, String> {
        start_fsm_with_data_and_finish_mode(
            document,
            Box::new(self.clone()),
            &[],
            None,
            None,
            finish_mode,
        )
    }

    /// Starts a child session for \<invoke\>.
    pub fn execute_invoke(
        &self,
        document: Arc<Document>,
        data: &[ParamPair],
        parent_session_id: SessionId,
        invoke_id: InvokeId,
    ) -> Result<ScxmlSession, String> {
        start_fsm_with_data_and_finish_mode(
            document,
            Box::new(self.clone()),
            data,
            Some(parent_session_id),
            Some(invoke_id),
            FinishMode::Dispose,
        )
    }

    pub fn parse_document(&self, text: &str) -> Result<Arc<Document>, String> {
        match &self.document_factory {
            Some(factory) => factory.parse(text),
            None => Err("No document factory configured".to_string()),
        }
    }

    pub fn load_document(&self, uri: &str) -> Result<Arc<Document>, String> {
        match &self.document_factory {
            Some(factory) => factory.load(uri),
            None => Err("No document factory configured".to_string()),
        }
    }

    pub fn register_session(&self, session: ScxmlSession) {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(session.session_id, session);
    }

    pub fn remove_session(&self, session_id: SessionId) {
        self.state.lock().unwrap().sessions.remove(&session_id);
    }

    pub fn get_session_sender(
        &self,
        session_id: SessionId,
    ) -> Option<std::sync::mpsc::Sender<Box<Event>>> {
        Some(
            self.state
                .lock()
                .unwrap()
                .sessions
                .get(&session_id)?
                .sender
                .clone(),
        )
    }

    /// Enqueues the event on the external queue of the session.
    pub fn send_to_session(&self, session_id: SessionId, event: Event) -> Result<(), String> {
        match self.get_session_sender(session_id) {
            None => Err(format!("Session #{} not found", session_id)),
            Some(sender) => sender
                .send(Box::new(event))
                .map_err(|e| format!("Can't send to session #{}: {}", session_id, e)),
        }
    }

    /// Cancels all running sessions and shuts the processors down.
    pub fn shutdown(&mut self) {
        info!("Executor shutdown...");
        let mut guard = self.state.lock().unwrap();
        for (_, session) in guard.sessions.iter() {
            let _ = session.sender.send(Box::new(Event::cancel_session()));
        }
        guard.sessions.clear();
        while let Some(processor) = guard.processors.pop() {
            processor.lock().unwrap().shutdown();
        }
    }
}
