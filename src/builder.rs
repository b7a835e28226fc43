//! Programmatic construction of documents.\
//! The builder takes the role of an external parser front-end: it assembles
//! the immutable arena and enforces the structural invariants the runtime
//! relies on. Document order is derived from the tree by a pre-order DFS at
//! build time, so construction order of siblings is what counts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::executable_content::Action;
use crate::fsm::{
    BindingType, CommonContent, DataItem, Document, DoneData, ExecutableContentId, HistoryType,
    Invoke, Parameter, State, StateId, Transition, TransitionId, TransitionType,
};

/// Factory used by the invoke subsystem to materialise child documents from
/// "src" URIs or runtime-evaluated content. The core itself never parses.
pub trait DocumentFactory: Send + Sync {
    fn parse(&self, text: &str) -> Result<Arc<Document>, String>;

    fn load(&self, uri: &str) -> Result<Arc<Document>, String>;
}

pub struct DocumentBuilder {
    name: String,
    datamodel_name: String,
    binding: BindingType,
    states: Vec<State>,
    transitions: Vec<Transition>,
    executable: Vec<Vec<Action>>,
    script: ExecutableContentId,
    root: StateId,
    /// Explicit initial targets per compound state.
    initial_targets: HashMap<StateId, Vec<StateId>>,
}

impl DocumentBuilder {
    pub fn new(name: &str) -> DocumentBuilder {
        let mut builder = DocumentBuilder {
            name: name.to_string(),
            datamodel_name: String::new(),
            binding: BindingType::Early,
            states: Vec::new(),
            transitions: Vec::new(),
            executable: Vec::new(),
            script: 0,
            root: 0,
            initial_targets: HashMap::new(),
        };
        builder.root = builder.add_state_node(0, name, false, false, HistoryType::None);
        builder
    }

    pub fn datamodel(&mut self, name: &str) -> &mut Self {
        self.datamodel_name = name.to_string();
        self
    }

    pub fn binding(&mut self, binding: BindingType) -> &mut Self {
        self.binding = binding;
        self
    }

    /// The artificial root state representing the \<scxml\> element.
    pub fn root(&self) -> StateId {
        self.root
    }

    fn add_state_node(
        &mut self,
        parent: StateId,
        name: &str,
        is_parallel: bool,
        is_final: bool,
        history_type: HistoryType,
    ) -> StateId {
        let id = (self.states.len() + 1) as StateId;
        self.states.push(State {
            id,
            doc_id: 0,
            name: name.to_string(),
            initial: 0,
            states: Vec::new(),
            history: Vec::new(),
            is_parallel,
            is_final,
            history_type,
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            transitions: Vec::new(),
            invokes: Vec::new(),
            data: Vec::new(),
            parent,
            donedata: None,
        });
        if parent != 0 {
            if history_type == HistoryType::None {
                self.state_mut(parent).states.push(id);
            } else {
                self.state_mut(parent).history.push(id);
            }
        }
        id
    }

    fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[(id - 1) as usize]
    }

    /// Adds a \<state\>. `parent` None makes it a child of the root.
    pub fn state(&mut self, parent: Option<StateId>, name: &str) -> StateId {
        self.add_state_node(
            parent.unwrap_or(self.root),
            name,
            false,
            false,
            HistoryType::None,
        )
    }

    /// Adds a \<parallel\> state.
    pub fn parallel(&mut self, parent: Option<StateId>, name: &str) -> StateId {
        self.add_state_node(
            parent.unwrap_or(self.root),
            name,
            true,
            false,
            HistoryType::None,
        )
    }

    /// Adds a \<final\> state.
    pub fn final_state(&mut self, parent: Option<StateId>, name: &str) -> StateId {
        self.add_state_node(
            parent.unwrap_or(self.root),
            name,
            false,
            true,
            HistoryType::None,
        )
    }

    /// Adds a \<history\> pseudo state to the parent.\
    /// Its mandatory default transition is added with [DocumentBuilder::transition].
    pub fn history(&mut self, parent: StateId, name: &str, history_type: HistoryType) -> StateId {
        self.add_state_node(parent, name, false, false, history_type)
    }

    /// Sets the explicit initial target(s) of a compound state (the
    /// "initial" attribute or \<initial\> element).
    pub fn initial(&mut self, state: StateId, targets: &[StateId]) -> &mut Self {
        self.initial_targets.insert(state, targets.to_vec());
        self
    }

    /// Registers a block of executable content and returns its id,
    /// used for \<if\>/\<foreach\> bodies and \<finalize\> handlers.
    pub fn block(&mut self, actions: Vec<Action>) -> ExecutableContentId {
        self.executable.push(actions);
        self.executable.len() as ExecutableContentId
    }

    /// Adds an \<onentry\> block.
    pub fn on_entry(&mut self, state: StateId, actions: Vec<Action>) -> &mut Self {
        let block = self.block(actions);
        self.state_mut(state).on_entry.push(block);
        self
    }

    /// Adds an \<onexit\> block.
    pub fn on_exit(&mut self, state: StateId, actions: Vec<Action>) -> &mut Self {
        let block = self.block(actions);
        self.state_mut(state).on_exit.push(block);
        self
    }

    /// The global \<script\> element.
    pub fn script(&mut self, actions: Vec<Action>) -> &mut Self {
        self.script = self.block(actions);
        self
    }

    /// Adds a transition.\
    /// `events` is the space-separated descriptor list, empty for an
    /// eventless transition; an empty target list makes it targetless.
    pub fn transition(
        &mut self,
        source: StateId,
        events: &str,
        cond: Option<&str>,
        targets: &[StateId],
    ) -> TransitionId {
        self.transition_of_type(source, events, cond, targets, TransitionType::External)
    }

    pub fn transition_of_type(
        &mut self,
        source: StateId,
        events: &str,
        cond: Option<&str>,
        targets: &[StateId],
        transition_type: TransitionType,
    ) -> TransitionId {
        let id = (self.transitions.len() + 1) as TransitionId;
        self.transitions.push(Transition {
            id,
            doc_id: id,
            events: events
                .split_whitespace()
                .map(|t| t.to_string())
                .collect(),
            cond: cond.map(|c| c.to_string()),
            source,
            target: targets.to_vec(),
            transition_type,
            content: 0,
        });
        self.state_mut(source).transitions.push(id);
        id
    }

    /// Attaches executable content to a transition.
    pub fn transition_content(&mut self, transition: TransitionId, actions: Vec<Action>) -> &mut Self {
        let block = self.block(actions);
        self.transitions[(transition - 1) as usize].content = block;
        self
    }

    /// Declares a \<data\> item initialised by an expression.
    pub fn data_expr(&mut self, state: Option<StateId>, name: &str, expr: &str) -> &mut Self {
        let state = state.unwrap_or(self.root);
        self.state_mut(state).data.push(DataItem {
            name: name.to_string(),
            expr: Some(expr.to_string()),
            content: None,
        });
        self
    }

    /// Declares a \<data\> item with a literal value.
    pub fn data_value(
        &mut self,
        state: Option<StateId>,
        name: &str,
        value: crate::datamodel::Data,
    ) -> &mut Self {
        let state = state.unwrap_or(self.root);
        self.state_mut(state).data.push(DataItem {
            name: name.to_string(),
            expr: None,
            content: Some(value),
        });
        self
    }

    /// Sets the \<donedata\> of a final state.
    pub fn donedata(
        &mut self,
        state: StateId,
        content: Option<CommonContent>,
        params: Option<Vec<Parameter>>,
    ) -> &mut Self {
        self.state_mut(state).donedata = Some(DoneData { content, params });
        self
    }

    /// Attaches an \<invoke\> to a state.
    pub fn invoke(&mut self, state: StateId, mut invoke: Invoke) -> &mut Self {
        invoke.doc_id = (self.state_mut(state).invokes.len() + 1) as u32;
        self.state_mut(state).invokes.push(invoke);
        self
    }

    /// Validates the structure and produces the immutable document.
    pub fn build(mut self) -> Result<Document, String> {
        self.materialize_initial_transitions()?;
        self.validate()?;

        // Document order: pre-order DFS.
        let mut doc_order: u32 = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            doc_order += 1;
            self.state_mut(id).doc_id = doc_order;
            let state = self.state_mut(id);
            let mut children: Vec<StateId> = state.history.clone();
            children.extend(state.states.iter().cloned());
            // Reversed, so the first child is processed first.
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }

        let mut state_names = HashMap::new();
        for state in &self.states {
            if state_names.insert(state.name.clone(), state.id).is_some() {
                return Err(format!("Duplicate state id '{}'", state.name));
            }
        }

        Ok(Document {
            name: self.name,
            datamodel_name: self.datamodel_name,
            binding: self.binding,
            version: "1.0".to_string(),
            root: self.root,
            states: self.states,
            transitions: self.transitions,
            executable: self.executable,
            state_names,
            script: self.script,
        })
    }

    /// Converts "initial" attributes into initial transitions and creates
    /// default ones (first child in document order) for compound states
    /// without an explicit initial. This step simplifies the statement of
    /// the algorithm and has no effect on the behavior.
    fn materialize_initial_transitions(&mut self) -> Result<(), String> {
        let explicit = std::mem::take(&mut self.initial_targets);
        let ids: Vec<StateId> = self.states.iter().map(|s| s.id).collect();
        for id in ids {
            let state = &self.states[(id - 1) as usize];
            if state.history_type != HistoryType::None || state.is_final {
                continue;
            }
            if state.is_parallel {
                // Parallel states enter all regions, an initial declaration
                // is not allowed.
                if explicit.contains_key(&id) {
                    return Err(format!(
                        "Parallel state '{}' must not declare an initial state",
                        state.name
                    ));
                }
                continue;
            }
            if state.states.is_empty() {
                if explicit.contains_key(&id) {
                    return Err(format!(
                        "State '{}' is atomic and must not declare an initial state",
                        state.name
                    ));
                }
                continue;
            }
            let targets = match explicit.get(&id) {
                Some(targets) => targets.clone(),
                None => vec![state.states[0]],
            };
            for target in &targets {
                if !self.is_descendant_of(*target, id) {
                    return Err(format!(
                        "Initial target of state '{}' is no descendant",
                        state.name
                    ));
                }
            }
            let transition_id = (self.transitions.len() + 1) as TransitionId;
            self.transitions.push(Transition {
                id: transition_id,
                doc_id: transition_id,
                events: Vec::new(),
                cond: None,
                source: id,
                target: targets,
                transition_type: TransitionType::External,
                content: 0,
            });
            self.state_mut(id).initial = transition_id;
        }
        Ok(())
    }

    fn valid_state(&self, id: StateId) -> bool {
        id >= 1 && (id as usize) <= self.states.len()
    }

    fn is_descendant_of(&self, state: StateId, ancestor: StateId) -> bool {
        if !self.valid_state(state) {
            return false;
        }
        let mut parent = self.states[(state - 1) as usize].parent;
        while parent != 0 {
            if parent == ancestor {
                return true;
            }
            parent = self.states[(parent - 1) as usize].parent;
        }
        false
    }

    fn validate(&self) -> Result<(), String> {
        let state_count = self.states.len();
        if self.states[(self.root - 1) as usize].states.is_empty() {
            return Err("Document has no states".to_string());
        }
        for state in &self.states {
            if state.parent != 0 && !self.valid_state(state.parent) {
                return Err(format!("State '{}' has an invalid parent", state.name));
            }
            match state.history_type {
                HistoryType::None => {}
                _ => {
                    // History pseudo states carry exactly one default
                    // transition with at least one target.
                    if state.transitions.len() != 1 {
                        return Err(format!(
                            "History state '{}' must have exactly one default transition",
                            state.name
                        ));
                    }
                    let t = &self.transitions[(state.transitions[0] - 1) as usize];
                    if !t.events.is_empty() || t.cond.is_some() || t.target.is_empty() {
                        return Err(format!(
                            "Default transition of history state '{}' must be eventless, \
                             unconditional and targeted",
                            state.name
                        ));
                    }
                }
            }
            if state.is_final && !state.transitions.is_empty() {
                return Err(format!(
                    "Final state '{}' must not have outgoing transitions",
                    state.name
                ));
            }
            if state.is_parallel {
                for child in &state.states {
                    let c = &self.states[(child - 1) as usize];
                    if c.is_final {
                        return Err(format!(
                            "Parallel state '{}' must not have final region roots",
                            state.name
                        ));
                    }
                }
                if state.states.len() < 2 {
                    return Err(format!(
                        "Parallel state '{}' needs at least two regions",
                        state.name
                    ));
                }
            }
        }
        for t in &self.transitions {
            if !self.valid_state(t.source) {
                return Err(format!("Transition {} has an invalid source", t.id));
            }
            for target in &t.target {
                if !self.valid_state(*target) {
                    return Err(format!("Transition {} has an unresolved target", t.id));
                }
            }
        }
        Ok(())
    }
}
