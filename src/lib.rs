//! A W3C SCXML (Harel Statecharts) runtime core in Rust.\
//! \
//! Executes parsed SCXML documents as hierarchical/parallel state machines
//! under run-to-completion semantics: document-ordered transition selection
//! with exit/entry set computation, two-priority event queueing, a
//! delayed-send scheduler, history restoration and an invoke subsystem for
//! nested child sessions.\
//! See <https://www.w3.org/TR/scxml/>.

extern crate core;

pub mod builder;
pub mod common;
pub mod executable_content;
pub mod fsm;
pub mod fsm_executor;

pub mod actions;
pub mod datamodel;
pub mod event_io_processor;
pub mod event_scheduler;
pub mod expression_engine;
pub mod test;
