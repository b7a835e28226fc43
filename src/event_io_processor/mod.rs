//! Event I/O processors base.\
//! For details about the concept see [W3C: The Event I/O Processors](https://www.w3.org/TR/scxml/#eventioprocessors).\
//! This module provides a trait to implement event-I/O-processors; the SCXML
//! processor is included, external transports register through the same trait.

use std::fmt::Debug;

use crate::datamodel::GlobalDataArc;
use crate::fsm::{Event, SessionId};

pub mod scxml_event_io_processor;

/// Name of the "_ioprocessors" system variable.
pub const SYS_IO_PROCESSORS: &str = "_ioprocessors";

/// Trait for event I/O processors.\
/// A processor routes a \<send\> to its destination. Implementations must
/// only enqueue into session channels from `send` and return, they are
/// called from the sending session's thread and from the scheduler's timer
/// thread.
pub trait EventIOProcessor: Debug + Send {
    /// Returns the location of the given session for this processor,
    /// as published in "_ioprocessors".
    fn get_location(&self, id: SessionId) -> String;

    /// Returns the type URI and the short-cut aliases of this processor.
    fn get_types(&self) -> &[&str];

    /// Delivers the event to the target.\
    /// On failure the processor enqueues the applicable error event
    /// ("error.communication" or "error.execution") on the internal queue of
    /// the sending session and returns false.
    fn send(&mut self, global: &GlobalDataArc, target: &str, event: Event) -> bool;

    fn shutdown(&mut self);
}
