//! Diagnostics Module
//!
//! Structured events emitted while a simulation runs. Each [`Engine`]
//! receives its own sink, so concurrent simulations never share state.
//!
//! # Components
//!
//! - [`EventSink`]: destination for simulation events
//! - [`EventLog`]: in-memory collector, used by default and in tests
//! - [`LogSink`]: forwards events to the `log` facade
//!
//! [`Engine`]: crate::simulation::Engine

pub mod events;

pub use events::{EventKind, EventLog, EventSink, LogSink, SimulationEvent};
