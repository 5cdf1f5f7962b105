//! Shared domain types for the event-sourced agent runtime: the event
//! envelope and catalogue, stream names, provider-agnostic messages and
//! tool calls, streaming deltas, and configuration surfaces.

pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod stream;
pub mod tool;

pub use error::{Error, Result};
pub use event::{Event, Payload, StreamName, ToolCallRef};
