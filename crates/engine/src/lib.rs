//! Drives a single session stream to termination: read events, project
//! the next step, execute it against the model client and tool registry,
//! and append the resulting events. Owns session lifecycle helpers
//! (`start_session`, `add_user_message`, `terminate_session`) and a
//! streaming variant that forwards progress while still appending only
//! complete, canonical events.

pub mod processing;
pub mod progress;
pub mod session;
pub mod streaming;

pub use processing::process_thread;
pub use progress::AgentProgress;
pub use session::{add_user_message, start_session, terminate_session};
pub use streaming::process_thread_streaming;
