//! Pure projection functions over an event slice: no I/O, no clock reads,
//! no hidden state. Every function here is a fold or a last-match lookup
//! over `&[ea_domain::event::Event]` and nothing else, so they're safe to
//! call from the engine, the CLI, and tests alike without a database.

pub mod conversation;
pub mod display_prefs;
pub mod next_step;
pub mod pending_tool_calls;
pub mod session_state;

pub use conversation::{conversation_context, ConversationMessage};
pub use display_prefs::display_prefs;
pub use next_step::{count_steps_taken, next_step, NextStep, StepCounts};
pub use pending_tool_calls::pending_tool_calls;
pub use session_state::{session_state, SessionState, SessionStatus};
