//! Agent runtime
//!
//! - `graph` - the Agent/Tools/End loop over a chat model and tenant tools
//! - `context` - system context and focus hint injection
//! - `plan` / `progress` - task plan extraction and progress accounting
//! - `session` - in-memory transcripts keyed by session id
//! - `turn` - one chat turn projected into `TurnEvent`s

pub mod context;
pub mod graph;
pub mod plan;
pub mod progress;
pub mod session;
pub mod turn;

pub use graph::{Agent, AgentConfig, AgentError, AgentState, AgentStep, PlannedCall};
pub use plan::extract_tasks;
pub use progress::{ProgressUpdate, TaskPlan, TaskStatus};
pub use session::{trim_messages, Session, SessionBusy, SessionStore};
pub use turn::{observe_step, run_turn, CallSummary, TurnEvent};
