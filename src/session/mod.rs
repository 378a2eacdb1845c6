//! Session lifecycle: persisted records and the supervisor that owns
//! one conversation end to end.

pub mod record;
pub mod store;
pub mod supervisor;

pub use record::{PersistedMessage, SessionRecord};
pub use store::SessionStore;
pub use supervisor::{SessionState, Supervisor, TurnSummary};
