pub mod engine;
pub mod session;

pub use engine::ConversationEngine;
pub use session::{ConversationState, Session, SessionStore};
