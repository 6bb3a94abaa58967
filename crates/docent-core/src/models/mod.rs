pub mod message;
pub mod session;

pub use message::{Message, MessageId, Role};
pub use session::{Session, SessionWithMessages};
