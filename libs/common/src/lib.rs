pub mod event_id;
pub mod frame;
pub mod message;

pub use event_id::EventId;
pub use message::Message;
