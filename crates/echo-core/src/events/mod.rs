//! Realtime events delivered by the change-notification transport

mod change_event;

pub use change_event::{ChangeEvent, EventClass};
