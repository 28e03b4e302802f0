//! Realtime subscription multiplexing.
//!
//! One upstream channel per resource, shared by every local subscriber.

mod channel_task;
mod channels;
mod multiplexer;
mod signal;

pub use channel_task::MultiplexerConfig;
pub use channels::{ChannelTopic, REACTIONS_TOPIC_PREFIX};
pub use multiplexer::{Multiplexer, Subscription};
pub use signal::{Signal, SignalCallback, SubscriberId};
