//! Ports - the external collaborators the sync engine depends on

mod ports;

pub use ports::{
    ChannelHandle, IdentityProvider, RealtimeChannel, RealtimeProvider, ReactionReader,
    ReactionWriter, TransportResult,
};
