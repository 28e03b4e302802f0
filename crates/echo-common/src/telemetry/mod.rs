//! Tracing subscriber setup
//!
//! The engine crates only emit `tracing` events. Installing a subscriber is up
//! to the embedding application, or to the integration tests via
//! [`try_init_tracing_with_config`].

mod tracing_setup;

pub use tracing_setup::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
