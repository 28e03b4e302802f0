//! # echo-sync
//!
//! Application layer: the optimistic reaction sync engine and the widget
//! binding built on top of it.
//!
//! ## Example
//!
//! ```ignore
//! use echo_sync::ReactionSync;
//!
//! let sync = ReactionSync::builder()
//!     .identity(identity)
//!     .backend(backend)
//!     .realtime(realtime)
//!     .config(SyncConfig::from_env()?)
//!     .build()?;
//!
//! let handle = sync.watch(&story_id);
//! let state = handle.wait_loaded().await;
//! handle.add_reaction(ReactionKind::Heart).await;
//! ```

pub mod binding;
pub mod engine;

pub use binding::{ReactionHandle, ReactionState};
pub use engine::{MutationOutcome, ReactionSync, ReactionSyncBuilder, RefreshOutcome};
