//! Fan-out hub
//!
//! The hub maintains the live set of subscriber pipes, a shared snapshot
//! built by folding every broadcast message, and the default flush
//! interval applied to new pipes.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<Hub<M>>
//!                ┌───────────────────────────┐
//!                │ pipes: HashMap<u64,       │
//!                │   { outbound_tx, handle } │
//!                │ snapshot: Option<Arc<M>>  │
//!                └────────────┬──────────────┘
//!                             │ send_all(msg)
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!      [pipe 1]           [pipe 2]           [pipe 3]
//!      batch+flush        immediate          batch+flush
//!          │                  │                  │
//!          └──► write ────────┴──► write ────────┴──► write
//! ```
//!
//! # Shared-instance design
//!
//! `send_all` takes `Arc<M>`: the same allocation reaches every pipe's
//! outbound queue and the snapshot fold. Nothing is copied per subscriber;
//! merge functions produce new values only when batching actually folds.

pub mod config;
pub mod store;

pub use config::HubConfig;
pub use store::Hub;
