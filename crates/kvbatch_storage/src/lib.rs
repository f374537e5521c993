//! # kvbatch Storage
//!
//! Transactional key-value storage boundary for kvbatch.
//!
//! This crate describes the native interface that the batching layer sits
//! on top of. The interface is shaped like a browser object
//! store: a database is opened once, transactions are scoped to one table
//! and one [`Mode`], and every operation is a one-shot [`Request`] that
//! reports completion through events rather than return values.
//!
//! ## Design Principles
//!
//! - Values are **opaque bytes**; the engine never interprets them
//! - Keys are typed ([`Key`]) and ordered by the engine
//! - Requests and transactions signal completion exactly once
//! - All mutations in one transaction commit together or not at all
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - In-process engine for tests and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use kvbatch_storage::{EventKind, EventTarget, Request};
//!
//! let request: Request<u32> = Request::pending();
//! request.succeed(7);
//! assert_eq!(request.emitter().fired(), Some(EventKind::Success));
//! assert_eq!(request.outcome(EventKind::Success).unwrap(), 7);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod event;
mod key;
mod memory;
mod request;

pub use backend::{BoxFuture, Connection, Engine, Mode, Schema, Transaction, UpgradeFn};
pub use error::{StoreError, StoreResult};
pub use event::{Emitter, EventKind, EventTarget, Listener, ListenerId};
pub use key::Key;
pub use memory::{FaultPlan, MemoryEngine};
pub use request::{Completion, Request};
