//! # Scheduling Module
//!
//! Internal implementation of the task-stream scheduling layer.
//!
//! This module contains all core building blocks such as:
//! - Multi-lane pending buffers
//! - Access controllers and completion handles
//! - Deferred snapshot arrays
//! - Stream consolidation
//! - Cancellation and progress propagation
//! - Job batching and stage execution
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod handle;
pub mod buffer;
pub mod access;
pub mod snapshot;
pub mod cancel;
pub mod stream;
pub mod schedule;
pub mod driver;
