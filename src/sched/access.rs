//! Per-resource access-control state machine.
//!
//! This module implements [`AccessController`], a small state machine that
//! guards one logical resource (a pending buffer, a snapshot array, a
//! lookup) and serializes conflicting access through **completion-handle
//! chaining** rather than locks.
//!
//! ## Purpose
//!
//! The goal is to enforce reader/writer rules *across asynchronously
//! completing jobs*:
//!
//! - Any number of jobs may hold **shared read** access concurrently.
//! - Any number may hold **shared write** access concurrently, provided the
//!   resource is internally lane-isolated.
//! - **Exclusive write** and **disposal** exclude everything else.
//!
//! The controller runs no work itself. [`AccessController::acquire`]
//! returns the handle the caller must see complete before touching the
//! resource; the caller combines it with its own scheduling, runs its job,
//! and hands the job's completion handle back through
//! [`AccessController::release`]. Future conflicting acquires then wait on
//! that handle; compatible ones do not.
//!
//! ## State
//!
//! Three dependency accumulators, one per compatibility class:
//!
//! | Accumulator | Meaning |
//! |------------:|---------|
//! | `exclusive_write` | completion of the last exclusive writer |
//! | `shared_writes` | join of every shared-write release since then |
//! | `shared_reads` | join of every shared-read release since then |
//!
//! A shared-read grant waits on the writers; a shared-write grant waits on
//! the exclusive writer and the readers; an exclusive grant waits on all
//! three. Releasing an exclusive grant collapses the accumulators, since
//! its handle already dominates everything before it.
//!
//! ## Call discipline
//!
//! The controller is driven from the scheduling thread in strict
//! acquire→release alternation. Overlapping *calls* (not grants) are a
//! schedule-construction bug and surface as [`AccessError`]; simultaneous
//! conflicting acquires in the same frame before any release are a usage
//! error by the same rule, not a queueing feature.

use crate::sched::error::AccessError;
use crate::sched::handle::{JobGraph, JobHandle};
use crate::sched::types::AccessType;


/// Serializes conflicting access to one guarded resource via completion
/// handles.
///
/// See the module documentation for the model. One controller exists per
/// resource; it has no notion of an owner, only of outstanding completion
/// dependencies per compatibility class.
pub struct AccessController {
    /// Access type of the outstanding grant, if any.
    acquired: Option<AccessType>,

    /// Set once a disposal grant is taken; terminal.
    disposed: bool,

    exclusive_write: JobHandle,
    shared_writes: JobHandle,
    shared_reads: JobHandle,
}

impl AccessController {
    /// Creates a controller with no outstanding dependencies.
    pub fn new() -> Self {
        AccessController {
            acquired: None,
            disposed: false,
            exclusive_write: JobHandle::COMPLETE,
            shared_writes: JobHandle::COMPLETE,
            shared_reads: JobHandle::COMPLETE,
        }
    }

    /// Returns the access type of the outstanding grant, if any.
    pub fn outstanding(&self) -> Option<AccessType> {
        self.acquired
    }

    /// Requests access of the given type.
    ///
    /// Returns the handle that must complete before the resource may be
    /// touched under this grant. The caller schedules its work behind the
    /// returned handle and must pass the work's own completion handle to
    /// [`AccessController::release`].
    ///
    /// # Errors
    /// - [`AccessError::UseAfterDisposal`] once a disposal grant was taken.
    /// - [`AccessError::AlreadyAcquired`] when a grant is still outstanding.
    pub fn acquire(
        &mut self,
        graph: &mut JobGraph,
        access: AccessType,
    ) -> Result<JobHandle, AccessError> {
        if self.disposed {
            return Err(AccessError::UseAfterDisposal);
        }
        if let Some(held) = self.acquired {
            return Err(AccessError::AlreadyAcquired { held, requested: access });
        }

        let handle = match access {
            AccessType::SharedRead => {
                graph.combine(&[self.exclusive_write, self.shared_writes])
            }
            AccessType::SharedWrite => {
                graph.combine(&[self.exclusive_write, self.shared_reads])
            }
            AccessType::ExclusiveWrite | AccessType::Disposal => graph.combine(&[
                self.exclusive_write,
                self.shared_writes,
                self.shared_reads,
            ]),
        };

        self.acquired = Some(access);
        if access == AccessType::Disposal {
            self.disposed = true;
        }
        Ok(handle)
    }

    /// Records that the work under the outstanding grant completes at
    /// `dependency`.
    ///
    /// Future acquires of incompatible types will wait on it; compatible
    /// concurrent accesses do not serialize against each other.
    ///
    /// # Errors
    /// [`AccessError::ReleaseWithoutAcquire`] when no grant is outstanding.
    pub fn release(
        &mut self,
        graph: &mut JobGraph,
        dependency: JobHandle,
    ) -> Result<(), AccessError> {
        let held = self.acquired.take().ok_or(AccessError::ReleaseWithoutAcquire)?;
        match held {
            AccessType::SharedRead => {
                self.shared_reads = graph.combine(&[self.shared_reads, dependency]);
            }
            AccessType::SharedWrite => {
                self.shared_writes = graph.combine(&[self.shared_writes, dependency]);
            }
            AccessType::ExclusiveWrite | AccessType::Disposal => {
                // The exclusive handle already waited on every accumulator,
                // so the accumulators collapse to it.
                self.exclusive_write = dependency;
                self.shared_writes = JobHandle::COMPLETE;
                self.shared_reads = JobHandle::COMPLETE;
            }
        }
        Ok(())
    }
}

impl Default for AccessController {
    fn default() -> Self {
        AccessController::new()
    }
}
