//! Job configuration and stage execution.
//!
//! This module is responsible for:
//! * coordinating many resources' acquire/release calls into one combined
//!   completion handle per unit of work,
//! * grouping jobs into execution stages based on access compatibility,
//! * running compatible jobs in parallel using Rayon,
//! * mapping the host pool's thread index onto the dense 0-based lane
//!   range.
//!
//! ## Scheduling model
//!
//! Jobs declare `(resource, access type)` requirements up front via
//! [`JobConfig`]. At submission each job acquires all of its requirements,
//! combines the grant handles into its dependency, registers its own
//! completion handle, and releases every requirement at that handle — the
//! acquire/release calls are strictly sequential on the scheduling thread
//! even though the *grants* overlap freely.
//!
//! Execution then assigns each job to the earliest stage after every
//! conflicting predecessor, so:
//! * jobs within a stage do **not** conflict and may run in parallel,
//! * conflicting jobs run in submission order, matching the handle chain
//!   built through the controllers,
//! * stages are executed sequentially, completing each job's handle before
//!   any dependent stage runs.
//!
//! ## Lane mapping
//!
//! Lane indices are 0-based and dense: the main thread is lane 0 and
//! worker `w` of the pool is lane `w + 1`. [`lane_for_current_thread`] is
//! the single place this mapping lives.

use rayon::prelude::*;

use crate::sched::access::AccessController;
use crate::sched::error::StreamResult;
use crate::sched::handle::{JobGraph, JobHandle};
use crate::sched::types::{AccessType, LaneIndex};


/// Lane count matching the current Rayon pool: one lane per worker plus
/// one for the main thread.
pub fn lane_count_for_pool() -> u32 {
    rayon::current_num_threads() as u32 + 1
}

/// The lane assigned to the calling thread.
///
/// Inside the pool this is the worker index plus one; outside it (the main
/// thread) it is lane 0.
pub fn lane_for_current_thread() -> LaneIndex {
    match rayon::current_thread_index() {
        Some(worker) => worker as LaneIndex + 1,
        None => 0,
    }
}

/// Index of a guarded resource in the controller slice a batch runs
/// against.
pub type ResourceId = usize;

/// Declares the resources one unit of work touches and how.
#[derive(Clone, Debug, Default)]
pub struct JobConfig {
    requirements: Vec<(ResourceId, AccessType)>,
}

impl JobConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        JobConfig { requirements: Vec::new() }
    }

    /// Adds a requirement.
    pub fn require(mut self, resource: ResourceId, access: AccessType) -> Self {
        self.requirements.push((resource, access));
        self
    }

    /// Returns `true` if this configuration cannot run concurrently with
    /// `other`.
    pub fn conflicts_with(&self, other: &JobConfig) -> bool {
        self.requirements.iter().any(|&(resource, access)| {
            other
                .requirements
                .iter()
                .any(|&(other_resource, other_access)| {
                    resource == other_resource && !access.compatible_with(other_access)
                })
        })
    }
}

struct BatchJob<'a> {
    config: JobConfig,
    work: Box<dyn Fn(LaneIndex) + Send + Sync + 'a>,
}

/// An ordered batch of jobs executed as one scheduling unit.
pub struct JobBatch<'a> {
    jobs: Vec<BatchJob<'a>>,
}

impl<'a> JobBatch<'a> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        JobBatch { jobs: Vec::new() }
    }

    /// Appends a job. Submission order is execution order for conflicting
    /// jobs.
    pub fn push(&mut self, config: JobConfig, work: impl Fn(LaneIndex) + Send + Sync + 'a) {
        self.jobs.push(BatchJob { config, work: Box::new(work) });
    }

    /// Number of jobs in the batch.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns `true` if the batch holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Acquires, stages, runs, and releases the whole batch.
    ///
    /// `controllers` is indexed by [`ResourceId`]; each job's closure
    /// receives the lane of the thread executing it.
    ///
    /// Returns the combined completion handle of every job in the batch.
    pub fn run(
        self,
        graph: &mut JobGraph,
        controllers: &mut [&mut AccessController],
    ) -> StreamResult<JobHandle> {
        let job_count = self.jobs.len();
        let mut handles = Vec::with_capacity(job_count);
        let mut dependencies = Vec::with_capacity(job_count);

        // Build the handle chain in submission order: acquire everything,
        // register the job behind the combined grants, release everything
        // at the job's own handle.
        for job in &self.jobs {
            let mut grants = Vec::with_capacity(job.config.requirements.len());
            for &(resource, access) in &job.config.requirements {
                grants.push(controllers[resource].acquire(graph, access)?);
            }
            let dependency = graph.combine(&grants);
            let handle = graph.register(&[dependency]);
            for &(resource, _) in &job.config.requirements {
                controllers[resource].release(graph, handle)?;
            }
            dependencies.push(dependency);
            handles.push(handle);
        }

        // Stage assignment: earliest stage after every conflicting
        // predecessor, so execution order matches the handle chain.
        let mut stage_of = vec![0usize; job_count];
        let mut stage_count = 0usize;
        for index in 0..job_count {
            let mut stage = 0;
            for earlier in 0..index {
                if self.jobs[index].config.conflicts_with(&self.jobs[earlier].config) {
                    stage = stage.max(stage_of[earlier] + 1);
                }
            }
            stage_of[index] = stage;
            stage_count = stage_count.max(stage + 1);
        }
        let mut stages: Vec<Vec<usize>> = vec![Vec::new(); stage_count];
        for index in 0..job_count {
            stages[stage_of[index]].push(index);
        }

        for stage in &stages {
            #[cfg(feature = "validation")]
            {
                for &index in stage {
                    assert!(
                        graph.is_complete(dependencies[index]),
                        "job dependency incomplete at stage start; stage assignment is wrong"
                    );
                }
            }

            let jobs = &self.jobs;
            stage.par_iter().for_each(|&index| {
                (jobs[index].work)(lane_for_current_thread());
            });

            for &index in stage {
                graph.mark_complete(handles[index]);
            }
        }

        #[cfg(not(feature = "validation"))]
        let _ = dependencies;

        Ok(graph.combine(&handles))
    }
}

impl Default for JobBatch<'_> {
    fn default() -> Self {
        JobBatch::new()
    }
}
