//! Background Worker
//!
//! In background mode every job travels through one bounded channel to a
//! worker task. The worker hands each job to the blocking pool, since output
//! computation may be slow and refresh takes node locks, and whatever the job
//! produces is sent back through the same channel.
//!
//! # Queue Capacity
//!
//! Jobs produced on the blocking pool wait for room in the channel, in the
//! order they were produced. Callers of [`Engine::refresh`] may be on an async
//! thread and are never blocked: when the channel is full, the jobs that did
//! not fit are handed, in order, to one forwarding task per call.
//!
//! # Failures
//!
//! A job that fails or panics is logged and dropped. The revision it was
//! computing keeps an empty output slot, so the next refresh that reaches it
//! schedules it again.
//!
//! The worker only holds a weak reference to the engine. Once the last
//! [`Engine`] handle is dropped the channel closes and the worker exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace, warn};

use super::job::Job;
use super::runtime::{Engine, EngineInner};
use crate::error::{EngineError, Result};

/// Main worker loop.
pub(super) async fn run(engine: Weak<EngineInner>, mut jobs: mpsc::Receiver<Job>) {
    info!("engine worker started");

    while let Some(job) = jobs.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        let engine = Engine { inner };
        debug!(?job, "worker received job");

        tokio::task::spawn_blocking(move || {
            match panic::catch_unwind(AssertUnwindSafe(|| run_job(&engine, job))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(%err, "job failed"),
                Err(_) => error!("job panicked"),
            }
        });
    }

    info!("engine worker exiting");
}

fn run_job(engine: &Engine, job: Job) -> Result<()> {
    let follow_up = engine.execute(job)?;
    engine.forward(follow_up)
}

/// Queue jobs for the worker without blocking the caller.
pub(super) fn submit(sender: &mpsc::Sender<Job>, handle: &Handle, jobs: Vec<Job>) -> Result<()> {
    let mut jobs = jobs.into_iter();
    while let Some(job) = jobs.next() {
        match sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                let deferred: Vec<_> = std::iter::once(job).chain(jobs).collect();
                trace!(deferred = deferred.len(), "job queue full, deferring sends");
                let sender = sender.clone();
                handle.spawn(async move {
                    for job in deferred {
                        if sender.send(job).await.is_err() {
                            warn!("worker stopped before deferred jobs were queued");
                            break;
                        }
                    }
                });
                return Ok(());
            }
            Err(TrySendError::Closed(_)) => return Err(EngineError::WorkerUnavailable),
        }
    }
    Ok(())
}

/// Queue jobs from a blocking-pool thread, waiting for room.
///
/// Must not be called from an async context.
pub(super) fn forward(sender: &mpsc::Sender<Job>, jobs: Vec<Job>) -> Result<()> {
    for job in jobs {
        sender
            .blocking_send(job)
            .map_err(|_| EngineError::WorkerUnavailable)?;
    }
    Ok(())
}
