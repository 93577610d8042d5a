//! Background job pool.
//!
//! Every fire-and-forget task is a named job on a bounded channel: the
//! co-occurrence batcher (one worker), the deferred semantic re-check
//! (two workers, coalesced per target id inside the consolidator), and
//! the catalyst probe. Workers log their own failures with the
//! originating memory id; nothing propagates to a caller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use anima_associations::AssociationEngine;
use anima_consolidation::Consolidator;
use anima_storage::StoragePool;

use crate::catalyst;

const QUEUE_CAPACITY: usize = 256;
const RECHECK_WORKERS: usize = 2;

/// A unit of deferred work.
#[derive(Debug, Clone)]
pub enum Job {
    RecordCoOccurrences {
        memory_ids: Vec<Uuid>,
        conversation_id: Option<String>,
    },
    SemanticRecheck {
        memory_id: Uuid,
    },
    CatalystProbe {
        memory_id: Uuid,
    },
}

/// Submission handle shared by the services.
#[derive(Clone)]
pub struct JobQueue {
    co_occurrence: mpsc::Sender<Job>,
    recheck: mpsc::Sender<Job>,
    probe: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueue without blocking the request path. A full queue drops the
    /// job with a warning; deferred work is best-effort by contract.
    pub fn submit(&self, job: Job) {
        let (queue, label) = match &job {
            Job::RecordCoOccurrences { .. } => (&self.co_occurrence, "co_occurrence"),
            Job::SemanticRecheck { .. } => (&self.recheck, "semantic_recheck"),
            Job::CatalystProbe { .. } => (&self.probe, "catalyst_probe"),
        };
        if queue.try_send(job).is_err() {
            warn!(queue = label, "job queue full, dropping job");
        }
    }
}

/// Running worker tasks. Dropping the handles does not stop the workers;
/// call [`JobWorkers::shutdown`] or let the runtime wind down.
pub struct JobWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl JobWorkers {
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Spawn the worker pool and hand back the submission queue.
pub fn spawn(
    pool: StoragePool,
    consolidator: Arc<Consolidator>,
    associations: Arc<AssociationEngine>,
) -> (JobQueue, JobWorkers) {
    let (co_tx, mut co_rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
    let (re_tx, re_rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
    let (probe_tx, mut probe_rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);

    let mut handles = Vec::new();

    // Co-occurrence batcher: a single worker keeps the upserts ordered.
    let assoc = associations.clone();
    handles.push(tokio::spawn(async move {
        while let Some(job) = co_rx.recv().await {
            if let Job::RecordCoOccurrences {
                memory_ids,
                conversation_id,
            } = job
            {
                if let Err(e) = assoc
                    .record_co_occurrences(&memory_ids, conversation_id.as_deref())
                    .await
                {
                    error!(error = %e, count = memory_ids.len(), "co-occurrence job failed");
                }
            }
        }
    }));

    // Deferred semantic re-check: a small pool, coalesced by target id
    // inside the consolidator.
    let re_rx = Arc::new(tokio::sync::Mutex::new(re_rx));
    for _ in 0..RECHECK_WORKERS {
        let consolidator = consolidator.clone();
        let re_rx = re_rx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let job = re_rx.lock().await.recv().await;
                let Some(job) = job else { break };
                if let Job::SemanticRecheck { memory_id } = job {
                    if let Err(e) = consolidator.deferred_recheck(memory_id).await {
                        error!(memory_id = %memory_id, error = %e, "semantic re-check failed");
                    }
                }
            }
        }));
    }

    // Catalyst probe.
    let probe_pool = pool.clone();
    handles.push(tokio::spawn(async move {
        while let Some(job) = probe_rx.recv().await {
            if let Job::CatalystProbe { memory_id } = job {
                if let Err(e) = catalyst::run_probe(&probe_pool, memory_id).await {
                    error!(memory_id = %memory_id, error = %e, "catalyst probe failed");
                }
            }
        }
    }));

    (
        JobQueue {
            co_occurrence: co_tx,
            recheck: re_tx,
            probe: probe_tx,
        },
        JobWorkers { handles },
    )
}
