// Path: crates/csp/src/jobs.rs

//! Background job execution with a bounded worker pool.
//!
//! One cooperative task runs each job; concurrency across jobs is bounded by
//! the pool size. Job rows are persisted snapshots: pollers read them from
//! the store, completed rows are garbage-collected after a delay, and rows
//! not marked completed at process restart are considered lost.

use crate::publish::{ingest_members, PublishDeclaration, PublishEngine};
use std::sync::Arc;
use tally_api::store::CensusStore;
use tally_telemetry::job_metrics;
use tally_types::config::CspConfig;
use tally_types::error::CspError;
use tally_types::ids::{CensusId, GroupId, MemberId, OrgAddress};
use tally_types::job::{Job, JobRowError};
use tally_types::member::RawMember;
use tally_types::time::now_ms;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// The work a submitted job performs.
pub enum JobWork {
    /// Materialize census participants from a member group.
    PublishCensus {
        /// The census to publish into.
        census_id: CensusId,
        /// The group to stream members from.
        group_id: GroupId,
        /// The field declaration accompanying the publish call.
        declaration: PublishDeclaration,
    },
    /// Bulk-ingest organization members.
    IngestMembers {
        /// The owning organization.
        org: OrgAddress,
        /// The raw rows to ingest.
        members: Vec<RawMember>,
    },
}

/// The job engine: a bounded queue drained by a fixed worker pool.
pub struct JobEngine {
    store: Arc<dyn CensusStore>,
    tx: mpsc::Sender<(Job, JobWork)>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobEngine {
    /// Spawns the worker pool and returns the engine handle.
    pub fn start(
        store: Arc<dyn CensusStore>,
        cfg: Arc<CspConfig>,
        publish: PublishEngine,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<(Job, JobWork)>(64);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::new();
        for worker_id in 0..cfg.job_workers.max(1) {
            workers.push(tokio::spawn(run_worker(
                worker_id,
                store.clone(),
                cfg.clone(),
                publish.clone(),
                rx.clone(),
                shutdown.clone(),
            )));
        }
        Self {
            store,
            tx,
            workers: Mutex::new(workers),
        }
    }

    /// Persists the job snapshot and enqueues the work.
    pub async fn submit(&self, job: Job, work: JobWork) -> Result<(), CspError> {
        self.store.save_job(&job).await?;
        job_metrics().inc_jobs_started(job_type_label(&job));
        self.tx
            .send((job, work))
            .await
            .map_err(|_| CspError::Internal("job queue is closed".to_string()))
    }

    /// Waits for every worker to observe shutdown and exit.
    pub async fn join(&self) {
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}

fn job_type_label(job: &Job) -> &'static str {
    match job.job_type {
        tally_types::job::JobType::CensusParticipants => "census_participants",
        tally_types::job::JobType::OrgMembers => "org_members",
    }
}

async fn run_worker(
    worker_id: usize,
    store: Arc<dyn CensusStore>,
    cfg: Arc<CspConfig>,
    publish: PublishEngine,
    rx: Arc<Mutex<mpsc::Receiver<(Job, JobWork)>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut guard = rx.lock().await;
            tokio::select! {
                item = guard.recv() => item,
                _ = shutdown.changed() => None,
            }
        };
        let Some((job, work)) = next else {
            tracing::debug!(worker_id, "job worker stopping");
            return;
        };
        let job_id = job.id;
        tracing::info!(worker_id, job = %job_id, "job started");
        run_job(&store, &cfg, &publish, job, work).await;
    }
}

async fn run_job(
    store: &Arc<dyn CensusStore>,
    cfg: &Arc<CspConfig>,
    publish: &PublishEngine,
    mut job: Job,
    work: JobWork,
) {
    let result: Result<(), CspError> = match work {
        JobWork::PublishCensus {
            census_id,
            group_id,
            declaration,
        } => {
            // The checkpoint persists a snapshot after every streamed batch
            // so pollers see progress while the job runs.
            let progress_store = store.clone();
            let job_cell = Arc::new(Mutex::new(job));
            let checkpoint_cell = job_cell.clone();
            let outcome = publish
                .publish_group_for_job(&census_id, &group_id, &declaration, |added, errors| {
                    let store = progress_store.clone();
                    let cell = checkpoint_cell.clone();
                    async move {
                        let mut job = cell.lock().await;
                        job.added = added;
                        if !errors.is_empty() {
                            job_metrics().inc_job_rows_rejected(errors.len() as u64);
                            job.errors.extend(errors);
                        }
                        if let Err(e) = store.save_job(&job).await {
                            tracing::warn!(job = %job.id, error = %e, "job checkpoint failed");
                        }
                    }
                })
                .await;
            job = match Arc::try_unwrap(job_cell) {
                Ok(m) => m.into_inner(),
                // Unreachable in practice: every checkpoint future has been
                // awaited by the time publish returns.
                Err(arc) => arc.lock().await.clone(),
            };
            outcome.map(|_| ())
        }
        JobWork::IngestMembers { org, members } => {
            let mut result = Ok(());
            for chunk in members.chunks(cfg.job_batch_size.max(1)) {
                match ingest_members(store, &org, cfg.salt.reveal(), chunk.to_vec()).await {
                    Ok(outcome) => {
                        job.added += outcome.added;
                        if !outcome.errors.is_empty() {
                            job_metrics().inc_job_rows_rejected(outcome.errors.len() as u64);
                            job.errors.extend(outcome.errors);
                        }
                        if let Err(e) = store.save_job(&job).await {
                            tracing::warn!(job = %job.id, error = %e, "job checkpoint failed");
                        }
                    }
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            result
        }
    };

    if let Err(e) = &result {
        // The job still terminates so pollers are not left hanging; the
        // failure is carried on the row.
        tracing::warn!(job = %job.id, error = %e, "job failed");
        job.errors.push(JobRowError {
            member_id: MemberId::default(),
            reason: e.to_string(),
        });
    }
    job.completed = true;
    job.completed_at = Some(now_ms());
    if let Err(e) = store.save_job(&job).await {
        tracing::warn!(job = %job.id, error = %e, "final job save failed");
        return;
    }
    job_metrics().inc_jobs_completed(job_type_label(&job));
    tracing::info!(job = %job.id, added = job.added, errors = job.errors.len(), "job completed");

    // Completed rows linger briefly for pollers, then disappear.
    let gc_store = store.clone();
    let gc_delay = std::time::Duration::from_millis(cfg.job_gc_delay_ms);
    let job_id = job.id;
    tokio::spawn(async move {
        tokio::time::sleep(gc_delay).await;
        if let Err(e) = gc_store.delete_job(&job_id).await {
            tracing::warn!(job = %job_id, error = %e, "job gc failed");
        }
    });
}
