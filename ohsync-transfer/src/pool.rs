//! Bounded worker pool for bulk downloads.
//!
//! A producer feeds a bounded queue; `workers` tasks pull jobs and run each
//! transfer on the blocking pool; results come back on their own channel.
//! One failed file never cancels the others.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use ohsync_core::TransferError;

use crate::descriptors::DownloadDescriptor;
use crate::download::{download_file, DownloadOutcome, Fetcher};
use crate::error::PoolError;

pub const DEFAULT_WORKERS: usize = 4;
const QUEUE_CAPACITY: usize = 64;

type Job = (usize, DownloadDescriptor);
type JobResult = (usize, DownloadDescriptor, Result<DownloadOutcome, TransferError>);

#[derive(Debug)]
pub struct CompletedDownload {
    /// Position in the input list.
    pub index: usize,
    pub descriptor: DownloadDescriptor,
    pub outcome: DownloadOutcome,
}

#[derive(Debug)]
pub struct FailedDownload {
    pub index: usize,
    pub descriptor: DownloadDescriptor,
    pub error: TransferError,
}

/// Everything the pool did, each list in input order.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub completed: Vec<CompletedDownload>,
    pub failed: Vec<FailedDownload>,
}

impl DownloadReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run the pool on a fresh multi-threaded runtime and block until done.
pub fn download_all(
    fetcher: Arc<dyn Fetcher>,
    descriptors: Vec<DownloadDescriptor>,
    workers: usize,
    max_bytes: u64,
) -> Result<DownloadReport, PoolError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(PoolError::Runtime)?;
    runtime.block_on(run_pool(fetcher, descriptors, workers, max_bytes))
}

/// Download every descriptor with at most `workers` transfers in flight.
pub async fn run_pool(
    fetcher: Arc<dyn Fetcher>,
    descriptors: Vec<DownloadDescriptor>,
    workers: usize,
    max_bytes: u64,
) -> Result<DownloadReport, PoolError> {
    let workers = workers.max(1);
    tracing::info!("downloading {} files with {workers} workers", descriptors.len());

    let (job_tx, job_rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
    let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(QUEUE_CAPACITY);
    let job_rx = Arc::new(Mutex::new(job_rx));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let jobs = job_rx.clone();
        let results = result_tx.clone();
        let fetcher = fetcher.clone();
        handles.push(tokio::spawn(async move {
            worker_task(worker, fetcher, jobs, results, max_bytes).await
        }));
    }
    // Workers hold the only remaining ends, so both channels close when they
    // finish.
    drop(job_rx);
    drop(result_tx);

    let producer = tokio::spawn(async move {
        for job in descriptors.into_iter().enumerate() {
            if job_tx.send(job).await.is_err() {
                return Err(PoolError::ChannelClosed("download queue"));
            }
        }
        Ok(())
    });

    let mut report = DownloadReport::default();
    while let Some((index, descriptor, result)) = result_rx.recv().await {
        match result {
            Ok(outcome) => report.completed.push(CompletedDownload {
                index,
                descriptor,
                outcome,
            }),
            Err(error) => {
                tracing::warn!("download of {} failed: {error}", descriptor.label);
                report.failed.push(FailedDownload {
                    index,
                    descriptor,
                    error,
                });
            }
        }
    }

    handle_join("producer", producer.await)?;
    for (worker, handle) in handles.into_iter().enumerate() {
        handle_join(&format!("worker {worker}"), handle.await)?;
    }

    report.completed.sort_by_key(|c| c.index);
    report.failed.sort_by_key(|f| f.index);
    Ok(report)
}

async fn worker_task(
    worker: usize,
    fetcher: Arc<dyn Fetcher>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    max_bytes: u64,
) -> Result<(), PoolError> {
    loop {
        let next = jobs.lock().await.recv().await;
        let Some((index, descriptor)) = next else {
            break;
        };
        tracing::debug!("worker {worker} picked up {}", descriptor.label);

        let fetcher = fetcher.clone();
        let job = descriptor.clone();
        let task =
            tokio::task::spawn_blocking(move || download_file(fetcher.as_ref(), &job, max_bytes));
        let result = match task.await {
            Ok(result) => result,
            // The item fails; the worker keeps pulling jobs.
            Err(err) => {
                tracing::error!("worker {worker}: download {} died: {err}", descriptor.label);
                Err(TransferError::Aborted(err.to_string()))
            }
        };

        if results.send((index, descriptor, result)).await.is_err() {
            return Err(PoolError::ChannelClosed("download results"));
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), PoolError>, tokio::task::JoinError>,
) -> Result<(), PoolError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(PoolError::Join {
            task: task.to_string(),
            message: err.to_string(),
        }),
    }
}
