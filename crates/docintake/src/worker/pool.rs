use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::pipeline::Workflow;
use crate::worker::job::{Job, JobResult};

/// Fixed set of threads running documents through one shared workflow.
///
/// Jobs are queued on a bounded channel; results go to an unbounded one so a
/// worker never blocks on a caller that is still submitting.
pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workflow: Arc<Workflow>, worker_count: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<JobResult>();

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let worker_workflow = Arc::clone(&workflow);

            let handle = thread::Builder::new()
                .name(format!("docintake-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, result_tx, worker_workflow))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Closes the queue, waits for every worker and returns all results.
    pub fn finish(self) -> Vec<JobResult> {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
        self.result_receiver.try_iter().collect()
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<JobResult>,
    workflow: Arc<Workflow>,
) {
    debug!("Worker {} started", worker_id);

    while let Ok(job) = job_receiver.recv() {
        debug!("Worker {} processing {}", worker_id, job.document.id);

        let result = workflow.process_with_retry(&job.document);

        if let Err(e) = result_sender.send(JobResult::new(&job, result)) {
            error!("Worker {} failed to send result: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}
