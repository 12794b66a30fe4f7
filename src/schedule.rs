use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::{JobPhase, TaskDescriptor};
use crate::transport::Transport;

/// A worker whose assignment loop accumulates this many failed calls stops
/// being used for the rest of the phase.
pub const MAX_WORKER_FAILURES: usize = 5;

/// Runs every task of one phase to completion and returns only then.
///
/// Each worker address observed on `register_rx` (backlog first, then live
/// arrivals) gets its own assignment loop pulling task indices off a shared
/// queue. Failed calls put the index back for anyone to retry; successes are
/// reported on a completion channel. The outer loop races new registrations
/// against completions and returns the moment the last distinct task index
/// has succeeded, without waiting for in-flight loops.
///
/// Known risk: a call that never returns wedges that worker's loop for good,
/// since the transport carries no timeout. The phase still finishes if other
/// workers cover the remaining tasks. If no worker ever completes a task,
/// this blocks forever; there is no error path.
pub async fn schedule(
    job_name: &str,
    input_files: &[String],
    n_reduce: usize,
    phase: JobPhase,
    register_rx: async_channel::Receiver<String>,
    transport: Arc<dyn Transport>,
) {
    let (ntasks, n_other) = match phase {
        JobPhase::Map => (input_files.len(), n_reduce),
        JobPhase::Reduce => (n_reduce, input_files.len()),
    };
    info!(%phase, ntasks, n_other, "schedule: starting phase");

    let (task_tx, task_rx) = async_channel::unbounded();
    for task_number in 0..ntasks {
        let _ = task_tx.try_send(task_number);
    }
    let (done_tx, done_rx) = async_channel::unbounded::<usize>();

    let files = Arc::new(input_files.to_vec());
    // A task counts toward completion once; a slow duplicate success for an
    // index that already finished is discarded here.
    let mut completed = vec![false; ntasks];
    let mut remaining = ntasks;
    while remaining > 0 {
        tokio::select! {
            Ok(address) = register_rx.recv() => {
                debug!(%phase, worker = %address, "schedule: worker registered");
                tokio::spawn(assignment_loop(
                    address,
                    job_name.to_string(),
                    Arc::clone(&files),
                    phase,
                    n_other,
                    task_tx.clone(),
                    task_rx.clone(),
                    done_tx.clone(),
                    Arc::clone(&transport),
                ));
            }
            Ok(task_number) = done_rx.recv() => {
                if completed[task_number] {
                    debug!(%phase, task_number, "schedule: duplicate completion ignored");
                } else {
                    completed[task_number] = true;
                    remaining -= 1;
                }
            }
        }
    }
    // Releases idle assignment loops; a loop holding a stale task when the
    // queue closes just fails its requeue, which is fine since every task
    // has already completed.
    task_rx.close();
    info!(%phase, "schedule: phase done");
}

async fn assignment_loop(
    worker: String,
    job_name: String,
    input_files: Arc<Vec<String>>,
    phase: JobPhase,
    n_other: usize,
    task_tx: async_channel::Sender<usize>,
    task_rx: async_channel::Receiver<usize>,
    done_tx: async_channel::Sender<usize>,
    transport: Arc<dyn Transport>,
) {
    let mut failures = 0;
    while let Ok(task_number) = task_rx.recv().await {
        let args = TaskDescriptor {
            job_name: job_name.clone(),
            phase,
            task_number,
            input_file: match phase {
                JobPhase::Map => input_files.get(task_number).cloned(),
                JobPhase::Reduce => None,
            },
            num_other_phase: n_other,
        };
        if transport.call(&worker, args).await {
            let _ = done_tx.send(task_number).await;
        } else {
            // Hand the task back before deciding this worker's fate, so
            // abandoning the worker can never drop a task.
            let _ = task_tx.send(task_number).await;
            failures += 1;
            if failures >= MAX_WORKER_FAILURES {
                warn!(
                    %phase,
                    worker = %worker,
                    failures,
                    "schedule: worker failed too often, no longer used"
                );
                break;
            }
        }
    }
}
