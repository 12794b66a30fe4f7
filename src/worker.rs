use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::common::{merge_name, JobPhase, MapReduceApp, TaskDescriptor};
use crate::map::do_map;
use crate::reduce::do_reduce;
use crate::transport::{LocalTransport, RpcRequest, WorkerRegistry};

/// An in-process worker. Serves its endpoint one task at a time, so a worker
/// slot never runs two tasks concurrently.
pub struct Worker {
    pub address: String,
}

impl Worker {
    pub fn start(
        transport: &LocalTransport,
        registry: &WorkerRegistry,
        app: Arc<dyn MapReduceApp>,
        dir: PathBuf,
    ) -> Worker {
        let address = format!("worker-{}", Uuid::new_v4());
        let requests = transport.bind(&address);
        registry.register(address.clone());

        let worker_address = address.clone();
        tokio::spawn(async move {
            while let Ok(RpcRequest { args, reply }) = requests.recv().await {
                debug!(
                    worker = %worker_address,
                    phase = %args.phase,
                    task = args.task_number,
                    "worker: running task"
                );
                let ok = match run_task(&dir, &args, &app).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(
                            worker = %worker_address,
                            phase = %args.phase,
                            task = args.task_number,
                            %err,
                            "worker: task failed"
                        );
                        false
                    }
                };
                let _ = reply.send(ok);
            }
        });

        Worker { address }
    }
}

async fn run_task(
    dir: &Path,
    args: &TaskDescriptor,
    app: &Arc<dyn MapReduceApp>,
) -> anyhow::Result<()> {
    match args.phase {
        JobPhase::Map => {
            let input_file = args
                .input_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("map task {} without input file", args.task_number))?;
            do_map(
                dir,
                &args.job_name,
                args.task_number,
                input_file,
                args.num_other_phase,
                app.as_ref(),
            )
        }
        JobPhase::Reduce => {
            let out_file = merge_name(dir, &args.job_name, args.task_number);
            do_reduce(
                dir,
                &args.job_name,
                args.task_number,
                &out_file,
                args.num_other_phase,
                Arc::clone(app),
            )
            .await
        }
    }
}
