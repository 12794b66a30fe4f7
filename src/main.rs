mod apps;
mod common;
mod driver;
mod map;
mod reduce;
mod schedule;
mod transport;
mod worker;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use apps::WordCount;
use common::MapReduceApp;
use transport::{LocalTransport, WorkerRegistry};
use worker::Worker;

/// Runs a word-count MapReduce job over the files of a directory, using an
/// in-process worker pool.
#[derive(Parser)]
struct Args {
    /// Directory holding the job's input files
    input_dir: PathBuf,
    /// Job name, used to prefix intermediate and output files
    #[arg(long, default_value = "wc")]
    job_name: String,
    /// Directory for intermediate and output files
    #[arg(long, default_value = "output")]
    work_dir: PathBuf,
    /// Number of reduce tasks
    #[arg(long, default_value_t = 4)]
    n_reduce: usize,
    /// Number of local workers
    #[arg(long, default_value_t = 3)]
    workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.work_dir)?;
    let input_files = common::read_files_from_dir(&args.input_dir)?;

    let transport = Arc::new(LocalTransport::new());
    let registry = WorkerRegistry::new();
    let app: Arc<dyn MapReduceApp> = Arc::new(WordCount {});
    for _ in 0..args.workers {
        Worker::start(&transport, &registry, Arc::clone(&app), args.work_dir.clone());
    }

    let output = driver::run_job(
        &args.work_dir,
        &args.job_name,
        &input_files,
        args.n_reduce,
        &registry,
        transport,
    )
    .await?;
    println!("{}", output.display());
    Ok(())
}
