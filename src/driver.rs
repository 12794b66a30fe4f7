use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::common::{merge_name, JobPhase, KeyValue};
use crate::schedule::schedule;
use crate::transport::{Transport, WorkerRegistry};

/// Runs a whole job: map phase, reduce phase, then a final merge of the
/// per-partition outputs in partition order. Returns the merged output path.
pub async fn run_job(
    dir: &Path,
    job_name: &str,
    input_files: &[String],
    n_reduce: usize,
    registry: &WorkerRegistry,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<PathBuf> {
    schedule(
        job_name,
        input_files,
        n_reduce,
        JobPhase::Map,
        registry.subscribe(),
        Arc::clone(&transport),
    )
    .await;
    schedule(
        job_name,
        input_files,
        n_reduce,
        JobPhase::Reduce,
        registry.subscribe(),
        transport,
    )
    .await;
    merge(dir, job_name, n_reduce)
}

/// Concatenates the reduce outputs as `key value` text lines. Each partition
/// file is already sorted, and partitions are visited in ascending order.
fn merge(dir: &Path, job_name: &str, n_reduce: usize) -> anyhow::Result<PathBuf> {
    let out_path = dir.join(format!("mrtmp.{job_name}"));
    let file = File::create(&out_path)
        .with_context(|| format!("failed to create {}", out_path.display()))?;
    let mut writer = BufWriter::new(file);
    for reduce_task in 0..n_reduce {
        let path = merge_name(dir, job_name, reduce_task);
        let contents = std::fs::read(&path)
            .with_context(|| format!("missing reduce output {}", path.display()))?;
        for item in serde_json::Deserializer::from_slice(&contents).into_iter::<KeyValue>() {
            let kv = item?;
            writeln!(writer, "{} {}", kv.key, kv.value)?;
        }
    }
    writer.flush()?;
    info!(job_name, output = %out_path.display(), "job merged");
    Ok(out_path)
}
