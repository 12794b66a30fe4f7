use anyhow::Context;
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::common::{reduce_name, MapReduceApp};

/// Runs one map task: applies the app's map function to the input file and
/// scatters the emitted records across `n_reduce` intermediate files, routed
/// by a hash of the key.
pub fn do_map(
    dir: &Path,
    job_name: &str,
    map_task: usize,
    input_file: &str,
    n_reduce: usize,
    app: &dyn MapReduceApp,
) -> anyhow::Result<()> {
    let contents = fs::read_to_string(input_file)
        .with_context(|| format!("failed to read map input {input_file}"))?;
    let records = app.map(input_file.to_string(), contents);

    let mut writers = Vec::with_capacity(n_reduce);
    for reduce_task in 0..n_reduce {
        let path = reduce_name(dir, job_name, map_task, reduce_task);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writers.push(BufWriter::new(file));
    }

    let emitted = records.len();
    for kv in records {
        let partition = key_partition(&kv.key, n_reduce);
        serde_json::to_writer(&mut writers[partition], &kv)?;
        writers[partition].write_all(b"\n")?;
    }
    for mut writer in writers {
        writer.flush()?;
    }
    debug!(map_task, input_file, emitted, "map: wrote partitions");
    Ok(())
}

/// Reduce partition a key is routed to. Both sides of the shuffle rely on
/// this being a pure function of the key.
pub fn key_partition(key: &str, n_reduce: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % n_reduce
}
