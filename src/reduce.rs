use anyhow::Context;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::common::{reduce_name, KeyValue, MapReduceApp};

/// Runs one reduce task: fans in this partition's intermediate file from
/// every map task, groups values by key, applies the app's reduce function
/// per key, and writes the output file with keys in ascending order.
///
/// Intermediate files are read concurrently, one reader per map source; the
/// grouping map is owned by this function alone and fed over a channel, so
/// it needs no lock. Per-key reduction also runs concurrently, since `reduce`
/// only sees one key's values.
pub async fn do_reduce(
    dir: &Path,
    job_name: &str,
    reduce_task: usize,
    out_file: &Path,
    n_map: usize,
    app: Arc<dyn MapReduceApp>,
) -> anyhow::Result<()> {
    let (tx, rx) = async_channel::bounded(n_map.max(1));
    for map_task in 0..n_map {
        let path = reduce_name(dir, job_name, map_task, reduce_task);
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(read_partition(path).await).await;
        });
    }
    drop(tx);

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    while let Ok(records) = rx.recv().await {
        for kv in records {
            grouped.entry(kv.key).or_default().push(kv.value);
        }
    }

    let n_keys = grouped.len();
    let (reduced_tx, reduced_rx) = async_channel::bounded(n_keys.max(1));
    for (key, values) in grouped {
        let app = Arc::clone(&app);
        let reduced_tx = reduced_tx.clone();
        tokio::spawn(async move {
            let value = app.reduce(key.clone(), values);
            let _ = reduced_tx.send(KeyValue { key, value }).await;
        });
    }
    drop(reduced_tx);

    let mut results = Vec::with_capacity(n_keys);
    while let Ok(kv) = reduced_rx.recv().await {
        results.push(kv);
    }
    results.sort_by(|a, b| a.key.cmp(&b.key));

    let file = File::create(out_file)
        .with_context(|| format!("failed to create {}", out_file.display()))?;
    let mut writer = BufWriter::new(file);
    for kv in &results {
        serde_json::to_writer(&mut writer, kv)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    debug!(
        reduce_task,
        keys = n_keys,
        out_file = %out_file.display(),
        "reduce: wrote output"
    );
    Ok(())
}

/// Decodes one intermediate file. A missing or unreadable file contributes
/// zero records; a malformed record ends that file's read early, keeping
/// whatever decoded before it.
async fn read_partition(path: PathBuf) -> Vec<KeyValue> {
    let contents = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(path = %path.display(), %err, "reduce: skipping unreadable partition file");
            return Vec::new();
        }
    };
    let mut records = Vec::new();
    for item in serde_json::Deserializer::from_slice(&contents).into_iter::<KeyValue>() {
        match item {
            Ok(kv) => records.push(kv),
            Err(err) => {
                debug!(path = %path.display(), %err, "reduce: decode stopped mid-stream");
                break;
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Joins each key's values with commas, sorted first so the result does
    /// not depend on arrival order.
    struct JoinSorted;

    impl MapReduceApp for JoinSorted {
        fn map(&self, _filename: String, _contents: String) -> Vec<KeyValue> {
            Vec::new()
        }

        fn reduce(&self, _key: String, mut values: Vec<String>) -> String {
            values.sort();
            values.join(",")
        }
    }

    fn write_partition(dir: &Path, job: &str, map_task: usize, reduce_task: usize, records: &[(&str, &str)]) {
        let mut lines = String::new();
        for (key, value) in records {
            let kv = KeyValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            lines.push_str(&serde_json::to_string(&kv).unwrap());
            lines.push('\n');
        }
        fs::write(reduce_name(dir, job, map_task, reduce_task), lines).unwrap();
    }

    fn read_output(path: &Path) -> Vec<(String, String)> {
        let contents = fs::read_to_string(path).unwrap();
        contents
            .lines()
            .map(|line| {
                let kv: KeyValue = serde_json::from_str(line).unwrap();
                (kv.key, kv.value)
            })
            .collect()
    }

    #[tokio::test]
    async fn merges_partitions_grouped_and_sorted() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        write_partition(dir, "job", 0, 0, &[("a", "1")]);
        write_partition(dir, "job", 1, 0, &[("a", "2"), ("b", "1")]);
        write_partition(dir, "job", 2, 0, &[("b", "2")]);

        let out = dir.join("out");
        do_reduce(dir, "job", 0, &out, 3, Arc::new(JoinSorted))
            .await
            .unwrap();

        assert_eq!(
            read_output(&out),
            vec![
                ("a".to_string(), "1,2".to_string()),
                ("b".to_string(), "1,2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_partition_file_equals_empty_one() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        write_partition(dir, "missing", 0, 0, &[("k", "1")]);
        // map task 1's file intentionally absent
        let out_missing = dir.join("out-missing");
        do_reduce(dir, "missing", 0, &out_missing, 2, Arc::new(JoinSorted))
            .await
            .unwrap();

        write_partition(dir, "empty", 0, 0, &[("k", "1")]);
        write_partition(dir, "empty", 1, 0, &[]);
        let out_empty = dir.join("out-empty");
        do_reduce(dir, "empty", 0, &out_empty, 2, Arc::new(JoinSorted))
            .await
            .unwrap();

        assert_eq!(fs::read(&out_missing).unwrap(), fs::read(&out_empty).unwrap());
    }

    #[tokio::test]
    async fn output_is_byte_identical_across_runs() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        write_partition(dir, "job", 0, 0, &[("x", "3"), ("y", "1"), ("x", "1")]);
        write_partition(dir, "job", 1, 0, &[("y", "2"), ("x", "2")]);

        let first = dir.join("out-1");
        let second = dir.join("out-2");
        do_reduce(dir, "job", 0, &first, 2, Arc::new(JoinSorted))
            .await
            .unwrap();
        do_reduce(dir, "job", 0, &second, 2, Arc::new(JoinSorted))
            .await
            .unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[tokio::test]
    async fn output_keys_are_strictly_ascending_without_duplicates() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        write_partition(dir, "job", 0, 0, &[("pear", "1"), ("apple", "1"), ("fig", "1")]);
        write_partition(dir, "job", 1, 0, &[("fig", "2"), ("apple", "2"), ("kiwi", "1")]);
        write_partition(dir, "job", 2, 0, &[("banana", "1"), ("pear", "2")]);

        let out = dir.join("out");
        do_reduce(dir, "job", 0, &out, 3, Arc::new(JoinSorted))
            .await
            .unwrap();

        let keys: Vec<String> = read_output(&out).into_iter().map(|(k, _)| k).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys not strictly ascending: {keys:?}");
        assert_eq!(keys, vec!["apple", "banana", "fig", "kiwi", "pear"]);
    }

    #[tokio::test]
    async fn malformed_record_keeps_decoded_prefix() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let kv = serde_json::to_string(&KeyValue {
            key: "good".to_string(),
            value: "1".to_string(),
        })
        .unwrap();
        fs::write(
            reduce_name(dir, "job", 0, 0),
            format!("{kv}\n{{\"key\": truncated"),
        )
        .unwrap();
        write_partition(dir, "job", 1, 0, &[("other", "1")]);

        let out = dir.join("out");
        do_reduce(dir, "job", 0, &out, 2, Arc::new(JoinSorted))
            .await
            .unwrap();

        assert_eq!(
            read_output(&out),
            vec![
                ("good".to_string(), "1".to_string()),
                ("other".to_string(), "1".to_string()),
            ]
        );
    }
}
