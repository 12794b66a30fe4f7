use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One intermediate or final record. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Map,
    Reduce,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Map => write!(f, "map"),
            JobPhase::Reduce => write!(f, "reduce"),
        }
    }
}

/// Arguments of one remote task dispatch. Built by the scheduler per call,
/// consumed once by the worker that receives it.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub job_name: String,
    pub phase: JobPhase,
    pub task_number: usize,
    /// Input file for map tasks; reduce tasks locate their inputs by name.
    pub input_file: Option<String>,
    /// Reduce-task count for a map task, map-task count for a reduce task.
    pub num_other_phase: usize,
}

/// Name of the intermediate file map task `map_task` writes for reduce
/// partition `reduce_task`. Write side and read side both derive it from here.
pub fn reduce_name(dir: &Path, job_name: &str, map_task: usize, reduce_task: usize) -> PathBuf {
    dir.join(format!("mrtmp.{}-{}-{}", job_name, map_task, reduce_task))
}

/// Name of the sorted output file of reduce task `reduce_task`.
pub fn merge_name(dir: &Path, job_name: &str, reduce_task: usize) -> PathBuf {
    dir.join(format!("mrtmp.{}-res-{}", job_name, reduce_task))
}

/// User-supplied map and reduce logic. `reduce` receives all values collected
/// for one key, in no particular order, and must not depend on their order.
pub trait MapReduceApp: Send + Sync {
    fn map(&self, filename: String, contents: String) -> Vec<KeyValue>;
    fn reduce(&self, key: String, values: Vec<String>) -> String;
}

pub fn read_files_from_dir(input_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut input = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() {
            input.push(path.to_string_lossy().into_owned());
        }
    }
    input.sort();
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_deterministic() {
        let dir = Path::new("/tmp/job");
        assert_eq!(
            reduce_name(dir, "wc", 2, 7),
            PathBuf::from("/tmp/job/mrtmp.wc-2-7")
        );
        assert_eq!(reduce_name(dir, "wc", 2, 7), reduce_name(dir, "wc", 2, 7));
        assert_eq!(
            merge_name(dir, "wc", 3),
            PathBuf::from("/tmp/job/mrtmp.wc-res-3")
        );
    }
}
