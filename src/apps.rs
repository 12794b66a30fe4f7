use regex::Regex;

use crate::common::{KeyValue, MapReduceApp};

pub struct WordCount {}

impl MapReduceApp for WordCount {
    fn map(&self, _filename: String, contents: String) -> Vec<KeyValue> {
        let words_regex = Regex::new(r"\b[a-zA-Z0-9]+\b").expect("invalid regex");
        words_regex
            .find_iter(&contents)
            .map(|w| KeyValue {
                key: w.as_str().to_lowercase(),
                value: String::from("1"),
            })
            .collect()
    }

    fn reduce(&self, _key: String, values: Vec<String>) -> String {
        values.len().to_string()
    }
}
