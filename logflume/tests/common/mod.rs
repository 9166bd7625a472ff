#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

// Every `.jsonl` file in `dir`, sorted by name.
pub fn jsonl_files(dir: &Path) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap().path())
    .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("jsonl"))
    .collect();
  files.sort();
  files
}

pub fn file_name(path: &Path) -> String {
  path.file_name().unwrap().to_string_lossy().into_owned()
}

// Parses each line of a JSONL file.
pub fn read_lines(path: &Path) -> Vec<Value> {
  fs::read_to_string(path)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect()
}

// A config with a single file channel rooted at `dir`.
pub fn file_config(dir: &Path, retention_days: u32) -> String {
  format!(
    r#"
stack: [local]
app: {{ environment: test, service_name: billing, hostname: test-host }}
channels:
  local:
    sinks:
      - {{ kind: file, directory: "{}", retention_days: {} }}
"#,
    dir.display(),
    retention_days
  )
}
