//! In-memory results keyed by file and curve index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{CurveOutcome, FitResult};

/// Per-file results, ordered by curve index.
pub type FileResults = BTreeMap<usize, CurveOutcome>;

/// Results of all batch runs so far.
///
/// Recomputing a file replaces its entry; results of different runs are
/// never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitResultStore {
    files: BTreeMap<String, FileResults>,
}

impl FitResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all results of a file.
    pub fn replace_file(&mut self, file_id: &str, results: FileResults) {
        self.files.insert(file_id.to_string(), results);
    }

    pub fn remove_file(&mut self, file_id: &str) -> Option<FileResults> {
        self.files.remove(file_id)
    }

    pub fn file(&self, file_id: &str) -> Option<&FileResults> {
        self.files.get(file_id)
    }

    pub fn get(&self, file_id: &str, curve_index: usize) -> Option<&CurveOutcome> {
        self.files.get(file_id)?.get(&curve_index)
    }

    /// Successful fits of a file, in curve order.
    pub fn fits<'a>(&'a self, file_id: &str) -> impl Iterator<Item = (usize, &'a FitResult)> + 'a {
        self.files
            .get(file_id)
            .into_iter()
            .flat_map(|m| m.iter())
            .filter_map(|(i, o)| o.as_ref().ok().map(|r| (*i, r)))
    }

    pub fn file_ids(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileResults)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of stored curve outcomes.
    pub fn len(&self) -> usize {
        self.files.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}
