use crate::engine::RunDetail;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<String, RunDetail>,
}

impl SnapshotStore {
    pub fn get(&self, run_id: &str) -> Option<&RunDetail> {
        self.snapshots.get(run_id)
    }

    pub fn replace(&mut self, run_id: &str, detail: RunDetail) -> Option<RunDetail> {
        self.snapshots.insert(run_id.to_string(), detail)
    }

    pub fn remove(&mut self, run_id: &str) -> Option<RunDetail> {
        self.snapshots.remove(run_id)
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.snapshots.contains_key(run_id)
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
