use super::confirmation::ConfirmationRequest;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ConfirmationRegistry {
    pending: HashMap<String, ConfirmationRequest>,
}

impl ConfirmationRegistry {
    /// Upserts by key; the replaced request, if any, is returned.
    pub fn register(&mut self, request: ConfirmationRequest) -> Option<ConfirmationRequest> {
        self.pending.insert(request.key.clone(), request)
    }

    pub fn get(&self, key: &str) -> Option<&ConfirmationRequest> {
        self.pending.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfirmationRequest> {
        self.pending.remove(key)
    }

    pub fn remove_for_run(&mut self, run_id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, request| request.run_id != run_id);
        before - self.pending.len()
    }

    pub fn list(&self) -> Vec<ConfirmationRequest> {
        let mut pending = self.pending.values().cloned().collect::<Vec<_>>();
        pending.sort_by(|a, b| a.key.cmp(&b.key));
        pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
