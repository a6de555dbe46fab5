use ember_model::JobRecord;

/// In-flight jobs, ordered by arrival.
///
/// Mutated only by the controller's own event handlers; start/end events
/// arrive on one serialized stream, so an end can never overtake its start.
#[derive(Debug, Default)]
pub(crate) struct JobSet {
    records: Vec<JobRecord>,
}

impl JobSet {
    pub(crate) fn push(&mut self, record: JobRecord) {
        self.records.push(record);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn records(&self) -> &[JobRecord] {
        &self.records
    }

    /// Remove the record with the given id, if tracked.
    pub(crate) fn remove_by_id(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id.as_deref() != Some(id));
        self.records.len() < before
    }

    /// Remove every record whose id appears in `ids`; returns how many left.
    pub(crate) fn remove_many(&mut self, ids: &[String]) -> usize {
        let before = self.records.len();
        self.records
            .retain(|r| !r.id.as_ref().is_some_and(|id| ids.contains(id)));
        before - self.records.len()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

/// Pending no-id job completion, recovered by polling the CI driver.
///
/// A single marker instead of one poller per event: duplicate `job_ended`
/// events while a reconciliation is outstanding collapse into it.
#[derive(Debug, Default)]
pub(crate) struct ReconcileState {
    pub(crate) pending: bool,
    pub(crate) attempts: u32,
}
