use crate::{
    error::{SegmentError, SegmentResult},
    signal::{AnnotationStream, Record},
};
use std::collections::BTreeMap;

/// Supplies records and their annotations by identifier.
pub trait RecordSource: Send + Sync {
    /// Identifiers of every readable record, in a stable order.
    fn record_ids(&self) -> SegmentResult<Vec<String>>;

    /// Load one record; unknown identifiers yield `RecordNotFound`.
    fn load(&self, id: &str) -> SegmentResult<(Record, AnnotationStream)>;
}

/// Record source backed by records already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: BTreeMap<String, (Record, AnnotationStream)>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record, annotations: AnnotationStream) {
        self.records.insert(record.name.clone(), (record, annotations));
    }
}

impl RecordSource for InMemorySource {
    fn record_ids(&self) -> SegmentResult<Vec<String>> {
        Ok(self.records.keys().cloned().collect())
    }

    fn load(&self, id: &str) -> SegmentResult<(Record, AnnotationStream)> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| SegmentError::RecordNotFound(id.to_string()))
    }
}
