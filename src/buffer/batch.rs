use crate::domain::EventRecord;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Why a batch was cut from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTrigger {
    /// Queue length reached the batch size.
    Size,
    /// Periodic scheduler tick.
    Timer,
    /// Explicit `flush()` call.
    Manual,
}

impl BatchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchTrigger::Size => "size",
            BatchTrigger::Timer => "timer",
            BatchTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for BatchTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous slice removed from the head of the queue.
///
/// Ownership moves to the send attempt; on a retryable failure the records
/// go back to the queue head via [`Batch::into_records`].
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    records: Vec<EventRecord>,
    trigger: BatchTrigger,
    created_at: Instant,
}

impl Batch {
    pub fn new(records: Vec<EventRecord>, trigger: BatchTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            records,
            trigger,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }

    pub fn trigger(&self) -> BatchTrigger {
        self.trigger
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceContext;

    #[test]
    fn test_batch_keeps_record_order() {
        let ctx = SourceContext::new("0.1.0");
        let records: Vec<_> = (0..3)
            .map(|i| EventRecord::builder(&ctx, format!("e{i}")).build())
            .collect();

        let batch = Batch::new(records.clone(), BatchTrigger::Manual);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.trigger(), BatchTrigger::Manual);
        assert_eq!(batch.into_records(), records);
    }

    #[test]
    fn test_batches_get_distinct_ids() {
        let a = Batch::new(Vec::new(), BatchTrigger::Timer);
        let b = Batch::new(Vec::new(), BatchTrigger::Timer);
        assert_ne!(a.id(), b.id());
        assert!(a.is_empty());
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(BatchTrigger::Size.to_string(), "size");
        assert_eq!(BatchTrigger::Manual.to_string(), "manual");
    }
}
