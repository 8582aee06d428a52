use super::error::BufferError;
use crate::domain::EventRecord;
use std::collections::VecDeque;

/// Ordered buffer of records waiting for delivery.
///
/// Insertion order is send priority. The queue is a plain single-owner
/// structure: the coordinator wraps it in a lock and never holds that lock
/// across an await, so every operation here runs to completion.
#[derive(Debug, Default)]
pub struct EventQueue {
    records: VecDeque<EventRecord>,
    limit: Option<usize>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that refuses new records once `limit` are pending.
    /// `None` keeps the queue unbounded.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Append to the tail. Returns the new queue length.
    ///
    /// Only fails when a limit is configured and already reached; the
    /// unbounded queue always accepts.
    pub fn enqueue(&mut self, record: EventRecord) -> Result<usize, BufferError> {
        if let Some(limit) = self.limit {
            if self.records.len() >= limit {
                return Err(BufferError::QueueFull { limit });
            }
        }

        self.records.push_back(record);
        Ok(self.records.len())
    }

    /// Remove up to `max_size` records from the head, in order.
    /// An empty result means there is nothing to do.
    pub fn take_batch(&mut self, max_size: usize) -> Vec<EventRecord> {
        let count = max_size.min(self.records.len());
        self.records.drain(..count).collect()
    }

    /// Put a failed batch back at the head, ahead of anything queued since.
    /// Relative order inside `records` is preserved. The limit is not
    /// applied: retried records keep their priority.
    pub fn requeue_front(&mut self, records: Vec<EventRecord>) {
        for record in records.into_iter().rev() {
            self.records.push_front(record);
        }
    }

    /// Remove every queued record, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<EventRecord> {
        self.records.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceContext;

    fn record(seq: u64) -> EventRecord {
        let ctx = SourceContext::with_session_id("s", "0.1.0");
        EventRecord::builder(&ctx, "test").field("seq", seq).build()
    }

    fn seqs(records: &[EventRecord]) -> Vec<u64> {
        records
            .iter()
            .map(|r| r.event().data()["seq"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_take_batch_is_fifo_and_bounded() {
        let mut queue = EventQueue::new();
        for i in 0..5 {
            queue.enqueue(record(i)).unwrap();
        }

        let batch = queue.take_batch(3);
        assert_eq!(seqs(&batch), vec![0, 1, 2]);
        assert_eq!(queue.len(), 2);

        let rest = queue.take_batch(10);
        assert_eq!(seqs(&rest), vec![3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_batch_on_empty_queue_returns_nothing() {
        let mut queue = EventQueue::new();
        assert!(queue.take_batch(10).is_empty());
        assert!(queue.take_batch(0).is_empty());
    }

    #[test]
    fn test_requeue_front_goes_ahead_of_newer_records() {
        let mut queue = EventQueue::new();
        for i in 0..3 {
            queue.enqueue(record(i)).unwrap();
        }
        let batch = queue.take_batch(3);

        queue.enqueue(record(3)).unwrap();
        queue.requeue_front(batch);

        let all = queue.drain_all();
        assert_eq!(seqs(&all), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drain_all_empties_queue() {
        let mut queue = EventQueue::new();
        for i in 0..25 {
            queue.enqueue(record(i)).unwrap();
        }

        let all = queue.drain_all();
        assert_eq!(all.len(), 25);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_enqueue_reports_length() {
        let mut queue = EventQueue::new();
        assert_eq!(queue.enqueue(record(0)).unwrap(), 1);
        assert_eq!(queue.enqueue(record(1)).unwrap(), 2);
    }

    #[test]
    fn test_limit_refuses_new_records_but_not_requeues() {
        let mut queue = EventQueue::with_limit(Some(2));
        queue.enqueue(record(0)).unwrap();
        queue.enqueue(record(1)).unwrap();
        assert_eq!(
            queue.enqueue(record(2)),
            Err(BufferError::QueueFull { limit: 2 })
        );

        let batch = queue.take_batch(2);
        queue.enqueue(record(3)).unwrap();
        queue.enqueue(record(4)).unwrap();
        queue.requeue_front(batch);

        assert_eq!(queue.len(), 4);
        assert_eq!(seqs(&queue.drain_all()), vec![0, 1, 3, 4]);
    }
}
