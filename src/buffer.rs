//! Pending event buffer
//!
//! Completed events wait here until a label submission drains them to the log.
//! Every operation takes the same lock, so a drain never observes half of a
//! push and a label pass never races a drain.

use parking_lot::Mutex;

use crate::types::TapEvent;

/// Ordered queue of events awaiting a durable write
#[derive(Debug, Default)]
pub struct PendingEventBuffer {
    events: Mutex<Vec<TapEvent>>,
}

impl PendingEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the tail
    pub fn push(&self, event: TapEvent) {
        self.events.lock().push(event);
    }

    /// Label every unlabeled entry with `text`.
    ///
    /// Returns how many entries were labeled. An empty `text` changes nothing.
    pub fn label_unlabeled(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut events = self.events.lock();
        events
            .iter_mut()
            .map(|event| event.apply_label(text))
            .filter(|applied| *applied)
            .count()
    }

    /// Take every buffered event, leaving the buffer empty
    pub fn drain_all(&self) -> Vec<TapEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn labeled(start: i64, label: &str) -> TapEvent {
        let mut event = TapEvent::new(start, 10, 1.0);
        event.label = label.to_string();
        event
    }

    #[test]
    fn test_push_preserves_order() {
        let buffer = PendingEventBuffer::new();
        for start in [30, 10, 20] {
            buffer.push(TapEvent::new(start, 1, 0.0));
        }

        let drained: Vec<i64> = buffer
            .drain_all()
            .iter()
            .map(|e| e.start_timestamp)
            .collect();
        assert_eq!(drained, vec![30, 10, 20]);
    }

    #[test]
    fn test_duplicates_are_independent_records() {
        let buffer = PendingEventBuffer::new();
        let event = TapEvent::new(5, 5, 5.0);
        buffer.push(event.clone());
        buffer.push(event);

        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_label_unlabeled_keeps_existing_labels() {
        let buffer = PendingEventBuffer::new();
        buffer.push(TapEvent::new(1, 10, 1.0));
        buffer.push(labeled(2, "kept"));
        buffer.push(TapEvent::new(3, 10, 1.0));

        assert_eq!(buffer.label_unlabeled("note"), 2);

        let labels: Vec<String> = buffer.drain_all().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["note", "kept", "note"]);
    }

    #[test]
    fn test_empty_label_is_noop() {
        let buffer = PendingEventBuffer::new();
        buffer.push(TapEvent::new(1, 10, 1.0));
        buffer.push(labeled(2, "kept"));

        assert_eq!(buffer.label_unlabeled(""), 0);

        let events = buffer.drain_all();
        assert!(events[0].is_unlabeled());
        assert_eq!(events[1].label, "kept");
    }

    #[test]
    fn test_drain_twice() {
        let buffer = PendingEventBuffer::new();
        buffer.push(TapEvent::new(1, 10, 1.0));

        assert_eq!(buffer.drain_all().len(), 1);
        assert!(buffer.drain_all().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_push_and_drain_loses_nothing() {
        let buffer = Arc::new(PendingEventBuffer::new());
        let producers: Vec<_> = (0..4)
            .map(|worker| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        buffer.push(TapEvent::new(worker * 1000 + i, 1, 0.0));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for _ in 0..50 {
            drained.extend(buffer.drain_all());
            thread::yield_now();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        drained.extend(buffer.drain_all());

        assert_eq!(drained.len(), 1000);
    }
}
