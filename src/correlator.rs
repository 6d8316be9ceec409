//! Contact correlation
//!
//! Pairs begin and end signals for each transient contact id and tracks the
//! peak ambient reading seen while the contact was open. Everything here is
//! in-memory; completed events are returned to the caller, which owns the
//! decision of where they go.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::{ContactId, TapEvent};

/// Latest ambient scalar reading, shared between the sensor callback and the correlator.
///
/// Stores the `f32` bit pattern in an atomic so a sensor thread can publish
/// while the foreground reads without locking.
#[derive(Debug, Default)]
pub struct AmbientScalar {
    bits: AtomicU32,
}

impl AmbientScalar {
    /// Create a reading holding `initial`
    pub fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(initial.to_bits()),
        }
    }

    /// Publish a new reading
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Most recent reading
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// State of one open contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactState {
    pub contact_id: ContactId,
    pub start_timestamp: i64,
    pub peak_scalar: f32,
}

/// Correlates begin/sample/end signals into completed [`TapEvent`]s
#[derive(Debug)]
pub struct EventCorrelator {
    open: HashMap<ContactId, ContactState>,
    ambient: Arc<AmbientScalar>,
}

impl Default for EventCorrelator {
    fn default() -> Self {
        Self::new(Arc::new(AmbientScalar::default()))
    }
}

impl EventCorrelator {
    /// Create a correlator reading begin-time and move-time values from `ambient`
    pub fn new(ambient: Arc<AmbientScalar>) -> Self {
        Self {
            open: HashMap::new(),
            ambient,
        }
    }

    /// Shared ambient reading used by this correlator
    pub fn ambient(&self) -> &Arc<AmbientScalar> {
        &self.ambient
    }

    /// Open a contact. A begin for an id that is already open replaces it.
    pub fn on_begin(&mut self, contact_id: ContactId, timestamp: i64) {
        let state = ContactState {
            contact_id,
            start_timestamp: timestamp,
            peak_scalar: self.ambient.load(),
        };
        if self.open.insert(contact_id, state).is_some() {
            tracing::trace!(contact_id, "begin replaced an open contact");
        }
    }

    /// Raise the peak of one open contact. Unknown ids are ignored.
    pub fn on_sample(&mut self, contact_id: ContactId, value: f32) {
        if let Some(state) = self.open.get_mut(&contact_id) {
            state.peak_scalar = state.peak_scalar.max(value);
        }
    }

    /// Apply `value` to every open contact
    pub fn sample_all(&mut self, value: f32) {
        for state in self.open.values_mut() {
            state.peak_scalar = state.peak_scalar.max(value);
        }
    }

    /// Move signal: broadcast the current ambient reading to all open contacts
    pub fn on_move(&mut self) {
        let value = self.ambient.load();
        self.sample_all(value);
    }

    /// Close a contact and build its event.
    ///
    /// Returns `None` when the id has no open contact (spurious or duplicate end).
    pub fn on_end(&mut self, contact_id: ContactId, timestamp: i64) -> Option<TapEvent> {
        let state = self.open.remove(&contact_id)?;
        let duration = timestamp.saturating_sub(state.start_timestamp).max(0);
        Some(TapEvent::new(
            state.start_timestamp,
            duration,
            state.peak_scalar,
        ))
    }

    /// Drop a contact without emitting an event
    pub fn on_cancel(&mut self, contact_id: ContactId) {
        self.open.remove(&contact_id);
    }

    /// Discard every open contact
    pub fn clear(&mut self) {
        self.open.clear();
    }

    /// Number of contacts currently open
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// State of an open contact, if any
    pub fn contact(&self, contact_id: ContactId) -> Option<&ContactState> {
        self.open.get(&contact_id)
    }
}

/// Convert a platform event time on the uptime clock into wall-clock milliseconds.
///
/// `now_uptime_ms` and `now_wall_ms` must be read at the same instant.
pub fn event_time_to_wall_clock(event_uptime_ms: i64, now_uptime_ms: i64, now_wall_ms: i64) -> i64 {
    now_wall_ms.saturating_sub(now_uptime_ms.saturating_sub(event_uptime_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlator_with_ambient(value: f32) -> EventCorrelator {
        EventCorrelator::new(Arc::new(AmbientScalar::new(value)))
    }

    #[test]
    fn test_begin_sample_end() {
        let mut correlator = correlator_with_ambient(0.0);

        correlator.on_begin(1, 1000);
        correlator.on_sample(1, 5.0);
        correlator.on_sample(1, 9.0);
        let event = correlator.on_end(1, 1300).unwrap();

        assert_eq!(event, TapEvent::new(1000, 300, 9.0));
        assert_eq!(correlator.open_count(), 0);
    }

    #[test]
    fn test_peak_defaults_to_begin_ambient() {
        let mut correlator = correlator_with_ambient(1013.25);

        correlator.on_begin(3, 50);
        let event = correlator.on_end(3, 80).unwrap();

        assert_eq!(event.peak_scalar, 1013.25);
        assert_eq!(event.duration, 30);
    }

    #[test]
    fn test_peak_never_decreases() {
        let mut correlator = correlator_with_ambient(2.0);

        correlator.on_begin(1, 0);
        correlator.on_sample(1, 7.0);
        correlator.on_sample(1, 3.0);
        correlator.on_sample(1, 1.0);

        assert_eq!(correlator.on_end(1, 10).unwrap().peak_scalar, 7.0);
    }

    #[test]
    fn test_spurious_end_and_cancel() {
        let mut correlator = correlator_with_ambient(0.0);

        assert!(correlator.on_end(42, 100).is_none());
        correlator.on_cancel(42);
        correlator.on_sample(42, 5.0);
        assert_eq!(correlator.open_count(), 0);

        correlator.on_begin(1, 0);
        assert!(correlator.on_end(1, 10).is_some());
        assert!(correlator.on_end(1, 20).is_none());
    }

    #[test]
    fn test_cancel_discards_without_event() {
        let mut correlator = correlator_with_ambient(0.0);

        correlator.on_begin(2, 100);
        correlator.on_cancel(2);

        assert!(correlator.on_end(2, 200).is_none());
    }

    #[test]
    fn test_reused_id_does_not_carry_over() {
        let ambient = Arc::new(AmbientScalar::new(1.0));
        let mut correlator = EventCorrelator::new(ambient.clone());

        correlator.on_begin(0, 100);
        correlator.on_sample(0, 50.0);
        correlator.on_end(0, 150).unwrap();

        correlator.on_begin(0, 400);
        let event = correlator.on_end(0, 410).unwrap();
        assert_eq!(event.start_timestamp, 400);
        assert_eq!(event.peak_scalar, 1.0);
    }

    #[test]
    fn test_last_begin_wins() {
        let mut correlator = correlator_with_ambient(0.0);

        correlator.on_begin(1, 100);
        correlator.on_sample(1, 8.0);
        correlator.on_begin(1, 500);

        let event = correlator.on_end(1, 600).unwrap();
        assert_eq!(event.start_timestamp, 500);
        assert_eq!(event.duration, 100);
        assert_eq!(event.peak_scalar, 0.0);
    }

    #[test]
    fn test_move_broadcasts_to_all_open_contacts() {
        let ambient = Arc::new(AmbientScalar::new(1.0));
        let mut correlator = EventCorrelator::new(ambient.clone());

        correlator.on_begin(1, 0);
        correlator.on_begin(2, 5);
        ambient.store(4.5);
        correlator.on_move();

        assert_eq!(correlator.contact(1).unwrap().peak_scalar, 4.5);
        assert_eq!(correlator.contact(2).unwrap().peak_scalar, 4.5);
    }

    #[test]
    fn test_negative_elapsed_time_clamps_to_zero() {
        let mut correlator = correlator_with_ambient(0.0);

        correlator.on_begin(1, 1000);
        assert_eq!(correlator.on_end(1, 900).unwrap().duration, 0);
    }

    #[test]
    fn test_clear_discards_open_contacts() {
        let mut correlator = correlator_with_ambient(0.0);

        correlator.on_begin(1, 0);
        correlator.on_begin(2, 0);
        correlator.clear();

        assert_eq!(correlator.open_count(), 0);
        assert!(correlator.on_end(1, 10).is_none());
    }

    #[test]
    fn test_event_time_conversion() {
        // Event happened 250ms of uptime before "now"
        let wall = event_time_to_wall_clock(9_750, 10_000, 1_700_000_000_000);
        assert_eq!(wall, 1_699_999_999_750);
    }

    #[test]
    fn test_ambient_scalar_roundtrip() {
        let ambient = AmbientScalar::default();
        assert_eq!(ambient.load(), 0.0);
        ambient.store(1001.75);
        assert_eq!(ambient.load(), 1001.75);
    }
}
