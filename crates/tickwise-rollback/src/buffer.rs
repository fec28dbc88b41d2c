//! Fixed-capacity ring buffer keyed by tick

use tickwise_core::{StateHistory, Tick};

/// A ring buffer for storing recent per-tick values
///
/// Each tick maps to slot `tick % capacity`, so saving tick `t` evicts tick
/// `t - capacity`. Values older than the one already occupying their slot
/// are refused, which keeps the retained window age-ordered.
#[derive(Debug, Clone)]
pub struct RollbackBuffer<T> {
    /// Ring buffer storage: (tick, value); `None` means the slot is empty
    slots: Vec<Option<(Tick, T)>>,
    /// Number of values currently stored
    count: usize,
    /// Newest tick ever saved
    newest: Option<Tick>,
}

impl<T> RollbackBuffer<T> {
    /// Create a new rollback buffer with the given capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of ticks to retain
    ///
    /// # Example
    ///
    /// ```rust
    /// use tickwise_rollback::RollbackBuffer;
    ///
    /// // 31 frames at 30 ticks/s = one second of history plus the present
    /// let buffer: RollbackBuffer<f32> = RollbackBuffer::new(31);
    /// assert_eq!(buffer.stats().capacity, 31);
    /// ```
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            count: 0,
            newest: None,
        }
    }

    fn slot_index(&self, tick: Tick) -> usize {
        tick as usize % self.slots.len()
    }

    /// Oldest tick that can still be stored alongside the newest one
    fn window_start(&self) -> Option<Tick> {
        self.newest
            .map(|newest| newest.saturating_sub(self.slots.len() as Tick - 1))
    }

    /// Get all stored values as an iterator (oldest to newest)
    pub fn iter(&self) -> impl Iterator<Item = (Tick, &T)> {
        let mut values: Vec<_> = self
            .slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(t, v)| (*t, v)))
            .collect();
        values.sort_by_key(|(t, _)| *t);
        values.into_iter()
    }

    /// Get mutable access to the value stored at exactly `tick`
    pub fn get_state_mut(&mut self, tick: Tick) -> Option<&mut T> {
        let index = self.slot_index(tick);
        self.slots[index]
            .as_mut()
            .filter(|(t, _)| *t == tick)
            .map(|(_, v)| v)
    }

    /// Get statistics about the buffer
    pub fn stats(&self) -> BufferStats {
        let (oldest, newest) = self.tick_range().unwrap_or((0, 0));
        BufferStats {
            capacity: self.slots.len(),
            count: self.count,
            oldest_tick: oldest,
            newest_tick: newest,
        }
    }
}

impl<T> StateHistory<T> for RollbackBuffer<T> {
    fn save_state(&mut self, tick: Tick, state: T) {
        if let Some(start) = self.window_start() {
            if tick < start {
                log::trace!("refusing tick {} older than retained window start {}", tick, start);
                return;
            }
        }

        let index = self.slot_index(tick);
        let was_empty = self.slots[index].is_none();
        self.slots[index] = Some((tick, state));
        if was_empty {
            self.count += 1;
        }

        if self.newest.map_or(true, |newest| tick > newest) {
            self.newest = Some(tick);
            // Slots now outside the window hold stale ticks; drop them so
            // lookups never see a wrapped value
            let start = self.window_start().unwrap_or(tick);
            for slot in &mut self.slots {
                if matches!(slot, Some((t, _)) if *t < start) {
                    *slot = None;
                    self.count -= 1;
                }
            }
        }
    }

    fn get_state(&self, tick: Tick) -> Option<&T> {
        let index = self.slot_index(tick);
        self.slots[index]
            .as_ref()
            .filter(|(t, _)| *t == tick)
            .map(|(_, v)| v)
    }

    fn get_nearest_before(&self, tick: Tick) -> Option<(Tick, &T)> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|(t, _)| *t <= tick)
            .max_by_key(|(t, _)| *t)
            .map(|(t, v)| (*t, v))
    }

    fn get_nearest_after(&self, tick: Tick) -> Option<(Tick, &T)> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|(t, _)| *t >= tick)
            .min_by_key(|(t, _)| *t)
            .map(|(t, v)| (*t, v))
    }

    fn clear_before(&mut self, tick: Tick) {
        for slot in &mut self.slots {
            if matches!(slot, Some((t, _)) if *t < tick) {
                *slot = None;
                self.count -= 1;
            }
        }
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.count = 0;
        self.newest = None;
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.slots.len())
    }

    fn len(&self) -> usize {
        self.count
    }

    fn tick_range(&self) -> Option<(Tick, Tick)> {
        let mut ticks = self.slots.iter().flatten().map(|(t, _)| *t);
        let first = ticks.next()?;
        Some(ticks.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}

/// Statistics about a rollback buffer
#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    /// Maximum capacity
    pub capacity: usize,
    /// Current number of stored values
    pub count: usize,
    /// Oldest tick in the buffer
    pub oldest_tick: Tick,
    /// Newest tick in the buffer
    pub newest_tick: Tick,
}

impl BufferStats {
    /// Get the tick span (newest - oldest)
    pub fn tick_span(&self) -> Tick {
        if self.count == 0 {
            0
        } else {
            self.newest_tick - self.oldest_tick
        }
    }

    /// Get the fill percentage (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f32 {
        self.count as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let buffer: RollbackBuffer<u8> = RollbackBuffer::new(64);
        assert_eq!(buffer.capacity(), Some(64));
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    #[should_panic(expected = "Capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = RollbackBuffer::<u8>::new(0);
    }

    #[test]
    fn test_save_and_get() {
        let mut buffer = RollbackBuffer::new(64);

        buffer.save_state(10, 'a');
        buffer.save_state(11, 'b');
        buffer.save_state(12, 'c');

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get_state(10), Some(&'a'));
        assert_eq!(buffer.get_state(12), Some(&'c'));
        assert!(buffer.get_state(13).is_none());
    }

    #[test]
    fn test_overwrite_same_tick() {
        let mut buffer = RollbackBuffer::new(8);
        buffer.save_state(5, 1);
        buffer.save_state(5, 2);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get_state(5), Some(&2));

        *buffer.get_state_mut(5).unwrap() = 3;
        assert_eq!(buffer.get_state(5), Some(&3));
    }

    #[test]
    fn test_ring_buffer_wrap() {
        let mut buffer = RollbackBuffer::new(4);

        for tick in 0..4 {
            buffer.save_state(tick, tick);
        }
        assert_eq!(buffer.len(), 4);

        // Add more - should wrap and evict the oldest
        buffer.save_state(4, 4);
        buffer.save_state(5, 5);

        assert!(buffer.get_state(0).is_none());
        assert!(buffer.get_state(1).is_none());
        assert!(buffer.get_state(4).is_some());
        assert!(buffer.get_state(5).is_some());
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.tick_range(), Some((2, 5)));
    }

    #[test]
    fn test_jump_evicts_out_of_window() {
        let mut buffer = RollbackBuffer::new(4);
        buffer.save_state(1, 1);
        buffer.save_state(2, 2);

        // Skipping ahead leaves 1 and 2 outside the window [7, 10]
        buffer.save_state(10, 10);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.tick_range(), Some((10, 10)));
    }

    #[test]
    fn test_refuses_ticks_older_than_window() {
        let mut buffer = RollbackBuffer::new(4);
        for tick in 10..14 {
            buffer.save_state(tick, tick);
        }

        // Slot of tick 9 is tick 13's slot; it must not be overwritten
        buffer.save_state(9, 9);
        assert!(buffer.get_state(9).is_none());
        assert_eq!(buffer.get_state(13), Some(&13));
    }

    #[test]
    fn test_nearest_before_and_after() {
        let mut buffer = RollbackBuffer::new(64);
        buffer.save_state(10, ());
        buffer.save_state(20, ());
        buffer.save_state(30, ());

        assert_eq!(buffer.get_nearest_before(25).map(|(t, _)| t), Some(20));
        assert_eq!(buffer.get_nearest_before(30).map(|(t, _)| t), Some(30));
        assert!(buffer.get_nearest_before(5).is_none());

        assert_eq!(buffer.get_nearest_after(15).map(|(t, _)| t), Some(20));
        assert_eq!(buffer.get_nearest_after(10).map(|(t, _)| t), Some(10));
        assert!(buffer.get_nearest_after(35).is_none());
    }

    #[test]
    fn test_clear_before() {
        let mut buffer = RollbackBuffer::new(64);
        buffer.save_state(10, ());
        buffer.save_state(20, ());
        buffer.save_state(30, ());

        buffer.clear_before(20);

        assert!(buffer.get_state(10).is_none());
        assert!(buffer.get_state(20).is_some());
        assert!(buffer.get_state(30).is_some());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_iter_is_ordered() {
        let mut buffer = RollbackBuffer::new(4);
        for tick in [7, 5, 6, 8] {
            buffer.save_state(tick, tick * 10);
        }
        let ticks: Vec<_> = buffer.iter().map(|(t, _)| t).collect();
        assert_eq!(ticks, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_stats() {
        let mut buffer = RollbackBuffer::new(64);
        buffer.save_state(10, ());
        buffer.save_state(20, ());
        buffer.save_state(30, ());

        let stats = buffer.stats();
        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.oldest_tick, 10);
        assert_eq!(stats.newest_tick, 30);
        assert_eq!(stats.tick_span(), 20);
    }
}
