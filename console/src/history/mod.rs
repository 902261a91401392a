//! Rolling sample history for charts
//!
//! [`RingBuffer`] keeps the most recent N samples in a fixed allocation;
//! [`RollingSeries`] feeds one from routed bus messages.

mod series;

pub use series::RollingSeries;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("ring buffer capacity must be positive")]
    InvalidCapacity,
}

/// Fixed-capacity circular store of the most recent samples.
///
/// `entries.len() == capacity` at all times and `cursor` is the slot the
/// next push overwrites, so traversal from `cursor` to the end and then
/// from the start up to `cursor` is oldest-to-newest.
///
/// The cursor wraps with strict modulo arithmetic: after `capacity` pushes
/// it is back at 0 and exactly `capacity` samples are visible.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: Vec<T>,
    cursor: usize,
    default_value: T,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize, default_value: T) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::InvalidCapacity);
        }
        Ok(Self {
            entries: vec![default_value.clone(); capacity],
            cursor: 0,
            default_value,
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Slot the next push will overwrite
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn push(&mut self, item: T) {
        self.entries[self.cursor] = item;
        self.cursor = (self.cursor + 1) % self.entries.len();
    }

    /// Visit every slot, oldest first.
    pub fn for_each(&self, mut visit: impl FnMut(&T)) {
        self.iter().for_each(|entry| visit(entry));
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries[self.cursor..]
            .iter()
            .chain(self.entries[..self.cursor].iter())
    }

    /// Most recently pushed sample (the default value before any push).
    pub fn latest(&self) -> &T {
        let index = (self.cursor + self.entries.len() - 1) % self.entries.len();
        &self.entries[index]
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        let default_value = self.default_value.clone();
        self.entries.fill(default_value);
        self.cursor = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================
