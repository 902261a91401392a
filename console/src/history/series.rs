use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::{RingBuffer, RingBufferError};
use crate::bus::router::{MessageHandler, RoutedMessage};

/// A chart's rolling history, fed by one routed message kind.
///
/// Clones share the same buffer: one clone is subscribed on the bus
/// router, another is kept by whatever redraws the chart.
#[derive(Clone)]
pub struct RollingSeries<T> {
    buffer: Arc<Mutex<RingBuffer<T>>>,
}

impl<T> RollingSeries<T>
where
    T: Clone + Default + DeserializeOwned + Send + 'static,
{
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        Ok(Self {
            buffer: Arc::new(Mutex::new(RingBuffer::new(capacity, T::default())?)),
        })
    }

    pub fn push(&self, sample: T) {
        self.buffer.lock().push(sample);
    }

    /// Ordered copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.buffer.lock().to_vec()
    }

    pub fn latest(&self) -> T {
        self.buffer.lock().latest().clone()
    }

    /// Project every sample through `f`, oldest first, for a chart series.
    pub fn map_series<U>(&self, mut f: impl FnMut(&T) -> U) -> Vec<U> {
        let buffer = self.buffer.lock();
        let mut series = Vec::with_capacity(buffer.capacity());
        buffer.for_each(|sample| series.push(f(sample)));
        series
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl<T> MessageHandler for RollingSeries<T>
where
    T: Clone + Default + DeserializeOwned + Send + 'static,
{
    fn handle(&mut self, message: &RoutedMessage) {
        match T::deserialize(&message.payload) {
            Ok(sample) => self.push(sample),
            Err(e) => {
                tracing::warn!(
                    kind = ?message.kind,
                    error = %e,
                    "Discarding sample with unexpected shape"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::ThroughputSample;

    #[test]
    fn test_routed_payloads_are_pushed() {
        let series = RollingSeries::<ThroughputSample>::new(3).unwrap();
        let mut handler = series.clone();

        handler.handle(&RoutedMessage::new(
            "throughput",
            json!({"bps": [800, 80], "shaped": [400, 40]}),
        ));

        let latest = series.latest();
        assert_eq!(latest.bps, (800, 80));
        assert_eq!(latest.shaped, (400, 40));
        assert_eq!(series.snapshot().len(), 3);
    }

    #[test]
    fn test_bad_payload_is_ignored() {
        let series = RollingSeries::<ThroughputSample>::new(2).unwrap();
        let mut handler = series.clone();

        handler.handle(&RoutedMessage::new("throughput", json!("garbage")));

        assert_eq!(series.snapshot(), vec![ThroughputSample::default(); 2]);
    }

    #[test]
    fn test_map_series_is_chronological() {
        let series = RollingSeries::<ThroughputSample>::new(2).unwrap();
        for down in [1, 2, 3] {
            series.push(ThroughputSample {
                bps: (down, 0),
                shaped: (0, 0),
            });
        }

        assert_eq!(series.map_series(|s| s.bps.0), vec![2, 3]);

        series.clear();
        assert_eq!(series.map_series(|s| s.bps.0), vec![0, 0]);
    }
}
