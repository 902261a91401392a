//! Kind-keyed dispatch of inbound bus messages
//!
//! Handlers subscribe to one message kind, or to every message via
//! [`MessageRouter::subscribe_all`]. Messages whose kind has no subscriber
//! are dropped without error.

use std::collections::HashMap;

/// One inbound message after framing has been removed
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    /// First key of the inbound wrapper object; `None` for `{}` or non-objects
    pub kind: Option<String>,
    pub payload: serde_json::Value,
}

impl RoutedMessage {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: Some(kind.into()),
            payload,
        }
    }

    /// Split a parsed inbound frame into kind and payload.
    ///
    /// The kind is the first key of the object, in document order.
    pub fn from_frame(frame: serde_json::Value) -> Self {
        match frame {
            serde_json::Value::Object(map) => match map.into_iter().next() {
                Some((kind, payload)) => Self {
                    kind: Some(kind),
                    payload,
                },
                None => Self {
                    kind: None,
                    payload: serde_json::Value::Null,
                },
            },
            other => Self {
                kind: None,
                payload: other,
            },
        }
    }
}

/// A subscriber to routed messages
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &RoutedMessage);
}

struct FnHandler<F>(F);

impl<F> MessageHandler for FnHandler<F>
where
    F: FnMut(&RoutedMessage) + Send,
{
    fn handle(&mut self, message: &RoutedMessage) {
        (self.0)(message)
    }
}

#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<String, Vec<Box<dyn MessageHandler>>>,
    catch_all: Vec<Box<dyn MessageHandler>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: impl Into<String>, handler: impl MessageHandler + 'static) {
        self.handlers
            .entry(kind.into())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn subscribe_fn<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: FnMut(&RoutedMessage) + Send + 'static,
    {
        self.subscribe(kind, FnHandler(handler));
    }

    /// Receive every routed message, including ones without a kind.
    pub fn subscribe_all<F>(&mut self, handler: F)
    where
        F: FnMut(&RoutedMessage) + Send + 'static,
    {
        self.catch_all.push(Box::new(FnHandler(handler)));
    }

    pub fn has_subscribers(&self, kind: &str) -> bool {
        self.handlers.get(kind).is_some_and(|h| !h.is_empty())
    }

    /// Deliver a message; returns how many handlers saw it.
    pub fn route(&mut self, message: &RoutedMessage) -> usize {
        let mut delivered = 0;
        for handler in self.catch_all.iter_mut() {
            handler.handle(message);
            delivered += 1;
        }

        let Some(kind) = message.kind.as_deref() else {
            tracing::debug!("Dropping inbound message without a kind");
            return delivered;
        };

        match self.handlers.get_mut(kind) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler.handle(message);
                    delivered += 1;
                }
            }
            None => {
                tracing::debug!(kind = %kind, "No subscriber for inbound message kind");
            }
        }
        delivered
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_from_frame_uses_first_key() {
        let frame: serde_json::Value =
            serde_json::from_str(r#"{"throughputChartSite": {"a": 1}}"#).unwrap();
        let message = RoutedMessage::from_frame(frame);

        assert_eq!(message.kind.as_deref(), Some("throughputChartSite"));
        assert_eq!(message.payload, json!({"a": 1}));
    }

    #[test]
    fn test_from_frame_keeps_document_order() {
        let frame: serde_json::Value = serde_json::from_str(r#"{"zeta": 1, "alpha": 2}"#).unwrap();
        let message = RoutedMessage::from_frame(frame);
        assert_eq!(message.kind.as_deref(), Some("zeta"));
        assert_eq!(message.payload, json!(1));
    }

    #[test]
    fn test_from_frame_empty_object_has_no_kind() {
        let message = RoutedMessage::from_frame(json!({}));
        assert_eq!(message.kind, None);

        let message = RoutedMessage::from_frame(json!([1, 2]));
        assert_eq!(message.kind, None);
        assert_eq!(message.payload, json!([1, 2]));
    }

    #[test]
    fn test_route_reaches_only_matching_kind() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut router = MessageRouter::new();

        let sink = seen.clone();
        router.subscribe_fn("siteInfo", move |m| sink.lock().push(m.payload.clone()));
        let sink = seen.clone();
        router.subscribe_fn("circuitInfo", move |_| sink.lock().push(json!("wrong")));

        let delivered = router.route(&RoutedMessage::new("siteInfo", json!({"id": 3})));

        assert_eq!(delivered, 1);
        assert_eq!(*seen.lock(), vec![json!({"id": 3})]);
    }

    #[test]
    fn test_unknown_and_missing_kinds_are_dropped() {
        let mut router = MessageRouter::new();
        router.subscribe_fn("siteInfo", |_| panic!("should not be called"));

        assert_eq!(router.route(&RoutedMessage::new("mystery", json!(null))), 0);
        assert_eq!(router.route(&RoutedMessage::from_frame(json!({}))), 0);
    }

    #[test]
    fn test_catch_all_sees_messages_without_kind() {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let mut router = MessageRouter::new();
        let sink = kinds.clone();
        router.subscribe_all(move |m| sink.lock().push(m.kind.clone()));

        router.route(&RoutedMessage::from_frame(json!({})));
        router.route(&RoutedMessage::new("throughput", json!({})));

        assert_eq!(*kinds.lock(), vec![None, Some("throughput".to_string())]);
        assert!(!router.has_subscribers("throughput"));
    }
}
