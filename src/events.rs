//! Single-process publish/subscribe event bus.
//!
//! Successful mutations publish one event after the HTTP response has been
//! written, ordered per bucket in commit order. A plain subscriber list
//! rather than an async channel — a single in-process test double never
//! needs cross-task delivery.

use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    ObjectCreatedPut,
    ObjectCreatedPost,
    ObjectCreatedCopy,
    ObjectCreatedCompleteMultipartUpload,
    ObjectRemovedDelete,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::ObjectCreatedPut => "ObjectCreated:Put",
            EventName::ObjectCreatedPost => "ObjectCreated:Post",
            EventName::ObjectCreatedCopy => "ObjectCreated:Copy",
            EventName::ObjectCreatedCompleteMultipartUpload => "ObjectCreated:CompleteMultipartUpload",
            EventName::ObjectRemovedDelete => "ObjectRemoved:Delete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventObject {
    pub key: String,
    pub size: u64,
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_time_millis: i64,
    pub event_name: EventName,
    pub bucket: String,
    pub object: EventObject,
}

impl Event {
    pub fn new(event_name: EventName, bucket: impl Into<String>, object: EventObject) -> Self {
        Self {
            event_time_millis: Utc::now().timestamp_millis(),
            event_name,
            bucket: bucket.into(),
            object,
        }
    }

    /// The JSON body a real S3 notification payload would carry — handy
    /// for a subscriber that wants to forward it verbatim.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "eventTime": self.event_time_millis,
            "eventName": self.event_name.as_str(),
            "s3": {
                "bucket": { "name": self.bucket },
                "object": {
                    "key": self.object.key,
                    "size": self.object.size,
                    "eTag": self.object.etag,
                },
            },
        })
        .to_string()
    }
}

pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.write().unwrap().push(subscriber);
    }

    /// Fan out `event` to every subscriber. A subscriber that panics is
    /// caught and logged; it never blocks or skips the remaining
    /// subscribers in the list.
    pub fn publish(&self, event: Event) {
        let subscribers = self.subscribers.read().unwrap();
        for subscriber in subscribers.iter() {
            let subscriber = subscriber.clone();
            let event_ref = &event;
            if catch_unwind(AssertUnwindSafe(|| subscriber(event_ref))).is_err() {
                log::warn!("event subscriber panicked handling {}", event.event_name.as_str());
            }
        }
    }
}
