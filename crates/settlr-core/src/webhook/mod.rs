//! Webhook notifications: payloads, the in-memory queue and the delivery worker

pub mod payload;
pub mod queue;
pub mod worker;

pub use payload::WebHookData;
pub use queue::{WebHookQueue, WebHookQueueItem};
pub use worker::{DeliveryOutcome, WebHookWorker, WebHookWorkerOpts};

// vim: ts=4
