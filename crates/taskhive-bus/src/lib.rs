//! Communication bus: topic pub/sub for inter-agent and
//! orchestrator-to-agent messaging.
//!
//! Delivery is at-most-once and in-memory. Subscriptions are channel-style
//! handles backed by bounded drop-oldest queues, so a slow subscriber never
//! blocks a publisher. `request` layers a correlation-id round-trip on top
//! of plain publish/subscribe.

pub mod bus;
pub mod message;
pub mod pattern;

pub use bus::{Bus, BusStats, Subscription};
pub use message::BusMessage;
pub use pattern::TopicPattern;
