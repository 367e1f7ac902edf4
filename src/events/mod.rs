//! # Lifecycle Events
//!
//! Batch and job lifecycle notifications over a tokio broadcast channel.
//! Event names live in [`crate::constants::events`].

pub mod publisher;

pub use publisher::{EventPublisher, LifecycleEvent, PublishedEvent};
