//! Realtime delivery for Parlor chats.
//!
//! The [`SessionRegistry`] tracks every live connection per user, the
//! [`DeliveryEngine`] turns inbound [`ClientEvent`]s into store mutations and
//! fans the resulting [`ServerEvent`]s out to connected participants.

pub mod engine;
pub mod error;
pub mod events;
pub mod notify;
pub mod registry;
pub mod typing;

pub use engine::DeliveryEngine;
pub use error::DeliveryError;
pub use events::{ClientEvent, FrameError, ServerEvent};
pub use notify::{
    MessageNotification, NoopNotificationPublisher, NotificationPublisher, NotifyError,
    RedisNotificationPublisher,
};
pub use registry::{SessionHandle, SessionId, SessionRegistry};
pub use typing::TypingBroadcaster;
