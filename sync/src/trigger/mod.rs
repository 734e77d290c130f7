//! Sources of "the chain tip may have moved" events.
//!
//! Two interchangeable strategies, picked by configuration:
//!
//! - [`PollTrigger`]: asks the node for its best hash on a fixed interval
//!   and fires only when it changes
//! - [`SubscriptionTrigger`]: fires once per pushed notification, with no
//!   deduplication
//!
//! Both fire [`Trigger::Startup`] first so the archive catches up before
//! steady-state operation.
use async_trait::async_trait;
use containers::BlockHash;

pub mod poll;
pub mod subscribe;

pub use poll::PollTrigger;
pub use subscribe::{Notification, NotificationSource, SubscriptionTrigger, ZmqNotificationSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Unconditional catch-up cycle when the source starts.
    Startup,
    /// The polled best block hash differs from the last observed one.
    TipChanged(BlockHash),
    /// A pushed notification arrived.
    Notification(Notification),
}

#[async_trait]
pub trait TriggerSource: Send {
    /// Waits for the next trigger. `None` means the source is exhausted.
    async fn next_trigger(&mut self) -> Option<Trigger>;
}

#[async_trait]
impl<T: TriggerSource + ?Sized> TriggerSource for Box<T> {
    async fn next_trigger(&mut self) -> Option<Trigger> {
        (**self).next_trigger().await
    }
}
