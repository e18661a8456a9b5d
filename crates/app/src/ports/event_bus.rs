//! Event bus port: publish/subscribe for device events.

use std::future::Future;

use greenhouse_domain::event::DeviceEvent;

/// Publishes device events to interested subscribers.
///
/// Publishing is fire-and-forget: a control operation never fails because
/// nobody is listening.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: DeviceEvent) -> impl Future<Output = ()> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: DeviceEvent) -> impl Future<Output = ()> + Send {
        (**self).publish(event)
    }
}
