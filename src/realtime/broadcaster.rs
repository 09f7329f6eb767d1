//! Selective fan-out of timer events to registered channels

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

use super::registry::{ChannelHandle, ConnectionRegistry};
use crate::state::{message::TimerIdPayload, ServerMessage, Timer, TimerId};

/// Default bound on a single channel delivery
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivers typed messages to the recipients the registry yields.
///
/// The registry lock is held only while the recipient list is copied.
/// Deliveries then run concurrently, each bounded by `send_timeout`; a channel
/// whose queue is closed or stays full past the timeout is unregistered.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
    notify_owner_on_stop: bool,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
            notify_owner_on_stop: false,
        }
    }

    /// Also deliver `TIMER_STOP` to the owner channels of the stopped timer's
    /// session. Off by default: stops go to supervisors only.
    pub fn with_owner_stop_notice(mut self, enabled: bool) -> Self {
        self.notify_owner_on_stop = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Bound on one delivery, also applied to socket writes
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Send `TIMER_UPDATE` to the timer's session and to every supervisor.
    /// Returns the number of channels that accepted the message.
    pub async fn broadcast_update(&self, timer: &Timer) -> usize {
        let recipients = self.registry.session_and_supervisors(&timer.session_id);
        self.deliver(recipients, ServerMessage::TimerUpdate(timer.clone()))
            .await
    }

    /// Send `TIMER_STOP` to every supervisor, and to the session's owners
    /// when enabled
    pub async fn broadcast_stop(&self, timer_id: TimerId, session_id: &str) -> usize {
        let recipients = if self.notify_owner_on_stop {
            self.registry.owners_and_supervisors(session_id)
        } else {
            self.registry.all_supervisors()
        };
        self.deliver(recipients, ServerMessage::TimerStop(TimerIdPayload { id: timer_id }))
            .await
    }

    async fn deliver(&self, recipients: Vec<ChannelHandle>, message: ServerMessage) -> usize {
        if recipients.is_empty() {
            return 0;
        }
        let kind = message.message_type().as_str();
        let timeout = self.send_timeout;

        let sends = recipients.into_iter().map(|handle| {
            let message = message.clone();
            async move {
                let outcome = handle.tx.send_timeout(message, timeout).await;
                (handle, outcome)
            }
        });

        let mut delivered = 0;
        for (handle, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let reason = match e {
                        SendTimeoutError::Timeout(_) => "timed out",
                        SendTimeoutError::Closed(_) => "channel closed",
                    };
                    warn!(
                        channel = handle.id(),
                        session_id = handle.session_id(),
                        role = %handle.role(),
                        kind,
                        reason,
                        "Failed to deliver message, dropping channel"
                    );
                    self.registry.unregister(&handle.key);
                }
            }
        }
        debug!(kind, delivered, "Broadcast complete");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::Role;

    fn broadcaster(registry: &Arc<ConnectionRegistry>) -> Broadcaster {
        Broadcaster::new(Arc::clone(registry), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn update_reaches_session_and_supervisors_only() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_g1, mut owner_s1) = registry.register("s1", Role::Owner);
        let (_g2, mut owner_s2) = registry.register("s2", Role::Owner);
        let (_g3, mut supervisor) = registry.register("anything", Role::Supervisor);

        let timer = Timer::new(1, "s1", 30);
        let delivered = broadcaster(&registry).broadcast_update(&timer).await;

        assert_eq!(delivered, 2);
        assert_eq!(owner_s1.try_recv().unwrap(), ServerMessage::TimerUpdate(timer.clone()));
        assert_eq!(supervisor.try_recv().unwrap(), ServerMessage::TimerUpdate(timer));
        assert!(owner_s2.try_recv().is_err());
    }

    #[tokio::test]
    async fn supervisor_in_same_session_gets_one_copy() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_g, mut supervisor) = registry.register("s1", Role::Supervisor);

        let delivered = broadcaster(&registry)
            .broadcast_update(&Timer::new(1, "s1", 5))
            .await;

        assert_eq!(delivered, 1);
        assert!(supervisor.try_recv().is_ok());
        assert!(supervisor.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_goes_to_supervisors_by_default() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_g1, mut owner) = registry.register("s1", Role::Owner);
        let (_g2, mut supervisor) = registry.register("s2", Role::Supervisor);

        broadcaster(&registry).broadcast_stop(9, "s1").await;

        assert_eq!(
            supervisor.try_recv().unwrap(),
            ServerMessage::TimerStop(TimerIdPayload { id: 9 })
        );
        assert!(owner.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_reaches_owner_when_enabled() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_g1, mut owner) = registry.register("s1", Role::Owner);
        let (_g2, mut other_owner) = registry.register("s2", Role::Owner);

        let delivered = broadcaster(&registry)
            .with_owner_stop_notice(true)
            .broadcast_stop(9, "s1")
            .await;

        assert_eq!(delivered, 1);
        assert!(owner.try_recv().is_ok());
        assert!(other_owner.try_recv().is_err());
    }

    #[tokio::test]
    async fn stalled_channel_is_dropped_without_blocking_others() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let (_stalled_guard, _stalled_rx) = registry.register("s1", Role::Owner);
        let (_g, mut healthy) = registry.register("s1", Role::Supervisor);
        let broadcaster = broadcaster(&registry);

        // First broadcast fills the stalled channel's single slot.
        assert_eq!(broadcaster.broadcast_update(&Timer::new(1, "s1", 3)).await, 2);
        healthy.try_recv().unwrap();

        // Second one times out on the stalled channel only.
        assert_eq!(broadcaster.broadcast_update(&Timer::new(1, "s1", 2)).await, 1);
        assert!(healthy.try_recv().is_ok());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all_supervisors().len(), 1);
    }

    #[tokio::test]
    async fn closed_channel_is_unregistered() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let (_guard, rx) = registry.register("s1", Role::Owner);
        drop(rx);

        let delivered = broadcaster(&registry)
            .broadcast_update(&Timer::new(1, "s1", 3))
            .await;

        assert_eq!(delivered, 0);
        assert!(registry.is_empty());
    }
}
