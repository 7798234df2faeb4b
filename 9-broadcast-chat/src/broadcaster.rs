use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::DeliveryFailurePolicy,
    event::{BroadcastEvent, EventReceiver},
    registry::ClientRegistry,
};

/// Outcome of fanning out one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// The single consumer of the broadcast queue.
///
/// Events are fanned out strictly one at a time in queue order; the queue is
/// the only thing that orders deliveries across sessions.
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    events: EventReceiver,
    policy: DeliveryFailurePolicy,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<ClientRegistry>,
        events: EventReceiver,
        policy: DeliveryFailurePolicy,
    ) -> Self {
        Self {
            registry,
            events,
            policy,
        }
    }

    /// Drains the queue until every producer has dropped its sender.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            fan_out(&self.registry, &event, self.policy).await;
        }
        info!("broadcast queue closed, broadcaster exiting");
    }
}

/// Delivers `event` to every registered client other than its origin.
///
/// A failed delivery never stops the others; under `Evict` the failing
/// client is hung up so its session tears down and announces the leave.
pub async fn fan_out(
    registry: &ClientRegistry,
    event: &BroadcastEvent,
    policy: DeliveryFailurePolicy,
) -> FanOut {
    info!(kind = ?event.kind, "{}", event.body);

    let mut outcome = FanOut::default();
    registry
        .for_each(event.origin, |id, entry| {
            if !entry.is_connected() {
                return;
            }
            match entry.deliver(&event.body) {
                Ok(()) => {
                    debug!(%id, name = entry.name(), "delivered");
                    outcome.delivered += 1;
                }
                Err(error) => {
                    warn!(%id, name = entry.name(), %error, "failed to deliver message");
                    outcome.failed += 1;
                    if policy == DeliveryFailurePolicy::Evict {
                        entry.hang_up();
                        outcome.evicted += 1;
                    }
                }
            }
        })
        .await;
    outcome
}
