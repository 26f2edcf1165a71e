//! Publishing billing notifications after a change has been persisted.

use std::sync::Arc;

use utilbill_core::TenantId;
use utilbill_events::{BillingEvent, EventBus, EventEnvelope};

/// Wraps the bus the notification dispatcher subscribes to.
///
/// Publication happens after the state change is stored. A failed publish is
/// logged and reported as `false`; the stored change stands and the caller's
/// operation still succeeds.
#[derive(Debug)]
pub struct Notifier<B> {
    bus: Arc<B>,
}

impl<B> Clone for Notifier<B> {
    fn clone(&self) -> Self {
        Self { bus: self.bus.clone() }
    }
}

impl<B> Notifier<B>
where
    B: EventBus<EventEnvelope<BillingEvent>>,
{
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn publish(&self, tenant_id: TenantId, event: BillingEvent) -> bool {
        let (subject_type, subject_id) = event.subject();
        let envelope = EventEnvelope::wrap(tenant_id, subject_type, subject_id, event);
        let event_id = envelope.event_id();
        let event_type = envelope.event_type().to_string();

        match self.bus.publish(envelope) {
            Ok(()) => {
                tracing::debug!(%tenant_id, %event_id, event_type = %event_type, "notification published");
                true
            }
            Err(err) => {
                tracing::error!(
                    %tenant_id,
                    %event_id,
                    event_type = %event_type,
                    error = ?err,
                    "notification publish failed after commit"
                );
                false
            }
        }
    }
}
