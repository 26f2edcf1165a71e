use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use utilbill_core::TenantId;

use crate::Event;

/// Envelope for a published domain event, carrying tenant + subject metadata.
///
/// Subscribers (the notification dispatcher, reporting) receive envelopes, never
/// bare payloads, so they can filter by tenant without inspecting the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,

    /// Entity the event is about ("invoice", "meter_reading", "tariff").
    subject_type: String,
    subject_id: Uuid,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant_id: TenantId,
        subject_type: impl Into<String>,
        subject_id: Uuid,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            subject_type: subject_type.into(),
            subject_id,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, copying its metadata into the envelope.
    pub fn wrap(
        tenant_id: TenantId,
        subject_type: impl Into<String>,
        subject_id: Uuid,
        payload: E,
    ) -> Self {
        let event_type = payload.event_type();
        let occurred_at = payload.occurred_at();
        Self::new(
            Uuid::now_v7(),
            tenant_id,
            subject_type,
            subject_id,
            event_type,
            occurred_at,
            payload,
        )
    }
}
