//! Append-only audit trail.
//!
//! Corrections, tariff configuration changes and every escalation out of
//! tenant scoping leave an entry here. Callers write the entry *before* the
//! change it describes and abort when the write fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use utilbill_core::{Entity, TenantId, UserId, entity_id, tenant_owned_record};

use crate::tenancy::{
    DEFAULT_STORAGE_TIMEOUT, Direction, Filter, Query, Record, RepositoryError, Storage, TENANT_COLUMN, Value,
    bounded,
};

entity_id!(
    /// Audit entry identifier.
    AuditId
);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    ReadingCorrected,
    TariffConfigurationChanged,
    TariffRollbackApplied,
    CrossTenantCreate,
    ScopeBypass,
}

impl AuditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditKind::ReadingCorrected => "reading_corrected",
            AuditKind::TariffConfigurationChanged => "tariff_configuration_changed",
            AuditKind::TariffRollbackApplied => "tariff_rollback_applied",
            AuditKind::CrossTenantCreate => "cross_tenant_create",
            AuditKind::ScopeBypass => "scope_bypass",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    /// Tenant the change concerns; `None` for platform-wide scope bypasses.
    pub tenant_id: Option<TenantId>,
    pub actor: Option<UserId>,
    pub kind: AuditKind,
    pub entity: String,
    pub subject_id: Option<Uuid>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub reason: Option<String>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, entity: impl Into<String>) -> Self {
        Self {
            id: AuditId::new(),
            tenant_id: None,
            actor: None,
            kind,
            entity: entity.into(),
            subject_id: None,
            before: None,
            after: None,
            reason: None,
            details: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn subject(mut self, id: Uuid) -> Self {
        self.subject_id = Some(id);
        self
    }

    pub fn before(mut self, value: Option<serde_json::Value>) -> Self {
        self.before = value;
        self
    }

    pub fn after(mut self, value: Option<serde_json::Value>) -> Self {
        self.after = value;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

tenant_owned_record!(AuditEntry, AuditId, "audit_entries");

impl Record for AuditEntry {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("kind", self.kind.as_str().into()),
            ("entity", self.entity.clone().into()),
            ("subject_id", self.subject_id.into()),
            ("actor", self.actor.into()),
            ("recorded_at", self.recorded_at.into()),
        ]
    }
}

/// Writer/reader for audit entries.
#[derive(Clone)]
pub struct AuditTrail {
    storage: Arc<dyn Storage<AuditEntry>>,
    timeout: Duration,
}

impl core::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditTrail").field("timeout", &self.timeout).finish()
    }
}

impl AuditTrail {
    pub fn new(storage: Arc<dyn Storage<AuditEntry>>) -> Self {
        Self {
            storage,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist `entry`. Any failure, including a timeout, is `AuditFailed`.
    pub async fn record(&self, entry: AuditEntry) -> Result<AuditEntry, RepositoryError> {
        match bounded(self.timeout, "audit_record", self.storage.insert(&entry)).await {
            Ok(()) => {
                tracing::info!(
                    audit_id = %entry.id,
                    kind = entry.kind.as_str(),
                    entity = %entry.entity,
                    tenant_id = ?entry.tenant_id,
                    "audit entry recorded"
                );
                Ok(entry)
            }
            Err(err) => {
                tracing::error!(kind = entry.kind.as_str(), entity = %entry.entity, error = %err, "audit write failed");
                Err(RepositoryError::AuditFailed(err.to_string()))
            }
        }
    }

    /// Entries about one record of `tenant`, oldest first.
    pub async fn for_entity(
        &self,
        tenant: TenantId,
        entity: &str,
        id: Uuid,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let query = Query::new(AuditEntry::ENTITY)
            .filter(Filter::eq(TENANT_COLUMN, tenant))
            .filter(Filter::eq("entity", entity))
            .filter(Filter::eq("subject_id", id))
            .order_by("recorded_at", Direction::Asc);
        bounded(self.timeout, "audit_for_entity", self.storage.fetch(&query)).await
    }

    /// A single entry of `tenant`.
    pub async fn find(&self, tenant: TenantId, id: AuditId) -> Result<Option<AuditEntry>, RepositoryError> {
        let query = Query::new(AuditEntry::ENTITY)
            .filter(Filter::eq(TENANT_COLUMN, tenant))
            .filter(Filter::eq("id", Uuid::from(id)));
        let rows = bounded(self.timeout, "audit_find", self.storage.fetch(&query)).await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::InMemoryStorage;

    fn trail() -> (Arc<InMemoryStorage<AuditEntry>>, AuditTrail) {
        let storage = Arc::new(InMemoryStorage::new());
        (storage.clone(), AuditTrail::new(storage))
    }

    #[tokio::test]
    async fn entries_are_listed_per_tenant_and_subject() {
        let (_, trail) = trail();
        let tenant = TenantId::new();
        let subject = Uuid::now_v7();

        trail
            .record(AuditEntry::new(AuditKind::ReadingCorrected, "meter_readings").tenant(tenant).subject(subject))
            .await
            .unwrap();
        trail
            .record(AuditEntry::new(AuditKind::ReadingCorrected, "meter_readings").tenant(TenantId::new()).subject(subject))
            .await
            .unwrap();
        trail
            .record(AuditEntry::new(AuditKind::ReadingCorrected, "meter_readings").tenant(tenant).subject(Uuid::now_v7()))
            .await
            .unwrap();

        let found = trail.for_entity(tenant, "meter_readings", subject).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tenant_id, Some(tenant));
    }

    #[tokio::test]
    async fn unavailable_storage_is_an_audit_failure() {
        let (storage, trail) = trail();
        storage.set_unavailable(true);

        let err = trail
            .record(AuditEntry::new(AuditKind::ScopeBypass, "meters"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AuditFailed(_)));
    }
}
