use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use utilbill_core::{Aggregate, AggregateRoot, Currency, TenantId, entity_id, tenant_owned_record};
use utilbill_events::Event;
use utilbill_properties::RenterId;

use crate::item::{InvoiceItem, ItemId, ItemUpdate};

entity_id!(
    /// Invoice identifier.
    InvoiceId
);

/// Invoice lifecycle. Transitions only move forward: Draft → Finalized → Paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Finalized,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Finalized => "finalized",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("invoice is {0} and can no longer be edited")]
    InvoiceNotEditable(InvoiceStatus),

    #[error("invoice is already finalized")]
    AlreadyFinalized,

    #[error("invoice must be finalized before it can be paid")]
    NotFinalized,

    #[error("invoice is already paid")]
    AlreadyPaid,

    #[error("only draft invoices can be deleted")]
    CannotDeleteFinalized,

    #[error("stored total {stored} does not match item sum {computed}")]
    InvalidTotal { stored: Decimal, computed: Decimal },

    #[error("invoice has no items")]
    EmptyInvoice,

    #[error("invoice item {0} not found")]
    ItemNotFound(ItemId),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl InvoiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Aggregate root: Invoice.
///
/// Items are embedded, so an invoice is written and read as one unit.
/// `total_amount` has no setter: it is recomputed from the items whenever an
/// item event is applied, which keeps it equal to the item sum at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    renter_id: RenterId,
    period_start: NaiveDate,
    period_end: NaiveDate,
    currency: Currency,
    status: InvoiceStatus,
    items: Vec<InvoiceItem>,
    total_amount: Decimal,
    due_date: NaiveDate,
    finalized_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    paid_amount: Option<Decimal>,
    payment_reference: Option<String>,
    generation_warnings: Vec<String>,
    version: u64,
    created_at: DateTime<Utc>,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        let epoch = NaiveDate::default();
        Self {
            id,
            tenant_id: None,
            renter_id: RenterId::from(uuid::Uuid::nil()),
            period_start: epoch,
            period_end: epoch,
            currency: Currency::default(),
            status: InvoiceStatus::Draft,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            due_date: epoch,
            finalized_at: None,
            paid_at: None,
            paid_amount: None,
            payment_reference: None,
            generation_warnings: Vec::new(),
            version: 0,
            created_at: DateTime::<Utc>::default(),
            created: false,
        }
    }

    /// Build a new draft from a `CreateDraft` command.
    pub fn draft(cmd: CreateDraft) -> Result<Self, InvoiceError> {
        let mut invoice = Invoice::empty(InvoiceId::new());
        invoice.execute(&InvoiceCommand::CreateDraft(cmd))?;
        Ok(invoice)
    }

    pub fn renter_id(&self) -> RenterId {
        self.renter_id
    }

    pub fn period(&self) -> (NaiveDate, NaiveDate) {
        (self.period_start, self.period_end)
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn item(&self, item_id: ItemId) -> Option<&InvoiceItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn paid_amount(&self) -> Option<Decimal> {
        self.paid_amount
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn generation_warnings(&self) -> &[String] {
        &self.generation_warnings
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_editable(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    /// Sum of item totals, independent of the stored `total_amount`.
    pub fn item_sum(&self) -> Decimal {
        self.items.iter().map(InvoiceItem::total).sum()
    }

    /// Deletion is only allowed while the invoice is a draft.
    pub fn ensure_deletable(&self) -> Result<(), InvoiceError> {
        if self.status == InvoiceStatus::Draft {
            Ok(())
        } else {
            Err(InvoiceError::CannotDeleteFinalized)
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

tenant_owned_record!(Invoice, InvoiceId, "invoices");

/// Command: CreateDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDraft {
    pub renter_id: RenterId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub currency: Currency,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    pub warnings: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateDraft(CreateDraft),
    AddItem {
        item: InvoiceItem,
        occurred_at: DateTime<Utc>,
    },
    EditItem {
        item_id: ItemId,
        update: ItemUpdate,
        occurred_at: DateTime<Utc>,
    },
    RemoveItem {
        item_id: ItemId,
        occurred_at: DateTime<Utc>,
    },
    Finalize {
        occurred_at: DateTime<Utc>,
    },
    MarkPaid {
        amount: Decimal,
        reference: Option<String>,
        paid_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCreated {
    pub invoice_id: InvoiceId,
    pub renter_id: RenterId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub currency: Currency,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    pub warnings: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    DraftCreated(DraftCreated),
    ItemAdded {
        item: InvoiceItem,
        occurred_at: DateTime<Utc>,
    },
    ItemEdited {
        item: InvoiceItem,
        occurred_at: DateTime<Utc>,
    },
    ItemRemoved {
        item_id: ItemId,
        occurred_at: DateTime<Utc>,
    },
    Finalized {
        total_amount: Decimal,
        occurred_at: DateTime<Utc>,
    },
    Paid {
        amount: Decimal,
        reference: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::DraftCreated(_) => "invoicing.invoice.draft_created",
            InvoiceEvent::ItemAdded { .. } => "invoicing.invoice.item_added",
            InvoiceEvent::ItemEdited { .. } => "invoicing.invoice.item_edited",
            InvoiceEvent::ItemRemoved { .. } => "invoicing.invoice.item_removed",
            InvoiceEvent::Finalized { .. } => "invoicing.invoice.finalized",
            InvoiceEvent::Paid { .. } => "invoicing.invoice.paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::DraftCreated(e) => e.occurred_at,
            InvoiceEvent::ItemAdded { occurred_at, .. }
            | InvoiceEvent::ItemEdited { occurred_at, .. }
            | InvoiceEvent::ItemRemoved { occurred_at, .. }
            | InvoiceEvent::Finalized { occurred_at, .. }
            | InvoiceEvent::Paid { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = InvoiceError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::DraftCreated(e) => {
                self.id = e.invoice_id;
                self.renter_id = e.renter_id;
                self.period_start = e.period_start;
                self.period_end = e.period_end;
                self.currency = e.currency;
                self.due_date = e.due_date;
                self.items = e.items.clone();
                self.generation_warnings = e.warnings.clone();
                self.status = InvoiceStatus::Draft;
                self.created_at = e.occurred_at;
                self.created = true;
                self.total_amount = self.item_sum();
            }
            InvoiceEvent::ItemAdded { item, .. } => {
                self.items.push(item.clone());
                self.total_amount = self.item_sum();
            }
            InvoiceEvent::ItemEdited { item, .. } => {
                if let Some(slot) = self.items.iter_mut().find(|i| i.id == item.id) {
                    *slot = item.clone();
                }
                self.total_amount = self.item_sum();
            }
            InvoiceEvent::ItemRemoved { item_id, .. } => {
                self.items.retain(|i| i.id != *item_id);
                self.total_amount = self.item_sum();
            }
            InvoiceEvent::Finalized { occurred_at, .. } => {
                self.status = InvoiceStatus::Finalized;
                self.finalized_at = Some(*occurred_at);
            }
            InvoiceEvent::Paid {
                amount,
                reference,
                occurred_at,
            } => {
                self.status = InvoiceStatus::Paid;
                self.paid_amount = Some(*amount);
                self.payment_reference = reference.clone();
                self.paid_at = Some(*occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateDraft(cmd) => self.handle_create(cmd),
            InvoiceCommand::AddItem { item, occurred_at } => {
                self.ensure_editable()?;
                let item = item.priced_in(self.currency);
                item.validate()?;
                if self.item(item.id).is_some() {
                    return Err(InvoiceError::validation(format!("item {} already exists", item.id)));
                }
                Ok(vec![InvoiceEvent::ItemAdded {
                    item,
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::EditItem {
                item_id,
                update,
                occurred_at,
            } => {
                self.ensure_editable()?;
                let current = self.item(*item_id).ok_or(InvoiceError::ItemNotFound(*item_id))?;
                let edited = current.edited(update, self.currency)?;
                Ok(vec![InvoiceEvent::ItemEdited {
                    item: edited,
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::RemoveItem { item_id, occurred_at } => {
                self.ensure_editable()?;
                if self.item(*item_id).is_none() {
                    return Err(InvoiceError::ItemNotFound(*item_id));
                }
                Ok(vec![InvoiceEvent::ItemRemoved {
                    item_id: *item_id,
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::Finalize { occurred_at } => self.handle_finalize(*occurred_at),
            InvoiceCommand::MarkPaid {
                amount,
                reference,
                paid_at,
            } => self.handle_mark_paid(*amount, reference.clone(), *paid_at),
        }
    }
}

impl Invoice {
    fn ensure_editable(&self) -> Result<(), InvoiceError> {
        if self.status == InvoiceStatus::Draft {
            Ok(())
        } else {
            Err(InvoiceError::InvoiceNotEditable(self.status))
        }
    }

    fn handle_create(&self, cmd: &CreateDraft) -> Result<Vec<InvoiceEvent>, InvoiceError> {
        if self.created {
            return Err(InvoiceError::validation("invoice already exists"));
        }
        if cmd.period_end <= cmd.period_start {
            return Err(InvoiceError::validation(format!(
                "billing period is empty: {}..{}",
                cmd.period_start, cmd.period_end
            )));
        }
        if cmd.items.is_empty() {
            return Err(InvoiceError::EmptyInvoice);
        }
        let items: Vec<InvoiceItem> = cmd.items.iter().map(|i| i.priced_in(cmd.currency)).collect();
        for item in &items {
            item.validate()?;
        }

        Ok(vec![InvoiceEvent::DraftCreated(DraftCreated {
            invoice_id: self.id,
            renter_id: cmd.renter_id,
            period_start: cmd.period_start,
            period_end: cmd.period_end,
            currency: cmd.currency,
            due_date: cmd.due_date,
            items,
            warnings: cmd.warnings.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, occurred_at: DateTime<Utc>) -> Result<Vec<InvoiceEvent>, InvoiceError> {
        if self.status != InvoiceStatus::Draft {
            return Err(InvoiceError::AlreadyFinalized);
        }
        if self.items.is_empty() {
            return Err(InvoiceError::EmptyInvoice);
        }
        let computed = self.item_sum();
        if computed != self.total_amount {
            return Err(InvoiceError::InvalidTotal {
                stored: self.total_amount,
                computed,
            });
        }

        Ok(vec![InvoiceEvent::Finalized {
            total_amount: self.total_amount,
            occurred_at,
        }])
    }

    fn handle_mark_paid(
        &self,
        amount: Decimal,
        reference: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<Vec<InvoiceEvent>, InvoiceError> {
        match self.status {
            InvoiceStatus::Draft => return Err(InvoiceError::NotFinalized),
            InvoiceStatus::Paid => return Err(InvoiceError::AlreadyPaid),
            InvoiceStatus::Finalized => {}
        }
        if amount <= Decimal::ZERO {
            return Err(InvoiceError::validation("payment amount must be positive"));
        }

        Ok(vec![InvoiceEvent::Paid {
            amount,
            reference: reference.filter(|r| !r.trim().is_empty()),
            occurred_at: paid_at,
        }])
    }
}
