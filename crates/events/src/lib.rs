//! Domain event plumbing: event metadata, tenant-scoped envelopes and the
//! publish/subscribe boundary used by the notification dispatcher, and the
//! billing notifications themselves.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::BillingEvent;
pub use tenant::TenantScoped;
