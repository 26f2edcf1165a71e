//! Utility providers, their tariffs and tariff configurations.
//!
//! Configurations arrive as loosely-shaped JSON from admin forms and are parsed
//! once, here, into [`TariffConfiguration`]. Nothing downstream inspects raw JSON.

pub mod configuration;
pub mod provider;
pub mod selection;
pub mod tariff;

pub use configuration::{
    ConfigurationError, FlatRate, TariffConfiguration, TariffZone, TimeOfUse, WeekendLogic,
};
pub use provider::{Provider, ProviderId};
pub use selection::{TariffError, ensure_no_overlap, select_active};
pub use tariff::{Tariff, TariffId};
