pub mod bus;
pub mod event;

pub use bus::{ALL_TENANTS, BusError, EventBus, EventHandler, SubscriptionId};
pub use event::BusEvent;
