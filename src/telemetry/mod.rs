pub mod counters;

pub use counters::{PersistenceCounters, SettlementCounters};
