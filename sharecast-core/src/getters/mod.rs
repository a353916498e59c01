//! Getter implementations: the cascade and the concrete sources it falls through

pub mod cascade;
pub mod exchange;
pub mod metered;
pub mod store;
pub mod tee;

pub use cascade::{cascade, CascadeGetter};
pub use exchange::{ExchangeGetter, ExchangeRequest};
pub use metered::MeteredGetter;
pub use store::StoreGetter;
pub use tee::TeeGetter;
