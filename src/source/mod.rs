//! Upstream price source
//!
//! Split into the record model, the caching client, and the Amber HTTP
//! implementation of the [`PriceSource`] seam.

pub mod amber;
pub mod client;
pub mod types;

pub use amber::AmberApi;
pub use client::{PriceSource, PriceSourceClient, SiteInfo};
pub use types::{ChannelType, PeriodSource, PeriodType, PriceRecord, RawPriceSnapshot, SiteId};
