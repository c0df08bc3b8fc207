//! Retail price derivation
//!
//! Converts a wholesale [`PriceRecord`] into retail import/export prices using
//! fixed tariff parameters. Everything here is pure arithmetic on dollars per
//! kWh; unit conversion already happened when the record was parsed.

use serde::{Deserialize, Serialize};

use crate::source::PriceRecord;

/// Fixed charge plus loss-factor multiplier for one direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticTariff {
    /// Network/retail fixed charge in $/kWh
    pub fixed_charge: f64,
    /// Multiplier applied to the wholesale price
    pub loss_factor: f64,
}

/// Distinct tariffs for energy bought from and sold to the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TariffSet {
    pub import: StaticTariff,
    pub export: StaticTariff,
}

/// Retail prices derived from one wholesale record, in $/kWh.
///
/// `export_price` is positive when the consumer gets paid for exporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedPrice {
    pub import_price: f64,
    pub export_price: f64,
    pub wholesale_price: f64,
}

/// Cost of importing one kWh at the given wholesale price
pub fn derive_import_price(record: &PriceRecord, tariff: &StaticTariff) -> f64 {
    tariff.fixed_charge + tariff.loss_factor * record.wholesale_per_kwh
}

/// Consumer's cost of exporting one kWh; negative means the consumer is paid
pub fn derive_export_price(record: &PriceRecord, tariff: &StaticTariff) -> f64 {
    tariff.fixed_charge - tariff.loss_factor * record.wholesale_per_kwh
}

impl DerivedPrice {
    /// Combine a record with both tariffs.
    ///
    /// This is the only place the export sign flips to "payment to consumer".
    pub fn derive(record: &PriceRecord, tariffs: &TariffSet) -> Self {
        Self {
            import_price: derive_import_price(record, &tariffs.import),
            export_price: -derive_export_price(record, &tariffs.export),
            wholesale_price: record.wholesale_per_kwh,
        }
    }
}
