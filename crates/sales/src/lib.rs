//! Sales domain module (event-sourced).
//!
//! A sale freezes the prices in effect for its client when it is recorded,
//! so later price changes never alter a recorded sale's total.

pub mod sale;

pub use sale::{
    ChangeQuantity, RecordDelivery, RecordSale, Sale, SaleCommand, SaleDeliveryRecorded,
    SaleEvent, SaleId, SalePricing, SaleQuantityChanged, SaleRecorded,
};
