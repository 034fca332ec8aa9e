//! Products domain module (event-sourced).
//!
//! A product owns its full price component history. Price changes are
//! recorded as events and applied through the price ledger, so replaying a
//! product's stream rebuilds the exact audit trail.

pub mod category;
pub mod price_sheet;
pub mod product;

pub use category::{Category, CategoryId};
pub use price_sheet::{
    PriceSheetConfig, PriceSheetError, PriceSheetImport, PriceSheetRow, SheetIssue,
    export_price_sheet, read_price_sheet,
};
pub use product::{
    ClientPricingReverted, ClientPricingTarget, CreateProduct, PriceSet, Product, ProductCommand,
    ProductCreated, ProductDetailsUpdated, ProductEvent, ProductId, RevertClientPricing,
    SetClientPricing, SetPrice, UpdateProductDetails,
};
