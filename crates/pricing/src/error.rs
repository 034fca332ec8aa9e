//! Ledger errors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use medarrival_core::DomainError;

use crate::component::{PriceComponentType, PriceScope};

/// Failure of a ledger write. Writes that fail leave the history untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("invalid amount {amount} for {component_type}: amounts cannot be negative")]
    InvalidAmount {
        component_type: PriceComponentType,
        amount: Decimal,
    },
}

impl From<PricingError> for DomainError {
    fn from(err: PricingError) -> Self {
        DomainError::validation(err.to_string())
    }
}

/// More than one row of the same exact scope is active at one instant.
///
/// Advisory: reads stay available by picking the most recent row, and this
/// is only reported (logged, or returned by
/// [`find_integrity_violations`](crate::ledger::find_integrity_violations)).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{active_count} active price components for {} (client: {:?}) at {as_of}", .scope.component_type, .scope.client_id)]
pub struct IntegrityViolation {
    pub scope: PriceScope,
    pub active_count: usize,
    pub as_of: DateTime<Utc>,
}
