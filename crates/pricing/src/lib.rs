//! Price component ledger (pure domain logic, no IO).
//!
//! A product's cost is a set of independently versioned components
//! (purchase price, transport, storage, ...). Each component row is valid
//! over a half-open interval `[effective_from, effective_to)` and is either a
//! default price or an override for one client. The ledger answers "what does
//! this cost, for this client, at this time" and records price changes
//! without ever deleting a row.
//!
//! The history collection is owned by the caller (the persistence
//! collaborator loads it, passes it in, and persists what changed).

pub mod component;
pub mod error;
pub mod ledger;

pub use component::{PriceComponent, PriceComponentType, PriceScope};
pub use error::{IntegrityViolation, PricingError};
pub use ledger::{
    PriceBreakdown, PriceSource, ResolvedPrice, breakdown, find_integrity_violations,
    get_active_amount, get_history, get_total_cost, has_override, resolve, revert_to_default,
    set_amount, set_amounts, validate_amount,
};
