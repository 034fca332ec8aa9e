use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medarrival_core::{ClientId, DomainError, ValueObject};

/// Cost line contributing to a product's total cost.
///
/// The set is closed: total cost is the sum over every member, with an
/// absent component contributing zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceComponentType {
    PurchasePrice,
    Transport,
    Storage,
    Transit,
    Customs,
    Certification,
}

impl PriceComponentType {
    /// Every component type, in display order.
    pub const ALL: [PriceComponentType; 6] = [
        PriceComponentType::PurchasePrice,
        PriceComponentType::Transport,
        PriceComponentType::Storage,
        PriceComponentType::Transit,
        PriceComponentType::Customs,
        PriceComponentType::Certification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PriceComponentType::PurchasePrice => "PURCHASE_PRICE",
            PriceComponentType::Transport => "TRANSPORT",
            PriceComponentType::Storage => "STORAGE",
            PriceComponentType::Transit => "TRANSIT",
            PriceComponentType::Customs => "CUSTOMS",
            PriceComponentType::Certification => "CERTIFICATION",
        }
    }
}

impl core::fmt::Display for PriceComponentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceComponentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PriceComponentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown price component type: {wanted}")))
    }
}

/// The lineage a price component belongs to: one type, default or one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriceScope {
    pub component_type: PriceComponentType,
    /// `None` is the default (global) scope.
    pub client_id: Option<ClientId>,
}

impl ValueObject for PriceScope {}

impl PriceScope {
    pub fn new(component_type: PriceComponentType, client_id: Option<ClientId>) -> Self {
        Self {
            component_type,
            client_id,
        }
    }

    pub fn default_for(component_type: PriceComponentType) -> Self {
        Self::new(component_type, None)
    }

    pub fn client(component_type: PriceComponentType, client_id: ClientId) -> Self {
        Self::new(component_type, Some(client_id))
    }

    pub fn is_override(&self) -> bool {
        self.client_id.is_some()
    }

    /// Exact-scope match. A client scope never matches default rows.
    pub fn matches(&self, component: &PriceComponent) -> bool {
        component.component_type == self.component_type && component.client_id == self.client_id
    }
}

/// One versioned cost entry.
///
/// Once superseded, only `effective_to` is ever set; `amount` is never
/// rewritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceComponent {
    pub component_type: PriceComponentType,
    pub amount: Decimal,
    pub effective_from: DateTime<Utc>,
    /// `None` means still active.
    pub effective_to: Option<DateTime<Utc>>,
    /// `None` means default price; `Some` is an override for that client.
    pub client_id: Option<ClientId>,
}

impl PriceComponent {
    /// A new open-ended component starting at `effective_from`.
    pub fn open(
        scope: PriceScope,
        amount: Decimal,
        effective_from: DateTime<Utc>,
    ) -> Self {
        Self {
            component_type: scope.component_type,
            amount,
            effective_from,
            effective_to: None,
            client_id: scope.client_id,
        }
    }

    pub fn scope(&self) -> PriceScope {
        PriceScope::new(self.component_type, self.client_id)
    }

    pub fn is_open(&self) -> bool {
        self.effective_to.is_none()
    }

    pub fn is_override(&self) -> bool {
        self.client_id.is_some()
    }

    /// Whether `at` falls inside `[effective_from, effective_to)`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.is_none_or(|to| to > at)
    }
}
