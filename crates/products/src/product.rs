use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medarrival_clients::{Client, ClientKind};
use medarrival_core::{
    Aggregate, AggregateId, AggregateRoot, ClientId, DomainError, ExpectedVersion,
};
use medarrival_events::Event;
use medarrival_pricing::{self as ledger, PriceBreakdown, PriceComponent, PriceComponentType};

use crate::category::CategoryId;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// The client a price override is recorded for.
///
/// Carries the client's kind as seen by the caller when the command was
/// issued; only marcher clients may hold overrides.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPricingTarget {
    pub client_id: ClientId,
    pub kind: ClientKind,
}

impl From<&Client> for ClientPricingTarget {
    fn from(client: &Client) -> Self {
        Self {
            client_id: client.id_typed(),
            kind: client.kind(),
        }
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    description: Option<String>,
    category_id: Option<CategoryId>,
    /// Every price component ever recorded: all types, all clients, all ranges.
    price_history: Vec<PriceComponent>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            category_id: None,
            price_history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    pub fn price_components(&self) -> &[PriceComponent] {
        &self.price_history
    }

    /// Amount in effect for `client` (or the default scope when `None`).
    ///
    /// RP clients always get the default amount.
    pub fn active_amount(
        &self,
        component_type: PriceComponentType,
        client: Option<&Client>,
        at: DateTime<Utc>,
    ) -> Decimal {
        ledger::get_active_amount(&self.price_history, component_type, pricing_scope(client), at)
    }

    pub fn total_cost(&self, client: Option<&Client>, at: DateTime<Utc>) -> Decimal {
        ledger::get_total_cost(&self.price_history, pricing_scope(client), at)
    }

    pub fn breakdown(&self, client: Option<&Client>, at: DateTime<Utc>) -> PriceBreakdown {
        ledger::breakdown(&self.price_history, pricing_scope(client), at)
    }

    /// Audit trail of one exact scope, most recent first.
    pub fn price_history(
        &self,
        component_type: PriceComponentType,
        client_id: Option<ClientId>,
    ) -> impl ExactSizeIterator<Item = &PriceComponent> + Clone + '_ {
        ledger::get_history(&self.price_history, component_type, client_id)
    }
}

fn pricing_scope(client: Option<&Client>) -> Option<ClientId> {
    client.and_then(Client::pricing_scope)
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    /// Default-scope prices effective from `occurred_at`.
    pub initial_prices: BTreeMap<PriceComponentType, Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new description (if None, keep existing).
    pub description: Option<String>,
    /// Optional new category (if None, keep existing).
    pub category_id: Option<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPrice (one component, default scope or one client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPrice {
    pub product_id: ProductId,
    pub component_type: PriceComponentType,
    /// `None` sets the default price.
    pub client: Option<ClientPricingTarget>,
    pub amount: Decimal,
    pub expected_version: ExpectedVersion,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetClientPricing (several overrides for one client at once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetClientPricing {
    pub product_id: ProductId,
    pub client: ClientPricingTarget,
    pub prices: BTreeMap<PriceComponentType, Decimal>,
    pub expected_version: ExpectedVersion,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevertClientPricing (drop every active override of a client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertClientPricing {
    pub product_id: ProductId,
    pub client_id: ClientId,
    pub expected_version: ExpectedVersion,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
    SetPrice(SetPrice),
    SetClientPricing(SetClientPricing),
    RevertClientPricing(RevertClientPricing),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PriceSet.
///
/// Supersedes the scope's active row at `occurred_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSet {
    pub product_id: ProductId,
    pub component_type: PriceComponentType,
    pub client_id: Option<ClientId>,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientPricingReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPricingReverted {
    pub product_id: ProductId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
    PriceSet(PriceSet),
    ClientPricingReverted(ClientPricingReverted),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "products.product.details_updated",
            ProductEvent::PriceSet(_) => "products.product.price_set",
            ProductEvent::ClientPricingReverted(_) => "products.product.client_pricing_reverted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
            ProductEvent::PriceSet(e) => e.occurred_at,
            ProductEvent::ClientPricingReverted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category_id = e.category_id;
                self.price_history.clear();
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category_id = e.category_id;
            }
            ProductEvent::PriceSet(e) => {
                // Amounts are validated in `handle`; a bad stored event is skipped.
                if let Err(err) = ledger::set_amount(
                    &mut self.price_history,
                    e.component_type,
                    e.client_id,
                    e.amount,
                    e.occurred_at,
                ) {
                    tracing::error!("failed to apply price change to product {}: {err}", e.product_id);
                }
            }
            ProductEvent::ClientPricingReverted(e) => {
                ledger::revert_to_default(&mut self.price_history, e.client_id, e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update(cmd),
            ProductCommand::SetPrice(cmd) => self.handle_set_price(cmd),
            ProductCommand::SetClientPricing(cmd) => self.handle_set_client_pricing(cmd),
            ProductCommand::RevertClientPricing(cmd) => self.handle_revert(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(product_id)
    }

    fn ensure_custom_pricing_allowed(target: &ClientPricingTarget) -> Result<(), DomainError> {
        if target.kind != ClientKind::Marcher {
            return Err(DomainError::invariant(
                "only marcher clients can have custom pricing",
            ));
        }
        Ok(())
    }

    /// A price change may not be dated before the scope's last recorded
    /// boundary: the latest `effective_from` or `effective_to` of any row.
    ///
    /// Closed rows are never reopened or shortened.
    fn ensure_not_backdated(
        &self,
        component_type: PriceComponentType,
        client_id: Option<ClientId>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let last_change = self
            .price_history(component_type, client_id)
            .map(|row| row.effective_to.unwrap_or(row.effective_from))
            .max();
        if let Some(last_change) = last_change {
            if at < last_change {
                return Err(DomainError::validation(format!(
                    "{component_type} change at {at} predates the last recorded change at {last_change}"
                )));
            }
        }
        Ok(())
    }

    fn price_set(
        &self,
        component_type: PriceComponentType,
        client_id: Option<ClientId>,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> ProductEvent {
        ProductEvent::PriceSet(PriceSet {
            product_id: self.id,
            component_type,
            client_id,
            amount,
            occurred_at,
        })
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        for (&component_type, &amount) in &cmd.initial_prices {
            ledger::validate_amount(component_type, amount)?;
        }

        let mut events = vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            category_id: cmd.category_id,
            occurred_at: cmd.occurred_at,
        })];
        events.extend(
            cmd.initial_prices
                .iter()
                .map(|(&t, &amount)| self.price_set(t, None, amount, cmd.occurred_at)),
        );
        Ok(events)
    }

    fn handle_update(&self, cmd: &UpdateProductDetails) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.product_id)?;

        let name = cmd
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.name)
            .to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            product_id: cmd.product_id,
            name,
            description: cmd.description.clone().or_else(|| self.description.clone()),
            category_id: cmd.category_id.or(self.category_id),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_price(&self, cmd: &SetPrice) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.product_id)?;
        cmd.expected_version.check(self.version)?;

        if let Some(target) = &cmd.client {
            Self::ensure_custom_pricing_allowed(target)?;
        }
        let client_id = cmd.client.map(|target| target.client_id);

        ledger::validate_amount(cmd.component_type, cmd.amount)?;
        self.ensure_not_backdated(cmd.component_type, client_id, cmd.occurred_at)?;

        Ok(vec![self.price_set(
            cmd.component_type,
            client_id,
            cmd.amount,
            cmd.occurred_at,
        )])
    }

    fn handle_set_client_pricing(
        &self,
        cmd: &SetClientPricing,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.product_id)?;
        cmd.expected_version.check(self.version)?;
        Self::ensure_custom_pricing_allowed(&cmd.client)?;

        if cmd.prices.is_empty() {
            return Err(DomainError::validation("no prices given"));
        }

        let client_id = Some(cmd.client.client_id);
        for (&component_type, &amount) in &cmd.prices {
            ledger::validate_amount(component_type, amount)?;
            self.ensure_not_backdated(component_type, client_id, cmd.occurred_at)?;
        }

        Ok(cmd
            .prices
            .iter()
            .map(|(&t, &amount)| self.price_set(t, client_id, amount, cmd.occurred_at))
            .collect())
    }

    fn handle_revert(&self, cmd: &RevertClientPricing) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.product_id)?;
        cmd.expected_version.check(self.version)?;
        for component_type in PriceComponentType::ALL {
            self.ensure_not_backdated(component_type, Some(cmd.client_id), cmd.occurred_at)?;
        }

        let has_active_override = PriceComponentType::ALL.into_iter().any(|t| {
            ledger::has_override(&self.price_history, t, cmd.client_id, cmd.occurred_at)
        });
        if !has_active_override {
            return Ok(Vec::new());
        }

        Ok(vec![ProductEvent::ClientPricingReverted(ClientPricingReverted {
            product_id: cmd.product_id,
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
