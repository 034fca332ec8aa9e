use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medarrival_clients::Client;
use medarrival_core::{Aggregate, AggregateId, AggregateRoot, ClientId, DomainError};
use medarrival_events::Event;
use medarrival_pricing::{PriceComponentType, ResolvedPrice};
use medarrival_products::{Product, ProductId};

/// Sale identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Prices in effect for a sale's client when the sale was recorded.
///
/// Each line keeps its [`PriceSource`](medarrival_pricing::PriceSource), so
/// reports can tell overridden prices from defaults without a stored flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePricing {
    pub product_id: ProductId,
    pub client_id: ClientId,
    pub as_of: DateTime<Utc>,
    pub lines: Vec<ResolvedPrice>,
}

impl SalePricing {
    /// Snapshot the prices `client` pays for `product` at `at`.
    pub fn quote(product: &Product, client: &Client, at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id_typed(),
            client_id: client.id_typed(),
            as_of: at,
            lines: product.breakdown(Some(client), at).lines,
        }
    }

    pub fn amount(&self, component_type: PriceComponentType) -> Decimal {
        self.lines
            .iter()
            .find(|line| line.component_type == component_type)
            .map(|line| line.amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn purchase_price(&self) -> Decimal {
        self.amount(PriceComponentType::PurchasePrice)
    }

    /// Sum of every component: what one unit costs to deliver.
    pub fn unit_cost(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }

    /// Amount billed: purchase price times quantity.
    pub fn total_for(&self, quantity: i64) -> Decimal {
        self.purchase_price() * Decimal::from(quantity)
    }

    pub fn has_overrides(&self) -> bool {
        self.lines.iter().any(ResolvedPrice::is_override)
    }
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    product_id: Option<ProductId>,
    client_id: Option<ClientId>,
    quantity: i64,
    expected_quantity: i64,
    pricing: Option<SalePricing>,
    total_amount: Decimal,
    sold_at: Option<DateTime<Utc>>,
    expected_delivery_date: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    /// `None` until the delivery has been inspected.
    conform: Option<bool>,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            product_id: None,
            client_id: None,
            quantity: 0,
            expected_quantity: 0,
            pricing: None,
            total_amount: Decimal::ZERO,
            sold_at: None,
            expected_delivery_date: None,
            delivered_at: None,
            conform: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn pricing(&self) -> Option<&SalePricing> {
        self.pricing.as_ref()
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn sold_at(&self) -> Option<DateTime<Utc>> {
        self.sold_at
    }

    /// Quantity the client is forecast to take.
    pub fn expected_quantity(&self) -> i64 {
        self.expected_quantity
    }

    /// Forecast billing: purchase price times expected quantity.
    pub fn expected_total(&self) -> Decimal {
        self.pricing
            .as_ref()
            .map(|pricing| pricing.total_for(self.expected_quantity))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn expected_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.expected_delivery_date
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    /// Outcome of the delivery inspection, if one was recorded.
    pub fn is_conform(&self) -> Option<bool> {
        self.conform
    }

    /// Not yet delivered and past the expected delivery date.
    pub fn is_overdue(&self, at: DateTime<Utc>) -> bool {
        !self.is_delivered() && self.expected_delivery_date.is_some_and(|due| at > due)
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale.
///
/// `pricing` is produced by [`SalePricing::quote`] against the current
/// product and client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub sale_id: SaleId,
    pub quantity: i64,
    pub expected_quantity: i64,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub pricing: SalePricing,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeQuantity {
    pub sale_id: SaleId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDelivery (goods received and inspected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub sale_id: SaleId,
    pub conform: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    ChangeQuantity(ChangeQuantity),
    RecordDelivery(RecordDelivery),
}

/// Event: SaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub sale_id: SaleId,
    pub quantity: i64,
    pub expected_quantity: i64,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub pricing: SalePricing,
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleQuantityChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleQuantityChanged {
    pub sale_id: SaleId,
    pub quantity: i64,
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleDeliveryRecorded.
///
/// A later inspection replaces the conformity verdict but keeps the first
/// delivery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDeliveryRecorded {
    pub sale_id: SaleId,
    pub conform: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleQuantityChanged(SaleQuantityChanged),
    SaleDeliveryRecorded(SaleDeliveryRecorded),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::SaleQuantityChanged(_) => "sales.sale.quantity_changed",
            SaleEvent::SaleDeliveryRecorded(_) => "sales.sale.delivery_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::SaleQuantityChanged(e) => e.occurred_at,
            SaleEvent::SaleDeliveryRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.product_id = Some(e.pricing.product_id);
                self.client_id = Some(e.pricing.client_id);
                self.quantity = e.quantity;
                self.expected_quantity = e.expected_quantity;
                self.total_amount = e.total_amount;
                self.sold_at = Some(e.occurred_at);
                self.expected_delivery_date = e.expected_delivery_date;
                self.pricing = Some(e.pricing.clone());
                self.created = true;
            }
            SaleEvent::SaleQuantityChanged(e) => {
                self.quantity = e.quantity;
                self.total_amount = e.total_amount;
            }
            SaleEvent::SaleDeliveryRecorded(e) => {
                self.delivered_at.get_or_insert(e.occurred_at);
                self.conform = Some(e.conform);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::ChangeQuantity(cmd) => self.handle_change_quantity(cmd),
            SaleCommand::RecordDelivery(cmd) => self.handle_record_delivery(cmd),
        }
    }
}

impl Sale {
    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive_quantity(quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }
        self.ensure_sale_id(cmd.sale_id)?;
        Self::ensure_positive_quantity(cmd.quantity)?;
        if cmd.expected_quantity <= 0 {
            return Err(DomainError::validation("expected quantity must be positive"));
        }
        if cmd.expected_delivery_date.is_some_and(|due| due < cmd.occurred_at) {
            return Err(DomainError::validation(
                "expected delivery date cannot precede the sale date",
            ));
        }

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            sale_id: cmd.sale_id,
            quantity: cmd.quantity,
            expected_quantity: cmd.expected_quantity,
            expected_delivery_date: cmd.expected_delivery_date,
            pricing: cmd.pricing.clone(),
            total_amount: cmd.pricing.total_for(cmd.quantity),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_quantity(
        &self,
        cmd: &ChangeQuantity,
    ) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_sale_id(cmd.sale_id)?;
        Self::ensure_positive_quantity(cmd.quantity)?;

        let pricing = self
            .pricing
            .as_ref()
            .ok_or_else(|| DomainError::invariant("recorded sale has no pricing snapshot"))?;

        Ok(vec![SaleEvent::SaleQuantityChanged(SaleQuantityChanged {
            sale_id: cmd.sale_id,
            quantity: cmd.quantity,
            total_amount: pricing.total_for(cmd.quantity),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_delivery(
        &self,
        cmd: &RecordDelivery,
    ) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_sale_id(cmd.sale_id)?;

        if self.sold_at.is_some_and(|sold_at| cmd.occurred_at < sold_at) {
            return Err(DomainError::validation(
                "delivery cannot be recorded before the sale",
            ));
        }

        Ok(vec![SaleEvent::SaleDeliveryRecorded(SaleDeliveryRecorded {
            sale_id: cmd.sale_id,
            conform: cmd.conform,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use medarrival_clients::{ClientCommand, ClientKind, CreateClient};
    use medarrival_core::ExpectedVersion;
    use medarrival_pricing::PriceSource;
    use medarrival_products::{ClientPricingTarget, CreateProduct, ProductCommand, SetPrice};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 10, 14, 0, 0).unwrap()
    }

    fn test_sale_id() -> SaleId {
        SaleId::new(AggregateId::new())
    }

    fn client(kind: ClientKind) -> Client {
        let client_id = ClientId::new();
        let mut client = Client::empty(client_id);
        let events = client
            .handle(&ClientCommand::CreateClient(CreateClient {
                client_id,
                name: "Clinique Atlas".to_string(),
                address: None,
                kind,
                occurred_at: t0(),
            }))
            .unwrap();
        client.apply(&events[0]);
        client
    }

    fn run(product: &mut Product, command: ProductCommand) {
        for event in product.handle(&command).unwrap() {
            product.apply(&event);
        }
    }

    /// Purchase 100, transport 20, customs 5 by default.
    fn product() -> Product {
        let product_id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(product_id);
        let initial_prices = BTreeMap::from([
            (PriceComponentType::PurchasePrice, dec!(100)),
            (PriceComponentType::Transport, dec!(20)),
            (PriceComponentType::Customs, dec!(5)),
        ]);
        run(
            &mut product,
            ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: "Catheter 18G".to_string(),
                description: None,
                category_id: None,
                initial_prices,
                occurred_at: t0(),
            }),
        );
        product
    }

    fn record(sale_id: SaleId, quantity: i64, pricing: SalePricing) -> SaleCommand {
        SaleCommand::RecordSale(RecordSale {
            sale_id,
            quantity,
            expected_quantity: quantity,
            expected_delivery_date: Some(t0() + Duration::days(7)),
            pricing,
            occurred_at: t0() + Duration::hours(1),
        })
    }

    fn recorded_sale(quantity: i64, pricing: SalePricing) -> Sale {
        let sale_id = test_sale_id();
        let mut sale = Sale::empty(sale_id);
        let events = sale.handle(&record(sale_id, quantity, pricing)).unwrap();
        sale.apply(&events[0]);
        sale
    }

    #[test]
    fn quote_uses_client_overrides() {
        let mut product = product();
        let marcher = client(ClientKind::Marcher);
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::SetPrice(SetPrice {
                product_id,
                component_type: PriceComponentType::PurchasePrice,
                client: Some(ClientPricingTarget::from(&marcher)),
                amount: dec!(80),
                expected_version: ExpectedVersion::Any,
                occurred_at: t0(),
            }),
        );

        let pricing = SalePricing::quote(&product, &marcher, t0() + Duration::minutes(1));

        assert_eq!(pricing.purchase_price(), dec!(80));
        assert_eq!(pricing.unit_cost(), dec!(105));
        assert!(pricing.has_overrides());
        assert_eq!(pricing.lines[0].source, PriceSource::Override);
        assert_eq!(pricing.lines[1].source, PriceSource::Default);
    }

    #[test]
    fn rp_client_quote_uses_default_prices() {
        let product = product();
        let rp = client(ClientKind::Rp);

        let pricing = SalePricing::quote(&product, &rp, t0());
        assert_eq!(pricing.purchase_price(), dec!(100));
        assert!(!pricing.has_overrides());
    }

    #[test]
    fn record_sale_totals_purchase_price_times_quantity() {
        let product = product();
        let rp = client(ClientKind::Rp);
        let pricing = SalePricing::quote(&product, &rp, t0());
        let sale_id = test_sale_id();
        let sale = Sale::empty(sale_id);

        let events = sale.handle(&record(sale_id, 3, pricing.clone())).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            SaleEvent::SaleRecorded(e) => {
                assert_eq!(e.sale_id, sale_id);
                assert_eq!(e.total_amount, dec!(300));
                assert_eq!(e.pricing, pricing);
            }
            _ => panic!("Expected SaleRecorded event"),
        }
    }

    #[test]
    fn record_sale_rejects_non_positive_quantity() {
        let product = product();
        let pricing = SalePricing::quote(&product, &client(ClientKind::Rp), t0());
        let sale_id = test_sale_id();

        for quantity in [0, -2] {
            let err = Sale::empty(sale_id)
                .handle(&record(sale_id, quantity, pricing.clone()))
                .unwrap_err();
            match err {
                DomainError::Validation(msg) => assert!(msg.contains("quantity")),
                _ => panic!("Expected Validation error for quantity {quantity}"),
            }
        }
    }

    #[test]
    fn record_sale_twice_is_a_conflict() {
        let pricing = SalePricing::quote(&product(), &client(ClientKind::Rp), t0());
        let sale = recorded_sale(1, pricing.clone());

        let err = sale.handle(&record(sale.id_typed(), 1, pricing)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn change_quantity_reprices_from_snapshot_not_current_prices() {
        let mut product = product();
        let rp = client(ClientKind::Rp);
        let mut sale = recorded_sale(2, SalePricing::quote(&product, &rp, t0()));
        assert_eq!(sale.total_amount(), dec!(200));

        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::SetPrice(SetPrice {
                product_id,
                component_type: PriceComponentType::PurchasePrice,
                client: None,
                amount: dec!(150),
                expected_version: ExpectedVersion::Any,
                occurred_at: t0() + Duration::days(1),
            }),
        );

        let events = sale
            .handle(&SaleCommand::ChangeQuantity(ChangeQuantity {
                sale_id: sale.id_typed(),
                quantity: 5,
                occurred_at: t0() + Duration::days(2),
            }))
            .unwrap();
        sale.apply(&events[0]);

        assert_eq!(sale.quantity(), 5);
        assert_eq!(sale.total_amount(), dec!(500));
        assert_eq!(sale.version(), 2);
    }

    fn deliver(sale: &Sale, conform: bool, occurred_at: DateTime<Utc>) -> SaleCommand {
        SaleCommand::RecordDelivery(RecordDelivery {
            sale_id: sale.id_typed(),
            conform,
            occurred_at,
        })
    }

    #[test]
    fn recorded_sale_tracks_forecast_and_awaits_delivery() {
        let pricing = SalePricing::quote(&product(), &client(ClientKind::Rp), t0());
        let sale_id = test_sale_id();
        let mut sale = Sale::empty(sale_id);
        let events = sale
            .handle(&SaleCommand::RecordSale(RecordSale {
                sale_id,
                quantity: 4,
                expected_quantity: 6,
                expected_delivery_date: Some(t0() + Duration::days(3)),
                pricing,
                occurred_at: t0(),
            }))
            .unwrap();
        sale.apply(&events[0]);

        assert_eq!(sale.expected_quantity(), 6);
        assert_eq!(sale.total_amount(), dec!(400));
        assert_eq!(sale.expected_total(), dec!(600));
        assert!(!sale.is_delivered());
        assert_eq!(sale.is_conform(), None);
        assert!(!sale.is_overdue(t0() + Duration::days(3)));
        assert!(sale.is_overdue(t0() + Duration::days(4)));
    }

    #[test]
    fn record_sale_validates_forecast_fields() {
        let pricing = SalePricing::quote(&product(), &client(ClientKind::Rp), t0());
        let sale_id = test_sale_id();
        let base = RecordSale {
            sale_id,
            quantity: 1,
            expected_quantity: 1,
            expected_delivery_date: None,
            pricing,
            occurred_at: t0(),
        };

        let zero_expected = RecordSale {
            expected_quantity: 0,
            ..base.clone()
        };
        let due_before_sale = RecordSale {
            expected_delivery_date: Some(t0() - Duration::days(1)),
            ..base.clone()
        };

        for cmd in [zero_expected, due_before_sale] {
            let err = Sale::empty(sale_id)
                .handle(&SaleCommand::RecordSale(cmd))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
        assert!(Sale::empty(sale_id).handle(&SaleCommand::RecordSale(base)).is_ok());
    }

    #[test]
    fn delivery_records_conformity_and_reinspection_keeps_first_arrival() {
        let pricing = SalePricing::quote(&product(), &client(ClientKind::Rp), t0());
        let mut sale = recorded_sale(2, pricing);
        let first_arrival = t0() + Duration::days(2);

        let events = sale.handle(&deliver(&sale, false, first_arrival)).unwrap();
        assert_eq!(events[0].event_type(), "sales.sale.delivery_recorded");
        sale.apply(&events[0]);
        assert_eq!(sale.is_conform(), Some(false));
        assert_eq!(sale.delivered_at(), Some(first_arrival));

        let events = sale.handle(&deliver(&sale, true, first_arrival + Duration::days(1))).unwrap();
        sale.apply(&events[0]);
        assert_eq!(sale.is_conform(), Some(true));
        assert_eq!(sale.delivered_at(), Some(first_arrival));
        assert!(!sale.is_overdue(t0() + Duration::days(30)));
    }

    #[test]
    fn delivery_before_sale_is_rejected() {
        let pricing = SalePricing::quote(&product(), &client(ClientKind::Rp), t0());
        let sale = recorded_sale(1, pricing);

        let err = sale.handle(&deliver(&sale, true, t0())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let unknown = Sale::empty(test_sale_id());
        let err = unknown.handle(&deliver(&unknown, true, t0())).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn change_quantity_on_unknown_sale_is_not_found() {
        let sale_id = test_sale_id();
        let err = Sale::empty(sale_id)
            .handle(&SaleCommand::ChangeQuantity(ChangeQuantity {
                sale_id,
                quantity: 1,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn sale_recorded_event_serializes_with_price_sources() {
        let pricing = SalePricing::quote(&product(), &client(ClientKind::Rp), t0());
        let sale_id = test_sale_id();
        let events = Sale::empty(sale_id).handle(&record(sale_id, 1, pricing)).unwrap();

        assert_eq!(events[0].event_type(), "sales.sale.recorded");
        let json = serde_json::to_value(&events[0]).unwrap();
        let first_line = &json["SaleRecorded"]["pricing"]["lines"][0];
        assert_eq!(first_line["component_type"], "PURCHASE_PRICE");
        assert_eq!(first_line["source"], "default");
        assert_eq!(json["SaleRecorded"]["total_amount"], 100.0);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: total is always purchase price times quantity.
            #[test]
            fn total_tracks_quantity(purchase_cents in 0i64..10_000_000, q1 in 1i64..10_000, q2 in 1i64..10_000) {
                let rp = client(ClientKind::Rp);
                let mut product = product();
                let product_id = product.id_typed();
                run(
                    &mut product,
                    ProductCommand::SetPrice(SetPrice {
                        product_id,
                        component_type: PriceComponentType::PurchasePrice,
                        client: None,
                        amount: Decimal::new(purchase_cents, 2),
                        expected_version: ExpectedVersion::Any,
                        occurred_at: t0(),
                    }),
                );

                let mut sale = recorded_sale(q1, SalePricing::quote(&product, &rp, t0()));
                prop_assert_eq!(sale.total_amount(), Decimal::new(purchase_cents, 2) * Decimal::from(q1));

                let events = sale
                    .handle(&SaleCommand::ChangeQuantity(ChangeQuantity {
                        sale_id: sale.id_typed(),
                        quantity: q2,
                        occurred_at: t0(),
                    }))
                    .unwrap();
                sale.apply(&events[0]);
                prop_assert_eq!(sale.total_amount(), Decimal::new(purchase_cents, 2) * Decimal::from(q2));
            }
        }
    }
}
