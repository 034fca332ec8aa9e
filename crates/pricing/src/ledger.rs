//! Ledger operations over a caller-owned price component history.
//!
//! Reads are pure functions of `(history, scope, as_of)`. Writes take the
//! history by `&mut` and perform the close-old/open-new pair inside that one
//! borrow, so no reader can observe a scope with zero or two open rows
//! mid-update. When the history lives in a shared store, the persistence
//! collaborator must wrap the persisted rows in a single transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medarrival_core::ClientId;

use crate::component::{PriceComponent, PriceComponentType, PriceScope};
use crate::error::{IntegrityViolation, PricingError};

/// Where a resolved amount came from.
///
/// Derived from which scope produced the active row; never stored alongside
/// the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// A client-scoped row was active.
    Override,
    /// The default-scope row was active.
    Default,
    /// Nothing was active; the amount is zero.
    Unset,
}

/// The amount in effect for one component type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub component_type: PriceComponentType,
    pub amount: Decimal,
    pub source: PriceSource,
}

impl ResolvedPrice {
    pub fn is_override(&self) -> bool {
        self.source == PriceSource::Override
    }
}

/// Every component type resolved for one client (or the default scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub client_id: Option<ClientId>,
    pub as_of: DateTime<Utc>,
    /// One line per [`PriceComponentType::ALL`] member, in that order.
    pub lines: Vec<ResolvedPrice>,
}

impl PriceBreakdown {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }

    pub fn amount(&self, component_type: PriceComponentType) -> Decimal {
        self.line(component_type)
            .map(|line| line.amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn line(&self, component_type: PriceComponentType) -> Option<&ResolvedPrice> {
        self.lines
            .iter()
            .find(|line| line.component_type == component_type)
    }

    pub fn has_overrides(&self) -> bool {
        self.lines.iter().any(ResolvedPrice::is_override)
    }
}

/// Resolve the active amount for a type, with client override precedence.
///
/// A client-scoped row active at `as_of` wins; otherwise the default-scope
/// row; otherwise zero with [`PriceSource::Unset`]. `client == None` only
/// consults the default scope.
///
/// If several rows of the same exact scope are active (an integrity
/// violation), the one with the latest `effective_from` wins, later
/// insertion breaking exact ties. The condition is logged, not raised.
pub fn resolve(
    history: &[PriceComponent],
    component_type: PriceComponentType,
    client: Option<ClientId>,
    as_of: DateTime<Utc>,
) -> ResolvedPrice {
    if let Some(client_id) = client {
        let scope = PriceScope::client(component_type, client_id);
        if let Some(row) = active_in_scope(history, &scope, as_of) {
            return ResolvedPrice {
                component_type,
                amount: row.amount,
                source: PriceSource::Override,
            };
        }
    }

    match active_in_scope(history, &PriceScope::default_for(component_type), as_of) {
        Some(row) => ResolvedPrice {
            component_type,
            amount: row.amount,
            source: PriceSource::Default,
        },
        None => ResolvedPrice {
            component_type,
            amount: Decimal::ZERO,
            source: PriceSource::Unset,
        },
    }
}

/// Amount in effect for `component_type` and `client` at `as_of` (see [`resolve`]).
pub fn get_active_amount(
    history: &[PriceComponent],
    component_type: PriceComponentType,
    client: Option<ClientId>,
    as_of: DateTime<Utc>,
) -> Decimal {
    resolve(history, component_type, client, as_of).amount
}

/// Whether the amount in effect comes from a client override.
pub fn has_override(
    history: &[PriceComponent],
    component_type: PriceComponentType,
    client: ClientId,
    as_of: DateTime<Utc>,
) -> bool {
    resolve(history, component_type, Some(client), as_of).is_override()
}

/// Sum of the active amount of every component type.
pub fn get_total_cost(
    history: &[PriceComponent],
    client: Option<ClientId>,
    as_of: DateTime<Utc>,
) -> Decimal {
    PriceComponentType::ALL
        .into_iter()
        .map(|t| get_active_amount(history, t, client, as_of))
        .sum()
}

pub fn breakdown(
    history: &[PriceComponent],
    client: Option<ClientId>,
    as_of: DateTime<Utc>,
) -> PriceBreakdown {
    PriceBreakdown {
        client_id: client,
        as_of,
        lines: PriceComponentType::ALL
            .into_iter()
            .map(|t| resolve(history, t, client, as_of))
            .collect(),
    }
}

/// Set a new amount for the exact `(component_type, client)` scope.
///
/// Closes the row active at `now` (no fallback to the default scope) and
/// appends an open row `[now, ∞)`. Prior rows are kept with a closed
/// interval. Negative amounts fail before anything is touched.
pub fn set_amount(
    history: &mut Vec<PriceComponent>,
    component_type: PriceComponentType,
    client: Option<ClientId>,
    new_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), PricingError> {
    validate_amount(component_type, new_amount)?;
    supersede(history, PriceScope::new(component_type, client), new_amount, now);
    Ok(())
}

/// Set several amounts for one scope owner at once.
///
/// Every amount is validated before the first write, so either all of them
/// apply or none does.
pub fn set_amounts(
    history: &mut Vec<PriceComponent>,
    client: Option<ClientId>,
    amounts: &BTreeMap<PriceComponentType, Decimal>,
    now: DateTime<Utc>,
) -> Result<(), PricingError> {
    for (&component_type, &amount) in amounts {
        validate_amount(component_type, amount)?;
    }
    for (&component_type, &amount) in amounts {
        supersede(history, PriceScope::new(component_type, client), amount, now);
    }
    Ok(())
}

/// Close every override of `client` active at `now`, without replacement.
///
/// Subsequent reads for that client fall back to the default scope. Returns
/// the number of rows closed; a second call returns 0 and changes nothing.
pub fn revert_to_default(
    history: &mut [PriceComponent],
    client: ClientId,
    now: DateTime<Utc>,
) -> usize {
    let closed: usize = PriceComponentType::ALL
        .into_iter()
        .map(|t| close_scope(history, &PriceScope::client(t, client), now))
        .sum();

    if closed > 0 {
        tracing::debug!("Reverted {} price override(s) for client {} at {}", closed, client, now);
    }
    closed
}

/// Rows of the exact scope, most recent `effective_from` first.
///
/// Exact ties keep the later-inserted row first. The returned iterator is
/// `Clone`, so a consumer can restart it; re-querying an unchanged history
/// yields the same sequence.
pub fn get_history<'a>(
    history: &'a [PriceComponent],
    component_type: PriceComponentType,
    client: Option<ClientId>,
) -> impl ExactSizeIterator<Item = &'a PriceComponent> + Clone + 'a {
    let scope = PriceScope::new(component_type, client);
    let mut rows: Vec<(usize, &PriceComponent)> = history
        .iter()
        .enumerate()
        .filter(|(_, row)| scope.matches(row))
        .collect();
    rows.sort_by(|(ia, a), (ib, b)| {
        b.effective_from
            .cmp(&a.effective_from)
            .then_with(|| ib.cmp(ia))
    });
    rows.into_iter().map(|(_, row)| row)
}

/// Every scope with more than one row active at `as_of`.
pub fn find_integrity_violations(
    history: &[PriceComponent],
    as_of: DateTime<Utc>,
) -> Vec<IntegrityViolation> {
    let mut counts: BTreeMap<PriceScope, usize> = BTreeMap::new();
    for row in history.iter().filter(|row| row.is_active_at(as_of)) {
        *counts.entry(row.scope()).or_default() += 1;
    }

    counts
        .into_iter()
        .filter(|&(_, active_count)| active_count > 1)
        .map(|(scope, active_count)| IntegrityViolation {
            scope,
            active_count,
            as_of,
        })
        .collect()
}

/// Reject negative amounts. Every ledger write goes through this check.
pub fn validate_amount(
    component_type: PriceComponentType,
    amount: Decimal,
) -> Result<(), PricingError> {
    if amount < Decimal::ZERO {
        return Err(PricingError::InvalidAmount {
            component_type,
            amount,
        });
    }
    Ok(())
}

fn supersede(
    history: &mut Vec<PriceComponent>,
    scope: PriceScope,
    amount: Decimal,
    now: DateTime<Utc>,
) {
    let closed = close_scope(history, &scope, now);
    history.push(PriceComponent::open(scope, amount, now));

    tracing::debug!(
        "Set {} to {} (client: {:?}) at {}, closing {} previous row(s)",
        scope.component_type,
        amount,
        scope.client_id,
        now,
        closed
    );
}

/// Close the rows of `scope` that are active at `now`, or still open but
/// not yet started.
///
/// Active rows end at `now`. Open rows starting after `now` are cut to a
/// zero-width interval at their own start so they can never become active
/// next to the replacement.
fn close_scope(history: &mut [PriceComponent], scope: &PriceScope, now: DateTime<Utc>) -> usize {
    let mut closed = 0;
    for row in history.iter_mut().filter(|row| scope.matches(row)) {
        if row.is_active_at(now) {
            row.effective_to = Some(now);
            closed += 1;
        } else if row.is_open() && row.effective_from > now {
            row.effective_to = Some(row.effective_from);
            closed += 1;
        }
    }
    closed
}

fn active_in_scope<'a>(
    history: &'a [PriceComponent],
    scope: &PriceScope,
    as_of: DateTime<Utc>,
) -> Option<&'a PriceComponent> {
    let mut winner: Option<&PriceComponent> = None;
    let mut active_count = 0usize;

    for row in history
        .iter()
        .filter(|row| scope.matches(row) && row.is_active_at(as_of))
    {
        active_count += 1;
        // `>=` so that an exact tie goes to the later insertion.
        if winner.is_none_or(|current| row.effective_from >= current.effective_from) {
            winner = Some(row);
        }
    }

    if active_count > 1 {
        let violation = IntegrityViolation {
            scope: *scope,
            active_count,
            as_of,
        };
        tracing::warn!("{}; using the most recent one", violation);
    }

    winner
}
