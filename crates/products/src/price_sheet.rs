//! Price sheet import/export.
//!
//! A price sheet is a CSV table with one row per product and one column per
//! price component type:
//!
//! ```text
//! Product ID,Product Name,Description,PURCHASE_PRICE,TRANSPORT,...
//! 0190...,Sterile gauze,Box of 100,100.00 DH,20.00 DH,...
//! ```
//!
//! Exported cells hold the amount resolved for the requested client. Imported
//! sheets become per-client price changes via [`PriceSheetRow::into_command`].

use std::collections::BTreeMap;
use std::io;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medarrival_clients::Client;
use medarrival_core::ExpectedVersion;
use medarrival_pricing::PriceComponentType;

use crate::product::{ClientPricingTarget, Product, ProductCommand, ProductId, SetClientPricing};

const PRODUCT_ID_HEADER: &str = "Product ID";
const PRODUCT_NAME_HEADER: &str = "Product Name";
const DESCRIPTION_HEADER: &str = "Description";

/// Formatting options shared by import and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSheetConfig {
    /// Appended to every exported amount and stripped on import.
    pub currency_suffix: String,
    pub delimiter: u8,
}

impl Default for PriceSheetConfig {
    fn default() -> Self {
        Self {
            currency_suffix: "DH".to_string(),
            delimiter: b',',
        }
    }
}

impl PriceSheetConfig {
    /// Read `MEDARRIVAL_CURRENCY_SUFFIX` and `MEDARRIVAL_SHEET_DELIMITER`,
    /// falling back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(suffix) = std::env::var("MEDARRIVAL_CURRENCY_SUFFIX") {
            config.currency_suffix = suffix.trim().to_string();
        }

        if let Ok(raw) = std::env::var("MEDARRIVAL_SHEET_DELIMITER") {
            match parse_delimiter(&raw) {
                Some(delimiter) => config.delimiter = delimiter,
                None => tracing::warn!(
                    "MEDARRIVAL_SHEET_DELIMITER={:?} is not a single ASCII character; using ','",
                    raw
                ),
            }
        }

        config
    }
}

fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw {
        "\\t" | "tab" | "\t" => Some(b'\t'),
        _ => match raw.trim().as_bytes() {
            [byte] if byte.is_ascii() => Some(*byte),
            _ => None,
        },
    }
}

#[derive(Debug, Error)]
pub enum PriceSheetError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("price sheet is missing the {0:?} column")]
    MissingHeader(&'static str),
}

/// Prices read for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSheetRow {
    pub product_id: ProductId,
    pub prices: BTreeMap<PriceComponentType, Decimal>,
}

impl PriceSheetRow {
    /// Turn the row into a bulk client pricing change.
    pub fn into_command(
        self,
        client: ClientPricingTarget,
        expected_version: ExpectedVersion,
        occurred_at: DateTime<Utc>,
    ) -> ProductCommand {
        ProductCommand::SetClientPricing(SetClientPricing {
            product_id: self.product_id,
            client,
            prices: self.prices,
            expected_version,
            occurred_at,
        })
    }
}

/// A cell or row that was left out of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetIssue {
    /// 1-based line in the source file.
    pub line: u64,
    pub column: Option<String>,
    pub message: String,
}

/// Result of reading a sheet: usable rows plus everything skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSheetImport {
    pub rows: Vec<PriceSheetRow>,
    pub skipped: Vec<SheetIssue>,
}

impl PriceSheetImport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Write one row per product with the amounts in effect for `client` at `at`.
///
/// `None` (or an RP client) exports the default prices.
pub fn export_price_sheet<'a, W, I>(
    products: I,
    client: Option<&Client>,
    at: DateTime<Utc>,
    config: &PriceSheetConfig,
    writer: W,
) -> Result<(), PriceSheetError>
where
    W: io::Write,
    I: IntoIterator<Item = &'a Product>,
{
    let mut out = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .from_writer(writer);

    let mut header = vec![PRODUCT_ID_HEADER, PRODUCT_NAME_HEADER, DESCRIPTION_HEADER];
    header.extend(PriceComponentType::ALL.iter().map(|t| t.as_str()));
    out.write_record(&header)?;

    let mut exported = 0usize;
    for product in products {
        let view = product.breakdown(client, at);
        let mut record = vec![
            product.id_typed().to_string(),
            product.name().to_string(),
            product.description().unwrap_or_default().to_string(),
        ];
        record.extend(
            PriceComponentType::ALL
                .iter()
                .map(|&t| format_amount(view.amount(t), &config.currency_suffix)),
        );
        out.write_record(&record)?;
        exported += 1;
    }

    out.flush()?;
    tracing::debug!("exported price sheet with {} products", exported);
    Ok(())
}

/// Parse a price sheet.
///
/// Only a missing `Product ID` column or an unreadable file is an error.
/// Bad ids, bad or negative amounts and rows without prices are reported in
/// [`PriceSheetImport::skipped`]; empty cells are ignored.
pub fn read_price_sheet<R: io::Read>(
    reader: R,
    config: &PriceSheetConfig,
) -> Result<PriceSheetImport, PriceSheetError> {
    let mut input = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = input.headers()?.clone();
    let id_column = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(PRODUCT_ID_HEADER))
        .ok_or(PriceSheetError::MissingHeader(PRODUCT_ID_HEADER))?;

    // Unrecognized columns (name, description, notes...) are ignored.
    let price_columns: Vec<(usize, PriceComponentType)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| PriceComponentType::from_str(h).ok().map(|t| (idx, t)))
        .collect();

    let mut import = PriceSheetImport::default();

    for record in input.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let raw_id = record.get(id_column).unwrap_or_default();
        let product_id = match ProductId::from_str(raw_id) {
            Ok(id) => id,
            Err(err) => {
                import.skipped.push(SheetIssue {
                    line,
                    column: Some(PRODUCT_ID_HEADER.to_string()),
                    message: err.to_string(),
                });
                continue;
            }
        };

        let mut prices = BTreeMap::new();
        for &(idx, component_type) in &price_columns {
            let raw = record.get(idx).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            match parse_amount(raw, &config.currency_suffix) {
                Some(amount) if amount >= Decimal::ZERO => {
                    prices.insert(component_type, amount);
                }
                Some(amount) => import.skipped.push(SheetIssue {
                    line,
                    column: Some(component_type.to_string()),
                    message: format!("negative amount {amount}"),
                }),
                None => import.skipped.push(SheetIssue {
                    line,
                    column: Some(component_type.to_string()),
                    message: format!("not an amount: {raw:?}"),
                }),
            }
        }

        if prices.is_empty() {
            import.skipped.push(SheetIssue {
                line,
                column: None,
                message: format!("no prices for product {product_id}"),
            });
            continue;
        }

        import.rows.push(PriceSheetRow { product_id, prices });
    }

    if !import.is_clean() {
        tracing::warn!(
            "price sheet import skipped {} entries ({} rows kept)",
            import.skipped.len(),
            import.rows.len()
        );
    }

    Ok(import)
}

/// `1234.5` -> `"1234.50 DH"`.
pub fn format_amount(amount: Decimal, currency_suffix: &str) -> String {
    let amount = amount.round_dp(2);
    if currency_suffix.is_empty() {
        format!("{amount:.2}")
    } else {
        format!("{amount:.2} {currency_suffix}")
    }
}

/// Accepts plain decimals, thousands separators and a trailing currency
/// suffix: `"1,234.50 DH"`, `"1234.5"`, `"20 dh"`.
///
/// A comma must separate groups of exactly three digits in the integer
/// part, so decimal-comma cells like `"10,5"` are rejected.
pub fn parse_amount(raw: &str, currency_suffix: &str) -> Option<Decimal> {
    let mut value = raw.trim();
    if !currency_suffix.is_empty() {
        let idx = value.len().saturating_sub(currency_suffix.len());
        if let (Some(head), Some(tail)) = (value.get(..idx), value.get(idx..)) {
            if tail.eq_ignore_ascii_case(currency_suffix) {
                value = head.trim_end();
            }
        }
    }

    let compact: String = value.chars().filter(|&c| c != ' ').collect();
    let (integer, fraction) = match compact.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (compact.as_str(), None),
    };
    if fraction.is_some_and(|f| f.contains(',')) {
        return None;
    }

    let integer = strip_thousands_separators(integer)?;
    let cleaned = match fraction {
        Some(fraction) => format!("{integer}.{fraction}"),
        None => integer,
    };
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

fn strip_thousands_separators(integer: &str) -> Option<String> {
    let mut groups = integer.split(',');
    let first = groups.next().unwrap_or_default();
    let rest: Vec<&str> = groups.collect();
    if rest.is_empty() {
        return Some(first.to_string());
    }

    let lead_digits = first.trim_start_matches(['-', '+']);
    let lead_ok = (1..=3).contains(&lead_digits.len())
        && lead_digits.bytes().all(|b| b.is_ascii_digit());
    let groups_ok = rest
        .iter()
        .all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()));
    if !(lead_ok && groups_ok) {
        return None;
    }

    let mut out = first.to_string();
    rest.iter().for_each(|g| out.push_str(g));
    Some(out)
}
