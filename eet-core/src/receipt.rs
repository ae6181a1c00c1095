//! Sale records and their wire representation.
pub mod codec;
pub mod codes;
mod schema;
pub mod sign;
pub mod xml;

pub use codes::{BkpCase, SecurityCodes, generate_bkp, generate_bkp_with_case, generate_pkp};
pub use schema::{FieldKind, FieldSpec, IdentifierRule, Section, SCHEMA, parse_request};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while turning a [`SaleRecord`] into a [`ParsedRequest`].
/// Nothing is sent over the wire when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestParsingError {
    #[error("{field} must be set")]
    Missing { field: &'static str },
    #[error("validation failed for {field}: '{value}' given")]
    Invalid { field: &'static str, value: String },
}

impl RequestParsingError {
    pub fn field(&self) -> &'static str {
        match self {
            RequestParsingError::Missing { field } | RequestParsingError::Invalid { field, .. } => {
                field
            }
        }
    }
}

/// A single sale as supplied by the merchant.
///
/// Money fields are integers in hundredths of CZK. Fields left as `None`
/// are either defaulted (message UUID, send time, flags, regime) or
/// reported as missing when required.
///
/// # Examples
/// ```rust
/// use chrono::DateTime;
/// use eet_core::receipt::{SaleRecord, parse_request};
///
/// let sold_at = DateTime::parse_from_rfc3339("2016-08-05T00:30:12+02:00")?;
/// let record = SaleRecord::new("CZ1212121218", 273, "/5546/RO24", "0/6460/ZQ42", sold_at, 3411300);
/// let request = parse_request(&record)?;
/// assert_eq!(request.data().get("celk_trzba"), Some("34113.00"));
/// assert_eq!(request.data().get("dat_trzby"), Some("2016-08-04T22:30:12Z"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleRecord {
    #[serde(alias = "uuidZpravy")]
    pub message_uuid: Option<Uuid>,
    #[serde(alias = "datOdesl")]
    pub sent_at: Option<DateTime<FixedOffset>>,
    #[serde(alias = "prvniZaslani")]
    pub first_submission: Option<bool>,
    #[serde(alias = "overeni")]
    pub verification_mode: Option<bool>,
    #[serde(alias = "dicPopl")]
    pub tax_id: Option<String>,
    #[serde(alias = "dicPoverujiciho")]
    pub delegating_tax_id: Option<String>,
    #[serde(alias = "idProvoz")]
    pub premises_id: Option<i64>,
    #[serde(alias = "idPokl")]
    pub till_id: Option<String>,
    #[serde(alias = "poradCis")]
    pub serial: Option<String>,
    #[serde(alias = "datTrzby")]
    pub sold_at: Option<DateTime<FixedOffset>>,
    #[serde(alias = "celkTrzba")]
    pub total: Option<i64>,
    #[serde(alias = "zaklNepodlDph")]
    pub untaxed_amount: Option<i64>,
    #[serde(alias = "zaklDan1")]
    pub standard_rate_base: Option<i64>,
    #[serde(alias = "dan1")]
    pub standard_rate_vat: Option<i64>,
    #[serde(alias = "zaklDan2")]
    pub first_reduced_rate_base: Option<i64>,
    #[serde(alias = "dan2")]
    pub first_reduced_rate_vat: Option<i64>,
    #[serde(alias = "zaklDan3")]
    pub second_reduced_rate_base: Option<i64>,
    #[serde(alias = "dan3")]
    pub second_reduced_rate_vat: Option<i64>,
    #[serde(alias = "cestSluz")]
    pub travel_services: Option<i64>,
    #[serde(alias = "pouzitZboz1")]
    pub used_goods_standard_rate: Option<i64>,
    #[serde(alias = "pouzitZboz2")]
    pub used_goods_first_reduced_rate: Option<i64>,
    #[serde(alias = "pouzitZboz3")]
    pub used_goods_second_reduced_rate: Option<i64>,
    #[serde(alias = "urcenoCerpZuct")]
    pub intended_for_drawing: Option<i64>,
    #[serde(alias = "cerpZuct")]
    pub drawn: Option<i64>,
    #[serde(alias = "rezim")]
    pub regime: Option<u8>,
}

impl SaleRecord {
    /// Record with every required field set; everything else is left to defaults.
    pub fn new(
        tax_id: impl Into<String>,
        premises_id: i64,
        till_id: impl Into<String>,
        serial: impl Into<String>,
        sold_at: DateTime<FixedOffset>,
        total: i64,
    ) -> Self {
        Self {
            tax_id: Some(tax_id.into()),
            premises_id: Some(premises_id),
            till_id: Some(till_id.into()),
            serial: Some(serial.into()),
            sold_at: Some(sold_at),
            total: Some(total),
            ..Self::default()
        }
    }
}

/// Wire attributes of one element, keyed by wire name.
///
/// Iteration order is ordinal by key, which is also the order the
/// canonical serializer emits attributes in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WireFields(BTreeMap<&'static str, String>);

impl WireFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &'static str, value: impl Into<String>) {
        self.0.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.0.iter().map(|(name, value)| (*name, value.as_str()))
    }
}

impl FromIterator<(&'static str, String)> for WireFields {
    fn from_iter<I: IntoIterator<Item = (&'static str, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A validated sale split into the `Hlavicka` (header) and `Data`
/// attribute maps. Built once per submission and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRequest {
    header: WireFields,
    data: WireFields,
}

impl ParsedRequest {
    pub(crate) fn from_parts(header: WireFields, data: WireFields) -> Self {
        Self { header, data }
    }

    pub fn header(&self) -> &WireFields {
        &self.header
    }

    pub fn data(&self) -> &WireFields {
        &self.data
    }

    /// Message UUID as sent in `Hlavicka@uuid_zpravy`.
    pub fn message_uuid(&self) -> &str {
        self.header.get("uuid_zpravy").unwrap_or_default()
    }
}
