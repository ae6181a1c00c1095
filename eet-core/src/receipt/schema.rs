use super::codec::{format_amount, format_bool, format_timestamp};
use super::{ParsedRequest, RequestParsingError, SaleRecord, WireFields};
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use std::fmt::{self, Display, Formatter};
use std::sync::LazyLock;
use uuid::Uuid;

static TAX_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CZ[0-9]{8,10}$").expect("valid tax id pattern"));
static TILL_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-zA-Z.,:;/#\-_ ]{1,20}$").expect("valid till id pattern")
});
static SERIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-zA-Z.,:;/#\-_ ]{1,25}$").expect("valid serial pattern")
});

const MONEY_LIMIT: i64 = 10_000_000_000;
const PREMISES_LIMIT: i64 = 1_000_000;

/// Which element a field is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Data,
}

/// Validation rules for identifier-like fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierRule {
    /// RFC 4122 UUID, versions 1 to 5.
    MessageUuid,
    /// `CZ` followed by 8 to 10 digits.
    TaxId,
    /// Positive integer below 1 000 000.
    Premises,
    /// Up to 20 characters from the restricted set.
    Till,
    /// Up to 25 characters from the restricted set.
    Serial,
}

/// Closed set of field kinds driving validation and formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identifier(IdentifierRule),
    /// Hundredths, strictly inside (-10^10, 10^10).
    Money,
    Timestamp,
    Flag,
    /// `0` (standard) or `1` (simplified regime).
    Regime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<FixedOffset>),
    Flag(bool),
    Uuid(Uuid),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Timestamp(value) => f.write_str(&value.to_rfc3339()),
            FieldValue::Flag(value) => f.write_str(format_bool(*value)),
            FieldValue::Uuid(value) => write!(f, "{}", value.hyphenated()),
        }
    }
}

/// One row of the request field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Name of the [`SaleRecord`] field, used in error messages.
    pub name: &'static str,
    pub wire_name: &'static str,
    pub section: Section,
    pub required: bool,
    pub kind: FieldKind,
    pub default: Option<fn() -> FieldValue>,
    pub read: fn(&SaleRecord) -> Option<FieldValue>,
}

impl FieldSpec {
    fn validate(&self, value: &FieldValue) -> bool {
        match (self.kind, value) {
            (FieldKind::Identifier(IdentifierRule::MessageUuid), FieldValue::Uuid(id)) => {
                matches!(id.get_version_num(), 1..=5)
                    && id.get_variant() == uuid::Variant::RFC4122
            }
            (FieldKind::Identifier(IdentifierRule::TaxId), FieldValue::Text(value)) => {
                TAX_ID_PATTERN.is_match(value)
            }
            (FieldKind::Identifier(IdentifierRule::Premises), FieldValue::Integer(value)) => {
                (1..PREMISES_LIMIT).contains(value)
            }
            (FieldKind::Identifier(IdentifierRule::Till), FieldValue::Text(value)) => {
                TILL_ID_PATTERN.is_match(value)
            }
            (FieldKind::Identifier(IdentifierRule::Serial), FieldValue::Text(value)) => {
                SERIAL_PATTERN.is_match(value)
            }
            (FieldKind::Money, FieldValue::Integer(value)) => {
                -MONEY_LIMIT < *value && *value < MONEY_LIMIT
            }
            (FieldKind::Timestamp, FieldValue::Timestamp(_)) => true,
            (FieldKind::Flag, FieldValue::Flag(_)) => true,
            (FieldKind::Regime, FieldValue::Integer(value)) => matches!(value, 0 | 1),
            _ => false,
        }
    }

    fn format(&self, value: &FieldValue) -> String {
        match (self.kind, value) {
            (FieldKind::Money, FieldValue::Integer(value)) => format_amount(*value),
            (_, FieldValue::Timestamp(value)) => format_timestamp(value),
            (_, FieldValue::Flag(value)) => format_bool(*value).to_string(),
            (_, FieldValue::Uuid(value)) => value.hyphenated().to_string(),
            (_, FieldValue::Integer(value)) => value.to_string(),
            (_, FieldValue::Text(value)) => value.clone(),
        }
    }
}

const fn money(
    name: &'static str,
    wire_name: &'static str,
    read: fn(&SaleRecord) -> Option<FieldValue>,
) -> FieldSpec {
    FieldSpec {
        name,
        wire_name,
        section: Section::Data,
        required: false,
        kind: FieldKind::Money,
        default: None,
        read,
    }
}

fn amount(value: Option<i64>) -> Option<FieldValue> {
    value.map(FieldValue::Integer)
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value.clone().map(FieldValue::Text)
}

/// Request fields in evaluation order.
pub static SCHEMA: [FieldSpec; 25] = [
    FieldSpec {
        name: "message_uuid",
        wire_name: "uuid_zpravy",
        section: Section::Header,
        required: true,
        kind: FieldKind::Identifier(IdentifierRule::MessageUuid),
        default: Some(|| FieldValue::Uuid(Uuid::new_v4())),
        read: |record| record.message_uuid.map(FieldValue::Uuid),
    },
    FieldSpec {
        name: "sent_at",
        wire_name: "dat_odesl",
        section: Section::Header,
        required: true,
        kind: FieldKind::Timestamp,
        default: Some(|| FieldValue::Timestamp(Utc::now().fixed_offset())),
        read: |record| record.sent_at.map(FieldValue::Timestamp),
    },
    FieldSpec {
        name: "first_submission",
        wire_name: "prvni_zaslani",
        section: Section::Header,
        required: true,
        kind: FieldKind::Flag,
        default: Some(|| FieldValue::Flag(true)),
        read: |record| record.first_submission.map(FieldValue::Flag),
    },
    FieldSpec {
        name: "verification_mode",
        wire_name: "overeni",
        section: Section::Header,
        required: true,
        kind: FieldKind::Flag,
        default: Some(|| FieldValue::Flag(false)),
        read: |record| record.verification_mode.map(FieldValue::Flag),
    },
    FieldSpec {
        name: "tax_id",
        wire_name: "dic_popl",
        section: Section::Data,
        required: true,
        kind: FieldKind::Identifier(IdentifierRule::TaxId),
        default: None,
        read: |record| text(&record.tax_id),
    },
    FieldSpec {
        name: "delegating_tax_id",
        wire_name: "dic_poverujiciho",
        section: Section::Data,
        required: false,
        kind: FieldKind::Identifier(IdentifierRule::TaxId),
        default: None,
        read: |record| text(&record.delegating_tax_id),
    },
    FieldSpec {
        name: "premises_id",
        wire_name: "id_provoz",
        section: Section::Data,
        required: true,
        kind: FieldKind::Identifier(IdentifierRule::Premises),
        default: None,
        read: |record| record.premises_id.map(FieldValue::Integer),
    },
    FieldSpec {
        name: "till_id",
        wire_name: "id_pokl",
        section: Section::Data,
        required: true,
        kind: FieldKind::Identifier(IdentifierRule::Till),
        default: None,
        read: |record| text(&record.till_id),
    },
    FieldSpec {
        name: "serial",
        wire_name: "porad_cis",
        section: Section::Data,
        required: true,
        kind: FieldKind::Identifier(IdentifierRule::Serial),
        default: None,
        read: |record| text(&record.serial),
    },
    FieldSpec {
        name: "sold_at",
        wire_name: "dat_trzby",
        section: Section::Data,
        required: true,
        kind: FieldKind::Timestamp,
        default: None,
        read: |record| record.sold_at.map(FieldValue::Timestamp),
    },
    FieldSpec {
        name: "total",
        wire_name: "celk_trzba",
        section: Section::Data,
        required: true,
        kind: FieldKind::Money,
        default: None,
        read: |record| amount(record.total),
    },
    money("untaxed_amount", "zakl_nepodl_dph", |record| {
        amount(record.untaxed_amount)
    }),
    money("standard_rate_base", "zakl_dan1", |record| {
        amount(record.standard_rate_base)
    }),
    money("standard_rate_vat", "dan1", |record| {
        amount(record.standard_rate_vat)
    }),
    money("first_reduced_rate_base", "zakl_dan2", |record| {
        amount(record.first_reduced_rate_base)
    }),
    money("first_reduced_rate_vat", "dan2", |record| {
        amount(record.first_reduced_rate_vat)
    }),
    money("second_reduced_rate_base", "zakl_dan3", |record| {
        amount(record.second_reduced_rate_base)
    }),
    money("second_reduced_rate_vat", "dan3", |record| {
        amount(record.second_reduced_rate_vat)
    }),
    money("travel_services", "cest_sluz", |record| {
        amount(record.travel_services)
    }),
    money("used_goods_standard_rate", "pouzit_zboz1", |record| {
        amount(record.used_goods_standard_rate)
    }),
    money("used_goods_first_reduced_rate", "pouzit_zboz2", |record| {
        amount(record.used_goods_first_reduced_rate)
    }),
    money("used_goods_second_reduced_rate", "pouzit_zboz3", |record| {
        amount(record.used_goods_second_reduced_rate)
    }),
    money("intended_for_drawing", "urceno_cerp_zuct", |record| {
        amount(record.intended_for_drawing)
    }),
    money("drawn", "cerp_zuct", |record| amount(record.drawn)),
    FieldSpec {
        name: "regime",
        wire_name: "rezim",
        section: Section::Data,
        required: true,
        kind: FieldKind::Regime,
        default: Some(|| FieldValue::Integer(0)),
        read: |record| record.regime.map(|value| FieldValue::Integer(i64::from(value))),
    },
];

/// Apply defaults, validate and format a sale record.
///
/// Fields are processed in table order and the first failure is returned.
///
/// # Errors
/// [`RequestParsingError::Missing`] for an unset required field without a
/// default, [`RequestParsingError::Invalid`] for a value its validator rejects.
pub fn parse_request(record: &SaleRecord) -> Result<ParsedRequest, RequestParsingError> {
    let mut header = WireFields::new();
    let mut data = WireFields::new();

    for spec in SCHEMA.iter() {
        let value = match ((spec.read)(record), spec.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default(),
            (None, None) if spec.required => {
                return Err(RequestParsingError::Missing { field: spec.name });
            }
            (None, None) => continue,
        };

        if !spec.validate(&value) {
            return Err(RequestParsingError::Invalid {
                field: spec.name,
                value: value.to_string(),
            });
        }

        let target = match spec.section {
            Section::Header => &mut header,
            Section::Data => &mut data,
        };
        target.insert(spec.wire_name, spec.format(&value));
    }

    Ok(ParsedRequest::from_parts(header, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sold_at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2016-08-05T00:30:12+02:00").unwrap()
    }

    fn minimal_record() -> SaleRecord {
        SaleRecord::new("CZ1212121218", 273, "/5546/RO24", "0/6460/ZQ42", sold_at(), -3411380)
    }

    #[test]
    fn minimal_record_is_defaulted_and_formatted() {
        let request = parse_request(&minimal_record()).expect("valid record");

        let data: Vec<_> = request.data().iter().collect();
        assert_eq!(
            data,
            vec![
                ("celk_trzba", "-34113.80"),
                ("dat_trzby", "2016-08-04T22:30:12Z"),
                ("dic_popl", "CZ1212121218"),
                ("id_pokl", "/5546/RO24"),
                ("id_provoz", "273"),
                ("porad_cis", "0/6460/ZQ42"),
                ("rezim", "0"),
            ]
        );

        let header = request.header();
        assert_eq!(header.get("prvni_zaslani"), Some("true"));
        assert_eq!(header.get("overeni"), Some("false"));
        let uuid = Uuid::parse_str(request.message_uuid()).expect("generated uuid");
        assert_eq!(uuid.get_version_num(), 4);
        let sent = header.get("dat_odesl").expect("send time");
        assert!(sent.ends_with('Z') && !sent.contains('.'));
    }

    #[test]
    fn defaults_are_fresh_per_call() {
        let first = parse_request(&minimal_record()).unwrap();
        let second = parse_request(&minimal_record()).unwrap();
        assert_ne!(first.message_uuid(), second.message_uuid());
    }

    #[test]
    fn explicit_header_values_are_kept() {
        let mut record = minimal_record();
        let uuid = Uuid::parse_str("ae0af488-5115-48c0-8d10-0861a2921981").unwrap();
        record.message_uuid = Some(uuid);
        record.sent_at = Some(sold_at());
        record.first_submission = Some(false);
        record.verification_mode = Some(true);
        let request = parse_request(&record).unwrap();
        assert_eq!(request.message_uuid(), "ae0af488-5115-48c0-8d10-0861a2921981");
        assert_eq!(request.header().get("dat_odesl"), Some("2016-08-04T22:30:12Z"));
        assert_eq!(request.header().get("prvni_zaslani"), Some("false"));
        assert_eq!(request.header().get("overeni"), Some("true"));
    }

    #[test]
    fn all_optional_fields_land_in_data() {
        let mut record = minimal_record();
        record.delegating_tax_id = Some("CZ1212121218".into());
        record.untaxed_amount = Some(11041);
        record.standard_rate_base = Some(10000);
        record.standard_rate_vat = Some(2000);
        record.first_reduced_rate_base = Some(20000);
        record.first_reduced_rate_vat = Some(1500);
        record.second_reduced_rate_base = Some(30000);
        record.second_reduced_rate_vat = Some(1000);
        record.travel_services = Some(9999);
        record.used_goods_standard_rate = Some(13579);
        record.used_goods_first_reduced_rate = Some(21828);
        record.used_goods_second_reduced_rate = Some(31415);
        record.intended_for_drawing = Some(42);
        record.drawn = Some(-1700);
        record.regime = Some(1);

        let request = parse_request(&record).unwrap();
        let data = request.data();
        assert_eq!(data.len(), 21);
        assert_eq!(data.get("dic_poverujiciho"), Some("CZ1212121218"));
        assert_eq!(data.get("zakl_nepodl_dph"), Some("110.41"));
        assert_eq!(data.get("urceno_cerp_zuct"), Some("0.42"));
        assert_eq!(data.get("cerp_zuct"), Some("-17.00"));
        assert_eq!(data.get("rezim"), Some("1"));
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let mut record = minimal_record();
        record.tax_id = None;
        assert_eq!(
            parse_request(&record),
            Err(RequestParsingError::Missing { field: "tax_id" })
        );

        let mut record = minimal_record();
        record.sold_at = None;
        assert_eq!(
            parse_request(&record),
            Err(RequestParsingError::Missing { field: "sold_at" })
        );
    }

    #[test]
    fn first_failure_in_table_order_wins() {
        let mut record = minimal_record();
        record.till_id = Some("@@@".into());
        record.total = None;
        assert_eq!(
            parse_request(&record),
            Err(RequestParsingError::Invalid {
                field: "till_id",
                value: "@@@".into()
            })
        );
    }

    #[test]
    fn validators_reject_out_of_range_values() {
        let cases: Vec<(&'static str, Box<dyn Fn(&mut SaleRecord)>)> = vec![
            ("tax_id", Box::new(|r: &mut SaleRecord| r.tax_id = Some("1212121218".into()))),
            ("tax_id", Box::new(|r: &mut SaleRecord| r.tax_id = Some("CZ1234567".into()))),
            ("delegating_tax_id", Box::new(|r: &mut SaleRecord| r.delegating_tax_id = Some("SK12345678".into()))),
            ("premises_id", Box::new(|r: &mut SaleRecord| r.premises_id = Some(0))),
            ("premises_id", Box::new(|r: &mut SaleRecord| r.premises_id = Some(1_000_000))),
            ("till_id", Box::new(|r: &mut SaleRecord| r.till_id = Some("x".repeat(21)))),
            ("till_id", Box::new(|r: &mut SaleRecord| r.till_id = Some(String::new()))),
            ("serial", Box::new(|r: &mut SaleRecord| r.serial = Some("x".repeat(26)))),
            ("total", Box::new(|r: &mut SaleRecord| r.total = Some(10_000_000_000))),
            ("total", Box::new(|r: &mut SaleRecord| r.total = Some(-10_000_000_000))),
            ("drawn", Box::new(|r: &mut SaleRecord| r.drawn = Some(i64::MAX))),
            ("regime", Box::new(|r: &mut SaleRecord| r.regime = Some(2))),
            ("message_uuid", Box::new(|r: &mut SaleRecord| r.message_uuid = Some(Uuid::nil()))),
        ];

        for (field, mutate) in cases {
            let mut record = minimal_record();
            mutate(&mut record);
            let err = parse_request(&record).expect_err(field);
            assert!(
                matches!(err, RequestParsingError::Invalid { field: f, .. } if f == field),
                "expected invalid {field}, got {err:?}"
            );
        }
    }

    #[test]
    fn boundary_values_are_accepted() {
        let mut record = minimal_record();
        record.premises_id = Some(999_999);
        record.till_id = Some("0aA.,:;/#-_ ".into());
        record.serial = Some("s".repeat(25));
        record.total = Some(9_999_999_999);
        record.drawn = Some(-9_999_999_999);
        let request = parse_request(&record).expect("boundary values are valid");
        assert_eq!(request.data().get("celk_trzba"), Some("99999999.99"));
        assert_eq!(request.data().get("cerp_zuct"), Some("-99999999.99"));
    }

    #[test]
    fn table_names_are_unique() {
        let mut wire: Vec<_> = SCHEMA.iter().map(|spec| spec.wire_name).collect();
        wire.sort_unstable();
        wire.dedup();
        assert_eq!(wire.len(), SCHEMA.len());
        assert_eq!(
            SCHEMA.iter().filter(|s| s.section == Section::Header).count(),
            4
        );
    }
}
