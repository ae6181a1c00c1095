//! Parsing and validating the registration service's reply.
//!
//! A reply ends in one of four states: not XML at all
//! ([`ResponseError::Parsing`]), XML without the expected structure
//! ([`ResponseError::WrongServerResponse`]), an explicit rejection
//! ([`ResponseError::Server`]), or a [`Confirmation`].
pub mod dom;

use crate::receipt::codec::{parse_bool, parse_timestamp};
use chrono::{DateTime, FixedOffset};
use dom::XmlNode;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;

static FIK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}-[0-9a-fA-F]{2}$",
    )
    .expect("valid FIK pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("response is not well-formed XML ({code} at line {line}): {message}")]
    Parsing {
        message: String,
        code: String,
        line: usize,
    },
    #[error("wrong server response: {0}")]
    WrongServerResponse(String),
    #[error("message rejected by the server (code {code}): {message}")]
    Server {
        code: String,
        message: String,
        rejected_at: Option<DateTime<FixedOffset>>,
    },
}

impl ResponseError {
    fn wrong(message: impl Into<String>) -> Self {
        ResponseError::WrongServerResponse(message.into())
    }
}

impl From<dom::SyntaxError> for ResponseError {
    fn from(error: dom::SyntaxError) -> Self {
        ResponseError::Parsing {
            message: error.message,
            code: error.code.to_string(),
            line: error.line,
        }
    }
}

/// `Varovani` element: a non-fatal remark attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    code: Option<String>,
    message: String,
}

impl Warning {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Which of the two mutually exclusive reply elements was present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOutcome {
    /// `Potvrzeni`. An omitted `test` attribute means `false`.
    Confirmed {
        received_at: Option<DateTime<FixedOffset>>,
        test: bool,
        fik: Option<String>,
    },
    /// `Chyba`.
    Rejected {
        code: String,
        message: String,
        rejected_at: Option<DateTime<FixedOffset>>,
    },
}

/// Fields read from `Envelope>Body>Odpoved`, before cross-validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub message_uuid: Option<String>,
    pub bkp: Option<String>,
    pub outcome: ServerOutcome,
    pub warnings: Vec<Warning>,
}

/// A validated registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    message_uuid: String,
    bkp: String,
    received_at: DateTime<FixedOffset>,
    test: bool,
    fik: String,
    warnings: Vec<Warning>,
}

impl Confirmation {
    pub fn message_uuid(&self) -> &str {
        &self.message_uuid
    }

    pub fn bkp(&self) -> &str {
        &self.bkp
    }

    pub fn received_at(&self) -> DateTime<FixedOffset> {
        self.received_at
    }

    pub fn test(&self) -> bool {
        self.test
    }

    pub fn fik(&self) -> &str {
        &self.fik
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// What the reply must echo back for the request that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseExpectation {
    pub message_uuid: String,
    pub bkp: String,
    pub playground: bool,
}

pub fn is_valid_fik(fik: &str) -> bool {
    FIK_PATTERN.is_match(fik)
}

/// Read the reply document into an element tree.
pub fn parse_response_xml(xml: &str) -> Result<XmlNode, ResponseError> {
    Ok(dom::parse(xml)?)
}

fn optional_timestamp(
    header: Option<&XmlNode>,
    attribute: &str,
) -> Result<Option<DateTime<FixedOffset>>, ResponseError> {
    match header.and_then(|h| h.attribute(attribute)) {
        None => Ok(None),
        Some(value) => parse_timestamp(value).map(Some).ok_or_else(|| {
            ResponseError::wrong(format!(
                "response contains an invalid value for Hlavicka>{attribute}: '{value}'"
            ))
        }),
    }
}

fn warning_from(node: &XmlNode) -> Warning {
    let code = node
        .attribute("kod_varov")
        .or_else(|| node.attribute("kod"))
        .map(str::to_string);
    Warning::new(code, node.text().unwrap_or_default())
}

/// Pull the reply fields out of the tree without judging them against the
/// request.
pub fn extract_response(root: &XmlNode) -> Result<ServerResponse, ResponseError> {
    if root.name() != "Envelope" {
        return Err(ResponseError::wrong(
            "response does not contain Envelope>Body>Odpoved",
        ));
    }

    if let Some(fault) = root.descend(&["Body", "Fault"]) {
        let reason = fault
            .child("faultstring")
            .and_then(XmlNode::text)
            .unwrap_or("no fault string");
        return Err(ResponseError::wrong(format!("SOAP fault: {reason}")));
    }

    let answer = root
        .descend(&["Body", "Odpoved"])
        .ok_or_else(|| ResponseError::wrong("response does not contain Envelope>Body>Odpoved"))?;

    let header = answer.child("Hlavicka");
    let message_uuid = header
        .and_then(|h| h.attribute("uuid_zpravy"))
        .map(str::to_string);
    let bkp = header.and_then(|h| h.attribute("bkp")).map(str::to_string);
    let warnings = answer.children_named("Varovani").map(warning_from).collect();

    let outcome = match (answer.child("Potvrzeni"), answer.child("Chyba")) {
        (Some(_), Some(_)) => {
            return Err(ResponseError::wrong(
                "response contains both Odpoved>Potvrzeni and Odpoved>Chyba",
            ));
        }
        (None, None) => {
            return Err(ResponseError::wrong(
                "response contains neither Odpoved>Potvrzeni nor Odpoved>Chyba",
            ));
        }
        (None, Some(error)) => ServerOutcome::Rejected {
            code: error.attribute("kod").unwrap_or_default().to_string(),
            message: error.text().unwrap_or_default().to_string(),
            rejected_at: optional_timestamp(header, "dat_odmit")?,
        },
        (Some(confirmation), None) => {
            let test = match confirmation.attribute("test") {
                None => false,
                Some(value) => parse_bool(value).ok_or_else(|| {
                    ResponseError::wrong(format!(
                        "response contains an invalid value in Potvrzeni>test: '{value}'"
                    ))
                })?,
            };
            ServerOutcome::Confirmed {
                received_at: optional_timestamp(header, "dat_prij")?,
                test,
                fik: confirmation.attribute("fik").map(str::to_string),
            }
        }
    };

    Ok(ServerResponse {
        message_uuid,
        bkp,
        outcome,
        warnings,
    })
}

fn describe(value: Option<&str>) -> &str {
    value.unwrap_or("<missing>")
}

/// Cross-check a reply against the request it answers.
///
/// A rejection is surfaced first as [`ResponseError::Server`]; otherwise
/// UUID, BKP, receive time, test flag and FIK are checked in that order.
pub fn validate_response(
    expected: &ResponseExpectation,
    response: ServerResponse,
) -> Result<Confirmation, ResponseError> {
    let (received_at, test, fik) = match response.outcome {
        ServerOutcome::Rejected {
            code,
            message,
            rejected_at,
        } => {
            return Err(ResponseError::Server {
                code,
                message,
                rejected_at,
            });
        }
        ServerOutcome::Confirmed {
            received_at,
            test,
            fik,
        } => (received_at, test, fik),
    };

    let message_uuid = match response.message_uuid {
        Some(uuid) if uuid == expected.message_uuid => uuid,
        other => {
            return Err(ResponseError::wrong(format!(
                "UUID in response: {} is not same as sent: {}",
                describe(other.as_deref()),
                expected.message_uuid
            )));
        }
    };

    let bkp = match response.bkp {
        Some(bkp) if bkp == expected.bkp => bkp,
        other => {
            return Err(ResponseError::wrong(format!(
                "BKP in response: {} is not same as sent: {}",
                describe(other.as_deref()),
                expected.bkp
            )));
        }
    };

    let received_at =
        received_at.ok_or_else(|| ResponseError::wrong("dat_prij in response is missing"))?;

    if test != expected.playground {
        return Err(ResponseError::wrong(format!(
            "test in response: {test} is not same as sent: {}",
            expected.playground
        )));
    }

    let fik = match fik {
        Some(fik) if is_valid_fik(&fik) => fik,
        other => {
            return Err(ResponseError::wrong(format!(
                "FIK in response is invalid: {}",
                describe(other.as_deref())
            )));
        }
    };

    Ok(Confirmation {
        message_uuid,
        bkp,
        received_at,
        test,
        fik,
        warnings: response.warnings,
    })
}

/// Parse, extract and validate in one step.
pub fn interpret_response(
    xml: &str,
    expected: &ResponseExpectation,
) -> Result<Confirmation, ResponseError> {
    let root = parse_response_xml(xml)?;
    let response = extract_response(&root)?;
    validate_response(expected, response)
}
