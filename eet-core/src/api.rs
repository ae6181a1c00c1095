//! Submission client: prepares, signs and sends a sale, then interprets the reply.
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::Config;
use crate::receipt::sign::{EnvelopeSigner, SignedEnvelope};
use crate::receipt::xml::constants::{REQUEST_CONTENT_TYPE, SOAP_ACTION};
use crate::receipt::{ParsedRequest, SaleRecord, SecurityCodes, parse_request};
use crate::response::{Confirmation, ResponseError, ResponseExpectation, interpret_response};

/// Failures reaching the service.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(String),
}

/// One outgoing POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub timeout: Duration,
    /// Reading may stop once the body exceeds this many bytes.
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// HTTP boundary of the client. Implementations perform exactly one request
/// per call and honour the request timeout.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, ApiError>> + Send;
}

/// `reqwest`-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// # Errors
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder().build().map_err(ApiError::Http)?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(timeout)
    } else {
        ApiError::Http(error)
    }
}

impl Transport for HttpTransport {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        let TransportRequest {
            url,
            headers,
            body,
            timeout,
            max_body_bytes,
        } = request;

        let mut builder = self.client.post(url).timeout(timeout).body(body);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let mut response = builder.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(e, timeout))? {
            body.extend_from_slice(&chunk);
            if body.len() > max_body_bytes {
                break;
            }
        }

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

/// A sale ready to send: validated fields, security codes and the signed envelope.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    request: ParsedRequest,
    codes: SecurityCodes,
    envelope: SignedEnvelope,
}

impl PreparedRequest {
    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    pub fn codes(&self) -> &SecurityCodes {
        &self.codes
    }

    pub fn envelope(&self) -> &SignedEnvelope {
        &self.envelope
    }
}

/// How a submission ended when it did not fail outright.
#[derive(Debug)]
pub enum Outcome {
    Confirmed(Confirmation),
    /// The exchange failed but offline mode is on; the locally computed
    /// codes in the [`Submission`] stand in for a FIK.
    Offline(Error),
}

#[derive(Debug)]
pub struct Submission {
    request: ParsedRequest,
    codes: SecurityCodes,
    outcome: Outcome,
    raw_response: Option<String>,
    response_time: Duration,
}

impl Submission {
    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    pub fn codes(&self) -> &SecurityCodes {
        &self.codes
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        match &self.outcome {
            Outcome::Confirmed(confirmation) => Some(confirmation),
            Outcome::Offline(_) => None,
        }
    }

    pub fn fik(&self) -> Option<&str> {
        self.confirmation().map(Confirmation::fik)
    }

    /// Error that triggered the offline fallback, if any.
    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Confirmed(_) => None,
            Outcome::Offline(error) => Some(error),
        }
    }

    /// Reply body as received, when one was read.
    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }

    /// Time spent on the network exchange and reply interpretation.
    pub fn response_time(&self) -> Duration {
        self.response_time
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

/// Fall back to offline codes only for recoverable errors, and only when enabled.
fn settle(result: Result<Confirmation, Error>, offline: bool) -> Result<Outcome, Error> {
    match result {
        Ok(confirmation) => Ok(Outcome::Confirmed(confirmation)),
        Err(error) if offline && error.is_recoverable() => Ok(Outcome::Offline(error)),
        Err(error) => Err(error),
    }
}

fn request_headers(user_agent: Option<&str>) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("Content-Type", REQUEST_CONTENT_TYPE.to_string()),
        ("SOAPAction", SOAP_ACTION.to_string()),
    ];
    if let Some(user_agent) = user_agent {
        headers.push(("User-Agent", user_agent.to_string()));
    }
    headers
}

fn is_xml_media_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/xml") || content_type.contains("application/xml")
}

/// Turn raw transport output into reply text, enforcing media type and size cap.
fn decode_body(response: TransportResponse, max_body_bytes: usize) -> Result<String, ResponseError> {
    match response.content_type.as_deref() {
        Some(content_type) if is_xml_media_type(content_type) => {}
        other => {
            return Err(ResponseError::WrongServerResponse(format!(
                "unknown content-type: {}",
                other.unwrap_or("<missing>")
            )));
        }
    }
    if response.body.len() > max_body_bytes {
        return Err(ResponseError::WrongServerResponse(format!(
            "response body exceeds {max_body_bytes} bytes"
        )));
    }
    String::from_utf8(response.body).map_err(|_| {
        ResponseError::WrongServerResponse("response body is not valid UTF-8".into())
    })
}

/// EET submission client.
///
/// # Examples
/// ```rust,no_run
/// use eet_core::api::EetClient;
/// use eet_core::config::Config;
/// use eet_core::receipt::sign::EnvelopeSigner;
///
/// # fn load() -> Result<(), Box<dyn std::error::Error>> {
/// let signer = EnvelopeSigner::from_pem(
///     &std::fs::read_to_string("certificate.pem")?,
///     &std::fs::read_to_string("private.pem")?,
/// )?;
/// let client = EetClient::new(Config::default().with_offline(true), signer)?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EetClient<T = HttpTransport> {
    config: Config,
    signer: EnvelopeSigner,
    transport: T,
    endpoint: String,
}

impl EetClient<HttpTransport> {
    /// Client over the default HTTP transport.
    ///
    /// # Errors
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(config: Config, signer: EnvelopeSigner) -> Result<Self, ApiError> {
        Ok(Self::with_transport(config, signer, HttpTransport::new()?))
    }
}

impl<T: Transport> EetClient<T> {
    pub fn with_transport(config: Config, signer: EnvelopeSigner, transport: T) -> Self {
        let endpoint = config.resolve_endpoint();
        Self {
            config,
            signer,
            transport,
            endpoint,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn signer(&self) -> &EnvelopeSigner {
        &self.signer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Validate the record, compute its codes and sign the envelope.
    /// Nothing is sent.
    ///
    /// # Errors
    /// [`Error::Request`] for an invalid record, [`Error::Signing`] when
    /// signing fails. Neither is eligible for the offline fallback.
    pub fn prepare(&self, record: &SaleRecord) -> Result<PreparedRequest, Error> {
        let request = parse_request(record)?;
        let codes = self
            .signer
            .security_codes(request.data(), self.config.bkp_case())?;
        let envelope = self.signer.sign_envelope(&request, &codes)?;
        debug!(
            message_uuid = request.message_uuid(),
            bkp = codes.bkp(),
            "prepared sale record"
        );
        Ok(PreparedRequest {
            request,
            codes,
            envelope,
        })
    }

    /// Prepare and submit a sale record.
    ///
    /// # Errors
    /// Request and signing errors always propagate. Transport and reply
    /// errors propagate unless offline mode is on, in which case they are
    /// returned inside [`Outcome::Offline`].
    pub async fn send(&self, record: &SaleRecord) -> Result<Submission, Error> {
        let prepared = self.prepare(record)?;
        self.submit(prepared).await
    }

    /// Submit an already prepared request.
    pub async fn submit(&self, prepared: PreparedRequest) -> Result<Submission, Error> {
        let PreparedRequest {
            request,
            codes,
            envelope,
        } = prepared;
        let expectation = ResponseExpectation {
            message_uuid: request.message_uuid().to_string(),
            bkp: codes.bkp().to_string(),
            playground: self.config.env().is_playground(),
        };

        let transport_request = TransportRequest {
            url: self.endpoint.clone(),
            headers: request_headers(self.config.user_agent()),
            body: envelope.into_xml(),
            timeout: self.config.timeout(),
            max_body_bytes: self.config.max_response_bytes(),
        };

        debug!(
            endpoint = %self.endpoint,
            message_uuid = %expectation.message_uuid,
            "sending sale record"
        );
        let started = Instant::now();
        let (raw_response, result) = match self.transport.post(transport_request).await {
            Ok(response) => {
                debug!(status = response.status, bytes = response.body.len(), "received reply");
                match decode_body(response, self.config.max_response_bytes()) {
                    Ok(text) => {
                        let result = interpret_response(&text, &expectation).map_err(Error::from);
                        (Some(text), result)
                    }
                    Err(error) => (None, Err(error.into())),
                }
            }
            Err(error) => (None, Err(error.into())),
        };
        let response_time = started.elapsed();

        let outcome = settle(result, self.config.offline())?;
        match &outcome {
            Outcome::Confirmed(confirmation) => {
                for warning in confirmation.warnings() {
                    warn!(
                        code = warning.code().unwrap_or_default(),
                        message = warning.message(),
                        "server attached a warning"
                    );
                }
                info!(
                    fik = confirmation.fik(),
                    elapsed_ms = u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX),
                    "sale registered"
                );
            }
            Outcome::Offline(error) => {
                warn!(%error, bkp = codes.bkp(), "registration failed, returning offline codes");
            }
        }

        Ok(Submission {
            request,
            codes,
            outcome,
            raw_response,
            response_time,
        })
    }
}
