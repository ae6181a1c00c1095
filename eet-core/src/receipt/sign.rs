use super::codes::{BkpCase, SecurityCodes};
use super::xml::{serialize_body, serialize_envelope, serialize_signed_info};
use super::{ParsedRequest, WireFields};
use base64ct::{Base64, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use x509_cert::{
    Certificate,
    der::{Decode, DecodePem, Encode},
};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("certificate parse error: {0}")]
    Certificate(String),
    #[error("private key parse error: {0}")]
    PrivateKey(String),
    #[error("certificate public key does not match the private key")]
    KeyMismatch,
    #[error("data is missing `{field}` required for the PKP")]
    MissingPkpField { field: &'static str },
    #[error("PKP is not valid base64")]
    InvalidPkp,
    #[error("RSA signing failed: {0}")]
    Rsa(#[source] rsa::Error),
}

/// The signed wire message. Never modified after signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedEnvelope {
    xml: String,
    body_digest: String,
    signature: String,
}

impl SignedEnvelope {
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Base64 SHA-256 of the body bytes, as written into `DigestValue`.
    pub fn body_digest(&self) -> &str {
        &self.body_digest
    }

    /// Base64 RSA-SHA256 signature over `SignedInfo`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn into_xml(self) -> String {
        self.xml
    }
}

/// Holds the taxpayer certificate and its RSA key; computes security codes
/// and signs envelopes with them.
pub struct EnvelopeSigner {
    certificate: Certificate,
    token: String,
    private_key: RsaPrivateKey,
}

impl fmt::Debug for EnvelopeSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeSigner")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .finish_non_exhaustive()
    }
}

impl EnvelopeSigner {
    /// Certificate DER and PKCS#8 private key DER.
    pub fn from_der(cert_der: &[u8], private_key_der: &[u8]) -> Result<Self, SigningError> {
        let cert = Certificate::from_der(cert_der)
            .map_err(|e| SigningError::Certificate(e.to_string()))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(private_key_der)
            .map_err(|e| SigningError::PrivateKey(e.to_string()))?;
        Self::from_parts(cert, private_key)
    }

    /// Certificate PEM and a PKCS#8 (`PRIVATE KEY`) or PKCS#1
    /// (`RSA PRIVATE KEY`) private key PEM.
    pub fn from_pem(cert_pem: &str, private_key_pem: &str) -> Result<Self, SigningError> {
        let cert = Certificate::from_pem(cert_pem.as_bytes())
            .map_err(|e| SigningError::Certificate(e.to_string()))?;
        let private_key = private_key_from_pem(private_key_pem)?;
        Self::from_parts(cert, private_key)
    }

    fn from_parts(certificate: Certificate, private_key: RsaPrivateKey) -> Result<Self, SigningError> {
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| SigningError::Certificate(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| SigningError::Certificate(format!("not an RSA certificate: {e}")))?;
        if public_key != private_key.to_public_key() {
            return Err(SigningError::KeyMismatch);
        }

        let der = certificate
            .to_der()
            .map_err(|e| SigningError::Certificate(e.to_string()))?;
        Ok(Self {
            certificate,
            token: Base64::encode_string(&der),
            private_key,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Certificate DER as base64, the `BinarySecurityToken` content.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn security_codes(
        &self,
        data: &WireFields,
        case: BkpCase,
    ) -> Result<SecurityCodes, SigningError> {
        SecurityCodes::compute(&self.private_key, data, case)
    }

    /// Serialize the body once, then digest, sign and wrap those same bytes.
    pub fn sign_envelope(
        &self,
        request: &ParsedRequest,
        codes: &SecurityCodes,
    ) -> Result<SignedEnvelope, SigningError> {
        let body = serialize_body(request, codes);
        let body_digest = Base64::encode_string(&Sha256::digest(body.as_bytes()));
        let signed_info = serialize_signed_info(&body_digest);
        let signature = sign_sha256_base64(&self.private_key, signed_info.as_bytes())?;
        let xml = serialize_envelope(&self.token, &signed_info, &signature, &body);
        Ok(SignedEnvelope {
            xml,
            body_digest,
            signature,
        })
    }
}

/// PKCS#8 or PKCS#1 RSA private key PEM.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, SigningError> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| SigningError::PrivateKey(e.to_string()))
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| SigningError::PrivateKey(e.to_string()))
    }
}

fn sign_sha256_base64(key: &RsaPrivateKey, message: &[u8]) -> Result<String, SigningError> {
    let digest = Sha256::digest(message);
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(SigningError::Rsa)?;
    Ok(Base64::encode_string(&signature))
}
