//! Taxpayer security codes: the PKP signature and the BKP checksum derived from it.
use super::WireFields;
use super::sign::SigningError;
use base64ct::{Base64, Encoding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Data fields signed into the PKP, in wire-contract order.
pub const PKP_FIELDS: [&str; 6] = [
    "dic_popl",
    "id_provoz",
    "id_pokl",
    "porad_cis",
    "dat_trzby",
    "celk_trzba",
];

/// Hex casing of the BKP. Lowercase is canonical; some legacy
/// integrations expect uppercase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BkpCase {
    #[default]
    Lower,
    Upper,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityCodes {
    pkp: String,
    bkp: String,
}

impl SecurityCodes {
    pub fn new(pkp: String, bkp: String) -> Self {
        Self { pkp, bkp }
    }

    /// Sign `data` and derive the matching BKP.
    pub fn compute(
        key: &RsaPrivateKey,
        data: &WireFields,
        case: BkpCase,
    ) -> Result<Self, SigningError> {
        let pkp = generate_pkp(key, data)?;
        let bkp = generate_bkp_with_case(&pkp, case)?;
        Ok(Self { pkp, bkp })
    }

    pub fn pkp(&self) -> &str {
        &self.pkp
    }

    pub fn bkp(&self) -> &str {
        &self.bkp
    }
}

/// The pipe-joined string the PKP is computed over.
pub fn pkp_plaintext(data: &WireFields) -> Result<String, SigningError> {
    let values = PKP_FIELDS
        .iter()
        .map(|&field| data.get(field).ok_or(SigningError::MissingPkpField { field }))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values.join("|"))
}

/// RSA-SHA256 (PKCS#1 v1.5) signature over [`pkp_plaintext`], base64 encoded.
pub fn generate_pkp(key: &RsaPrivateKey, data: &WireFields) -> Result<String, SigningError> {
    let plaintext = pkp_plaintext(data)?;
    let digest = Sha256::digest(plaintext.as_bytes());
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(SigningError::Rsa)?;
    Ok(Base64::encode_string(&signature))
}

/// BKP in canonical lowercase form.
///
/// # Examples
/// ```rust
/// use eet_core::receipt::generate_bkp;
///
/// let bkp = generate_bkp("AAAA")?;
/// assert_eq!(bkp, "29e2dcfb-b16f63bb-0254df75-85a15bb6-fb5e927d");
/// # Ok::<(), eet_core::receipt::sign::SigningError>(())
/// ```
pub fn generate_bkp(pkp: &str) -> Result<String, SigningError> {
    generate_bkp_with_case(pkp, BkpCase::Lower)
}

/// SHA-1 of the decoded PKP as hex, split into five dash-separated blocks of eight.
pub fn generate_bkp_with_case(pkp: &str, case: BkpCase) -> Result<String, SigningError> {
    let raw = Base64::decode_vec(pkp.trim()).map_err(|_| SigningError::InvalidPkp)?;
    let hash = Sha1::digest(&raw);

    let mut bkp = String::with_capacity(44);
    for (index, byte) in hash.iter().enumerate() {
        if index > 0 && index % 4 == 0 {
            bkp.push('-');
        }
        let hex = match case {
            BkpCase::Lower => format!("{byte:02x}"),
            BkpCase::Upper => format!("{byte:02X}"),
        };
        bkp.push_str(&hex);
    }
    Ok(bkp)
}
