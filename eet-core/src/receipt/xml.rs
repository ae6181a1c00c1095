//! Canonical XML serialization of the request body and signature parts.
//!
//! Output is byte-exact exclusive-C14N form: attributes sorted ordinally,
//! explicit end tags, no insignificant whitespace. Attribute values are
//! written verbatim; request values are already restricted to a safe
//! character set by the schema validators.
pub(crate) mod constants;

use super::{ParsedRequest, SecurityCodes, WireFields};
use constants::{
    BASE64_ENCODING_TYPE, BODY_ID, DS_NS, ENVELOPED_SIGNATURE_TRANSFORM, EET_NS,
    EXC_C14N_ALGORITHM, RSA_SHA256_ALGORITHM, SHA256_DIGEST_ALGORITHM, SOAP_ENV_NS, TOKEN_ID,
    WSSE_NS, WSU_NS, X509_VALUE_TYPE,
};

fn push_element(out: &mut String, tag: &str, attributes: &[(&str, &str)], content: &str) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
    out.push('>');
    out.push_str(content);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn element(tag: &str, attributes: &[(&str, &str)], content: &str) -> String {
    let mut out = String::new();
    push_element(&mut out, tag, attributes, content);
    out
}

/// Empty element with attributes in ordinal (byte-wise) key order.
///
/// # Examples
/// ```rust
/// use eet_core::receipt::xml::serialize_element;
///
/// let xml = serialize_element("Data", &[("rezim", "0"), ("celk_trzba", "1.00")]);
/// assert_eq!(xml, r#"<Data celk_trzba="1.00" rezim="0"></Data>"#);
/// ```
pub fn serialize_element(tag: &str, attributes: &[(&str, &str)]) -> String {
    let mut sorted = attributes.to_vec();
    sorted.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
    element(tag, &sorted, "")
}

/// Same as [`serialize_element`] for a wire field map, which is already ordered.
pub fn serialize_fields(tag: &str, fields: &WireFields) -> String {
    let attributes: Vec<_> = fields.iter().collect();
    element(tag, &attributes, "")
}

pub fn serialize_security_codes(codes: &SecurityCodes) -> String {
    let mut content = String::new();
    push_element(
        &mut content,
        "pkp",
        &[("cipher", "RSA2048"), ("digest", "SHA256"), ("encoding", "base64")],
        codes.pkp(),
    );
    push_element(
        &mut content,
        "bkp",
        &[("digest", "SHA1"), ("encoding", "base16")],
        codes.bkp(),
    );
    element("KontrolniKody", &[], &content)
}

/// The `soap:Body` element: header, data, then the security codes.
pub fn serialize_body(request: &ParsedRequest, codes: &SecurityCodes) -> String {
    let mut sale = serialize_fields("Hlavicka", request.header());
    sale.push_str(&serialize_fields("Data", request.data()));
    sale.push_str(&serialize_security_codes(codes));
    let trzba = element("Trzba", &[("xmlns", EET_NS)], &sale);
    element(
        "soap:Body",
        &[("xmlns:soap", SOAP_ENV_NS), ("id", BODY_ID)],
        &trzba,
    )
}

/// `SignedInfo` referencing the body by its id, carrying the body digest.
pub fn serialize_signed_info(digest: &str) -> String {
    let mut transforms = element("Transform", &[("Algorithm", ENVELOPED_SIGNATURE_TRANSFORM)], "");
    push_element(&mut transforms, "Transform", &[("Algorithm", EXC_C14N_ALGORITHM)], "");

    let mut reference = element("Transforms", &[], &transforms);
    push_element(
        &mut reference,
        "DigestMethod",
        &[("Algorithm", SHA256_DIGEST_ALGORITHM)],
        "",
    );
    push_element(&mut reference, "DigestValue", &[], digest);

    let mut content = element("CanonicalizationMethod", &[("Algorithm", EXC_C14N_ALGORITHM)], "");
    push_element(
        &mut content,
        "SignatureMethod",
        &[("Algorithm", RSA_SHA256_ALGORITHM)],
        "",
    );
    let uri = format!("#{BODY_ID}");
    push_element(&mut content, "Reference", &[("URI", uri.as_str())], &reference);

    element("SignedInfo", &[("xmlns", DS_NS)], &content)
}

/// Full SOAP envelope: WS-Security header followed by the body, verbatim.
pub fn serialize_envelope(token: &str, signed_info: &str, signature: &str, body: &str) -> String {
    let token_uri = format!("#{TOKEN_ID}");
    let key_info = element(
        "KeyInfo",
        &[],
        &element(
            "wsse:SecurityTokenReference",
            &[],
            &element(
                "wsse:Reference",
                &[("URI", token_uri.as_str()), ("ValueType", X509_VALUE_TYPE)],
                "",
            ),
        ),
    );

    let mut signature_content = signed_info.to_string();
    push_element(&mut signature_content, "SignatureValue", &[], signature);
    signature_content.push_str(&key_info);

    let mut security = element(
        "wsse:BinarySecurityToken",
        &[
            ("wsu:Id", TOKEN_ID),
            ("EncodingType", BASE64_ENCODING_TYPE),
            ("ValueType", X509_VALUE_TYPE),
        ],
        token,
    );
    push_element(&mut security, "Signature", &[("xmlns", DS_NS)], &signature_content);

    let header = element(
        "soap:Header",
        &[],
        &element(
            "wsse:Security",
            &[
                ("xmlns:wsse", WSSE_NS),
                ("xmlns:wsu", WSU_NS),
                ("soap:mustUnderstand", "1"),
            ],
            &security,
        ),
    );

    let mut content = header;
    content.push_str(body);
    element("soap:Envelope", &[("xmlns:soap", SOAP_ENV_NS)], &content)
}
