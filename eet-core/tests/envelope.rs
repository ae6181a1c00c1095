mod common;

use base64ct::{Base64, Encoding};
use common::{FIXTURE_BKP, FIXTURE_PKP, RESPONSE_UUID, pinned_record, signer};
use eet_core::receipt::{BkpCase, parse_request};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_cert::der::Encode;

fn slice_between<'a>(xml: &'a str, start: &str, end: &str) -> &'a str {
    let from = xml.find(start).expect("start marker");
    let to = xml[from..].find(end).expect("end marker") + from + end.len();
    &xml[from..to]
}

fn sign_pinned() -> eet_core::receipt::sign::SignedEnvelope {
    let signer = signer();
    let request = parse_request(&pinned_record()).expect("valid record");
    let codes = signer
        .security_codes(request.data(), BkpCase::Lower)
        .expect("codes");
    signer.sign_envelope(&request, &codes).expect("envelope")
}

#[test]
fn digest_value_covers_the_body_bytes() {
    let envelope = sign_pinned();
    let body = slice_between(envelope.xml(), "<soap:Body ", "</soap:Body>");
    let digest = Base64::encode_string(&Sha256::digest(body.as_bytes()));

    assert_eq!(envelope.body_digest(), digest);
    assert!(
        envelope
            .xml()
            .contains(&format!("<DigestValue>{digest}</DigestValue>"))
    );
}

#[test]
fn signature_verifies_against_certificate_key() {
    let signer = signer();
    let envelope = sign_pinned();
    let signed_info = slice_between(envelope.xml(), "<SignedInfo ", "</SignedInfo>");

    let spki = signer
        .certificate()
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .expect("spki der");
    let public_key = RsaPublicKey::from_public_key_der(&spki).expect("rsa public key");
    let signature = Base64::decode_vec(envelope.signature()).expect("base64 signature");
    let hashed = Sha256::digest(signed_info.as_bytes());

    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, &signature)
        .expect("signature over SignedInfo verifies");
    assert!(
        envelope
            .xml()
            .contains(&format!("<SignatureValue>{}</SignatureValue>", envelope.signature()))
    );
}

#[test]
fn envelope_carries_token_codes_and_header() {
    let signer = signer();
    let envelope = sign_pinned();
    let xml = envelope.xml();

    assert!(xml.starts_with("<soap:Envelope "));
    assert!(xml.ends_with("</soap:Envelope>"));
    assert!(xml.contains(signer.token()));
    assert!(xml.contains(&format!(">{FIXTURE_PKP}</pkp>")));
    assert!(xml.contains(&format!(">{FIXTURE_BKP}</bkp>")));
    assert!(xml.contains(&format!(r#"uuid_zpravy="{RESPONSE_UUID}""#)));
    assert!(xml.contains(r#"dat_odesl="2020-03-05T18:56:00Z""#));
    assert!(xml.contains(r#"dat_trzby="2016-08-04T22:30:12Z""#));
    assert!(xml.contains(r#"celk_trzba="34113.00""#));
    assert!(xml.contains(r##"URI="#Body""##));
    assert!(!xml.contains('\n'));
}

#[test]
fn pinned_record_yields_identical_envelopes() {
    assert_eq!(sign_pinned(), sign_pinned());
}

#[test]
fn body_attributes_are_in_ordinal_order() {
    let envelope = sign_pinned();
    let data = slice_between(envelope.xml(), "<Data ", "</Data>");
    let names: Vec<&str> = data
        .trim_start_matches("<Data ")
        .split("\" ")
        .filter_map(|pair| pair.split_once('=').map(|(name, _)| name))
        .collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert!(names.contains(&"dic_popl"));
}
