use chrono::{DateTime, FixedOffset};
use eet_core::receipt::SaleRecord;
use eet_core::receipt::sign::EnvelopeSigner;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[allow(dead_code)]
pub const RESPONSE_UUID: &str = "ae0af488-5115-48c0-8d10-0861a2921981";
#[allow(dead_code)]
pub const RESPONSE_BKP: &str = "6d8adb2d-a3a20e55-b78e8168-b240c580-38c71f7d";
#[allow(dead_code)]
pub const RESPONSE_FIK: &str = "f741687f-61c8-4672-917a-46bcf8eff62d-fa";

/// PKP of the reference sale signed with the fixture key, and its BKP.
#[allow(dead_code)]
pub const FIXTURE_PKP: &str = "Lror80O7YcHLWwWXjr7ZDYjb4ToM7EEgDuxcgSZjc3qNGoWpr/4VabWOZ9Lazbo91QnrS3zPF9Cxb4+K+rlSDZoqR11vE1PLbpRA/A8b++dwUXVU1nxB8s6g6UIAaiOAx3vb9RP/InY6qUp9h91m86udYdMjaQ0vwEhg5dsRPhpbRqnfgL7aDr6Kn2PbpdKXy0ehoH8i5ptxFJQhy/BkAxPXgEvv0FoE8Xhwa5DTwB3IsFVi55gtwxfU1rAEBoUzsDit4IhykAwAewhrYSsDW5Mbs0M11l9HkcGzpimrcqcLqVYNKyY58D6PlIIaacUdTvR+14TSGQMPqp7mT0hl6w==";
#[allow(dead_code)]
pub const FIXTURE_BKP: &str = "8f32aa0f-a87538c7-4e672f25-c358452f-97d31df9";

pub fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

pub fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative)).expect("read fixture")
}

#[allow(dead_code)]
pub fn signer() -> EnvelopeSigner {
    EnvelopeSigner::from_pem(
        &read_fixture("keys/certificate.pem"),
        &read_fixture("keys/private.pem"),
    )
    .expect("fixture signer")
}

#[allow(dead_code)]
pub fn sold_at() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2016-08-05T00:30:12+02:00").expect("timestamp")
}

/// The reference sale: CZ1212121218 / 273 / /5546/RO24 / 0/6460/ZQ42, 34113.00 CZK.
#[allow(dead_code)]
pub fn reference_record() -> SaleRecord {
    SaleRecord::new("CZ1212121218", 273, "/5546/RO24", "0/6460/ZQ42", sold_at(), 3411300)
}

/// Reference sale with the header pinned so the envelope is reproducible.
#[allow(dead_code)]
pub fn pinned_record() -> SaleRecord {
    let mut record = reference_record();
    record.message_uuid = Some(Uuid::parse_str(RESPONSE_UUID).expect("uuid"));
    record.sent_at = Some(
        DateTime::parse_from_rfc3339("2020-03-05T19:56:00+01:00").expect("timestamp"),
    );
    record
}
