use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Separator between signed fields. Chosen so no field content can forge a
/// boundary: the DSL forbids raw control characters outside string literals
/// and ids never contain them.
pub const FIELD_SEPARATOR: u8 = 0x1f;

/// Canonical byte form of an ordered field tuple: fields joined by
/// `FIELD_SEPARATOR`, UTF-8, no trailing separator.
pub fn canonical_fields(fields: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, f) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.extend_from_slice(f.as_bytes());
    }
    out
}

/// base64(HMAC-SHA256) over the canonical form of an ordered field tuple.
/// Downstream audit consumers recompute this to detect tampering.
pub fn sign_fields(secret: &[u8], fields: &[&str]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&canonical_fields(fields));
    STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_fields(secret: &[u8], fields: &[&str], signature_b64: &str) -> bool {
    let Ok(claimed) = STANDARD.decode(signature_b64) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&canonical_fields(fields));
    mac.verify_slice(&claimed).is_ok()
}
