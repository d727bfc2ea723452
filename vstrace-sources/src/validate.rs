//! Shared HMAC-SHA256 payload validation.
//!
//! Every adapter either trusts the body unconditionally (no secret
//! configured, matching the original's behavior when `secretKey` is nil) or
//! verifies a hex-encoded HMAC-SHA256 digest in constant time. Vendor
//! adapters each have their own signature header convention and digest
//! prefix; `customhttp` uses the generic `X-VS-Signature` header this
//! system introduced.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The generic signature header used by the `customhttp` adapter.
pub const SIGNATURE_HEADER: &str = "X-VS-Signature";

/// Computes the hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies `signature` (a hex digest, optionally prefixed `sha256=` as
/// GitHub/GitLab do) against an HMAC-SHA256 of `body` under `secret`.
/// Constant-time: never short-circuits on the first mismatched byte.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.ct_eq(&provided[..]).into()
}

/// Validates `body` against `signature` only when `secret` is configured.
/// With no secret, the body passes through unconditionally, matching the
/// original's pass-through when no webhook secret is set for a source.
pub fn validate(secret: Option<&[u8]>, body: &[u8], signature: Option<&str>) -> bool {
    match secret {
        None => true,
        Some(secret) => match signature {
            Some(signature) => verify(secret, body, signature),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn round_trips_sign_and_verify() {
        let secret = b"topsecret";
        let body = b"{\"action\":\"opened\"}";
        let sig = sign(secret, body);
        assert!(verify(secret, body, &sig));
        assert!(verify(secret, body, &format!("sha256={sig}")));
    }

    #[rstest]
    fn rejects_tampered_body() {
        let secret = b"topsecret";
        let sig = sign(secret, b"original");
        assert!(!verify(secret, b"tampered", &sig));
    }

    #[rstest]
    fn rejects_malformed_signature() {
        assert!(!verify(b"secret", b"body", "not-hex!!"));
    }

    #[rstest]
    fn no_secret_passes_through() {
        assert!(validate(None, b"anything", None));
    }

    #[rstest]
    fn secret_without_signature_header_fails() {
        assert!(!validate(Some(b"secret"), b"body", None));
    }
}
