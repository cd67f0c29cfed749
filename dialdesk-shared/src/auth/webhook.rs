/// Voice provider webhook signatures
///
/// The provider signs each webhook with the account auth token:
///
/// 1. Start from the full URL the provider requested, query string included.
/// 2. For form-encoded POSTs, sort the body parameters by name and append
///    each name immediately followed by its value.
/// 3. HMAC-SHA1 the result with the auth token and base64-encode it.
///
/// The result is sent in the `X-Twilio-Signature` header. Verification
/// decodes the header and compares the MAC in constant time.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

fn signed_payload(url: &str, params: &[(String, String)]) -> Vec<u8> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut payload = url.as_bytes().to_vec();
    for (name, value) in sorted {
        payload.extend_from_slice(name.as_bytes());
        payload.extend_from_slice(value.as_bytes());
    }
    payload
}

fn mac_for(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(&signed_payload(url, params));
    Some(mac)
}

/// Computes the base64 signature the provider would send
///
/// Returns an empty string only if the MAC cannot be keyed, which HMAC
/// never refuses.
pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    mac_for(auth_token, url, params)
        .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Verifies a signature header value in constant time
pub fn verify_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };

    mac_for(auth_token, url, params)
        .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("To".to_string(), "+18005551212".to_string()),
            ("CallSid".to_string(), "CA1234567890ABCDE".to_string()),
            ("From".to_string(), "+12349013030".to_string()),
            ("Caller".to_string(), "+12349013030".to_string()),
            ("Digits".to_string(), "1234".to_string()),
        ]
    }

    #[test]
    fn test_known_signature() {
        // Example from the provider's published request-validation docs
        let signature = compute_signature(
            "12345",
            "https://mycompany.com/myapp.php?foo=1&bar=2",
            &params(),
        );
        assert_eq!(signature, "0/KCTR6DLpKmkAf8muzZqo1nDgQ=");
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let mut reversed = params();
        reversed.reverse();
        let url = "https://api.example.com/webhooks/voice/status";

        assert_eq!(
            compute_signature("token", url, &params()),
            compute_signature("token", url, &reversed)
        );
    }

    #[test]
    fn test_verify() {
        let url = "https://api.example.com/webhooks/voice/status";
        let signature = compute_signature("secret-token", url, &params());

        assert!(verify_signature("secret-token", url, &params(), &signature));
        assert!(!verify_signature("other-token", url, &params(), &signature));
        assert!(!verify_signature("secret-token", "https://api.example.com/other", &params(), &signature));

        let mut tampered = params();
        tampered[0].1 = "+19999999999".to_string();
        assert!(!verify_signature("secret-token", url, &tampered, &signature));

        assert!(!verify_signature("secret-token", url, &params(), "not base64!"));
        assert!(!verify_signature("secret-token", url, &params(), ""));
    }
}
