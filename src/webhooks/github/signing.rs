use anyhow::anyhow;
use rocket::{
    data::{ByteUnit, FromData, Outcome},
    http::Status,
    Data, Request,
};
use subtle::ConstantTimeEq;
use tracing::{trace, warn};

use crate::config::WebhookSecret;

const X_GITHUB_SIGNATURE: &str = "X-Hub-Signature-256";

/// Checks `signature` (the raw `X-Hub-Signature-256` header value) against the HMAC-SHA256 of
/// `body` keyed with `secret`.
///
/// The expected value is rebuilt as `sha256=<lowercase hex>` and compared byte for byte in
/// constant time. A length mismatch returns early, the length isn't secret.
pub fn verify_signature(body: &[u8], signature: Option<&str>, secret: &[u8]) -> bool {
    use hmac::{Hmac, Mac, NewMac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signature = match signature {
        Some(s) => s,
        None => {
            trace!("no signature provided");
            return false;
        }
    };

    // HMAC accepts keys of any length, but don't panic on it anyway
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);

    // GitHub puts a prefix in front of its hex SHA256
    let digest = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    if digest.len() != signature.len() {
        trace!("signature has the wrong length");
        return false;
    }

    bool::from(digest.as_bytes().ct_eq(signature.as_bytes()))
}

/// Raw webhook body, only constructed once the signature gate let it through.
pub struct SignedGitHubPayload(pub Vec<u8>);

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

#[rocket::async_trait]
impl<'r> FromData<'r> for SignedGitHubPayload {
    type Error = anyhow::Error;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        trace!("received payload on GitHub webhook endpoint: {:?}", request);

        let secret = match request.rocket().state::<WebhookSecret>() {
            Some(secret) => secret,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    anyhow!("webhook secret isn't managed by rocket"),
                ))
            }
        };

        // HMAC is computed over the whole body, so buffer all of it first
        let size_limit = request.limits().get("json").unwrap_or(LIMIT);
        let content = match data.open(size_limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                warn!("payload was bigger than {}, rejecting it", size_limit);
                return Outcome::Error((
                    Status::InternalServerError,
                    anyhow!("data limit exceeded"),
                ));
            }
            Err(e) => return Outcome::Error((Status::InternalServerError, e.into())),
        };

        if secret.skip_verification {
            trace!("signature verification is disabled, accepting payload");
            return Outcome::Success(SignedGitHubPayload(content));
        }

        let signature = request.headers().get_one(X_GITHUB_SIGNATURE);
        if !verify_signature(&content, signature, secret.secret.as_bytes()) {
            trace!("signature validation failed, stopping here...");
            return Outcome::Error((Status::Unauthorized, anyhow!("couldn't verify signature")));
        }

        trace!("validated GitHub payload");
        Outcome::Success(SignedGitHubPayload(content))
    }
}

#[cfg(test)]
mod tests {
    use hmac::{Hmac, Mac, NewMac};
    use sha2::Sha256;

    use super::*;

    const SECRET: &[u8] = b"It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    fn sign(body: &[u8], secret: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_github_documented_signature() {
        // example from GitHub's "validating webhook deliveries" documentation
        let signature = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

        assert_eq!(sign(BODY, SECRET), signature);
        assert!(verify_signature(BODY, Some(signature), SECRET));
    }

    #[test]
    fn rejects_missing_signature() {
        assert!(!verify_signature(BODY, None, SECRET));
        assert!(!verify_signature(b"", None, b""));
    }

    #[test]
    fn rejects_every_single_byte_mutation() {
        let signature = sign(BODY, SECRET);

        for i in 0..BODY.len() {
            let mut mutated = BODY.to_vec();
            mutated[i] ^= 0x01;
            assert!(
                !verify_signature(&mutated, Some(&signature), SECRET),
                "mutation at byte {} was accepted",
                i
            );
        }
    }

    #[test]
    fn rejects_wrong_secret() {
        let signature = sign(BODY, b"another secret");
        assert!(!verify_signature(BODY, Some(&signature), SECRET));
    }

    #[test]
    fn rejects_malformed_headers() {
        let signature = sign(BODY, SECRET);
        let bare_hex = signature.strip_prefix("sha256=").unwrap();

        assert!(!verify_signature(BODY, Some(bare_hex), SECRET));
        assert!(!verify_signature(BODY, Some(""), SECRET));
        assert!(!verify_signature(BODY, Some("sha256=not hex at all"), SECRET));
        assert!(!verify_signature(BODY, Some(&format!("{}00", signature)), SECRET));
        assert!(!verify_signature(
            BODY,
            Some(&format!("sha1={}", bare_hex)),
            SECRET
        ));
        // the comparison is over the exact header bytes
        assert!(!verify_signature(
            BODY,
            Some(&format!("sha256={}", bare_hex.to_uppercase())),
            SECRET
        ));
    }

    #[test]
    fn empty_body_and_secret() {
        let signature = sign(b"", b"");
        assert!(verify_signature(b"", Some(&signature), b""));
    }
}
