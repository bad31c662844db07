//! Telegram `initData` verification and session-token issuance.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Validates a raw `initData` query string against the bot token.
///
/// The `hash` field is removed, the remaining pairs are rendered as
/// `key=value` lines, sorted, joined with `\n`, and HMAC-SHA-256'd under
/// `SHA-256(bot_token)`. Telegram's reference algorithm sorts by key alone;
/// sorting the joined `key=value` lines is kept as-is for parity with the
/// deployed verifier.
///
/// Pure: never errors, never touches state. `false` on empty inputs or a
/// missing `hash`.
pub fn verify_init_data(bot_token: &str, raw: &str) -> bool {
    if bot_token.is_empty() || raw.is_empty() {
        return false;
    }

    let mut provided = None;
    let mut lines = Vec::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        if key == "hash" {
            provided = Some(value.into_owned());
        } else {
            lines.push(format!("{key}={value}"));
        }
    }
    let Some(provided) = provided else {
        return false;
    };

    lines.sort();
    let check_string = lines.join("\n");

    let secret_key = Sha256::digest(bot_token.as_bytes());
    let Ok(mut mac) = HmacSha256::new_from_slice(secret_key.as_slice()) else {
        return false;
    };
    mac.update(check_string.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    expected == provided
}

/// Claims carried by the session token handed back after a verified login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Issues a short-lived HS256 token for the verified user.
pub fn issue_session_token(
    secret: &str,
    uid: i64,
    is_admin: bool,
    ttl_minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: uid.to_string(),
        admin: is_admin,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Decodes and validates a session token.
pub fn decode_session_token(
    secret: &str,
    token: &str,
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "12345:test-bot-token";

    /// Signs `pairs` the way the verifier expects: lines in the exact order
    /// given, joined with newlines.
    fn sign(bot_token: &str, pairs: &[(&str, &str)]) -> String {
        let check_string = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");
        let secret_key = Sha256::digest(bot_token.as_bytes());
        let mut mac = HmacSha256::new_from_slice(secret_key.as_slice()).unwrap();
        mac.update(check_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn encode_query(pairs: &[(&str, &str)], hash: &str) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            ser.append_pair(k, v);
        }
        ser.append_pair("hash", hash);
        ser.finish()
    }

    #[test]
    fn accepts_correctly_signed_payload() {
        let pairs = [
            ("auth_date", "1700000000"),
            ("query_id", "AAF9xyz"),
            ("user", r#"{"id":42,"first_name":"Ann"}"#),
        ];
        let hash = sign(TOKEN, &pairs);
        let raw = encode_query(&pairs, &hash);
        assert!(verify_init_data(TOKEN, &raw));
    }

    #[test]
    fn rejects_tampered_payload() {
        let pairs = [("auth_date", "1700000000"), ("query_id", "AAF9xyz")];
        let hash = sign(TOKEN, &pairs);
        let tampered = [("auth_date", "1700000001"), ("query_id", "AAF9xyz")];
        let raw = encode_query(&tampered, &hash);
        assert!(!verify_init_data(TOKEN, &raw));
    }

    #[test]
    fn rejects_wrong_bot_token() {
        let pairs = [("auth_date", "1700000000")];
        let hash = sign(TOKEN, &pairs);
        let raw = encode_query(&pairs, &hash);
        assert!(!verify_init_data("999:other-token", &raw));
    }

    #[test]
    fn rejects_empty_inputs_and_missing_hash() {
        assert!(!verify_init_data("", "auth_date=1"));
        assert!(!verify_init_data(TOKEN, ""));
        assert!(!verify_init_data(TOKEN, "auth_date=1&query_id=x"));
    }

    #[test]
    fn sorts_joined_lines_not_keys() {
        // Key order and joined-line order disagree here: "user" < "user2" as
        // keys, but "user2=a" < "user=z" as lines ('2' < '='). The signature
        // is computed over the line ordering; verification must agree.
        let line_ordered = [("user2", "a"), ("user", "z")];
        let hash = sign(TOKEN, &line_ordered);
        let raw = encode_query(&[("user", "z"), ("user2", "a")], &hash);
        assert!(verify_init_data(TOKEN, &raw));

        let key_ordered = [("user", "z"), ("user2", "a")];
        let wrong_hash = sign(TOKEN, &key_ordered);
        let raw = encode_query(&key_ordered, &wrong_hash);
        assert!(!verify_init_data(TOKEN, &raw));
    }

    #[test]
    fn percent_encoded_values_verify_after_decoding() {
        // The check string is built over decoded values, as a browser's
        // URLSearchParams yields them.
        let pairs = [("user", r#"{"id":7,"first_name":"Ann Lee"}"#)];
        let hash = sign(TOKEN, &pairs);
        let raw = encode_query(&pairs, &hash);
        assert!(raw.contains('%'));
        assert!(verify_init_data(TOKEN, &raw));
    }

    #[test]
    fn session_token_roundtrip() {
        let token = issue_session_token("secret", 42, true, 60).unwrap();
        let claims = decode_session_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "42");
        assert!(claims.admin);
        assert!(claims.exp > claims.iat);
        assert!(decode_session_token("other", &token).is_err());
    }
}
