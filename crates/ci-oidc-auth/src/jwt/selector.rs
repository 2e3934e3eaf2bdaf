//! Signing key selection
//!
//! Matches a token header against a key set: the declared `alg` must be on the
//! allow-list, then the first key whose `kid` equals the header's `kid` wins.
//! Key sets are small, so a linear scan is all that is needed.

use jsonwebtoken::jwk::Jwk;
use serde_json::Value;
use tracing::debug;

use super::{KeySet, TokenHeader};
use crate::error::{VerifyError, VerifyResult};

/// Algorithms a CI identity token may be signed with
pub const ALLOWED_ALGORITHMS: &[&str] = &["RS256"];

/// Rendering of an absent header field in error messages
const ABSENT: &str = "None";

/// The key a token will be verified against
#[derive(Debug, Clone)]
pub struct SigningKey {
    /// Key identifier the key was matched on
    pub kid: String,
    /// Algorithm the token header declared
    pub alg: String,
    /// Parsed key material
    pub jwk: Jwk,
}

/// Select the signing key for `header` using the default allow-list
///
/// # Errors
///
/// See [`select_key_allowing`].
pub fn select_key(key_set: &KeySet, header: &TokenHeader) -> VerifyResult<SigningKey> {
    select_key_allowing(key_set, header, ALLOWED_ALGORITHMS)
}

/// Select the signing key for `header`, accepting only `allowed` algorithms
///
/// # Errors
///
/// - [`VerifyError::AlgorithmNotAllowed`] if `alg` is absent or not allowed.
///   Checked before any key lookup.
/// - [`VerifyError::KeyNotFound`] if `kid` is absent or matches no key
/// - [`VerifyError::SignatureOrClaimInvalid`] if the matched key is not a usable JWK
pub fn select_key_allowing<S: AsRef<str>>(
    key_set: &KeySet,
    header: &TokenHeader,
    allowed: &[S],
) -> VerifyResult<SigningKey> {
    let alg = match header.alg.as_deref() {
        Some(alg) if allowed.iter().any(|a| a.as_ref() == alg) => alg,
        other => {
            return Err(VerifyError::AlgorithmNotAllowed(
                other.unwrap_or(ABSENT).to_string(),
            ));
        }
    };

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| VerifyError::KeyNotFound(ABSENT.to_string()))?;

    let raw = key_set
        .keys
        .iter()
        .filter(|key| key.is_object())
        .find(|key| key.get("kid").and_then(Value::as_str) == Some(kid))
        .ok_or_else(|| {
            debug!(kid, available = key_set.len(), "no key matches token kid");
            VerifyError::KeyNotFound(kid.to_string())
        })?;

    let jwk: Jwk = serde_json::from_value(raw.clone())
        .map_err(|e| VerifyError::invalid(format!("unusable signing key {kid}: {e}")))?;

    Ok(SigningKey {
        kid: kid.to_string(),
        alg: alg.to_string(),
        jwk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rsa_key(kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": kid,
            "n": "ohj8MKIuxmZ0ENPclpDBzb5jdq059IaqSm1mkakymHaCTyO8wGWsQuoOH8kJ2vi5ttrUPIOyIOVTa1ofQ7rbCvKvWvQvTSUVjgLyVucU5UXmW7FqJiWju3Fxmu3QRDeGJcuGCiPjnFlyLSaiilAgFJ7zA3pBtYTgbu4Yi_v-Pr6Vt0zB9or9mzzC9tOIN_lJDNWPnM22dvbh8N1J3w9ZkarXcolnVsAK7NHlACIv3yEPoUdfJVbASt73ceiQDwB0L9Vq0rbwCEgtG98fcMEznJdhB-5VpA1kllxINk3On63KQpLNLcP_8H2rhqdXQzNmNxMY-Sj3DEuY_s-CTe4nHw",
            "e": "AQAB",
        })
    }

    fn header(alg: Option<&str>, kid: Option<&str>) -> TokenHeader {
        TokenHeader {
            alg: alg.map(String::from),
            kid: kid.map(String::from),
        }
    }

    fn key_set(keys: Vec<Value>) -> KeySet {
        KeySet { keys }
    }

    #[test]
    fn test_selects_matching_kid_regardless_of_order() {
        for keys in [
            vec![rsa_key("A"), rsa_key("B")],
            vec![rsa_key("B"), rsa_key("A")],
        ] {
            let key = select_key(&key_set(keys), &header(Some("RS256"), Some("B"))).unwrap();
            assert_eq!(key.kid, "B");
            assert_eq!(key.jwk.common.key_id.as_deref(), Some("B"));
        }
    }

    #[test]
    fn test_unknown_kid() {
        let keys = key_set(vec![rsa_key("A"), rsa_key("B")]);
        let err = select_key(&keys, &header(Some("RS256"), Some("C"))).unwrap_err();
        assert_eq!(err, VerifyError::KeyNotFound("C".into()));
    }

    #[test]
    fn test_missing_kid() {
        let keys = key_set(vec![rsa_key("A")]);
        let err = select_key(&keys, &header(Some("RS256"), None)).unwrap_err();
        assert_eq!(err, VerifyError::KeyNotFound("None".into()));
    }

    #[test]
    fn test_algorithm_checked_before_lookup() {
        // kid "C" does not exist: the algorithm error must still win.
        let keys = key_set(vec![rsa_key("A")]);
        for alg in ["HS256", "none", "ES256"] {
            let err = select_key(&keys, &header(Some(alg), Some("C"))).unwrap_err();
            assert_eq!(err, VerifyError::AlgorithmNotAllowed(alg.into()));
        }

        let err = select_key(&keys, &header(None, Some("A"))).unwrap_err();
        assert_eq!(err, VerifyError::AlgorithmNotAllowed("None".into()));
    }

    #[test]
    fn test_first_match_wins_and_junk_is_skipped() {
        let mut second = rsa_key("A");
        second["use"] = json!("enc");
        let keys = key_set(vec![json!("junk"), json!(42), rsa_key("A"), second]);

        let key = select_key(&keys, &header(Some("RS256"), Some("A"))).unwrap();
        assert_eq!(
            key.jwk.common.public_key_use,
            Some(jsonwebtoken::jwk::PublicKeyUse::Signature)
        );
    }

    #[test]
    fn test_unusable_key_material() {
        let keys = key_set(vec![json!({"kid": "A", "kty": "RSA"})]);
        let err = select_key(&keys, &header(Some("RS256"), Some("A"))).unwrap_err();
        assert!(matches!(err, VerifyError::SignatureOrClaimInvalid(_)));
    }

    #[test]
    fn test_custom_allow_list() {
        let keys = key_set(vec![rsa_key("A")]);
        let allowed = vec!["RS256".to_string(), "RS384".to_string()];

        let err = select_key_allowing(&keys, &header(Some("RS512"), Some("A")), &allowed)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AlgorithmNotAllowed);
        assert!(select_key_allowing(&keys, &header(Some("RS384"), Some("A")), &allowed).is_ok());
    }
}
