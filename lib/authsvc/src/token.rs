//! Bearer token issuer/verifier: builds and verifies the
//! `header.payload.signature` envelope, backing onto
//! `aether::crypto` for the actual HMAC/RSA work.

use crate::model::Claims;
use aether::revocation::RevocationSet;
use aether::{encoding, time, Error, ErrorKind, Result};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Algorithm {
    Hs256,
    Rs256,
}

impl Algorithm {
    fn as_str(self) -> &'static str {
        match self {
            Algorithm::Hs256 => "HS256",
            Algorithm::Rs256 => "RS256",
        }
    }

    fn parse(alg: &str) -> Option<Algorithm> {
        match alg {
            "HS256" => Some(Algorithm::Hs256),
            "RS256" => Some(Algorithm::Rs256),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Header<'a> {
    alg: &'a str,
    typ: &'a str,
}

/// Configuration for the issuer/verifier: one of the two signing schemes,
/// an optional revocation set wired in to make `verify` reject revoked
/// tokens.
pub struct TokenIssuer {
    algorithm: Algorithm,
    hmac_key: Option<Vec<u8>>,
    rsa_private_key: Option<RsaPrivateKey>,
    rsa_public_key: Option<RsaPublicKey>,
    revocation_set: Option<Arc<RevocationSet>>,
}

impl TokenIssuer {
    pub fn hmac(key: Vec<u8>, revocation_set: Option<Arc<RevocationSet>>) -> Self {
        TokenIssuer {
            algorithm: Algorithm::Hs256,
            hmac_key: Some(key),
            rsa_private_key: None,
            rsa_public_key: None,
            revocation_set,
        }
    }

    pub fn rsa(
        private_key: Option<RsaPrivateKey>,
        public_key: Option<RsaPublicKey>,
        revocation_set: Option<Arc<RevocationSet>>,
    ) -> Self {
        TokenIssuer {
            algorithm: Algorithm::Rs256,
            hmac_key: None,
            rsa_private_key: private_key,
            rsa_public_key: public_key,
            revocation_set,
        }
    }

    pub fn revocation_set(&self) -> Option<&Arc<RevocationSet>> {
        self.revocation_set.as_ref()
    }

    /// Issue a signed access token with `lifetime_seconds` left to live.
    pub fn issue_access(&self, subject: &str, identifier: &str, roles: &[String], lifetime_seconds: u64) -> Result<String> {
        let now = time::timestamp_secs();
        let header = Header {
            alg: self.algorithm.as_str(),
            typ: "JWT",
        };
        let jti = aether::crypto::random_hex(16);
        let claims = Claims {
            sub: subject.to_string(),
            usr: identifier.to_string(),
            roles: roles.to_vec(),
            jti,
            iat: now,
            exp: now + lifetime_seconds,
        };

        let header_json = serde_json::to_vec(&header)
            .map_err(|e| Error::new(ErrorKind::InvalidArgument, e.to_string()))?;
        let payload_json = serde_json::to_vec(&claims)
            .map_err(|e| Error::new(ErrorKind::InvalidArgument, e.to_string()))?;

        let header_b64 = encoding::base64url_encode(&header_json);
        let payload_b64 = encoding::base64url_encode(&payload_json);
        let signing_input = format!("{header_b64}.{payload_b64}");

        let signature = self.sign(signing_input.as_bytes())?;
        let signature_b64 = encoding::base64url_encode(&signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Opaque refresh token: 32 random bytes, hex-encoded. Unsigned, never
    /// carries claims.
    pub fn issue_refresh(&self) -> String {
        aether::crypto::random_hex(32)
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            Algorithm::Hs256 => {
                let key = self
                    .hmac_key
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "no symmetric signing key configured"))?;
                Ok(aether::crypto::hmac_sha256(key, data)?.to_vec())
            }
            Algorithm::Rs256 => {
                let key = self
                    .rsa_private_key
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "no RSA private key configured"))?;
                aether::crypto::rsa_sha256_sign(key, data)
            }
        }
    }

    /// Verify and decode an access token, including expiry and revocation
    /// checks.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::new(ErrorKind::InvalidToken, "malformed token: expected 3 parts"));
        }
        let (header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);

        let header_bytes = encoding::base64url_decode(header_b64)?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|_| Error::new(ErrorKind::InvalidToken, "malformed token header"))?;

        let alg = Algorithm::parse(header.alg)
            .ok_or_else(|| Error::new(ErrorKind::InvalidToken, format!("unknown algorithm: {}", header.alg)))?;

        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = encoding::base64url_decode(signature_b64)?;

        let verified = match alg {
            Algorithm::Hs256 => {
                let key = self
                    .hmac_key
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "no symmetric signing key configured"))?;
                let expected = aether::crypto::hmac_sha256(key, signing_input.as_bytes())?;
                aether::crypto::constant_time_eq(&expected, &signature)
            }
            Algorithm::Rs256 => {
                let key = self
                    .rsa_public_key
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "no RSA public key configured"))?;
                aether::crypto::rsa_sha256_verify(key, signing_input.as_bytes(), &signature)
            }
        };

        if !verified {
            return Err(Error::new(ErrorKind::InvalidToken, "signature verification failed"));
        }

        let payload_bytes = encoding::base64url_decode(payload_b64)?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|_| Error::new(ErrorKind::InvalidToken, "malformed token payload"))?;

        let now = time::timestamp_secs();
        if now > claims.exp {
            return Err(Error::new(ErrorKind::TokenExpired, "access token has expired"));
        }

        if let Some(revocation_set) = &self.revocation_set {
            if revocation_set.is_revoked(&claims.jti, now) {
                return Err(Error::new(ErrorKind::TokenRevoked, "access token has been revoked"));
            }
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_hmac_roundtrips_claims() {
        let issuer = TokenIssuer::hmac(b"super-secret".to_vec(), None);
        let roles = vec!["player".to_string()];
        let token = issuer.issue_access("1", "Alice1", &roles, 900).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "1");
        assert_eq!(claims.usr, "Alice1");
        assert_eq!(claims.roles, roles);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_malformed_token() {
        let issuer = TokenIssuer::hmac(b"k".to_vec(), None);
        assert!(issuer.verify("not.a.valid.token").is_err());
        assert!(issuer.verify("onlyonepart").is_err());
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let issuer = TokenIssuer::hmac(b"k".to_vec(), None);
        let token = issuer.issue_access("1", "Alice1", &[], 900).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let tampered_sig = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        parts[2] = tampered_sig;
        let tampered = parts.join(".");
        assert!(issuer.verify(&tampered).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let issuer = TokenIssuer::hmac(b"k".to_vec(), None);
        let token = issuer.issue_access("1", "Alice1", &[], 0).unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        let result = issuer.verify(&token);
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::TokenExpired));
    }

    #[test]
    fn verify_rejects_revoked_jti() {
        let revocation_set = Arc::new(RevocationSet::new());
        let issuer = TokenIssuer::hmac(b"k".to_vec(), Some(revocation_set.clone()));
        let token = issuer.issue_access("1", "Alice1", &[], 900).unwrap();
        let claims = issuer.verify(&token).unwrap();
        let now = time::timestamp_secs();
        revocation_set.revoke(&claims.jti, claims.exp, now);
        let result = issuer.verify(&token);
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::TokenRevoked));
    }

    #[test]
    fn issue_refresh_is_64_char_hex() {
        let issuer = TokenIssuer::hmac(b"k".to_vec(), None);
        let refresh = issuer.issue_refresh();
        assert_eq!(refresh.len(), 64);
        assert!(refresh.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
