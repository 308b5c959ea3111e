//! DPoP proof generation (RFC 9449).
//!
//! Proofs are ES256 JWS objects carrying the request method and URI, signed
//! with a per-process P-256 key whose public half travels in the header as a
//! JWK. For resource requests the proof binds the access token through
//! `ath = base64url(sha256(token))`, plus the server-issued nonce when one
//! has been captured.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use sds_core::AppError;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

pub struct DpopKey {
    signing_key: SigningKey,
}

impl DpopKey {
    /// Generate a fresh P-256 key pair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// The public key as a JWK, embedded in every proof header.
    pub fn public_jwk(&self) -> serde_json::Value {
        let point = self
            .signing_key
            .verifying_key()
            .to_encoded_point(false);
        let x = point.x().map(|x| URL_SAFE_NO_PAD.encode(x)).unwrap_or_default();
        let y = point.y().map(|y| URL_SAFE_NO_PAD.encode(y)).unwrap_or_default();
        serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": x,
            "y": y,
        })
    }

    /// Sign a proof for one request.
    ///
    /// `htu` is the target URI stripped of query and fragment. Pass the
    /// access token for resource requests (userinfo) and the latest
    /// `DPoP-Nonce` the server handed out, when there is one.
    pub fn proof(
        &self,
        method: &str,
        url: &Url,
        access_token: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<String, AppError> {
        let mut htu = url.clone();
        htu.set_query(None);
        htu.set_fragment(None);

        let header = serde_json::json!({
            "typ": "dpop+jwt",
            "alg": "ES256",
            "jwk": self.public_jwk(),
        });
        let mut payload = serde_json::json!({
            "jti": Uuid::new_v4().to_string(),
            "htm": method,
            "htu": htu.as_str(),
            "iat": Utc::now().timestamp(),
        });
        if let Some(token) = access_token {
            payload["ath"] = URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes())).into();
        }
        if let Some(nonce) = nonce {
            payload["nonce"] = nonce.into();
        }

        let encode = |value: &serde_json::Value| -> Result<String, AppError> {
            let bytes = serde_json::to_vec(value)
                .map_err(|e| AppError::System(format!("Failed to encode DPoP proof: {e}")))?;
            Ok(URL_SAFE_NO_PAD.encode(bytes))
        };
        let signing_input = format!("{}.{}", encode(&header)?, encode(&payload)?);
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }
}
