//! Signed, time-boxed accept tokens.
//!
//! Wire format: `<header>.<claims>.<signature>`, each segment base64url
//! without padding. The signature is HMAC-SHA256 over `<header>.<claims>`.
//! Tokens are never stored; validity is signature + expiry only.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_ISSUER: &str = "qnc";
pub const TOKEN_ALGORITHM: &str = "HS256";
pub const DEFAULT_TTL_SECONDS: i64 = 60 * 60 * 12;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptClaims {
    #[serde(rename = "dealId")]
    pub deal_id: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iss")]
    pub issuer: String,
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("accept token is malformed")]
    Malformed,
    #[error("accept token signature does not match")]
    BadSignature,
    #[error("accept token has expired")]
    Expired,
}

pub fn mint(deal_id: &str, ttl_seconds: i64, secret: &[u8]) -> String {
    mint_at(deal_id, ttl_seconds, secret, Utc::now().timestamp())
}

pub fn mint_at(deal_id: &str, ttl_seconds: i64, secret: &[u8], issued_at: i64) -> String {
    let claims = json!({
        "dealId": deal_id,
        "iat": issued_at,
        "exp": issued_at.saturating_add(ttl_seconds),
        "iss": TOKEN_ISSUER,
    });

    let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{header}.{claims}");
    let signature = URL_SAFE_NO_PAD.encode(sign(secret, signing_input.as_bytes()));

    format!("{signing_input}.{signature}")
}

pub fn verify(token: &str, secret: &[u8]) -> Result<AcceptClaims, TokenError> {
    verify_at(token, secret, Utc::now().timestamp())
}

pub fn verify_at(token: &str, secret: &[u8], now: i64) -> Result<AcceptClaims, TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenError::Malformed);
    };
    if header.is_empty() || claims.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }

    let signing_input = &token[..header.len() + 1 + claims.len()];
    let expected = sign(secret, signing_input.as_bytes());
    let provided = URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::BadSignature)?;
    if provided.len() != expected.len()
        || !bool::from(provided.as_slice().ct_eq(expected.as_slice()))
    {
        return Err(TokenError::BadSignature);
    }

    let header: TokenHeader = decode_segment(header)?;
    if header.alg != TOKEN_ALGORITHM {
        return Err(TokenError::Malformed);
    }

    let claims: AcceptClaims = decode_segment(claims)?;
    if now > claims.expires_at {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

fn sign(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail in practice.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}
