//! HTTP Signatures (draft-cavage) verification for incoming webhooks.
//!
//! The CI server signs each delivery with a shared secret and sends
//! the result in a `Signature` header (or `Authorization: Signature ...`):
//!
//! ```text
//! keyId="hook",algorithm="hmac-sha256",headers="date content-length",signature="<base64>"
//! ```
//!
//! The signing string is built from the listed headers, one `name: value`
//! line each. Verification fails closed: anything that cannot be parsed or
//! recomputed is reported as missing/malformed rather than valid.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "signature";
const AUTHORIZATION_HEADER: &str = "authorization";
const AUTHORIZATION_SCHEME: &str = "Signature ";

/// Pseudo-header covering the method and path of the request
pub const REQUEST_TARGET: &str = "(request-target)";
/// Headers every accepted signature must cover
const REQUIRED_SIGNED_HEADERS: &[&str] = &["date"];

// =============================================================================
// Errors / Outcome
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no signature header present")]
    MissingHeader,

    #[error("malformed signature parameters: {0}")]
    Malformed(String),

    #[error("unexpected signature parameter '{0}'")]
    UnknownParameter(String),

    #[error("signature is missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signature is not valid base64")]
    InvalidEncoding,

    #[error("signed header '{0}' is not present in the request")]
    MissingSignedHeader(String),

    #[error("signature does not cover required header '{0}'")]
    UncoveredHeader(&'static str),
}

/// Result of checking a request against the shared secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    MissingOrMalformed(SignatureError),
    Invalid,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

// =============================================================================
// Algorithm
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    HmacSha256,
    HmacSha512,
}

impl Algorithm {
    pub fn parse(name: &str) -> Result<Self, SignatureError> {
        match name.to_ascii_lowercase().as_str() {
            "hmac-sha256" => Ok(Algorithm::HmacSha256),
            "hmac-sha512" => Ok(Algorithm::HmacSha512),
            _ => Err(SignatureError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::HmacSha256 => "hmac-sha256",
            Algorithm::HmacSha512 => "hmac-sha512",
        }
    }

    fn compute(&self, secret: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::HmacSha256 => {
                let mut mac = HmacSha256::new_from_slice(secret)
                    .expect("HMAC can take key of any size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Algorithm::HmacSha512 => {
                let mut mac = HmacSha512::new_from_slice(secret)
                    .expect("HMAC can take key of any size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    /// Constant-time comparison via the HMAC library
    fn verify(&self, secret: &[u8], data: &[u8], expected: &[u8]) -> bool {
        match self {
            Algorithm::HmacSha256 => HmacSha256::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(data);
                    mac.verify_slice(expected).is_ok()
                })
                .unwrap_or(false),
            Algorithm::HmacSha512 => HmacSha512::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(data);
                    mac.verify_slice(expected).is_ok()
                })
                .unwrap_or(false),
        }
    }
}

// =============================================================================
// Request view
// =============================================================================

/// Framework-independent view of the parts of a request that get signed
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    method: String,
    target: String,
    headers: BTreeMap<String, String>,
    body: &'a [u8],
}

impl<'a> SignedRequest<'a> {
    pub fn new(method: &str, target: &str, body: &'a [u8]) -> Self {
        Self {
            method: method.to_ascii_lowercase(),
            target: target.to_string(),
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Adds a header value. Repeated headers are joined with ", ".
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value.trim());
            })
            .or_insert_with(|| value.trim().to_string());
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Value that goes into the signing string for `name`.
    ///
    /// `content-length` is taken from the received body rather than the
    /// header so a truncated or padded body cannot reuse a signature.
    fn signed_value(&self, name: &str) -> Result<String, SignatureError> {
        match name {
            REQUEST_TARGET => Ok(format!("{} {}", self.method, self.target)),
            "content-length" => Ok(self.body.len().to_string()),
            _ => self
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| SignatureError::MissingSignedHeader(name.to_string())),
        }
    }

    fn signature_value(&self) -> Option<&str> {
        self.get(SIGNATURE_HEADER).or_else(|| {
            self.get(AUTHORIZATION_HEADER)
                .and_then(|value| value.strip_prefix(AUTHORIZATION_SCHEME))
        })
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Parsed `Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub key_id: String,
    pub algorithm: Algorithm,
    pub headers: Vec<String>,
    pub signature: Vec<u8>,
}

/// Parses `key="value"` pairs separated by commas.
///
/// Unknown or repeated keys are rejected.
pub fn parse_signature_header(value: &str) -> Result<SignatureParams, SignatureError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    let mut rest = value.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest
            .split_once('=')
            .ok_or_else(|| {
                SignatureError::Malformed(format!("expected key=value in '{}'", rest))
            })?;
        let key = key.trim();
        let after_quote = after_key
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| {
                SignatureError::Malformed(format!("value of '{}' is not quoted", key))
            })?;
        let (param, remainder) = after_quote
            .split_once('"')
            .ok_or_else(|| {
                SignatureError::Malformed(format!("unterminated value for '{}'", key))
            })?;

        let slot = match key {
            "keyId" => &mut key_id,
            "algorithm" => &mut algorithm,
            "headers" => &mut headers,
            "signature" => &mut signature,
            other => return Err(SignatureError::UnknownParameter(other.to_string())),
        };
        if slot.replace(param).is_some() {
            return Err(SignatureError::Malformed(format!("duplicate parameter '{}'", key)));
        }

        let remainder = remainder.trim_start();
        rest = match remainder.strip_prefix(',') {
            Some(next) => next.trim_start(),
            None if remainder.is_empty() => remainder,
            None => {
                return Err(SignatureError::Malformed(format!(
                    "unexpected text after '{}'",
                    key
                )))
            }
        };
    }

    let key_id = key_id
        .filter(|id| !id.is_empty())
        .ok_or(SignatureError::MissingParameter("keyId"))?;
    let algorithm = algorithm.ok_or(SignatureError::MissingParameter("algorithm"))?;
    let algorithm = Algorithm::parse(algorithm)?;
    let signature = signature
        .filter(|sig| !sig.is_empty())
        .ok_or(SignatureError::MissingParameter("signature"))?;
    let signature = STANDARD
        .decode(signature)
        .map_err(|_| SignatureError::InvalidEncoding)?;
    let headers = match headers {
        Some(list) => list
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect(),
        None => vec!["date".to_string()],
    };

    Ok(SignatureParams {
        key_id: key_id.to_string(),
        algorithm,
        headers,
        signature,
    })
}

/// Builds the newline-separated string that the HMAC is computed over
pub fn signing_string(
    headers: &[String],
    request: &SignedRequest<'_>,
) -> Result<String, SignatureError> {
    let lines = headers
        .iter()
        .map(|name| Ok(format!("{}: {}", name, request.signed_value(name)?)))
        .collect::<Result<Vec<_>, SignatureError>>()?;
    Ok(lines.join("\n"))
}

/// Checks a `Digest: SHA-256=<base64>` header against the body, if present
fn digest_matches(request: &SignedRequest<'_>) -> bool {
    let Some(digest) = request.get("digest") else {
        return true;
    };
    digest
        .split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .find(|(algorithm, _)| algorithm.eq_ignore_ascii_case("SHA-256"))
        .is_some_and(|(_, encoded)| encoded == STANDARD.encode(Sha256::digest(request.body)))
}

// =============================================================================
// Verify / Sign
// =============================================================================

/// Verifies the request signature against the shared secret.
pub fn verify(secret: &str, request: &SignedRequest<'_>) -> Verification {
    let header = match request.signature_value() {
        Some(header) => header,
        None => return Verification::MissingOrMalformed(SignatureError::MissingHeader),
    };

    let params = match parse_signature_header(header) {
        Ok(params) => params,
        Err(e) => return Verification::MissingOrMalformed(e),
    };

    if let Some(uncovered) = REQUIRED_SIGNED_HEADERS
        .iter()
        .find(|required| !params.headers.iter().any(|h| h == *required))
    {
        return Verification::MissingOrMalformed(SignatureError::UncoveredHeader(*uncovered));
    }

    let signing = match signing_string(&params.headers, request) {
        Ok(signing) => signing,
        Err(e) => return Verification::MissingOrMalformed(e),
    };

    if !params
        .algorithm
        .verify(secret.as_bytes(), signing.as_bytes(), &params.signature)
    {
        return Verification::Invalid;
    }

    if params.headers.iter().any(|h| h == "digest") && !digest_matches(request) {
        return Verification::Invalid;
    }

    Verification::Valid
}

/// Produces a `Signature` header value for the request.
///
/// Used by tests and tooling that need to talk to the webhook endpoint.
pub fn sign(
    secret: &str,
    key_id: &str,
    algorithm: Algorithm,
    headers: &[&str],
    request: &SignedRequest<'_>,
) -> Result<String, SignatureError> {
    let headers: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let signing = signing_string(&headers, request)?;
    let signature = algorithm.compute(secret.as_bytes(), signing.as_bytes());

    Ok(format!(
        r#"keyId="{}",algorithm="{}",headers="{}",signature="{}""#,
        key_id,
        algorithm.as_str(),
        headers.join(" "),
        STANDARD.encode(signature)
    ))
}
