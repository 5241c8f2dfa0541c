//! HTTP message signatures over invocation requests.
//!
//! The signing string lists one `name: value` line per covered header, in
//! the order the `headers` parameter names them. The `(request-target)`
//! pseudo header stands for the lowercase method followed by the path and
//! query.

use crate::{
    header::{HeaderError, parse_parameters},
    request::InvocationRequest,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

/// Name of the header that carries the message signature.
pub const SIGNATURE_HEADER: &str = "signature";

/// Pseudo header covering the method, path and query.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Name of the header carrying the body digest.
pub const DIGEST_HEADER: &str = "digest";

/// Name of the header carrying the request time.
pub const DATE_HEADER: &str = "date";

/// Name of the header carrying the request authority.
pub const HOST_HEADER: &str = "host";

/// Parsed `signature` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Verification method of the signing key.
    pub key_id: String,
    /// Signature algorithm label, e.g. `ed25519`.
    pub algorithm: String,
    /// Covered headers in signing string order, lowercase.
    pub headers: Vec<String>,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

impl SignatureHeader {
    /// Returns true when `name` is among the covered headers.
    pub fn covers(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|covered| covered.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SignatureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            self.algorithm,
            self.headers.join(" "),
            STANDARD.encode(&self.signature)
        )
    }
}

impl FromStr for SignatureHeader {
    type Err = HeaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parameters = parse_parameters(value)?;

        let key_id = parameters
            .remove("keyId")
            .ok_or(HeaderError::MissingParameter("keyId"))?;
        let algorithm = parameters
            .remove("algorithm")
            .ok_or(HeaderError::MissingParameter("algorithm"))?;
        // draft-cavage defaults to covering only the date header
        let headers = parameters
            .remove("headers")
            .unwrap_or_else(|| DATE_HEADER.to_string())
            .split_ascii_whitespace()
            .map(str::to_ascii_lowercase)
            .collect();
        let signature = parameters
            .remove("signature")
            .ok_or(HeaderError::MissingParameter("signature"))?;
        let signature = STANDARD
            .decode(signature)
            .map_err(|error| HeaderError::Malformed(format!("signature: {error}")))?;

        Ok(Self {
            key_id,
            algorithm,
            headers,
            signature,
        })
    }
}

/// Build the string a message signature covers.
///
/// # Errors
///
/// Fails with [`HeaderError::MissingHeader`] when a covered header is not
/// set on `request`.
pub fn signing_string(
    request: &InvocationRequest,
    covered: &[String],
) -> Result<String, HeaderError> {
    let lines = covered
        .iter()
        .map(|name| {
            let name = name.to_ascii_lowercase();
            let value = if name == REQUEST_TARGET {
                request.request_target()
            } else {
                request
                    .header(&name)
                    .ok_or_else(|| HeaderError::MissingHeader(name.clone()))?
                    .trim()
                    .to_string()
            };
            Ok(format!("{name}: {value}"))
        })
        .collect::<Result<Vec<_>, HeaderError>>()?;

    Ok(lines.join("\n"))
}

/// The `digest` header value for `body`: `SHA-256=<base64>`.
pub fn content_digest(body: &[u8]) -> String {
    format!("SHA-256={}", STANDARD.encode(Sha256::digest(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;
    use url::Url;

    fn covered(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn it_builds_the_signing_string_in_covered_order() -> TestResult {
        let request =
            InvocationRequest::post(Url::parse("https://kms.example.com/kms/keystores/ks-1/keys")?)
                .with_header("Date", "Wed, 01 May 2024 10:00:00 GMT")
                .with_header("host", "kms.example.com");

        let signed = signing_string(&request, &covered(&["(request-target)", "host", "date"]))?;
        assert_eq!(
            signed,
            "(request-target): post /kms/keystores/ks-1/keys\n\
             host: kms.example.com\n\
             date: Wed, 01 May 2024 10:00:00 GMT"
        );
        Ok(())
    }

    #[test]
    fn it_requires_every_covered_header() -> TestResult {
        let request = InvocationRequest::get(Url::parse("https://kms.example.com/kms")?);
        assert_eq!(
            signing_string(&request, &covered(&["date"])),
            Err(HeaderError::MissingHeader("date".into()))
        );
        Ok(())
    }

    #[test]
    fn it_parses_what_it_formats() -> TestResult {
        let header = SignatureHeader {
            key_id: "did:key:z6MkexampleKey".into(),
            algorithm: "ed25519".into(),
            headers: covered(&["(request-target)", "host", "date", "capability-invocation"]),
            signature: vec![0xfb, 0xff, 0x01, 0x02],
        };
        let formatted = header.to_string();
        assert!(formatted.contains(r#"headers="(request-target) host date capability-invocation""#));

        let parsed: SignatureHeader = formatted.parse()?;
        assert_eq!(parsed, header);
        assert!(parsed.covers("Capability-Invocation"));
        assert!(!parsed.covers("digest"));
        Ok(())
    }

    #[test]
    fn it_rejects_signature_headers_without_a_key() {
        assert_eq!(
            "algorithm=\"ed25519\",signature=\"AA==\"".parse::<SignatureHeader>(),
            Err(HeaderError::MissingParameter("keyId"))
        );
    }

    #[test]
    fn it_digests_the_body() {
        assert_eq!(
            content_digest(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }
}
