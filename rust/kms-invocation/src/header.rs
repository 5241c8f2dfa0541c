//! The `capability-invocation` header.

use std::{collections::HashMap, fmt, str::FromStr};
use thiserror::Error;

/// Name of the header that carries the invoked capability.
pub const CAPABILITY_INVOCATION_HEADER: &str = "capability-invocation";

const SCHEME: &str = "zcap";

/// Errors raised while reading invocation and signature headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// The header does not start with the expected scheme.
    #[error("Expected the {0} scheme")]
    Scheme(&'static str),

    /// The parameter list could not be parsed.
    #[error("Malformed header parameters: {0}")]
    Malformed(String),

    /// A parameter appears twice.
    #[error("Duplicate header parameter {0}")]
    Duplicate(String),

    /// A required parameter is absent.
    #[error("Missing header parameter {0}")]
    MissingParameter(&'static str),

    /// A header the signature covers is absent from the request.
    #[error("Signed header {0} is missing from the request")]
    MissingHeader(String),
}

/// Parsed `capability-invocation` header value.
///
/// ```text
/// zcap capability="<base64url>",action="<action>"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityInvocation {
    /// The invoked capability, compressed and base64url encoded.
    pub capability: String,
    /// The action requested.
    pub action: String,
}

impl fmt::Display for CapabilityInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME} capability=\"{}\",action=\"{}\"",
            self.capability, self.action
        )
    }
}

impl FromStr for CapabilityInvocation {
    type Err = HeaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let parameters = value
            .split_once(char::is_whitespace)
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(SCHEME))
            .map(|(_, parameters)| parameters)
            .ok_or(HeaderError::Scheme(SCHEME))?;

        let mut parameters = parse_parameters(parameters)?;
        Ok(Self {
            capability: parameters
                .remove("capability")
                .ok_or(HeaderError::MissingParameter("capability"))?,
            action: parameters
                .remove("action")
                .ok_or(HeaderError::MissingParameter("action"))?,
        })
    }
}

/// Parse a comma separated `name="value"` list. Values may also be bare
/// tokens without quotes. Quoted values cannot contain `"`.
pub(crate) fn parse_parameters(input: &str) -> Result<HashMap<String, String>, HeaderError> {
    let mut parameters = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let (name, after) = rest
            .split_once('=')
            .ok_or_else(|| HeaderError::Malformed(format!("expected name=value in {rest:?}")))?;
        let name = name.trim();
        if name.is_empty() || name.contains([',', '"', ' ']) {
            return Err(HeaderError::Malformed(format!("invalid name {name:?}")));
        }

        let after = after.trim_start();
        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted
                    .find('"')
                    .ok_or_else(|| HeaderError::Malformed(format!("unterminated value for {name}")))?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after.find(',') {
                Some(end) => (after[..end].trim_end(), &after[end..]),
                None => (after.trim_end(), ""),
            },
        };

        if parameters
            .insert(name.to_string(), value.to_string())
            .is_some()
        {
            return Err(HeaderError::Duplicate(name.to_string()));
        }

        let remaining = remaining.trim_start();
        rest = match remaining.strip_prefix(',') {
            Some(next) => next.trim_start(),
            None if remaining.is_empty() => remaining,
            None => {
                return Err(HeaderError::Malformed(format!(
                    "expected a comma before {remaining:?}"
                )));
            }
        };
    }

    Ok(parameters)
}
