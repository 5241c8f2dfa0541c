#![warn(missing_docs)]

//! Exercising capabilities over HTTP.
//!
//! An invocation is an ordinary HTTP request that carries two extra headers:
//!
//! ```text
//! capability-invocation: zcap capability="<base64url brotli json>",action="create-key"
//! signature: keyId="did:key:z6Mk…",algorithm="ed25519",
//!            headers="(request-target) host date capability-invocation digest",
//!            signature="<base64>"
//! ```
//!
//! The first names the capability being exercised and the action requested;
//! the second is an HTTP message signature by the capability's invoker over
//! the request line and the listed headers.
//!
//! - [`InvocationSigner`] / [`sign_invocation`] attach both headers
//! - [`InvocationVerifier`] checks them and walks the capability chain
//! - [`Transport`] and [`dispatch`] send batches of signed invocations

mod dispatch;
mod error;
mod header;
mod http_signature;
mod request;
mod sign;
mod transport;
mod verify;

pub use dispatch::*;
pub use error::*;
pub use header::*;
pub use http_signature::*;
pub use request::*;
pub use sign::*;
pub use transport::*;
pub use verify::*;
