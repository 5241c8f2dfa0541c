#![warn(missing_docs)]

//! Authorization capabilities for a multi-tenant key management service.
//!
//! A root capability binds a protected resource (a keystore, a data vault) to
//! the principal that owns it. The owner can delegate a narrower capability
//! to another principal; every delegation extends the capability chain by the
//! parent's identifier, so any capability can be traced back to its root.
//!
//! ```text
//! issue ──► root ──► delegate ──► delegated ──► compress ──► HTTP header
//!                                                        │
//!                            ChainVerifier ◄── decompress ◄┘
//! ```
//!
//! - [`CapabilitySigner`] mints roots and delegations
//! - [`compress`] / [`decompress`] move capabilities through HTTP headers
//! - [`ChainVerifier`] walks a presented capability back to a trusted root

pub mod action;
mod canonical;
mod capability;
mod compress;
mod error;
mod resolver;
mod signer;
mod verify;

pub use action::Actions;
pub use canonical::*;
pub use capability::*;
pub use compress::*;
pub use error::*;
pub use resolver::*;
pub use signer::*;
pub use verify::*;
