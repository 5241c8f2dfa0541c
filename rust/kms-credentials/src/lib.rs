//! Principal identities and signing primitives for KMS capabilities.
//!
//! The traits in this crate describe the collaborators that capability
//! issuance, delegation and invocation depend on:
//!
//! - [`Principal`]: anything identified by a [`Did`]
//! - [`Signer`] / [`Verifier`]: produce and check signatures of a suite
//! - [`Resolver`]: turn a DID into a [`Verifier`]
//! - [`Authority`]: a principal that can sign on its own behalf
//!
//! The [`ed25519`] module provides a `did:key` implementation of all of them.

mod authority;
mod did;
mod principal;
mod resolver;
mod suite;

pub mod ed25519;

pub use authority::*;
pub use did::*;
pub use ed25519::{Ed25519KeyResolver, Ed25519Signature, Ed25519Signer, Ed25519Verifier};
pub use principal::*;
pub use resolver::*;
pub use suite::*;
