#![warn(missing_docs)]

//! Light weight helpers shared by the KMS authorization crates: cross-target
//! `Send`/`Sync` bounds, a bounded fan-out/fan-in task group and wall clock
//! formatting.

mod sync;
pub use sync::*;

mod r#async;
pub use r#async::*;

pub mod time;
