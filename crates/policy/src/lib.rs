//! Capability-based policy system.
//!
//! Core principle: **All side effects require an explicit capability.**
//!
//! Tools describe what they are about to touch as [`CapabilityRequest`]s and
//! the host asks a [`Policy`] for a [`Decision`] before running them.

mod capability;
mod error;
mod policy;

pub use capability::{CapabilityKind, CapabilityRequest};
pub use error::{Error, Result};
pub use policy::{AllowRules, Decision, DenyRules, Policy};
