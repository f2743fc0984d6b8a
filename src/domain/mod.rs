//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (timestamps, IDs, events, errors)
//! - `subscription` - Plan classification, expiry accrual and historical recompute

pub mod foundation;
pub mod subscription;
