//! Subscription Accrual - turns confirmed payments into subscription time.
//!
//! Classifies what plan an order paid for, accrues the plan period onto the
//! buyer's subscription expiry, and rebuilds the subscription from order
//! history when deliveries arrive out of order.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
