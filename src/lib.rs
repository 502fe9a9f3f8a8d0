//! Ratewell - Per-Client Leaky Bucket Rate Limiting
//!
//! This crate implements a calls-per-minute rate limiter built from
//! independent leaky buckets, one per caller key, and a small HTTP service
//! that charges each request against the caller's address.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
