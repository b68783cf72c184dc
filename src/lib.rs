//! Invoice Desk Library
//!
//! Client-side building blocks for the invoice manager: an expiring response
//! cache with cache-aside fetch, invoice field normalization, the email import
//! API client and display formatting.

pub mod cache;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod email;
pub mod fields;
pub mod format;
