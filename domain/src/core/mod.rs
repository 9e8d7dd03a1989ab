//! Core domain concepts shared across all subdomains.
//!
//! - [`error::DomainError`]: domain-level errors
//! - [`interrupt::Interruption`]: cancellation sentinels carried as `error_text`
//! - [`string`]: UTF-8 safe truncation and callstack suffixes

pub mod error;
pub mod interrupt;
pub mod string;
