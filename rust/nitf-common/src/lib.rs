//! Core definitions (errors and the common `Result` alias), relied upon by all
//! nitf-* crates.

pub mod error;
pub mod result;

pub use result::Result;
