//! URL handling module for Sumi-Engine
//!
//! This module turns raw link text into [`CanonicalUrl`] values: scheme and
//! host case folding, default-port elision, dot-segment removal, percent
//! escape normalization, relative resolution against a parent page, and a
//! public-suffix based split of the host into domain and subdomain.

mod canonical;
mod domain;

pub use canonical::CanonicalUrl;
pub use domain::{split_host, HostParts};
