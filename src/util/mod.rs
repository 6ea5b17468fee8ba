//! Utility functions shared by the discovery and parsing layers.
//!
//! - **URL validation**: SSRF-aware validation applied to every outbound request
//! - **Text processing**: control-character stripping for feed metadata
//!
//! # Examples
//!
//! ```
//! use feedscout::util::{strip_control_chars, validate_url, HostPolicy};
//!
//! let url = validate_url("https://example.com/feed.xml", HostPolicy::PublicOnly).unwrap();
//! assert_eq!(url.path(), "/feed.xml");
//!
//! assert_eq!(strip_control_chars("Title\x07"), "Title");
//! ```

mod text;
mod url_validator;

pub use text::{collapse_whitespace, strip_control_chars};
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
