#![deny(missing_docs)]

//! # hopsflow models
//!
//! Plain data types shared by the credential bootstrapper, the jobs client
//! and the command line. Nothing in this crate performs I/O.
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`service`] | Registry query, resolved endpoint, URL scheme |
//! | [`credentials`] | Service user email/password pair |
//! | [`api_key`] | Generated key names, scopes and issued keys |
//! | [`file_mode`] | Octal permission bits for the key file |
//! | [`execution`] | Job execution state and its classification |

pub mod api_key;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod file_mode;
pub mod service;

// Re-export all public types at crate root for convenience.
pub use api_key::*;
pub use credentials::*;
pub use error::*;
pub use execution::*;
pub use file_mode::*;
pub use service::*;
