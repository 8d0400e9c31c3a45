//! # domobj Testkit
//!
//! Test utilities for domobj.
//!
//! This crate provides:
//! - A small sales domain (mapping and seeded storage)
//! - Recording extensions and listeners that log the events they see
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! The integration tests under `tests/` exercise the crates together.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use domobj_testkit::prelude::*;
//!
//! #[test]
//! fn loads_a_customer() {
//!     let fixture = SalesFixture::new();
//!     let tx = fixture.root_transaction();
//!     let acme = tx.get_object(&fixture.acme).unwrap();
//!     assert_eq!(tx.get_property(&acme, "Name").unwrap(), "Acme".into());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use recording::*;
