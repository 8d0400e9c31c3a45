//! Benchmark utilities for domobj.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
