//! # domobj codec
//!
//! Identity and value model shared by the domobj crates.
//!
//! This crate provides:
//! - [`ObjectId`], the immutable identity of a persistent object
//!   (class id + storage key), with a parseable textual form
//! - [`Value`], the closed set of property values a data container holds
//! - CBOR helpers ([`to_cbor`], [`from_cbor`]) used for snapshots and files
//!
//! ## Usage
//!
//! ```
//! use domobj_codec::{from_cbor, to_cbor, ObjectId, StorageKey, Value};
//!
//! let id = ObjectId::new("Order", StorageKey::Integer(1));
//! let value = Value::ObjectId(id.clone());
//!
//! let bytes = to_cbor(&value).unwrap();
//! let decoded: Value = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded.as_object_id(), Some(&id));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod object_id;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use object_id::{ClassId, ObjectId, StorageKey};
pub use value::{Value, ValueType};
