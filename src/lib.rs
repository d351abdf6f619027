#![doc = include_str!("lib.md")]
#![deny(unsafe_code)]
pub mod error;
pub mod proto;
pub mod read;

pub use error::{Error, Result};
pub use fallible_streaming_iterator;
