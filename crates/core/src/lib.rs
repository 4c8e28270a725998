//! Core record types, validation, and deduplication for transit-tracks.

pub mod dedup;
pub mod error;
pub mod limits;
pub mod records;
pub mod transform;

pub use dedup::*;
pub use error::{Error, FetchError, Result, ValidationError, WriteError};
pub use records::*;
pub use transform::*;
