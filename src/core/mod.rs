pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Column, Fields, Schema, merge_fields};
pub use value::{DataType, Value};
