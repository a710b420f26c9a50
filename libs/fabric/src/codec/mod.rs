use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod json;

pub use self::json::JsonCodec;

/// Maps values to and from the text carried by a transport
///
/// The daemon only exchanges text, so encoded values are always valid UTF-8.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String>;

    fn decode<T: for<'de> Deserialize<'de>>(&self, text: &str) -> Result<T>;
}
