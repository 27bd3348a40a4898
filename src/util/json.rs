use std::io;

use serde::de::DeserializeOwned;
use serde_json::de::{IoRead, Read, StrRead};
use serde_json::Deserializer;

// EXPLAIN output nests two JSON levels per plan node, so plans a few dozen
// operators deep already pass serde_json's default limit of 128.
fn decode<'de, R: Read<'de>, T: DeserializeOwned>(mut deserializer: Deserializer<R>) -> serde_json::Result<T> {
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// `serde_json::from_str` without the nesting limit; the stack grows on demand.
pub fn from_str_unbounded<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    decode(Deserializer::new(StrRead::new(text)))
}

/// Reader counterpart of [`from_str_unbounded`].
pub fn from_reader_unbounded<R: io::Read, T: DeserializeOwned>(reader: R) -> serde_json::Result<T> {
    decode(Deserializer::new(IoRead::new(reader)))
}
