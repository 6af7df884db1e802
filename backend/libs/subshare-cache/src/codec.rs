//! JSON codec between cached values and store payloads.
//!
//! serde_json with derive output is deterministic for struct fields (emitted
//! in declaration order), renders enums as their serde names and
//! `NaiveDate` as `YYYY-MM-DD`.

use crate::CacheResult;
use serde::{de::DeserializeOwned, Serialize};

pub fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CacheResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}
