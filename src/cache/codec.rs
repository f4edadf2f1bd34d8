//! Record Codec
//!
//! Items are stored as JSON values written back to back, one per line, with
//! no count prefix. Reading streams values until end of input.
//!
//! Every record is decoded again before anything is written. JSON cannot
//! represent some values (non-finite floats serialize as `null`), and a record
//! that would not read back as an equal item fails the whole write.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Result of reading a record stream
#[derive(Debug)]
pub struct DecodeOutcome<T> {
    /// Records decoded before the stream ended or broke
    pub items: Vec<T>,
    /// The error that stopped the read early, if any
    pub error: Option<Error>,
}

impl<T> DecodeOutcome<T> {
    /// True when a malformed record cut the read short
    pub fn is_truncated(&self) -> bool {
        self.error.is_some()
    }
}

/// Encode one item, checking that it reads back as an equal item.
fn encode_record<T>(index: usize, item: &T) -> Result<Vec<u8>>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let bytes = serde_json::to_vec(item)
        .map_err(|e| Error::Encode(format!("record {}: {}", index, e)))?;

    match serde_json::from_slice::<T>(&bytes) {
        Ok(decoded) if decoded == *item => Ok(bytes),
        Ok(_) => Err(Error::Encode(format!(
            "record {} does not read back as the same value",
            index
        ))),
        Err(e) => Err(Error::Encode(format!(
            "record {} cannot be read back: {}",
            index, e
        ))),
    }
}

/// Encode every item in order into one buffer.
pub fn encode_to_vec<T>(items: &[T]) -> Result<Vec<u8>>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let mut encoded = Vec::new();
    for (index, item) in items.iter().enumerate() {
        encoded.extend_from_slice(&encode_record(index, item)?);
        encoded.push(b'\n');
    }
    Ok(encoded)
}

/// Write every item in order.
///
/// All records are encoded and checked first, so a rejected item leaves the
/// writer untouched.
pub fn encode_records<T, W>(writer: &mut W, items: &[T]) -> Result<()>
where
    T: Serialize + DeserializeOwned + PartialEq,
    W: Write + ?Sized,
{
    let encoded = encode_to_vec(items)?;
    write_encoded(writer, &encoded)
}

/// Write records produced by [`encode_to_vec`].
pub fn write_encoded<W>(writer: &mut W, encoded: &[u8]) -> Result<()>
where
    W: Write + ?Sized,
{
    writer
        .write_all(encoded)
        .map_err(|e| Error::io("writing records", e))?;
    writer
        .flush()
        .map_err(|e| Error::io("flushing records", e))
}

/// Read records until end of stream.
///
/// A malformed record stops the read; everything decoded before it is kept.
pub fn decode_records<T, R>(reader: R) -> DecodeOutcome<T>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut items = Vec::new();
    let mut error = None;

    for next in serde_json::Deserializer::from_reader(reader).into_iter::<T>() {
        match next {
            Ok(item) => items.push(item),
            Err(e) => {
                error = Some(Error::from(e));
                break;
            }
        }
    }

    DecodeOutcome { items, error }
}
