//! Payload encoding shared by clients and node implementations.
//!
//! Every payload is a `bincode` (standard configuration) encoding of a serde
//! value:
//!
//! | method                   | request            | response                      |
//! |--------------------------|--------------------|-------------------------------|
//! | `ChainHeight`            | `()`               | `u64`                         |
//! | `GetTransaction`         | `TransactionId`    | `Option<Transaction>`         |
//! | `SendTransaction`        | `Transaction`      | `()`                          |
//! | `SubscribeConfirmations` | `SubscribeRequest` | stream of [`StreamFrame`]     |
//!
//! [`StreamFrame`]: crate::events::StreamFrame

use crate::error::{Error, Result};
use crate::events::Cursor;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Where a confirmation feed starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamStart {
    /// New confirmations only.
    #[default]
    Live,
    /// Every confirmation the node holds, then new ones.
    Genesis,
    /// Every confirmation strictly after the cursor, then new ones.
    After(Cursor),
}

/// Opens the confirmation feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub start: StreamStart,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::standard(),
    )?)
}

/// Decodes a complete payload. Trailing bytes are a protocol violation.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, consumed) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    if consumed != bytes.len() {
        return Err(Error::Protocol(format!(
            "{} trailing bytes after payload",
            bytes.len() - consumed
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_request_is_empty() {
        assert!(encode(&()).unwrap().is_empty());
        decode::<()>(&[]).unwrap();
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&42u64).unwrap();
        bytes.push(0);
        assert!(matches!(decode::<u64>(&bytes), Err(Error::Protocol(_))));
    }

    #[test]
    fn truncated_payload_is_a_protocol_error() {
        let request = SubscribeRequest {
            start: StreamStart::After(Cursor::new(7, 1)),
        };
        let bytes = encode(&request).unwrap();
        let err = decode::<SubscribeRequest>(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(decode::<SubscribeRequest>(&bytes).unwrap(), request);
    }
}
