//! Byte encoding of index keys and values.
//!
//! Encodings are order-preserving: comparing two encoded keys byte by byte
//! gives the same result as comparing the original values. Strings are
//! stored as raw UTF-8 without a length prefix, integers as big-endian with
//! the sign bit flipped for signed types.

use rod_types::RodId;

use crate::error::{IndexError, IndexResult};

const SIGN_BIT: u64 = 1 << 63;

/// Encode a value into index bytes.
pub trait Encode {
    fn encode(&self) -> Vec<u8>;
}

/// Decode a value from index bytes.
pub trait Decode: Sized {
    fn decode(bytes: &[u8]) -> IndexResult<Self>;
}

fn word(bytes: &[u8]) -> IndexResult<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| IndexError::Decode(format!("expected 8 bytes, got {}", bytes.len())))
}

impl Encode for str {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Encode for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| IndexError::Decode(e.to_string()))
    }
}

impl Encode for [u8] {
    fn encode(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl Encode for u64 {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl Decode for u64 {
    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        Ok(u64::from_be_bytes(word(bytes)?))
    }
}

impl Encode for i64 {
    fn encode(&self) -> Vec<u8> {
        ((*self as u64) ^ SIGN_BIT).to_be_bytes().to_vec()
    }
}

impl Decode for i64 {
    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        Ok((u64::from_be_bytes(word(bytes)?) ^ SIGN_BIT) as i64)
    }
}

impl Encode for f64 {
    fn encode(&self) -> Vec<u8> {
        let bits = self.to_bits();
        let ordered = if bits & SIGN_BIT != 0 {
            !bits
        } else {
            bits ^ SIGN_BIT
        };
        ordered.to_be_bytes().to_vec()
    }
}

impl Decode for f64 {
    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        let ordered = u64::from_be_bytes(word(bytes)?);
        let bits = if ordered & SIGN_BIT != 0 {
            ordered ^ SIGN_BIT
        } else {
            !ordered
        };
        Ok(f64::from_bits(bits))
    }
}

impl Encode for RodId {
    fn encode(&self) -> Vec<u8> {
        self.get().encode()
    }
}

impl Decode for RodId {
    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        u64::decode(bytes).map(RodId::new)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self) -> Vec<u8> {
        (**self).encode()
    }
}
