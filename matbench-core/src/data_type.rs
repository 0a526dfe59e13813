//! Primitive element types that can travel through the transport layer.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::mem::size_of;

#[derive(
    IntoPrimitive, TryFromPrimitive, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug,
)]
#[repr(u8)]
pub enum DataType {
    I32,
    I64,
}

impl DataType {
    pub fn of<T: HasDataType>() -> Self {
        T::DATA_TYPE
    }

    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::I32 => size_of::<i32>(),
            DataType::I64 => size_of::<i64>(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::I32 => "int32",
            DataType::I64 => "int64",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width signed integers that can be stored in a [`Matrix`](crate::Matrix) and moved
/// between workers as native-endian bytes.
pub trait HasDataType: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn size_in_bytes() -> usize {
        Self::DATA_TYPE.size_in_bytes()
    }

    /// Appends the native-endian encoding of `src` to `dst`.
    fn encode(src: &[Self], dst: &mut Vec<u8>);

    /// Decodes `src` into `dst`. `src` must hold exactly `dst.len()` elements.
    fn decode(src: &[u8], dst: &mut [Self]);
}

macro_rules! impl_has_data_type {
    ($ty:ty, $variant:ident) => {
        impl HasDataType for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn encode(src: &[Self], dst: &mut Vec<u8>) {
                dst.reserve(src.len() * size_of::<$ty>());

                for value in src {
                    dst.extend_from_slice(&value.to_ne_bytes());
                }
            }

            fn decode(src: &[u8], dst: &mut [Self]) {
                const N: usize = size_of::<$ty>();
                assert_eq!(src.len(), dst.len() * N);

                for (value, bytes) in dst.iter_mut().zip(src.chunks_exact(N)) {
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(bytes);
                    *value = <$ty>::from_ne_bytes(raw);
                }
            }
        }
    };
}

impl_has_data_type!(i32, I32);
impl_has_data_type!(i64, I64);

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn test_encode_decode() {
        let input = [-100i32, 0, 7, i32::MAX, i32::MIN];
        let mut bytes = vec![];
        i32::encode(&input, &mut bytes);
        assert_eq!(bytes.len(), input.len() * 4);

        let mut output = [0i32; 5];
        i32::decode(&bytes, &mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_primitive_roundtrip() {
        for ty in [DataType::I32, DataType::I64].iter() {
            let raw: u8 = (*ty).into();
            assert_eq!(DataType::try_from(raw).unwrap(), *ty);
        }

        DataType::try_from(17u8).unwrap_err();
        assert_eq!(DataType::of::<i64>().size_in_bytes(), 8);
    }
}
