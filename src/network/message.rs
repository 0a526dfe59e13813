use std::convert::TryFrom;

use super::{Channel, NetworkError};
use crate::types::{DataType, HasDataType, WorkerId};

/// A message as it travels between workers of a [`LocalCommunicator`](super::LocalCommunicator).
///
/// The payload is the native-endian encoding of the elements, the header records the raw
/// element type so the receiving side can reject a mismatch instead of reinterpreting bytes.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) source: WorkerId,
    pub(crate) channel: Channel,
    data_type: u8,
    payload: Vec<u8>,
}

impl Envelope {
    pub(crate) fn new<T: HasDataType>(source: WorkerId, channel: Channel, data: &[T]) -> Self {
        let mut payload = Vec::new();
        T::encode(data, &mut payload);

        Self {
            source,
            channel,
            data_type: T::DATA_TYPE.into(),
            payload,
        }
    }

    pub(crate) fn matches(&self, src: Option<WorkerId>, channel: Channel) -> bool {
        self.channel == channel && src.map_or(true, |src| src == self.source)
    }

    fn data_type(&self) -> Result<DataType, NetworkError> {
        DataType::try_from(self.data_type).map_err(|_| NetworkError::UnknownDataType {
            peer: self.source,
            raw: self.data_type,
        })
    }

    /// Number of elements of type `T` in the payload.
    pub(crate) fn element_count<T: HasDataType>(&self) -> Result<usize, NetworkError> {
        let actual = self.data_type()?;
        if actual != T::DATA_TYPE {
            return Err(NetworkError::TypeMismatch {
                peer: self.source,
                channel: self.channel,
                expected: T::DATA_TYPE,
                actual,
            });
        }

        Ok(self.payload.len() / actual.size_in_bytes())
    }

    pub(crate) fn decode_into<T: HasDataType>(&self, buffer: &mut [T]) -> Result<(), NetworkError> {
        let actual = self.element_count::<T>()?;
        if actual != buffer.len() {
            return Err(NetworkError::SizeMismatch {
                peer: self.source,
                channel: self.channel,
                expected: buffer.len(),
                actual,
            });
        }

        T::decode(&self.payload, buffer);
        Ok(())
    }
}
