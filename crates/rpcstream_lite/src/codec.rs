use bytes::Bytes;
use prost::Message;

use crate::error::Status;

/// Encode a message into a session frame.
pub fn encode<M: Message>(msg: &M) -> Bytes {
    Bytes::from(msg.encode_to_vec())
}

/// Decode a session frame. A malformed frame is a transport failure.
pub fn decode<M: Message + Default>(frame: Bytes) -> Result<M, Status> {
    M::decode(frame).map_err(|e| Status::transport(format!("failed to decode message: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Number {
        #[prost(int64, tag = "1")]
        value: i64,
    }

    #[test]
    fn test_encoded_frame_decodes() {
        let frame = encode(&Number { value: -42 });
        assert_eq!(decode::<Number>(frame).unwrap(), Number { value: -42 });
    }

    #[test]
    fn test_garbage_frame_is_transport_error() {
        let err = decode::<Number>(Bytes::from_static(&[0x08, 0xff])).unwrap_err();
        assert_eq!(err.code(), Code::Transport);
    }
}
