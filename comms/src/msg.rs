use std::{borrow::Cow, io};

use half::f16;

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR: Header = 0;
const CONTROL: Header = 1;
const CHUNK: Header = 2;
const HALF_CHUNK: Header = 3;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A slice of a reduction buffer in full precision.
    Chunk(&'a [f32]),
    /// A slice of a reduction buffer compressed to half precision.
    HalfChunk(&'a [f16]),
}

impl Payload<'_> {
    /// Returns the amount of numbers carried.
    pub fn len(&self) -> usize {
        match self {
            Payload::Chunk(nums) => nums.len(),
            Payload::HalfChunk(nums) => nums.len(),
        }
    }

    /// Returns `true` if the payload carries no numbers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// First message sent to the right neighbour of the ring.
    Hello { rank: usize },
    /// Last message sent to the right neighbour of the ring.
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// Returns a short name for the kind of message, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Hello { .. }) => "control/hello",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(Payload::Chunk(_)) => "data/chunk",
            Msg::Data(Payload::HalfChunk(_)) => "data/half_chunk",
            Msg::Err(_) => "err",
        }
    }

    fn invalid_data<T, E>(err: E) -> io::Result<T>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Err(io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR.to_be_bytes());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL.to_be_bytes());

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, cmd).unwrap();
                None
            }
            Msg::Data(Payload::Chunk(nums)) => {
                buf.extend_from_slice(&CHUNK.to_be_bytes());
                Some(bytemuck::cast_slice(nums))
            }
            Msg::Data(Payload::HalfChunk(nums)) => {
                buf.extend_from_slice(&HALF_CHUNK.to_be_bytes());
                Some(bytemuck::cast_slice(nums))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::invalid_data(format!(
                "The given buffer is too small {}, must at least be {HEADER_SIZE} bytes",
                buf.len()
            ));
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR => match std::str::from_utf8(rest) {
                Ok(s) => Ok(Self::Err(Cow::Borrowed(s))),
                Err(e) => Self::invalid_data(e),
            },
            CONTROL => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            CHUNK => match bytemuck::try_cast_slice(rest) {
                Ok(nums) => Ok(Self::Data(Payload::Chunk(nums))),
                Err(e) => Self::invalid_data(format!("invalid chunk body: {e:?}")),
            },
            HALF_CHUNK => match bytemuck::try_cast_slice(rest) {
                Ok(nums) => Ok(Self::Data(Payload::HalfChunk(nums))),
                Err(e) => Self::invalid_data(format!("invalid half chunk body: {e:?}")),
            },
            other => Self::invalid_data(format!("Received an invalid kind header {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_body(msg: &Msg) -> Vec<u8> {
        let mut buf = Vec::new();
        let tail = msg.serialize(&mut buf);
        buf.extend_from_slice(tail.unwrap_or_default());
        buf
    }

    #[test]
    fn control_is_json_after_the_header() {
        let body = frame_body(&Msg::Control(Command::Hello { rank: 3 }));
        assert_eq!(&body[..HEADER_SIZE], &CONTROL.to_be_bytes());
        assert_eq!(&body[HEADER_SIZE..], br#"{"hello":{"rank":3}}"#);
    }

    #[test]
    fn unknown_kind_is_invalid_data() {
        let body = 9u32.to_be_bytes();
        let err = Msg::deserialize(&body).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn short_buffer_is_invalid_data() {
        let err = Msg::deserialize(&[0, 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn odd_sized_chunk_body_is_rejected() {
        // Backed by u32 so the body after the header stays aligned.
        let mut raw = [0u32; 3];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut raw);
        bytes[..HEADER_SIZE].copy_from_slice(&CHUNK.to_be_bytes());

        let err = Msg::deserialize(&bytes[..HEADER_SIZE + 6]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn err_body_must_be_utf8() {
        let mut body = ERR.to_be_bytes().to_vec();
        body.extend_from_slice(&[0xff, 0xfe, b'!']);

        let err = Msg::deserialize(&body).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
