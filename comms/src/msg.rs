use std::{borrow::Cow, io};

use half::f16;

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR: Header = 0;
const CONTROL: Header = 1;
const GRAD: Header = 2;
const HALF_GRAD: Header = 3;
const PARAMS: Header = 4;
const STATE: Header = 5;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A full precision gradient, or the full precision result of a reduction.
    Grad(&'a [f32]),
    /// A gradient compressed to IEEE half precision.
    HalfGrad(&'a [f16]),
    /// Model parameters being broadcasted.
    Params(&'a [f32]),
    /// An opaque serialized optimizer state.
    State(&'a [u8]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Hello { rank: usize, world_size: usize },
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
    /// Returns a static name for the kind of message, useful for protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(_) => "control",
            Msg::Data(Payload::Grad(_)) => "grad",
            Msg::Data(Payload::HalfGrad(_)) => "half_grad",
            Msg::Data(Payload::Params(_)) => "params",
            Msg::Data(Payload::State(_)) => "state",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }

    fn cast<'b, T: bytemuck::Pod>(bytes: &'b [u8]) -> io::Result<&'b [T]> {
        bytemuck::try_cast_slice(bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Received a malformed numeric payload: {e:?}"),
            )
        })
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
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Data(payload) => {
                let (kind, bytes): (Header, &[u8]) = match payload {
                    Payload::Grad(grad) => (GRAD, bytemuck::cast_slice(grad)),
                    Payload::HalfGrad(grad) => (HALF_GRAD, bytemuck::cast_slice(grad)),
                    Payload::Params(params) => (PARAMS, bytemuck::cast_slice(params)),
                    Payload::State(state) => (STATE, state),
                };

                buf.extend_from_slice(&kind.to_be_bytes());
                Some(bytes)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            GRAD => Ok(Self::Data(Payload::Grad(Self::cast(rest)?))),
            HALF_GRAD => Ok(Self::Data(Payload::HalfGrad(Self::cast(rest)?))),
            PARAMS => Ok(Self::Data(Payload::Params(Self::cast(rest)?))),
            STATE => Ok(Self::Data(Payload::State(rest))),
            kind => Self::invalid_kind_byte(kind),
        }
    }
}
