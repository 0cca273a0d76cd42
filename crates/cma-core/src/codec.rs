//! Persisted form of a [`Parameter`].
//!
//! Layout (big-endian, 29 bytes):
//! `[version:u8] ([minimal_surplus:i16][factor:i16]) x 6 [happy_factor:i16] [reserved:u8] [require_happy:u8]`
//!
//! The reserved byte held a since-retired field. It is written as 0 and
//! skipped on read so the record keeps its size. Any new field needs a new
//! version and an explicit migration; the size of version 2 never changes.

use cma_protocol::OutputType;
use thiserror::Error;
use tracing::warn;

use crate::Parameter;

pub const SAVED_PARAMETER_SIZE: usize = 29;
pub const PARAMETER_VERSION: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("stored parameter is {0} bytes, expected {SAVED_PARAMETER_SIZE}")]
    WrongSize(usize),
    #[error("unsupported parameter version {0}")]
    UnknownVersion(u8),
}

pub fn encode_parameter(parameter: &Parameter) -> [u8; SAVED_PARAMETER_SIZE] {
    let mut out = DataOut::new();

    out.put_u8(PARAMETER_VERSION);
    for output in OutputType::ALL {
        out.put_i16(parameter.minimal_surplus[output.index()]);
        out.put_i16(parameter.factor[output.index()]);
    }
    out.put_i16(parameter.happy_factor);
    out.put_u8(0);
    out.put_u8(parameter.require_happy as u8);

    assert_eq!(out.used, SAVED_PARAMETER_SIZE);
    out.buffer
}

pub fn decode_parameter(bytes: &[u8]) -> Result<Parameter, CodecError> {
    let bytes: &[u8; SAVED_PARAMETER_SIZE] = bytes
        .try_into()
        .map_err(|_| CodecError::WrongSize(bytes.len()))?;
    let mut input = DataIn::new(bytes);

    let version = input.get_u8();
    if version != PARAMETER_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }

    let mut parameter = Parameter::default();
    for output in OutputType::ALL {
        parameter.minimal_surplus[output.index()] = input.get_i16();
        parameter.factor[output.index()] = input.get_i16();
    }
    parameter.happy_factor = input.get_i16();
    let _reserved = input.get_u8();
    parameter.require_happy = input.get_bool8();

    Ok(parameter)
}

struct DataOut {
    buffer: [u8; SAVED_PARAMETER_SIZE],
    used: usize,
}

impl DataOut {
    fn new() -> Self {
        Self {
            buffer: [0; SAVED_PARAMETER_SIZE],
            used: 0,
        }
    }

    fn put_u8(&mut self, value: u8) {
        self.buffer[self.used] = value;
        self.used += 1;
    }

    fn put_i16(&mut self, value: i16) {
        self.buffer[self.used..self.used + 2].copy_from_slice(&value.to_be_bytes());
        self.used += 2;
    }
}

struct DataIn<'a> {
    buffer: &'a [u8; SAVED_PARAMETER_SIZE],
    pos: usize,
}

impl<'a> DataIn<'a> {
    fn new(buffer: &'a [u8; SAVED_PARAMETER_SIZE]) -> Self {
        Self { buffer, pos: 0 }
    }

    fn get_u8(&mut self) -> u8 {
        let value = self.buffer[self.pos];
        self.pos += 1;
        value
    }

    fn get_i16(&mut self) -> i16 {
        let value = i16::from_be_bytes([self.buffer[self.pos], self.buffer[self.pos + 1]]);
        self.pos += 2;
        value
    }

    fn get_bool8(&mut self) -> bool {
        let value = self.get_u8();
        if value > 1 {
            warn!(value, "stored value isn't boolean");
        }
        value != 0
    }
}
