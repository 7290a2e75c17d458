//! Record-level codec: the fixed 8-byte header, name-value pairs, and the fixed-size
//! begin-request and end-request bodies.
//!
//! Everything multi-byte on the wire is big-endian:
//!
//! ```text
//! header:         version | type | request id (2) | content length (2) | padding length | reserved
//! begin-request:  role (2) | flags | reserved (5)
//! end-request:    app status (4) | protocol status | reserved (3)
//! ```

use super::error::{Error, Result};
use super::s11n::*;

use byteorder::{ByteOrder, NetworkEndian};
use bytes::BytesMut;
use enum_primitive::FromPrimitive;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u8,
    pub record_type: u8,
    pub request_id: u16,
    pub content_length: u16,
    pub padding_length: u8,
}

impl RecordHeader {
    pub fn new(record_type: RecordType, request_id: u16, content_length: u16, padding_length: u8)
        -> RecordHeader
    {
        RecordHeader {
            version: FASTCGI_VERSION,
            record_type: record_type as u8,
            request_id,
            content_length,
            padding_length,
        }
    }

    /// The record type, or `None` for a type this crate doesn't know about.
    pub fn kind(&self) -> Option<RecordType> {
        RecordType::from_u8(self.record_type)
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.version;
        out[1] = self.record_type;
        NetworkEndian::write_u16(&mut out[2..4], self.request_id);
        NetworkEndian::write_u16(&mut out[4..6], self.content_length);
        out[6] = self.padding_length;
        // out[7] is reserved and stays zero.
        out
    }

    /// Structural inverse of `encode`. Nothing is checked against the bytes that follow.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> RecordHeader {
        RecordHeader {
            version: bytes[0],
            record_type: bytes[1],
            request_id: NetworkEndian::read_u16(&bytes[2..4]),
            content_length: NetworkEndian::read_u16(&bytes[4..6]),
            padding_length: bytes[6],
        }
    }
}

pub fn encode_header(record_type: RecordType, request_id: u16, content_length: u16,
                     padding_length: u8) -> [u8; HEADER_LEN]
{
    RecordHeader::new(record_type, request_id, content_length, padding_length).encode()
}

fn len_prefix_size(len: usize) -> usize {
    if len < 0x80 { 1 } else { 4 }
}

/// Exact number of bytes `encode_name_value` produces for a pair with these field lengths.
pub fn name_value_size(name_len: usize, value_len: usize) -> usize {
    len_prefix_size(name_len) + name_len + len_prefix_size(value_len) + value_len
}

fn write_len(buf: &mut BytesMut, len: usize) {
    if len < 0x80 {
        buf.extend_from_slice(&[len as u8]);
    } else {
        let mut bytes = [0u8; 4];
        NetworkEndian::write_u32(&mut bytes, len as u32 | 0x8000_0000);
        buf.extend_from_slice(&bytes);
    }
}

/// Reserve exactly `len` bytes up front, so running out of memory is an error and not an abort.
fn alloc_buf(len: usize) -> Result<BytesMut> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    Ok(BytesMut::from(buf))
}

/// Encodes one CGI-style parameter: both length prefixes, then the name bytes, then the value.
pub fn encode_name_value(name: &[u8], value: &[u8]) -> Result<BytesMut> {
    for len in &[name.len(), value.len()] {
        if *len > MAX_NAME_VALUE_LENGTH {
            return Err(Error::TooLong(*len));
        }
    }

    let mut buf = alloc_buf(name_value_size(name.len(), value.len()))?;
    write_len(&mut buf, name.len());
    write_len(&mut buf, value.len());
    buf.extend_from_slice(name);
    buf.extend_from_slice(value);
    trace!("name-value pair ({}, {}) is {} bytes",
           String::from_utf8_lossy(name), String::from_utf8_lossy(value), buf.len());
    Ok(buf)
}

pub fn encode_begin_request(role: u16, keep_connection: bool) -> [u8; BEGIN_REQUEST_BODY_LEN] {
    let mut out = [0u8; BEGIN_REQUEST_BODY_LEN];
    NetworkEndian::write_u16(&mut out[0..2], role);
    out[2] = if keep_connection { FCGI_KEEP_CONN } else { 0 };
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginRequest {
    pub role: Role,
    pub keep_connection: bool,
}

impl BeginRequest {
    pub fn encode(&self) -> [u8; BEGIN_REQUEST_BODY_LEN] {
        encode_begin_request(self.role as u16, self.keep_connection)
    }

    pub fn decode(bytes: &[u8]) -> Result<BeginRequest> {
        if bytes.len() < BEGIN_REQUEST_BODY_LEN {
            return Err(Error::Protocol(
                format!("begin-request body is {} bytes", bytes.len())));
        }
        let raw_role = NetworkEndian::read_u16(&bytes[0..2]);
        let role = Role::from_u16(raw_role)
            .ok_or_else(|| Error::Protocol(format!("unknown role {}", raw_role)))?;
        Ok(BeginRequest {
            role,
            keep_connection: (bytes[2] & FCGI_KEEP_CONN) == FCGI_KEEP_CONN,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndRequest {
    pub app_status: u32,
    pub protocol_status: u8,
}

impl EndRequest {
    pub fn status(&self) -> Option<ProtocolStatus> {
        ProtocolStatus::from_u8(self.protocol_status)
    }

    pub fn encode(&self) -> [u8; END_REQUEST_BODY_LEN] {
        let mut out = [0u8; END_REQUEST_BODY_LEN];
        NetworkEndian::write_u32(&mut out[0..4], self.app_status);
        out[4] = self.protocol_status;
        out
    }

    pub fn decode(bytes: &[u8; END_REQUEST_BODY_LEN]) -> EndRequest {
        EndRequest {
            app_status: NetworkEndian::read_u32(&bytes[0..4]),
            protocol_status: bytes[4],
        }
    }
}

/// Header and content in one buffer, so a record goes out in a single write.
pub fn encode_record(record_type: RecordType, request_id: u16, content: &[u8])
    -> Result<BytesMut>
{
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(Error::TooLong(content.len()));
    }

    let mut buf = alloc_buf(HEADER_LEN + content.len())?;
    buf.extend_from_slice(&encode_header(record_type, request_id, content.len() as u16, 0));
    buf.extend_from_slice(content);
    Ok(buf)
}
