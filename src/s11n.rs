//! s11n == serialization. Constants and enumerations that make up FastCGI records on the wire.

pub const FASTCGI_VERSION: u8 = 1;

/// Every record starts with a header of exactly this many bytes.
pub const HEADER_LEN: usize = 8;

/// The begin-request and end-request bodies are both fixed at 8 bytes.
pub const BEGIN_REQUEST_BODY_LEN: usize = 8;
pub const END_REQUEST_BODY_LEN: usize = 8;

/// Content length is a 16-bit header field.
pub const MAX_CONTENT_LENGTH: usize = 0xFFFF;

/// Name-value lengths are 31-bit; the top bit of a 4-byte prefix marks the long form.
pub const MAX_NAME_VALUE_LENGTH: usize = 0x7FFF_FFFF;

/// Flag bit in the begin-request body: keep the connection open after the response.
pub const FCGI_KEEP_CONN: u8 = 1;

enum_from_primitive! {
    #[repr(u8)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum RecordType {
        BeginRequest = 1,
        AbortRequest = 2,
        EndRequest = 3,
        Params = 4,
        Stdin = 5,
        Stdout = 6,
        Stderr = 7,
        Data = 8,
        GetValues = 9,
        GetValuesResult = 10,
        UnknownType = 11,
    }
}

enum_from_primitive! {
    #[repr(u16)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Role {
        Responder = 1,
        Authorizer = 2,
        Filter = 3,
    }
}

enum_from_primitive! {
    #[repr(u8)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum ProtocolStatus {
        RequestComplete = 0,
        CantMultiplexConnections = 1,
        Overloaded = 2,
        UnknownRole = 3,
    }
}
