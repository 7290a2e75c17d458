//! One FastCGI request over one connection: the outbound record sequence and the response
//! read loop.

use super::config::SessionConfig;
use super::error::{Error, Result};
use super::lowlevel::*;
use super::s11n::*;

use std::io::{self, Read, Write};
use std::net::TcpStream;

/// Where a session is in its request. Operations are only accepted in the order
/// connect, begin, params, end of params, body, end of body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Unconnected,
    Connected,
    BeginSent,
    ParamsSent,
    ParamsEnded,
    BodySent,
    Ended,
    /// A send failed part-way. The server may have seen a partial record, so nothing more can
    /// be sent on this connection.
    Failed,
    Closed,
}

/// A client-side FastCGI session. Owns the stream exclusively and carries a single request.
pub struct Session<S = TcpStream> {
    stream: Option<S>,
    config: SessionConfig,
    state: State,
}

impl Session<TcpStream> {
    pub fn new() -> Session<TcpStream> {
        Session::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Session<TcpStream> {
        Session {
            stream: None,
            config,
            state: State::Unconnected,
        }
    }

    /// Opens a TCP connection to the application server. On failure the session stays
    /// unconnected and may be connected again.
    pub fn connect(&mut self, address: &str, port: u16) -> Result<()> {
        self.check_state("connect", &[State::Unconnected])?;
        let stream = TcpStream::connect((address, port)).map_err(|e| {
            debug!("connect to {}:{} failed: {}", address, port, e);
            Error::Connect(e)
        })?;
        debug!("connected to {}:{}", address, port);
        self.stream = Some(stream);
        self.state = State::Connected;
        Ok(())
    }
}

impl<S> Session<S> {
    pub fn request_id(&self) -> u16 {
        self.config.request_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Only allowed before the begin-request record is sent.
    pub fn set_request_id(&mut self, request_id: u16) -> Result<()> {
        self.check_state("set request id", &[State::Unconnected, State::Connected])?;
        if request_id == 0 {
            warn!("request id 0 is reserved for management records");
        }
        self.config.request_id = request_id;
        Ok(())
    }

    /// Releases the stream. Safe to call more than once; only the first call drops it.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("request {}: closing connection", self.config.request_id);
        }
        self.state = State::Closed;
    }

    fn check_state(&self, operation: &'static str, allowed: &[State]) -> Result<()> {
        if self.state == State::Closed {
            Err(Error::Closed)
        } else if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::State { operation, state: self.state })
        }
    }
}

impl<S: Read + Write> Session<S> {
    /// Wraps an already-open stream.
    pub fn from_stream(stream: S, config: SessionConfig) -> Session<S> {
        Session {
            stream: Some(stream),
            config,
            state: State::Connected,
        }
    }

    /// Runs `send` if the session is in one of the `allowed` states and moves it to `next` on
    /// success. Any failure leaves the session `Failed`.
    fn transition<F>(&mut self, operation: &'static str, allowed: &[State], next: State, send: F)
        -> Result<()>
        where F: FnOnce(&mut Self) -> Result<()>
    {
        self.check_state(operation, allowed)?;
        match send(self) {
            Ok(()) => {
                self.state = next;
                Ok(())
            },
            Err(e) => {
                debug!("request {}: {} failed: {}", self.config.request_id, operation, e);
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    /// Writes one record with a single write call. A short write is a failure.
    fn write_record(&mut self, record_type: RecordType, content: &[u8]) -> Result<()> {
        let record = encode_record(record_type, self.config.request_id, content)?;
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;

        let written = stream.write(&record).map_err(Error::Write)?;
        if written != record.len() {
            return Err(Error::Write(io::Error::new(io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, record.len()))));
        }
        stream.flush().map_err(Error::Write)?;

        debug!("request {}: sent {:?} record, {} bytes of content",
               self.config.request_id, record_type, content.len());
        Ok(())
    }

    /// Writes `content` as consecutive records of the same stream type, each no larger than
    /// the content length field allows. Empty content writes nothing.
    fn write_stream(&mut self, record_type: RecordType, content: &[u8]) -> Result<()> {
        for chunk in content.chunks(MAX_CONTENT_LENGTH) {
            self.write_record(record_type, chunk)?;
        }
        Ok(())
    }

    pub fn begin_request(&mut self) -> Result<()> {
        let body = BeginRequest {
            role: self.config.role,
            keep_connection: self.config.keep_connection,
        }.encode();
        self.transition("begin request", &[State::Connected], State::BeginSent,
                        |s| s.write_record(RecordType::BeginRequest, &body))
    }

    /// Sends one name-value pair as its own PARAMS record. A pair that doesn't fit in one
    /// record continues in the next.
    pub fn send_param<N, V>(&mut self, name: N, value: V) -> Result<()>
        where N: AsRef<[u8]>, V: AsRef<[u8]>
    {
        self.transition("send param", &[State::BeginSent, State::ParamsSent], State::ParamsSent,
                        |s| {
            let pair = encode_name_value(name.as_ref(), value.as_ref())?;
            s.write_stream(RecordType::Params, &pair)
        })
    }

    pub fn send_params<I, N, V>(&mut self, params: I) -> Result<()>
        where I: IntoIterator<Item = (N, V)>, N: AsRef<[u8]>, V: AsRef<[u8]>
    {
        for (name, value) in params {
            self.send_param(name, value)?;
        }
        Ok(())
    }

    /// Sends the empty PARAMS record that tells the server there are no more parameters.
    pub fn end_params(&mut self) -> Result<()> {
        self.transition("end params", &[State::BeginSent, State::ParamsSent], State::ParamsEnded,
                        |s| s.write_record(RecordType::Params, &[]))
    }

    /// Sends request body bytes on STDIN. An empty slice sends nothing, since an empty STDIN
    /// record would end the body.
    pub fn send_body(&mut self, body: &[u8]) -> Result<()> {
        if body.is_empty() {
            debug!("request {}: ignoring empty body chunk", self.config.request_id);
            return self.check_state("send body", &[State::ParamsEnded, State::BodySent]);
        }
        self.transition("send body", &[State::ParamsEnded, State::BodySent], State::BodySent,
                        |s| s.write_stream(RecordType::Stdin, body))
    }

    /// Sends the empty STDIN record that ends the request body.
    pub fn end_body(&mut self) -> Result<()> {
        self.transition("end body", &[State::ParamsEnded, State::BodySent], State::Ended,
                        |s| s.write_record(RecordType::Stdin, &[]))
    }

    /// Sends a bare END_REQUEST header from the client side.
    ///
    /// END_REQUEST is normally a server record; this exists for peers that expect the legacy
    /// client sequence of begin, params, end. New code should use `end_params` and `end_body`.
    pub fn send_end_request(&mut self) -> Result<()> {
        self.transition("send end request",
                        &[State::BeginSent, State::ParamsSent, State::ParamsEnded, State::BodySent],
                        State::Ended,
                        |s| s.write_record(RecordType::EndRequest, &[]))
    }

    /// Reads the response until the server closes the connection, handing each STDOUT chunk to
    /// `sink` as it arrives. STDERR output is discarded.
    ///
    /// With `keep_connection` set, the loop instead stops after the END_REQUEST for this
    /// request, since the server won't close the connection.
    pub fn drain<F>(&mut self, mut sink: F) -> Result<()>
        where F: FnMut(&[u8])
    {
        self.check_state("drain response",
                         &[State::BeginSent, State::ParamsSent, State::ParamsEnded,
                           State::BodySent, State::Ended])?;

        let request_id = self.config.request_id;
        let keep_connection = self.config.keep_connection;
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        let mut content = Vec::new();

        loop {
            let header = match read_header(stream)? {
                Some(header) => header,
                None => {
                    debug!("request {}: server closed the connection", request_id);
                    return Ok(());
                }
            };

            if header.version != FASTCGI_VERSION {
                return Err(Error::Protocol(
                    format!("unexpected FCGI version {}", header.version)));
            }

            debug!("request id: {}; record type: {:?}, {} bytes of content, {} of padding",
                   header.request_id, header.kind(), header.content_length,
                   header.padding_length);

            match header.kind() {
                Some(RecordType::Stdout) => {
                    read_content(stream, &mut content, header.content_length as usize)?;
                    if header.request_id != request_id {
                        warn!("dropping STDOUT for request {}, expected {}",
                              header.request_id, request_id);
                    } else if content.is_empty() {
                        debug!("request {}: end of STDOUT", request_id);
                    } else {
                        sink(&content[..]);
                    }
                },
                Some(RecordType::Stderr) => {
                    read_content(stream, &mut content, header.content_length as usize)?;
                    if !content.is_empty() {
                        warn!("request {}: discarding {} bytes of STDERR: {}", header.request_id,
                              content.len(), String::from_utf8_lossy(&content));
                    }
                },
                Some(RecordType::EndRequest) => {
                    let mut body = [0u8; END_REQUEST_BODY_LEN];
                    read_content(stream, &mut content, header.content_length as usize)?;
                    let n = content.len().min(END_REQUEST_BODY_LEN);
                    body[..n].copy_from_slice(&content[..n]);
                    let end = EndRequest::decode(&body);
                    debug!("request {}: end of request, app status {}, protocol status {:?}",
                           header.request_id, end.app_status, end.status());

                    if keep_connection && header.request_id == request_id {
                        skip(stream, header.padding_length as usize)?;
                        return Ok(());
                    }
                },
                kind => {
                    warn!("skipping unexpected {:?} record (type {})", kind, header.record_type);
                    skip(stream, header.content_length as usize)?;
                },
            }

            skip(stream, header.padding_length as usize)?;
        }
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads into `buf` until it's full or the stream ends. Returns how many bytes were read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// `None` on a clean end of stream between records.
fn read_header<R: Read>(reader: &mut R) -> Result<Option<RecordHeader>> {
    let mut raw = [0u8; HEADER_LEN];
    match read_full(reader, &mut raw).map_err(Error::Read)? {
        0 => Ok(None),
        HEADER_LEN => Ok(Some(RecordHeader::decode(&raw))),
        n => Err(Error::Read(io::Error::new(io::ErrorKind::UnexpectedEof,
            format!("stream ended {} bytes into a record header", n)))),
    }
}

fn read_content<R: Read>(reader: &mut R, buf: &mut Vec<u8>, len: usize) -> Result<()> {
    buf.clear();
    buf.try_reserve(len)?;
    buf.resize(len, 0);
    reader.read_exact(buf).map_err(Error::Read)
}

fn skip<R: Read>(reader: &mut R, len: usize) -> Result<()> {
    let mut scratch = [0u8; 256];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(scratch.len());
        reader.read_exact(&mut scratch[..n]).map_err(Error::Read)?;
        remaining -= n;
    }
    Ok(())
}
