extern crate byteorder;
extern crate env_logger;
extern crate fastcgi_client;

use byteorder::{ByteOrder, NetworkEndian};
use fastcgi_client::*;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

struct Record {
    header: RecordHeader,
    content: Vec<u8>,
}

fn read_record(socket: &mut TcpStream) -> Record {
    let mut raw = [0u8; HEADER_LEN];
    socket.read_exact(&mut raw).expect("failed to read header");
    let header = RecordHeader::decode(&raw);
    let mut content = vec![0u8; header.content_length as usize];
    socket.read_exact(&mut content).expect("failed to read content");
    let mut padding = vec![0u8; header.padding_length as usize];
    socket.read_exact(&mut padding).expect("failed to read padding");
    Record { header, content }
}

fn read_len(idx: &mut usize, bytes: &[u8]) -> usize {
    let len: usize;
    if bytes[*idx] < 0x80 {
        len = bytes[*idx] as usize;
        *idx += 1;
    } else {
        len = NetworkEndian::read_u32(&bytes[*idx..]) as usize & 0x7FFF_FFFF;
        *idx += 4;
    }
    len
}

fn parse_params(bytes: &[u8]) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let name_len = read_len(&mut idx, bytes);
        let value_len = read_len(&mut idx, bytes);
        let name = String::from_utf8_lossy(&bytes[idx .. idx + name_len]).into_owned();
        idx += name_len;
        let value = String::from_utf8_lossy(&bytes[idx .. idx + value_len]).into_owned();
        idx += value_len;
        params.insert(name, value);
    }
    params
}

/// What the fake server saw from the client.
struct Received {
    begin: BeginRequest,
    request_id: u16,
    params: HashMap<String, String>,
    stdin: Vec<u8>,
}

fn write_record(socket: &mut TcpStream, record_type: RecordType, request_id: u16,
                content: &[u8], padding: u8) {
    let mut out = encode_header(record_type, request_id, content.len() as u16, padding).to_vec();
    out.extend_from_slice(content);
    out.extend(vec![0u8; padding as usize]);
    socket.write_all(&out).expect("failed to write record");
}

/// Accepts one connection, reads a full request (through the empty STDIN record), answers
/// with `stdout` split into padded records plus some STDERR, then closes.
fn serve_one(listener: TcpListener, stdout: &'static [u8]) -> thread::JoinHandle<Received> {
    thread::spawn(move || {
        let (mut socket, _addr) = listener.accept().expect("failed to accept");

        let first = read_record(&mut socket);
        assert_eq!(first.header.kind(), Some(RecordType::BeginRequest));
        let begin = BeginRequest::decode(&first.content).expect("bad begin-request body");
        let request_id = first.header.request_id;

        let mut params_bytes = vec![];
        loop {
            let record = read_record(&mut socket);
            assert_eq!(record.header.kind(), Some(RecordType::Params));
            if record.content.is_empty() {
                break;
            }
            params_bytes.extend(record.content);
        }

        let mut stdin = vec![];
        loop {
            let record = read_record(&mut socket);
            assert_eq!(record.header.kind(), Some(RecordType::Stdin));
            if record.content.is_empty() {
                break;
            }
            stdin.extend(record.content);
        }

        let (head, tail) = stdout.split_at(stdout.len() / 2);
        write_record(&mut socket, RecordType::Stdout, request_id, head, 5);
        write_record(&mut socket, RecordType::Stderr, request_id, b"PHP Warning: test", 3);
        write_record(&mut socket, RecordType::Stdout, request_id, tail, 0);
        write_record(&mut socket, RecordType::Stdout, request_id, b"", 0);
        write_record(&mut socket, RecordType::Stderr, request_id, b"", 0);
        let end = EndRequest {
            app_status: 0,
            protocol_status: ProtocolStatus::RequestComplete as u8,
        };
        write_record(&mut socket, RecordType::EndRequest, request_id, &end.encode(), 0);

        Received {
            begin,
            request_id,
            params: parse_params(&params_bytes),
            stdin,
        }
    })
}

fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let port = listener.local_addr().expect("no local addr").port();
    (listener, port)
}

#[test]
fn get_request_round_trip() {
    let _ = env_logger::init();
    let (listener, port) = listen();
    let response = b"Content-type: text/html\r\n\r\n<h1>hello</h1>";
    let server = serve_one(listener, response);

    let mut session = Session::with_config(SessionConfig::default().with_request_id(3));
    session.connect("127.0.0.1", port).unwrap();
    session.begin_request().unwrap();
    session.send_params(vec![
        ("SCRIPT_FILENAME", "/srv/www/index.php"),
        ("REQUEST_METHOD", "GET"),
    ]).unwrap();
    session.end_params().unwrap();
    session.end_body().unwrap();

    let mut body = vec![];
    let mut calls = 0;
    session.drain(|bytes| {
        calls += 1;
        body.extend_from_slice(bytes);
    }).unwrap();
    session.close();
    session.close();

    assert_eq!(&body[..], &response[..]);
    assert_eq!(calls, 2);

    let received = server.join().unwrap();
    assert_eq!(received.request_id, 3);
    assert_eq!(received.begin, BeginRequest { role: Role::Responder, keep_connection: false });
    assert_eq!(received.params["SCRIPT_FILENAME"], "/srv/www/index.php");
    assert_eq!(received.params["REQUEST_METHOD"], "GET");
    assert!(received.stdin.is_empty());
}

#[test]
fn post_request_with_large_body_and_param() {
    let _ = env_logger::init();
    let (listener, port) = listen();
    let server = serve_one(listener, b"Status: 201 Created\r\n\r\n");

    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let cookie = "c".repeat(70_000);

    let mut session = Session::new();
    session.connect("127.0.0.1", port).unwrap();
    session.begin_request().unwrap();
    session.send_param("REQUEST_METHOD", "POST").unwrap();
    session.send_param("CONTENT_LENGTH", body.len().to_string()).unwrap();
    session.send_param("HTTP_COOKIE", &cookie).unwrap();
    session.end_params().unwrap();
    session.send_body(&body[..1000]).unwrap();
    session.send_body(&body[1000..]).unwrap();
    session.end_body().unwrap();

    let mut out = vec![];
    session.drain(|bytes| out.extend_from_slice(bytes)).unwrap();
    assert_eq!(&out[..], &b"Status: 201 Created\r\n\r\n"[..]);

    let received = server.join().unwrap();
    assert_eq!(received.params["REQUEST_METHOD"], "POST");
    assert_eq!(received.params["CONTENT_LENGTH"], "200000");
    assert_eq!(received.params["HTTP_COOKIE"], cookie);
    assert_eq!(received.stdin, body);
}

#[test]
fn legacy_sequence_with_end_request() {
    let _ = env_logger::init();
    let (listener, port) = listen();

    let server = thread::spawn(move || {
        let (mut socket, _addr) = listener.accept().expect("failed to accept");
        let mut types = vec![];
        loop {
            let record = read_record(&mut socket);
            let kind = record.header.kind();
            types.push(kind);
            if kind == Some(RecordType::EndRequest) {
                assert!(record.content.is_empty());
                break;
            }
        }
        write_record(&mut socket, RecordType::Stdout, 1, b"hi", 0);
        types
    });

    let mut session = Session::new();
    session.connect("127.0.0.1", port).unwrap();
    session.begin_request().unwrap();
    session.send_param("SCRIPT_FILENAME", "/srv/www/index.php").unwrap();
    session.send_param("REQUEST_METHOD", "GET").unwrap();
    session.send_end_request().unwrap();

    let mut chunks = vec![];
    session.drain(|bytes| chunks.push(bytes.to_vec())).unwrap();
    assert_eq!(chunks, vec![b"hi".to_vec()]);

    assert_eq!(server.join().unwrap(), vec![
        Some(RecordType::BeginRequest),
        Some(RecordType::Params),
        Some(RecordType::Params),
        Some(RecordType::EndRequest),
    ]);
}

#[test]
fn connect_failure_leaves_session_unconnected() {
    let _ = env_logger::init();
    let (listener, port) = listen();
    drop(listener);

    let mut session = Session::new();
    match session.connect("127.0.0.1", port) {
        Err(Error::Connect(_)) => (),
        other => panic!("expected connect error, got {:?}", other),
    }
    assert_eq!(session.state(), State::Unconnected);
    assert!(session.get_ref().is_none());
}
