//! Black-box integration tests against the public API only: requests are
//! assembled as raw FastCGI bytes (mirroring what a web server actually puts
//! on the wire), since `Record` is an internal detail of the engine.

use bytes::{BufMut, Bytes, BytesMut};
use fcgi_proto::{Connection, Event, ProtocolError, Role};

const BEGIN_REQUEST: u8 = 1;
const ABORT_REQUEST: u8 = 2;
const END_REQUEST: u8 = 3;
const PARAMS: u8 = 4;
const STDIN: u8 = 5;
const STDOUT: u8 = 6;

fn record(record_type: u8, request_id: u16, content: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version
    buf.put_u8(record_type);
    buf.put_u16(request_id);
    buf.put_u16(content.len() as u16);
    buf.put_u8(0); // padding_length
    buf.put_u8(0); // reserved
    buf.put_slice(content);
    buf.freeze()
}

fn begin_request(request_id: u16, role: u16, keep_connection: bool) -> Bytes {
    let mut content = BytesMut::new();
    content.put_u16(role);
    content.put_u8(if keep_connection { 1 } else { 0 });
    content.put_bytes(0, 5);
    record(BEGIN_REQUEST, request_id, &content)
}

fn name_value_pair(name: &str, value: &str) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(name.len() as u8);
    buf.put_u8(value.len() as u8);
    buf.put_slice(name.as_bytes());
    buf.put_slice(value.as_bytes());
    buf
}

#[test]
fn full_responder_conversation() {
    let mut conn = Connection::default();

    let events = conn
        .feed_data(&begin_request(1, 1, false))
        .expect("begin request is well-formed");
    assert!(events.is_empty());

    let mut params = BytesMut::new();
    params.extend_from_slice(&name_value_pair("REQUEST_METHOD", "GET"));
    params.extend_from_slice(&name_value_pair("SCRIPT_NAME", "/hello"));
    conn.feed_data(&record(PARAMS, 1, &params)).unwrap();
    let events = conn.feed_data(&record(PARAMS, 1, b"")).unwrap();

    let Event::Begin(begin) = &events[0] else {
        panic!("expected RequestBegin, got {:?}", events[0]);
    };
    assert_eq!(begin.request_id, 1);
    assert_eq!(begin.role, Role::RESPONDER);
    assert!(!begin.keep_connection);
    assert_eq!(begin.params.get("REQUEST_METHOD"), Some(&"GET".to_string()));
    assert_eq!(begin.params.get("SCRIPT_NAME"), Some(&"/hello".to_string()));

    let events = conn.feed_data(&record(STDIN, 1, b"")).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::Data(data) if data.data.is_empty()));

    conn.send_headers(1, [("Content-Type", "text/plain")], Some(200))
        .unwrap();
    conn.send_data(1, "hello world", true).unwrap();

    let out = conn.data_to_send();
    assert_eq!(
        &out[..record(STDOUT, 1, b"Status: 200\r\nContent-Type: text/plain\r\n\r\n").len()],
        &record(STDOUT, 1, b"Status: 200\r\nContent-Type: text/plain\r\n\r\n")[..]
    );
    assert!(out.ends_with(&record(END_REQUEST, 1, &[0, 0, 0, 0, 0, 0, 0, 0])[..]));
}

#[test]
fn bad_protocol_version_is_rejected() {
    let mut conn = Connection::default();
    let mut bad = record(STDIN, 1, b"");
    let mut buf = BytesMut::from(&bad[..]);
    buf[0] = 2; // corrupt the version byte
    bad = buf.freeze();

    let err = conn.feed_data(&bad).unwrap_err();
    assert_eq!(
        err.to_string(),
        "FastCGI protocol violation: unexpected protocol version: 2"
    );
}

#[test]
fn unrecognized_management_record_gets_unknown_type_reply() {
    let mut conn = Connection::default();
    // type 200 has no meaning in the catalog; request_id 0 marks it management.
    let events = conn.feed_data(&record(200, 0, b"")).unwrap();
    assert!(events.is_empty());

    let out = conn.data_to_send();
    assert_eq!(out[1], 11); // UnknownType record type code
    assert_eq!(out[8], 200); // echoes back the unrecognized type code
}

#[test]
fn role_not_accepted_by_connection_is_rejected_without_an_error() {
    let mut conn = Connection::new([Role::RESPONDER], []);

    let events = conn
        .feed_data(&begin_request(1, Role::FILTER.0, false))
        .expect("an unaccepted role is reported to the peer, not raised as an error");
    assert!(events.is_empty());

    let out = conn.data_to_send();
    assert_eq!(out[1], END_REQUEST);
    assert_eq!(&out[2..4], &[0, 1]); // request_id
    assert_eq!(out[12], fcgi_proto::ProtocolStatus::UNKNOWN_ROLE.0); // protocol_status byte
}

#[test]
fn abort_mid_request_then_explicit_end_request() {
    let mut conn = Connection::default();
    conn.feed_data(&begin_request(1, 1, false)).unwrap();
    conn.feed_data(&record(PARAMS, 1, b"")).unwrap();
    conn.feed_data(&record(STDIN, 1, b"")).unwrap();

    let events = conn.feed_data(&record(ABORT_REQUEST, 1, b"")).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Abort(_)));

    conn.end_request(1).unwrap();
    let out = conn.data_to_send();
    assert_eq!(out[1], END_REQUEST);
}

#[test]
fn sending_for_an_unknown_request_id_is_rejected_and_buffer_stays_clean() {
    let mut conn = Connection::default();
    let err = conn.end_request(99).unwrap_err();
    assert!(matches!(err, ProtocolError::IllegalOutboundRecord { .. }));
    assert!(conn.data_to_send().is_empty());
}
