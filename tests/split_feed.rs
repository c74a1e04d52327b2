//! The engine has to behave as if fed from a real socket: arrival at
//! arbitrary byte boundaries must never change what gets decoded. This
//! mirrors spec.md's testable property that `feed_data` is insensitive to
//! how the caller chunks the underlying transport reads.

use bytes::{BufMut, Bytes, BytesMut};
use fcgi_proto::{Connection, Event};

fn record(record_type: u8, request_id: u16, content: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(1);
    buf.put_u8(record_type);
    buf.put_u16(request_id);
    buf.put_u16(content.len() as u16);
    buf.put_u8(0);
    buf.put_u8(0);
    buf.put_slice(content);
    buf.freeze()
}

fn begin_request(request_id: u16) -> Bytes {
    let mut content = BytesMut::new();
    content.put_u16(1); // RESPONDER
    content.put_u8(0);
    content.put_bytes(0, 5);
    record(1, request_id, &content)
}

fn name_value_pair(name: &str, value: &str) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(name.len() as u8);
    buf.put_u8(value.len() as u8);
    buf.put_slice(name.as_bytes());
    buf.put_slice(value.as_bytes());
    buf
}

fn whole_conversation() -> Vec<u8> {
    let mut params = BytesMut::new();
    params.extend_from_slice(&name_value_pair("REQUEST_METHOD", "POST"));

    let mut out = BytesMut::new();
    out.extend_from_slice(&begin_request(1));
    out.extend_from_slice(&record(4, 1, &params)); // Params
    out.extend_from_slice(&record(4, 1, b"")); // Params EOF
    out.extend_from_slice(&record(5, 1, b"payload")); // Stdin
    out.extend_from_slice(&record(5, 1, b"")); // Stdin EOF
    out.to_vec()
}

#[test]
fn byte_at_a_time_matches_one_shot() {
    let conversation = whole_conversation();

    let mut whole = Connection::default();
    let whole_events = whole.feed_data(&conversation).unwrap();

    let mut split = Connection::default();
    let mut split_events = Vec::new();
    for byte in &conversation {
        split_events.extend(split.feed_data(std::slice::from_ref(byte)).unwrap());
    }

    assert_eq!(whole_events.len(), split_events.len());
    for (a, b) in whole_events.iter().zip(split_events.iter()) {
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }
}

#[test]
fn arbitrary_chunk_boundaries_match_one_shot() {
    let conversation = whole_conversation();

    let mut whole = Connection::default();
    let whole_events = whole.feed_data(&conversation).unwrap();

    // Split at a handful of boundaries that land mid-header and mid-payload,
    // not just on record edges.
    let boundaries = [1, 3, 9, 10, 17, 18, 40, 41, conversation.len()];
    let mut chunked = Connection::default();
    let mut chunked_events = Vec::new();
    let mut start = 0;
    for &end in &boundaries {
        let end = end.min(conversation.len());
        if end > start {
            chunked_events.extend(chunked.feed_data(&conversation[start..end]).unwrap());
            start = end;
        }
    }

    assert_eq!(
        whole_events
            .iter()
            .map(|e| format!("{e:?}"))
            .collect::<Vec<_>>(),
        chunked_events
            .iter()
            .map(|e| format!("{e:?}"))
            .collect::<Vec<_>>()
    );
}

#[test]
fn partial_record_produces_no_events_until_complete() {
    let begin = begin_request(1);
    let mut conn = Connection::default();

    let events = conn.feed_data(&begin[..begin.len() - 1]).unwrap();
    assert!(events.is_empty());
    assert!(conn.data_to_send().is_empty());

    let events = conn.feed_data(&begin[begin.len() - 1..]).unwrap();
    assert!(events.is_empty()); // BeginRequest alone emits no event, only Params EOF does
    assert!(matches!(
        conn.feed_data(&record(4, 1, b""))
            .unwrap()
            .first()
            .unwrap(),
        Event::Begin(_)
    ));
}
