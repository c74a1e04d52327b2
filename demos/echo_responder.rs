//! Minimal synchronous FastCGI responder, demonstrating how a transport
//! wires bytes to [`fcgi_proto::Connection`]. Not part of the library: the
//! engine itself never touches a socket (translated in spirit from
//! `fcgiproto`'s `asyncio-server.py` demo, using a blocking
//! `std::net::TcpListener` loop instead of an async runtime since this
//! crate adds none).
//!
//! Run with `cargo run --example echo_responder -- 9500` and point a FastCGI
//! client (e.g. nginx's `fastcgi_pass`) at `127.0.0.1:9500`.

use std::{
    collections::HashMap,
    env,
    io::{Read, Write},
    net::{TcpListener, TcpStream},
};

use fcgi_proto::{Connection, Event};

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let port: u16 = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(9500);

    let listener = TcpListener::bind(("127.0.0.1", port))?;
    println!("listening on 127.0.0.1:{port}");

    for stream in listener.incoming() {
        let stream = stream?;
        if let Err(err) = handle_connection(stream) {
            eprintln!("connection error: {err}");
        }
    }

    Ok(())
}

struct PendingRequest {
    params: indexmap::IndexMap<String, String>,
    keep_connection: bool,
    body: Vec<u8>,
}

fn handle_connection(mut stream: TcpStream) -> std::io::Result<()> {
    let mut conn = Connection::default();
    let mut pending: HashMap<u16, PendingRequest> = HashMap::new();
    let mut buf = [0u8; 4096];

    loop {
        let read = stream.read(&mut buf)?;
        if read == 0 {
            return Ok(());
        }

        let events = match conn.feed_data(&buf[..read]) {
            Ok(events) => events,
            Err(err) => {
                eprintln!("protocol violation: {err}");
                return Ok(());
            }
        };

        let mut keep_open = true;
        for event in events {
            match event {
                Event::Begin(begin) => {
                    pending.insert(
                        begin.request_id,
                        PendingRequest {
                            params: begin.params,
                            keep_connection: begin.keep_connection,
                            body: Vec::new(),
                        },
                    );
                }
                Event::Data(data) => {
                    let Some(request) = pending.get_mut(&data.request_id) else {
                        continue;
                    };
                    if data.data.is_empty() {
                        let request = pending.remove(&data.request_id).expect("checked above");
                        keep_open = request.keep_connection;
                        respond(&mut conn, data.request_id, &request)
                            .expect("sending a just-begun response cannot violate the FSM");
                    } else {
                        request.body.extend_from_slice(&data.data);
                    }
                }
                Event::SecondaryData(_) | Event::Abort(_) => {}
            }
        }

        stream.write_all(&conn.data_to_send())?;

        if !keep_open {
            return Ok(());
        }
    }
}

fn respond(
    conn: &mut Connection,
    request_id: u16,
    request: &PendingRequest,
) -> Result<(), fcgi_proto::ProtocolError> {
    let rows: String = request
        .params
        .iter()
        .map(|(k, v)| format!("{k}={v}\n"))
        .collect();
    let body = request.body.clone();
    let response = format!(
        "FastCGI parameters:\n{rows}\nRequest body ({} bytes):\n{}\n",
        body.len(),
        String::from_utf8_lossy(&body)
    );

    conn.send_headers(
        request_id,
        [
            ("Content-Type".to_string(), "text/plain; charset=UTF-8".to_string()),
            ("Content-Length".to_string(), response.len().to_string()),
        ],
        Some(200),
    )?;
    conn.send_data(request_id, response.into_bytes(), true)?;
    Ok(())
}
