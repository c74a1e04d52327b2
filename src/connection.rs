// Copyright 2022 jmjoy
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The connection multiplexer: owns the input/output buffers and the live
//! request table, and dispatches decoded records to the right place.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::{
    error::ProtocolError,
    event::Event,
    record::{self, ProtocolStatus, Record, Role},
    state::RequestState,
};

/// FastCGI connection state machine.
///
/// Feed it inbound bytes with [`Connection::feed_data`], read back outbound
/// bytes with [`Connection::data_to_send`], and drive responses with
/// [`Connection::send_headers`], [`Connection::send_data`] and
/// [`Connection::end_request`]. The connection itself never touches a
/// socket; wiring this to a transport is the caller's job.
///
/// # Examples
///
/// ```
/// use fcgi_proto::{Connection, Role};
///
/// let mut conn = Connection::default();
/// let events = conn.feed_data(b"").unwrap();
/// assert!(events.is_empty());
/// assert!(conn.data_to_send().is_empty());
/// ```
#[derive(Debug)]
pub struct Connection {
    roles: HashSet<Role>,
    fcgi_values: HashMap<String, String>,
    input_buffer: BytesMut,
    output_buffer: BytesMut,
    requests: HashMap<u16, RequestState>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new([Role::RESPONDER], [])
    }
}

impl Connection {
    /// Creates a new connection accepting the given `roles`, seeded with
    /// `fcgi_values` for `GetValues` queries.
    ///
    /// `FCGI_MPXS_CONNS` is always present in the resulting value set,
    /// defaulting to `"1"` if not supplied explicitly — matching the
    /// reference implementation's constructor.
    pub fn new<R, V>(roles: R, fcgi_values: V) -> Self
    where
        R: IntoIterator<Item = Role>,
        V: IntoIterator<Item = (String, String)>,
    {
        let mut fcgi_values: HashMap<String, String> = fcgi_values.into_iter().collect();
        fcgi_values
            .entry("FCGI_MPXS_CONNS".to_string())
            .or_insert_with(|| "1".to_string());

        debug!(version = crate::LIB_VERSION, "fcgi-proto connection constructed");

        Self {
            roles: roles.into_iter().collect(),
            fcgi_values,
            input_buffer: BytesMut::new(),
            output_buffer: BytesMut::new(),
            requests: HashMap::new(),
        }
    }

    /// Feeds inbound bytes to the connection, returning the events they
    /// produced, in arrival order.
    ///
    /// May enqueue outbound bytes (role rejections, management replies) —
    /// call [`Connection::data_to_send`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on malformed framing or an illegal record
    /// sequence; the connection should be torn down by the caller when this
    /// happens.
    pub fn feed_data(&mut self, data: &[u8]) -> Result<Vec<Event>, ProtocolError> {
        self.input_buffer.extend_from_slice(data);
        let mut events = Vec::new();

        while let Some(record) = record::decode_record(&mut self.input_buffer)? {
            self.dispatch(record, &mut events)?;
        }

        Ok(events)
    }

    fn dispatch(&mut self, record: Record, events: &mut Vec<Event>) -> Result<(), ProtocolError> {
        if record.request_id() != 0 {
            let request_id = record.request_id();
            let role_rejected = matches!(
                &record,
                Record::BeginRequest { role, .. } if !self.roles.contains(role)
            );

            // A BeginRequest always creates the request's table entry. Any
            // other record for an id with no live request runs against a
            // transient, unstored FSM so the identical ProtocolError surfaces
            // without ever growing `requests` for an id that cannot succeed
            // (spec.md §3's invariant: the table holds a request_id only
            // from its first BeginRequest).
            let event = if matches!(record, Record::BeginRequest { .. }) {
                self.requests
                    .entry(request_id)
                    .or_insert_with(RequestState::new)
                    .receive_record(&record)?
            } else {
                match self.requests.get_mut(&request_id) {
                    Some(state) => state.receive_record(&record)?,
                    None => RequestState::new().receive_record(&record)?,
                }
            };

            if role_rejected {
                trace!(request_id, "rejecting BeginRequest for unaccepted role");
                self.send_record(Record::EndRequest {
                    request_id,
                    app_status: 0,
                    protocol_status: ProtocolStatus::UNKNOWN_ROLE,
                })?;
            } else if let Some(event) = event {
                events.push(event);
            }

            return Ok(());
        }

        match record {
            Record::GetValues { keys } => {
                let pairs = keys
                    .into_iter()
                    .filter_map(|key| {
                        self.fcgi_values.get(&key).cloned().map(|value| (key, value))
                    })
                    .collect();
                self.send_record(Record::GetValuesResult { pairs })
            }
            other => {
                let record_type = match &other {
                    Record::UnknownManagementRecord { record_type } => *record_type,
                    cataloged => cataloged.record_type().expect("checked above") as u8,
                };
                self.send_record(Record::UnknownType { record_type })
            }
        }
    }

    /// Drains and returns all bytes queued for the peer.
    pub fn data_to_send(&mut self) -> Bytes {
        std::mem::take(&mut self.output_buffer).freeze()
    }

    /// Sends response headers for `request_id`.
    ///
    /// Emits a single `Stdout` record containing an HTTP-style header
    /// block: an optional `Status: <code>` line, then one `key: value` line
    /// per header, followed by a blank line.
    pub fn send_headers<K, V, I>(
        &mut self,
        request_id: u16,
        headers: I,
        status: Option<u16>,
    ) -> Result<(), ProtocolError>
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut payload = BytesMut::new();
        if let Some(status) = status {
            payload.extend_from_slice(format!("Status: {status}\r\n").as_bytes());
        }
        for (key, value) in headers {
            payload.extend_from_slice(&key.into());
            payload.extend_from_slice(b": ");
            payload.extend_from_slice(&value.into());
            payload.extend_from_slice(b"\r\n");
        }
        payload.extend_from_slice(b"\r\n");

        self.send_record(Record::Stdout {
            request_id,
            data: payload.freeze(),
        })
    }

    /// Sends response body data for `request_id`.
    ///
    /// May be called several times before `end_request` is `true`. Passing
    /// `end_request: true` also sends the `Stdout` EOF marker and the final
    /// `EndRequest(REQUEST_COMPLETE)`.
    pub fn send_data(
        &mut self,
        request_id: u16,
        data: impl Into<Bytes>,
        end_request: bool,
    ) -> Result<(), ProtocolError> {
        self.send_record(Record::Stdout {
            request_id,
            data: data.into(),
        })?;

        if end_request {
            self.send_record(Record::Stdout {
                request_id,
                data: Bytes::new(),
            })?;
            self.send_record(Record::EndRequest {
                request_id,
                app_status: 0,
                protocol_status: ProtocolStatus::REQUEST_COMPLETE,
            })?;
        }

        Ok(())
    }

    /// Marks `request_id` finished with `REQUEST_COMPLETE` and no further
    /// output.
    pub fn end_request(&mut self, request_id: u16) -> Result<(), ProtocolError> {
        self.send_record(Record::EndRequest {
            request_id,
            app_status: 0,
            protocol_status: ProtocolStatus::REQUEST_COMPLETE,
        })
    }

    /// Validates `record` against its request's FSM (for non-management
    /// records), evicts the request on completion, and only then appends
    /// the encoded bytes to the output buffer — so a rejected send leaves
    /// both the request table and the output buffer untouched.
    fn send_record(&mut self, record: Record) -> Result<(), ProtocolError> {
        let request_id = record.request_id();

        if request_id != 0 {
            match self.requests.entry(request_id) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().send_record(&record)?;
                    if entry.get().is_finished() {
                        entry.remove();
                    }
                }
                Entry::Vacant(_) => {
                    // No such live request: run against a transient FSM so the
                    // same ProtocolError surfaces, without inserting a doomed
                    // entry for an id that can never legally receive output.
                    RequestState::new().send_record(&record)?;
                }
            }
        }

        trace!(request_id, record_type = ?record.record_type(), "enqueuing outbound record");
        record.encode(&mut self.output_buffer);
        Ok(())
    }
}
