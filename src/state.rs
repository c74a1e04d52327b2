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

//! Per-request state machine enforcing the legal ordering of FastCGI
//! record types for one of the three application roles.

use bytes::BytesMut;
use indexmap::IndexMap;
use tracing::trace;

use crate::{
    error::ProtocolError,
    event::{Event, RequestAbort, RequestBegin, RequestData, RequestSecondaryData},
    nvpair,
    record::{ProtocolStatus, Record, Role},
};

/// A label for each state a request can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    ExpectBeginRequest,
    ExpectParams,
    ExpectStdin,
    ExpectData,
    ExpectStdout,
    ExpectEndRequest,
    Finished,
}

impl State {
    /// Matches the spec's `EXPECT_*`/`FINISHED` naming, used verbatim in
    /// `ProtocolError` messages.
    fn label(self) -> &'static str {
        match self {
            State::ExpectBeginRequest => "EXPECT_BEGIN_REQUEST",
            State::ExpectParams => "EXPECT_PARAMS",
            State::ExpectStdin => "EXPECT_STDIN",
            State::ExpectData => "EXPECT_DATA",
            State::ExpectStdout => "EXPECT_STDOUT",
            State::ExpectEndRequest => "EXPECT_END_REQUEST",
            State::Finished => "FINISHED",
        }
    }
}

/// FSM plus accumulated per-request data: role, flags, and the buffered
/// (not-yet-EOF'd) `Params` payload.
#[derive(Debug)]
pub(crate) struct RequestState {
    state: State,
    role: Option<Role>,
    flags: u8,
    params_buffer: BytesMut,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            state: State::ExpectBeginRequest,
            role: None,
            flags: 0,
            params_buffer: BytesMut::new(),
        }
    }
}

impl RequestState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Applies an inbound record, returning the event it produces (if any)
    /// or a [`ProtocolError`] if the record is illegal in the current state.
    pub(crate) fn receive_record(
        &mut self,
        record: &Record,
    ) -> Result<Option<Event>, ProtocolError> {
        let unexpected = || ProtocolError::UnexpectedInboundRecord {
            record_type: record.record_type().expect("inbound records are cataloged"),
            state: self.state.label(),
        };

        match record {
            Record::BeginRequest {
                request_id,
                role,
                flags,
            } => {
                if self.state != State::ExpectBeginRequest {
                    return Err(unexpected());
                }
                self.role = Some(*role);
                self.flags = *flags;
                self.transition(State::ExpectParams, *request_id);
                Ok(None)
            }

            Record::Params { request_id, data } => {
                if self.state != State::ExpectParams {
                    return Err(unexpected());
                }
                if !data.is_empty() {
                    self.params_buffer.extend_from_slice(data);
                    return Ok(None);
                }

                let pairs = nvpair::decode_pairs(&self.params_buffer)?;
                let params: IndexMap<String, String> = pairs.into_iter().collect();
                let role = self.role.expect("role set by BeginRequest");
                let next = if role == Role::AUTHORIZER {
                    State::ExpectStdout
                } else {
                    State::ExpectStdin
                };
                self.transition(next, *request_id);
                Ok(Some(Event::Begin(RequestBegin {
                    request_id: *request_id,
                    role,
                    keep_connection: self.flags & 0x1 != 0,
                    params,
                })))
            }

            Record::Stdin { request_id, data } => {
                if self.state != State::ExpectStdin {
                    return Err(unexpected());
                }
                if data.is_empty() {
                    let role = self.role.expect("role set by BeginRequest");
                    let next = if role == Role::FILTER {
                        State::ExpectData
                    } else {
                        State::ExpectStdout
                    };
                    self.transition(next, *request_id);
                }
                Ok(Some(Event::Data(RequestData {
                    request_id: *request_id,
                    data: data.clone(),
                })))
            }

            Record::Data { request_id, data } => {
                if self.state != State::ExpectData {
                    return Err(unexpected());
                }
                if data.is_empty() {
                    self.transition(State::ExpectStdout, *request_id);
                }
                Ok(Some(Event::SecondaryData(RequestSecondaryData {
                    request_id: *request_id,
                    data: data.clone(),
                })))
            }

            Record::AbortRequest { request_id } => {
                if !(State::ExpectBeginRequest < self.state && self.state < State::Finished) {
                    return Err(unexpected());
                }
                self.transition(State::ExpectEndRequest, *request_id);
                Ok(Some(Event::Abort(RequestAbort {
                    request_id: *request_id,
                })))
            }

            _ => Err(unexpected()),
        }
    }

    /// Applies an outbound record, mutating the FSM or returning a
    /// [`ProtocolError`] if sending it is not legal in the current state.
    pub(crate) fn send_record(&mut self, record: &Record) -> Result<(), ProtocolError> {
        let illegal = || ProtocolError::IllegalOutboundRecord {
            record_type: record.record_type().expect("outbound records are cataloged"),
            state: self.state.label(),
        };

        match record {
            Record::Stdout { request_id, data } => {
                if self.state != State::ExpectStdout {
                    return Err(illegal());
                }
                if data.is_empty() {
                    self.transition(State::ExpectEndRequest, *request_id);
                }
                Ok(())
            }
            Record::EndRequest {
                request_id,
                protocol_status,
                ..
            } => {
                match self.state {
                    State::ExpectEndRequest if *protocol_status == ProtocolStatus::REQUEST_COMPLETE => {
                        self.transition(State::Finished, *request_id);
                        Ok(())
                    }
                    State::ExpectParams if *protocol_status != ProtocolStatus::REQUEST_COMPLETE => {
                        self.transition(State::Finished, *request_id);
                        Ok(())
                    }
                    _ => Err(illegal()),
                }
            }
            _ => Err(illegal()),
        }
    }

    fn transition(&mut self, next: State, request_id: u16) {
        trace!(request_id, from = self.state.label(), to = next.label(), "request state transition");
        self.state = next;
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}

impl State {
    fn rank(self) -> u8 {
        match self {
            State::ExpectBeginRequest => 0,
            State::ExpectParams => 1,
            State::ExpectStdin => 2,
            State::ExpectData => 3,
            State::ExpectStdout => 4,
            State::ExpectEndRequest => 5,
            State::Finished => 6,
        }
    }
}
