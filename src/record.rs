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

//! FastCGI record framing: the 8-byte header, the closed set of record
//! types, and the tagged [`Record`] union that replaces the per-class
//! hierarchy of the reference implementation with a single Rust enum.

use std::fmt::{self, Display};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{error::ProtocolError, nvpair};

/// Only version of the FastCGI protocol this engine understands.
pub(crate) const VERSION: u8 = 1;
/// Size of the fixed record header, in bytes.
pub(crate) const HEADER_LEN: usize = 8;

/// Application role requested by a `BeginRequest` record.
///
/// Modeled as a newtype over `u16` rather than a closed enum: the wire
/// protocol lets a peer request any role value, and a connection is
/// expected to reject roles it does not recognize via [`ProtocolStatus::UNKNOWN_ROLE`]
/// rather than fail to decode the record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Role(pub u16);

impl Role {
    /// Serves full HTTP-style requests and produces a response.
    pub const RESPONDER: Role = Role(1);
    /// Accepts or denies a request without producing a body.
    pub const AUTHORIZER: Role = Role(2);
    /// Transforms a primary stream plus a secondary data stream.
    pub const FILTER: Role = Role(3);
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Outcome code carried by an `EndRequest` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolStatus(pub u8);

impl ProtocolStatus {
    /// The request was processed to completion.
    pub const REQUEST_COMPLETE: ProtocolStatus = ProtocolStatus(0);
    /// This application does not support multiplexed connections.
    pub const CANT_MPX_CONN: ProtocolStatus = ProtocolStatus(1);
    /// The application is too busy to service a new request.
    pub const OVERLOADED: ProtocolStatus = ProtocolStatus(2);
    /// The request's role was not one the application accepts.
    pub const UNKNOWN_ROLE: ProtocolStatus = ProtocolStatus(3);
}

/// Closed catalog of FastCGI/1.0 record type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
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

impl RecordType {
    fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            _ => return None,
        })
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeginRequest => "BeginRequest",
            Self::AbortRequest => "AbortRequest",
            Self::EndRequest => "EndRequest",
            Self::Params => "Params",
            Self::Stdin => "Stdin",
            Self::Stdout => "Stdout",
            Self::Stderr => "Stderr",
            Self::Data => "Data",
            Self::GetValues => "GetValues",
            Self::GetValuesResult => "GetValuesResult",
            Self::UnknownType => "UnknownType",
        };
        f.write_str(name)
    }
}

/// A single decoded or to-be-encoded FastCGI record.
///
/// A tagged union, per the protocol's closed set of payload shapes (see
/// the "Tagged union over inheritance" design note) — there is no class
/// hierarchy here, just one enum per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Inbound: begins a new request.
    BeginRequest { request_id: u16, role: Role, flags: u8 },
    /// Inbound: asks the application to abandon a request.
    AbortRequest { request_id: u16 },
    /// Outbound: reports a request's final disposition.
    EndRequest {
        request_id: u16,
        app_status: u32,
        protocol_status: ProtocolStatus,
    },
    /// Inbound stream: CGI parameters; an empty payload signals EOF.
    Params { request_id: u16, data: Bytes },
    /// Inbound stream: request body; an empty payload signals EOF.
    Stdin { request_id: u16, data: Bytes },
    /// Inbound stream (filter role only): secondary data; empty = EOF.
    Data { request_id: u16, data: Bytes },
    /// Outbound stream: response body; an empty payload signals EOF.
    Stdout { request_id: u16, data: Bytes },
    /// Outbound stream: diagnostic output.
    Stderr { request_id: u16, data: Bytes },
    /// Management: queries connection-level FastCGI values.
    GetValues { keys: Vec<String> },
    /// Management: answers a `GetValues` query.
    GetValuesResult { pairs: Vec<(String, String)> },
    /// Management: reply sent for an unrecognized management record type.
    UnknownType { record_type: u8 },
    /// Synthetic, decode-only marker for a non-management-catalog record
    /// type seen on the management channel (`request_id == 0`). Never
    /// encoded; the connection layer turns it into an `UnknownType` reply.
    UnknownManagementRecord { record_type: u8 },
}

impl Record {
    /// The `request_id` this record targets, or `0` for management records.
    pub fn request_id(&self) -> u16 {
        match self {
            Record::BeginRequest { request_id, .. }
            | Record::AbortRequest { request_id }
            | Record::EndRequest { request_id, .. }
            | Record::Params { request_id, .. }
            | Record::Stdin { request_id, .. }
            | Record::Data { request_id, .. }
            | Record::Stdout { request_id, .. }
            | Record::Stderr { request_id, .. } => *request_id,
            Record::GetValues { .. }
            | Record::GetValuesResult { .. }
            | Record::UnknownType { .. }
            | Record::UnknownManagementRecord { .. } => 0,
        }
    }

    /// The catalog [`RecordType`] of this record, if it has one.
    ///
    /// Returns `None` only for [`Record::UnknownManagementRecord`], which by
    /// definition carries a type code outside the catalog.
    pub fn record_type(&self) -> Option<RecordType> {
        Some(match self {
            Record::BeginRequest { .. } => RecordType::BeginRequest,
            Record::AbortRequest { .. } => RecordType::AbortRequest,
            Record::EndRequest { .. } => RecordType::EndRequest,
            Record::Params { .. } => RecordType::Params,
            Record::Stdin { .. } => RecordType::Stdin,
            Record::Data { .. } => RecordType::Data,
            Record::Stdout { .. } => RecordType::Stdout,
            Record::Stderr { .. } => RecordType::Stderr,
            Record::GetValues { .. } => RecordType::GetValues,
            Record::GetValuesResult { .. } => RecordType::GetValuesResult,
            Record::UnknownType { .. } => RecordType::UnknownType,
            Record::UnknownManagementRecord { .. } => return None,
        })
    }

    /// Encodes this record (header + content; no padding) to `out`.
    ///
    /// # Panics
    ///
    /// Panics if called on [`Record::UnknownManagementRecord`], which is a
    /// decode-only placeholder never meant to be put back on the wire.
    pub fn encode(&self, out: &mut BytesMut) {
        let mut content = BytesMut::new();
        match self {
            Record::BeginRequest { role, flags, .. } => {
                content.put_u16(role.0);
                content.put_u8(*flags);
                content.put_bytes(0, 5);
            }
            Record::AbortRequest { .. } => {}
            Record::EndRequest {
                app_status,
                protocol_status,
                ..
            } => {
                content.put_u32(*app_status);
                content.put_u8(protocol_status.0);
                content.put_bytes(0, 3);
            }
            Record::Params { data, .. }
            | Record::Stdin { data, .. }
            | Record::Data { data, .. }
            | Record::Stdout { data, .. }
            | Record::Stderr { data, .. } => {
                content.put_slice(data);
            }
            Record::GetValues { keys } => {
                let pairs: Vec<(&str, &str)> = keys.iter().map(|k| (k.as_str(), "")).collect();
                content.put_slice(&nvpair::encode_pairs(pairs));
            }
            Record::GetValuesResult { pairs } => {
                let pairs: Vec<(&str, &str)> = pairs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                content.put_slice(&nvpair::encode_pairs(pairs));
            }
            Record::UnknownType { record_type } => {
                content.put_u8(*record_type);
                content.put_bytes(0, 7);
            }
            Record::UnknownManagementRecord { .. } => {
                unreachable!("UnknownManagementRecord is a decode-only placeholder")
            }
        }

        out.put_u8(VERSION);
        out.put_u8(self.record_type().expect("checked above") as u8);
        out.put_u16(self.request_id());
        out.put_u16(content.len() as u16);
        out.put_u8(0); // padding_length: this engine never emits padding
        out.put_u8(0); // reserved
        out.put_slice(&content);
    }

    /// Convenience wrapper around [`Record::encode`] that returns a fresh
    /// buffer.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

/// Attempts to decode a single record from the head of `buf`.
///
/// On success, the consumed bytes (header + content + padding) are removed
/// from `buf`. Returns `Ok(None)` if `buf` does not yet hold a complete
/// record — the caller should wait for more data and try again.
pub fn decode_record(buf: &mut BytesMut) -> Result<Option<Record>, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let version = buf[0];
    let type_byte = buf[1];
    let request_id = u16::from_be_bytes([buf[2], buf[3]]);
    let content_length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let padding_length = buf[6] as usize;

    let total_len = HEADER_LEN + content_length + padding_length;
    if buf.len() < total_len {
        return Ok(None);
    }

    if version != VERSION {
        return Err(ProtocolError::UnexpectedVersion { version });
    }

    let content = Bytes::copy_from_slice(&buf[HEADER_LEN..HEADER_LEN + content_length]);
    buf.advance(total_len);

    trace!(record_type = type_byte, request_id, content_length, "decoded record header");

    let Some(record_type) = RecordType::from_u8(type_byte) else {
        return if request_id == 0 {
            Ok(Some(Record::UnknownManagementRecord {
                record_type: type_byte,
            }))
        } else {
            Err(ProtocolError::UnknownRecordType {
                record_type: type_byte,
            })
        };
    };

    parse_content(record_type, request_id, content).map(Some)
}

/// Bounds-checks `content` against the fixed-size prefix a record type's
/// layout requires, so a peer-supplied record with a too-short declared
/// `content_length` surfaces a [`ProtocolError`] instead of an index panic.
fn require_len(
    record_type: RecordType,
    content: &[u8],
    expected: usize,
) -> Result<(), ProtocolError> {
    if content.len() < expected {
        return Err(ProtocolError::RecordContentTruncated {
            record_type,
            expected,
            actual: content.len(),
        });
    }
    Ok(())
}

fn parse_content(
    record_type: RecordType,
    request_id: u16,
    content: Bytes,
) -> Result<Record, ProtocolError> {
    Ok(match record_type {
        RecordType::BeginRequest => {
            require_len(record_type, &content, 3)?;
            let role = Role(u16::from_be_bytes([content[0], content[1]]));
            let flags = content[2];
            Record::BeginRequest {
                request_id,
                role,
                flags,
            }
        }
        RecordType::AbortRequest => Record::AbortRequest { request_id },
        RecordType::EndRequest => {
            require_len(record_type, &content, 5)?;
            let app_status = u32::from_be_bytes([content[0], content[1], content[2], content[3]]);
            let protocol_status = ProtocolStatus(content[4]);
            Record::EndRequest {
                request_id,
                app_status,
                protocol_status,
            }
        }
        RecordType::Params => Record::Params {
            request_id,
            data: content,
        },
        RecordType::Stdin => Record::Stdin {
            request_id,
            data: content,
        },
        RecordType::Data => Record::Data {
            request_id,
            data: content,
        },
        RecordType::Stdout => Record::Stdout {
            request_id,
            data: content,
        },
        RecordType::Stderr => Record::Stderr {
            request_id,
            data: content,
        },
        RecordType::GetValues => {
            let pairs = nvpair::decode_pairs(&content)?;
            Record::GetValues {
                keys: pairs.into_iter().map(|(k, _)| k).collect(),
            }
        }
        RecordType::GetValuesResult => {
            let pairs = nvpair::decode_pairs(&content)?;
            Record::GetValuesResult { pairs }
        }
        RecordType::UnknownType => {
            require_len(record_type, &content, 1)?;
            Record::UnknownType {
                record_type: content[0],
            }
        }
    })
}
