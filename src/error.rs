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

//! Error types and result type aliases for the FastCGI protocol engine.

use crate::record::RecordType;

/// Result type alias for fallible protocol operations.
pub type ProtoResult<T> = Result<T, ProtocolError>;

/// Raised whenever the peer or the caller violates the FastCGI/1.0 protocol.
///
/// Every variant's message is prefixed with `"FastCGI protocol violation: "`
/// so that `to_string()` matches the reference implementation's wording.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A record header declared a version other than 1.
    #[error("FastCGI protocol violation: unexpected protocol version: {version}")]
    UnexpectedVersion {
        /// The version byte actually seen.
        version: u8,
    },

    /// A non-management record (`request_id != 0`) used an unrecognized
    /// record type.
    #[error("FastCGI protocol violation: unknown record type: {record_type}")]
    UnknownRecordType {
        /// The raw, unrecognized record type byte.
        record_type: u8,
    },

    /// Fewer than the required bytes remained to decode a name length
    /// prefix in a name-value pair list.
    #[error("FastCGI protocol violation: not enough data to decode name length in name-value pair")]
    NameLengthTruncated,

    /// Fewer than the required bytes remained to decode a value length
    /// prefix in a name-value pair list.
    #[error("FastCGI protocol violation: not enough data to decode value length in name-value pair")]
    ValueLengthTruncated,

    /// The declared name/value lengths exceed the data actually present.
    #[error("FastCGI protocol violation: name/value data missing from buffer")]
    PairDataTruncated,

    /// A name-value pair's name contained a non-ASCII byte.
    #[error("FastCGI protocol violation: name-value pair name is not valid ASCII")]
    NameNotAscii,

    /// A name-value pair's value was not valid UTF-8.
    #[error("FastCGI protocol violation: name-value pair value is not valid UTF-8")]
    ValueNotUtf8,

    /// A record's declared `content_length` was too small to hold the
    /// type's fixed-size payload.
    #[error("FastCGI protocol violation: {record_type} record content too short: expected at least {expected} bytes, got {actual}")]
    RecordContentTruncated {
        /// The record type whose fixed layout could not be read.
        record_type: RecordType,
        /// The minimum content length required by that layout.
        expected: usize,
        /// The content length actually present.
        actual: usize,
    },

    /// A record arrived that the per-request state machine does not permit
    /// in its current state.
    #[error("FastCGI protocol violation: received unexpected {record_type} record in the {state} state")]
    UnexpectedInboundRecord {
        /// The record type that could not be accepted.
        record_type: RecordType,
        /// The FSM state label at the time of rejection.
        state: &'static str,
    },

    /// The application attempted to send a record the per-request state
    /// machine does not permit in its current state.
    #[error("FastCGI protocol violation: cannot send {record_type} record in the {state} state")]
    IllegalOutboundRecord {
        /// The record type that could not be sent.
        record_type: RecordType,
        /// The FSM state label at the time of rejection.
        state: &'static str,
    },
}
