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

//! Events surfaced to the application by [`crate::Connection::feed_data`].

use bytes::Bytes;
use indexmap::IndexMap;

use crate::record::Role;

/// Signals the application about a new incoming request.
///
/// Emitted exactly once per request, when the `Params` stream reaches EOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBegin {
    /// Identifier of the request.
    pub request_id: u16,
    /// The role the web server expects the application to perform.
    pub role: Role,
    /// Whether the server asked that the connection be kept open after this
    /// request finishes (`FCGI_KEEP_CONN`).
    pub keep_connection: bool,
    /// CGI parameters, in the order the server sent them.
    pub params: IndexMap<String, String>,
}

/// Body data for a request's `Stdin` stream.
///
/// An empty `data` signals end of stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestData {
    /// Identifier of the request.
    pub request_id: u16,
    /// Raw request body bytes, or empty at EOF.
    pub data: Bytes,
}

/// Secondary-stream data for a request's `Data` stream (filter role only).
///
/// An empty `data` signals end of stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSecondaryData {
    /// Identifier of the request.
    pub request_id: u16,
    /// Raw secondary-stream bytes, or empty at EOF.
    pub data: Bytes,
}

/// Signals the application that the server wants the request aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAbort {
    /// Identifier of the request.
    pub request_id: u16,
}

/// Any event the engine can surface from [`crate::Connection::feed_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin(RequestBegin),
    Data(RequestData),
    SecondaryData(RequestSecondaryData),
    Abort(RequestAbort),
}
