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

#![warn(rust_2018_idioms)]
#![warn(clippy::dbg_macro, clippy::print_stdout)]

//! A sans-I/O FastCGI/1.0 protocol engine.
//!
//! This crate is a pure state machine and codec for the byte stream spoken
//! between a web server and a FastCGI application process. It performs no
//! networking, threading, or file I/O of its own: the caller feeds it
//! inbound bytes with [`Connection::feed_data`], reads back outbound bytes
//! with [`Connection::data_to_send`], and drives application responses
//! through [`Connection::send_headers`], [`Connection::send_data`] and
//! [`Connection::end_request`].
//!
//! See [`Connection`] for the full API, [`Event`] for what gets surfaced to
//! the application, and [`ProtocolError`] for the single failure category
//! the engine raises.

mod connection;
mod error;
mod event;
mod nvpair;
mod record;
mod state;

pub(crate) const LIB_VERSION: &str = env!("LIB_BUILD_VERSION");

pub use crate::{
    connection::Connection,
    error::{ProtoResult, ProtocolError},
    event::{Event, RequestAbort, RequestBegin, RequestData, RequestSecondaryData},
    record::{ProtocolStatus, Role},
};
