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

//! Name-value pair list codec shared by `Params`, `GetValues` and
//! `GetValuesResult` record payloads.
//!
//! Length prefixes are 1 byte for lengths below 128, or 4 big-endian bytes
//! with the top bit set otherwise (§4.1 of the protocol spec).

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Appends the length-prefix encoding of a single length value.
fn put_length(buf: &mut BytesMut, len: usize) {
    if len < 128 {
        buf.put_u8(len as u8);
    } else {
        buf.put_u32((len as u32) | 0x8000_0000);
    }
}

/// Encodes a list of name-value pairs into the FastCGI wire form: per pair,
/// the name length, the value length, the name bytes, then the value bytes.
pub fn encode_pairs<'a, I>(pairs: I) -> BytesMut
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut buf = BytesMut::new();
    for (name, value) in pairs {
        put_length(&mut buf, name.len());
        put_length(&mut buf, value.len());
        buf.put_slice(name.as_bytes());
        buf.put_slice(value.as_bytes());
    }
    buf
}

/// Reads a name length prefix from `buf`: the short form applies whenever
/// the top bit of the current byte is clear (the enclosing `while index <
/// buf.len()` loop already guarantees at least one byte is present, so no
/// extra lookahead is required here, unlike the value-length case below).
fn take_name_length(buf: &[u8], index: &mut usize) -> Result<usize, ProtocolError> {
    let remaining = buf.len() - *index;
    if buf[*index] & 0x80 == 0 {
        let len = buf[*index] as usize;
        *index += 1;
        Ok(len)
    } else if remaining > 4 {
        let raw = (&buf[*index..*index + 4]).get_u32();
        *index += 4;
        Ok((raw & 0x7fff_ffff) as usize)
    } else {
        Err(ProtocolError::NameLengthTruncated)
    }
}

/// Reads a value length prefix from `buf`, honoring the reference
/// implementation's strict `remaining > 1` short-form test: a buffer with
/// exactly one byte left falls through to the long-form branch and is
/// treated as truncated, even though one byte would suffice to hold a
/// short-form length. This is a pinned, intentional quirk (see
/// `DESIGN.md`), not tightened to `>= 1`, and applies only to the value
/// length — the name length has no such lookahead requirement.
fn take_value_length(buf: &[u8], index: &mut usize) -> Result<usize, ProtocolError> {
    let remaining = buf.len() - *index;
    if remaining > 1 && buf[*index] & 0x80 == 0 {
        let len = buf[*index] as usize;
        *index += 1;
        Ok(len)
    } else if remaining > 4 {
        let raw = (&buf[*index..*index + 4]).get_u32();
        *index += 4;
        Ok((raw & 0x7fff_ffff) as usize)
    } else {
        Err(ProtocolError::ValueLengthTruncated)
    }
}

/// Decodes a complete name-value pair list, returning ASCII names and
/// UTF-8 values as owned strings in wire order.
pub fn decode_pairs(buf: &[u8]) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut index = 0;
    let mut pairs = Vec::new();

    while index < buf.len() {
        let name_length = take_name_length(buf, &mut index)?;
        let value_length = take_value_length(buf, &mut index)?;

        if buf.len() - index >= name_length + value_length {
            let name_bytes = &buf[index..index + name_length];
            if !name_bytes.is_ascii() {
                return Err(ProtocolError::NameNotAscii);
            }
            let name = String::from_utf8(name_bytes.to_vec()).expect("checked ASCII above");
            let value = String::from_utf8(
                buf[index + name_length..index + name_length + value_length].to_vec(),
            )
            .map_err(|_| ProtocolError::ValueNotUtf8)?;
            index += name_length + value_length;
            pairs.push((name, value));
        } else {
            return Err(ProtocolError::PairDataTruncated);
        }
    }

    Ok(pairs)
}
