//! Binary lane frame parsing (panic-free).
//!
//! Layout (little-endian):
//!
//! ```text
//! v:u8 flags:u8 poll_delay_ms:u32
//! channel_id:str16 trace_id:str16 route_name:str16
//! error_count:u16 { kind:u8 code:u32 message:str16 }*
//! body: remaining bytes
//! ```
//!
//! `str16` is a u16 length followed by UTF-8 bytes. Only `v` and `flags` are
//! mandatory; a frame that ends at a section boundary leaves the rest at their
//! defaults. A frame that ends inside a section is rejected.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ChanpollError, Result};

use super::envelope::{Envelope, ErrorKind, ProtocolError};

/// Current binary wire version.
pub const BINARY_VERSION: u8 = 1;

pub const FLAG_NOT_READY: u8 = 0x01;
pub const FLAG_TERMINATED: u8 = 0x02;
pub const FLAG_EMPTY: u8 = 0x04;
pub const FLAG_ERROR: u8 = 0x08;

pub(crate) fn encode(env: &Envelope) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(
        16 + env.channel_id.len() + env.trace_id.len() + env.route_name.len() + env.body.len(),
    );

    let mut flags = 0u8;
    if env.not_ready {
        flags |= FLAG_NOT_READY;
    }
    if env.terminated {
        flags |= FLAG_TERMINATED;
    }
    if env.empty {
        flags |= FLAG_EMPTY;
    }
    if env.error {
        flags |= FLAG_ERROR;
    }

    buf.put_u8(BINARY_VERSION);
    buf.put_u8(flags);
    buf.put_u32_le(env.poll_delay_ms);
    put_str16(&mut buf, &env.channel_id, "channel_id")?;
    put_str16(&mut buf, &env.trace_id, "trace_id")?;
    put_str16(&mut buf, &env.route_name, "route_name")?;

    let count = u16::try_from(env.errors.len())
        .map_err(|_| ChanpollError::BadRequest("too many errors for one frame".into()))?;
    buf.put_u16_le(count);
    for e in &env.errors {
        buf.put_u8(e.kind().to_wire());
        buf.put_u32_le(e.code());
        put_str16(&mut buf, e.message(), "error message")?;
    }

    buf.put_slice(&env.body);
    Ok(buf.freeze())
}

pub(crate) fn decode(mut buf: Bytes) -> Result<Envelope> {
    if buf.remaining() < 2 {
        return Err(ChanpollError::BadRequest("frame too short".into()));
    }

    let v = buf.get_u8();
    if v != BINARY_VERSION {
        return Err(ChanpollError::UnsupportedVersion(v));
    }
    let flags = buf.get_u8();

    let mut env = Envelope {
        not_ready: flags & FLAG_NOT_READY != 0,
        terminated: flags & FLAG_TERMINATED != 0,
        empty: flags & FLAG_EMPTY != 0,
        error: flags & FLAG_ERROR != 0,
        ..Envelope::default()
    };

    if !buf.has_remaining() {
        return Ok(env);
    }
    if buf.remaining() < 4 {
        return Err(ChanpollError::BadRequest("truncated poll delay".into()));
    }
    env.poll_delay_ms = buf.get_u32_le();

    let mut strs: [String; 3] = Default::default();
    for (slot, what) in strs
        .iter_mut()
        .zip(["channel_id", "trace_id", "route_name"])
    {
        if !buf.has_remaining() {
            break;
        }
        *slot = get_str16(&mut buf, what)?;
    }
    let [channel_id, trace_id, route_name] = strs;
    env.channel_id = channel_id;
    env.trace_id = trace_id;
    env.route_name = route_name;

    if !buf.has_remaining() {
        return Ok(env);
    }
    if buf.remaining() < 2 {
        return Err(ChanpollError::BadRequest("truncated error count".into()));
    }
    let count = buf.get_u16_le();
    for _ in 0..count {
        if buf.remaining() < 5 {
            return Err(ChanpollError::BadRequest("truncated error entry".into()));
        }
        let kind = ErrorKind::from_wire(u32::from(buf.get_u8()));
        let code = buf.get_u32_le();
        let message = get_str16(&mut buf, "error message")?;
        env.errors.push(ProtocolError::new(kind, code, message));
    }

    // Remaining bytes are payload.
    env.body = buf.copy_to_bytes(buf.remaining());
    Ok(env)
}

fn put_str16(buf: &mut BytesMut, s: &str, what: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| ChanpollError::BadRequest(format!("{what} longer than 65535 bytes")))?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str16(buf: &mut Bytes, what: &str) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(ChanpollError::BadRequest(format!("truncated {what} length")));
    }
    let len = usize::from(buf.get_u16_le());
    if buf.remaining() < len {
        return Err(ChanpollError::BadRequest(format!("truncated {what}")));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| ChanpollError::BadRequest(format!("{what} is not utf-8")))
}
