//! JSON lane (camelCase field names).
//!
//! Every field is optional on decode, and an explicit `null` reads the same as
//! an absent field. The body travels as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ChanpollError, Result};

use super::envelope::{Envelope, ErrorKind, ProtocolError};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonEnvelope {
    #[serde(deserialize_with = "null_as_default")]
    channel_id: String,
    #[serde(deserialize_with = "null_as_default")]
    trace_id: String,
    #[serde(deserialize_with = "null_as_default")]
    route_name: String,
    #[serde(deserialize_with = "null_as_default")]
    is_not_ready: bool,
    #[serde(deserialize_with = "null_as_default")]
    is_terminated: bool,
    #[serde(deserialize_with = "null_as_default")]
    is_empty: bool,
    #[serde(deserialize_with = "null_as_default")]
    is_error: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    errors: Vec<JsonError>,
    #[serde(deserialize_with = "null_as_default")]
    poll_delay_ms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonError {
    /// Unknown or out-of-range kinds decode as unclassified.
    #[serde(deserialize_with = "null_as_default")]
    kind: u32,
    #[serde(deserialize_with = "null_as_default")]
    code: u32,
    #[serde(deserialize_with = "null_as_default")]
    message: String,
}

fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

pub(crate) fn encode(env: &Envelope) -> Result<Bytes> {
    let wire = JsonEnvelope {
        channel_id: env.channel_id.clone(),
        trace_id: env.trace_id.clone(),
        route_name: env.route_name.clone(),
        is_not_ready: env.not_ready,
        is_terminated: env.terminated,
        is_empty: env.empty,
        is_error: env.error,
        errors: env
            .errors
            .iter()
            .map(|e| JsonError {
                kind: u32::from(e.kind().to_wire()),
                code: e.code(),
                message: e.message().to_owned(),
            })
            .collect(),
        poll_delay_ms: env.poll_delay_ms,
        body: (!env.body.is_empty()).then(|| STANDARD.encode(&env.body)),
    };
    let v = serde_json::to_vec(&wire)
        .map_err(|e| ChanpollError::Internal(format!("json encode failed: {e}")))?;
    Ok(Bytes::from(v))
}

pub(crate) fn decode(buf: &[u8]) -> Result<Envelope> {
    let wire: JsonEnvelope = serde_json::from_slice(buf)
        .map_err(|e| ChanpollError::BadRequest(format!("invalid envelope json: {e}")))?;

    let body = match wire.body.as_deref() {
        None | Some("") => Bytes::new(),
        Some(s) => Bytes::from(
            STANDARD
                .decode(s)
                .map_err(|e| ChanpollError::BadRequest(format!("invalid body base64: {e}")))?,
        ),
    };

    Ok(Envelope {
        channel_id: wire.channel_id,
        trace_id: wire.trace_id,
        route_name: wire.route_name,
        not_ready: wire.is_not_ready,
        terminated: wire.is_terminated,
        empty: wire.is_empty,
        error: wire.is_error,
        errors: wire
            .errors
            .into_iter()
            .map(|e| ProtocolError::new(ErrorKind::from_wire(e.kind), e.code, e.message))
            .collect(),
        poll_delay_ms: wire.poll_delay_ms,
        body,
    })
}
