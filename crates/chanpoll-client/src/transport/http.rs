//! `reqwest`-backed transport: POST `{base_url}/{route}`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;

use chanpoll_core::error::{ChanpollError, Result};
use chanpoll_core::protocol::WireFormat;

use super::{HttpResponse, SendOptions, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    format: WireFormat,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, format: WireFormat) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ChanpollError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            format,
        })
    }

    fn url_for(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }
}

// keep_alive is not forwarded: reqwest pools connections on its own.
#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        route: &str,
        body: Bytes,
        opts: SendOptions,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .post(self.url_for(route))
            .header(CONTENT_TYPE, self.format.content_type())
            .timeout(opts.timeout)
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::TimedOut
    } else if e.is_connect() || e.is_request() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_trims_slashes() {
        let t = HttpTransport::new("http://localhost:8080/", WireFormat::Json).unwrap();
        assert_eq!(t.url_for("/events"), "http://localhost:8080/events");
        assert_eq!(t.url_for("events"), "http://localhost:8080/events");
    }
}
