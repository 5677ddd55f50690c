use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use thiserror::Error;
use tokio::time;

use super::{HttpTransport, PostRequest, PostResponse, SESSION_COOKIE};

/// Failures to obtain any response from the device.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http client error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

/// Plain-HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&mut self, request: PostRequest<'_>) -> Result<PostResponse, TransportError> {
        let mut builder = self.client.post(request.url).body(request.body.to_vec());
        if let Some(cookie) = request.cookie {
            builder = builder.header(COOKIE, format!("{SESSION_COOKIE}={cookie}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let cookie = if request.collect_cookie && status == 200 {
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .find_map(parse_session_cookie)
        } else {
            None
        };
        let body = response.bytes().await?.to_vec();

        Ok(PostResponse {
            status,
            body,
            cookie,
        })
    }
}

/// Extracts the session id from a `Set-Cookie` header value.
///
/// Only a whole `TP_SESSIONID=` attribute counts; its value runs up to the
/// next `;`. A header without the attribute, or with an empty value, yields
/// `None`.
pub fn parse_session_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|attr| attr.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Wrapper that bounds every POST with a deadline.
#[derive(Debug)]
pub struct TimeoutTransport<T> {
    inner: T,
    timeout: Duration,
}

impl<T> TimeoutTransport<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T> HttpTransport for TimeoutTransport<T>
where
    T: HttpTransport,
{
    async fn post(&mut self, request: PostRequest<'_>) -> Result<PostResponse, TransportError> {
        match time::timeout(self.timeout, self.inner.post(request)).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}
