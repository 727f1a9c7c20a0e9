//! Basic authentication header injection

use super::http::RequestInterceptor;
use crate::error::{Result, StreamifyError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::RequestBuilder;
use reqwest::header::{HeaderValue, AUTHORIZATION};

/// Adds `Authorization: Basic ...` to every request
#[derive(Clone)]
pub struct BasicAuthInterceptor {
    header: HeaderValue,
}

impl std::fmt::Debug for BasicAuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthInterceptor").finish_non_exhaustive()
    }
}

impl BasicAuthInterceptor {
    pub fn new(username: &str, password: &str) -> Result<Self> {
        if username.is_empty() {
            return Err(StreamifyError::invalid_parameter("username", "Missing username!"));
        }
        if password.is_empty() {
            return Err(StreamifyError::invalid_parameter("password", "Missing password!"));
        }

        let token = STANDARD.encode(format!("{}:{}", username, password));
        let mut header = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| StreamifyError::invalid_parameter("username", e.to_string()))?;
        header.set_sensitive(true);
        Ok(Self { header })
    }

    /// The header value sent with each request
    pub fn header_value(&self) -> &HeaderValue {
        &self.header
    }
}

impl RequestInterceptor for BasicAuthInterceptor {
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.header.clone())
    }
}
