//! The capabilities a web framework must expose to host the relay.

use async_trait::async_trait;
use reqwest::Method;

use crate::error::ProtocolError;

/// One inbound request and the response being built for it.
#[async_trait]
pub trait ProxyExchange: Send {
    /// Framework name, reported upstream in the user agent.
    fn framework(&self) -> &str;

    fn method(&self) -> Method;

    /// First value of a request header, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<String>;

    /// All request headers, lowercased names.
    fn headers(&self) -> Vec<(String, String)>;

    /// Request body; `None` when empty. Can be taken once.
    async fn body(&mut self) -> Result<Option<Vec<u8>>, ProtocolError>;

    /// Add a response header.
    fn set_header(&mut self, name: &str, value: &str);

    /// Set the response status and body.
    fn respond(&mut self, status: u16, body: Vec<u8>);
}
