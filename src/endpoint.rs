//! Endpoint identifiers.
//!
//! Wire format: `[namespace/]owner/alias[/path]`. The namespace is only
//! recognised from a closed set; otherwise the first segment is the owner.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Namespaces that may prefix an endpoint id.
pub const NAMESPACES: &[&str] = &["workflows", "comfy"];

/// Parsed endpoint identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId {
    pub namespace: Option<String>,
    pub owner: String,
    pub alias: String,
    pub path: Option<String>,
}

impl EndpointId {
    /// Parse `[namespace/]owner/alias[/path]`.
    pub fn parse(id: &str) -> Result<Self> {
        let segments: Vec<&str> = id.split('/').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidEndpoint(id.to_string()));
        }

        let (namespace, rest) = match segments.as_slice() {
            [first, rest @ ..] if rest.len() >= 2 && NAMESPACES.contains(first) => {
                (Some(first.to_string()), rest)
            }
            all => (None, all),
        };

        match rest {
            [owner, alias, path @ ..] => Ok(Self {
                namespace,
                owner: owner.to_string(),
                alias: alias.to_string(),
                path: if path.is_empty() {
                    None
                } else {
                    Some(path.join("/"))
                },
            }),
            _ => Err(Error::InvalidEndpoint(id.to_string())),
        }
    }

    /// `[namespace/]owner/alias`, the part the queue routes status and results by.
    pub fn app_path(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.owner, self.alias),
            None => format!("{}/{}", self.owner, self.alias),
        }
    }

    /// Full path including the optional sub-path, used for submission.
    pub fn full_path(&self) -> String {
        match &self.path {
            Some(path) => format!("{}/{}", self.app_path(), path),
            None => self.app_path(),
        }
    }
}

impl FromStr for EndpointId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}
