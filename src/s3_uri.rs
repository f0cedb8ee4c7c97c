//! `s3://bucket/key` URIs.

use crate::{Error, ErrorContext, Result};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "s3://";

/// A parsed S3 URI.
///
/// Everything after the bucket is the key, including any `?query` part. `#` is
/// a legal key character and is never treated as a fragment separator.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct S3Uri {
    uri: String,
    bucket_end: usize,
}

impl S3Uri {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix(SCHEME).ok_or_else(|| {
            Error::validation_with_context(
                "S3 URI must start with s3://",
                ErrorContext::new()
                    .with_field_path("uri")
                    .with_details(uri.to_string())
                    .with_source("s3_uri"),
            )
        })?;
        let bucket_len = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
        if bucket_len == 0 {
            return Err(Error::validation_with_context(
                "S3 URI has no bucket",
                ErrorContext::new()
                    .with_field_path("uri")
                    .with_details(uri.to_string())
                    .with_source("s3_uri"),
            ));
        }
        Ok(Self {
            uri: uri.to_string(),
            bucket_end: SCHEME.len() + bucket_len,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.uri[SCHEME.len()..self.bucket_end]
    }

    pub fn key(&self) -> &str {
        self.uri[self.bucket_end..].trim_start_matches('/')
    }

    /// The original URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl FromStr for S3Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl fmt::Debug for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3Uri(uri='{}')", self.uri)
    }
}
