//! Small helpers shared by the service clients.

use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;

/// Run `find`; when it yields nothing, run `create` instead.
pub async fn find_or_create<T, F, C, FindFut, CreateFut>(find: F, create: C) -> Result<T>
where
    F: FnOnce() -> FindFut,
    C: FnOnce() -> CreateFut,
    FindFut: Future<Output = Result<Option<T>>>,
    CreateFut: Future<Output = Result<T>>,
{
    match find().await? {
        Some(found) => Ok(found),
        None => create().await,
    }
}

/// Split `items` into consecutive chunks of at most `size` elements.
///
/// A `size` of 0 is a `Validation` error.
pub fn chunker<T>(items: &[T], size: usize) -> Result<std::slice::Chunks<'_, T>> {
    if size == 0 {
        return Err(Error::validation_with_context(
            "Chunk size must be at least 1",
            ErrorContext::new().with_field_path("size").with_source("chunker"),
        ));
    }
    Ok(items.chunks(size))
}

/// Flatten a DynamoDB record (`{"foo": {"S": "bar"}}`) into `{"foo": "bar"}`.
///
/// The first attribute value of every entry is kept as-is.
pub fn dynamodb_record_to_map(record: &serde_json::Map<String, Value>) -> BTreeMap<String, Value> {
    record
        .iter()
        .filter_map(|(key, typed)| {
            let value = typed.as_object()?.values().next()?.clone();
            Some((key.clone(), value))
        })
        .collect()
}

/// Interpret a loosely typed flag. `t`, `true`, `yes`, `y`, `on` and `1`
/// (any case) and the number 1 are true; everything else is false.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => str_to_bool(s),
        _ => false,
    }
}

/// String flavour of [`to_bool`].
pub fn str_to_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "t" | "true" | "yes" | "y" | "on" | "1"
    )
}

/// Fail when fewer (or more) bytes were written to S3 than expected.
pub fn check_written_s3(object_name: &str, expected_written_length: u64, written_length: u64) -> Result<()> {
    if expected_written_length != written_length {
        return Err(Error::S3Writing(object_name.to_string()));
    }
    Ok(())
}
