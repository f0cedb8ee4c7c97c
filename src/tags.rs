//! Conversions between plain maps and the tag/filter shapes AWS APIs use.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An AWS resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A describe-call filter, e.g. `{"Name": "tag:environment", "Values": ["prod"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

/// Turn `{name: values}` into describe filters.
pub fn create_filters(filters: &BTreeMap<String, Vec<String>>) -> Vec<Filter> {
    filters
        .iter()
        .map(|(name, values)| Filter {
            name: name.clone(),
            values: values.clone(),
        })
        .collect()
}

/// Parse `key:value` strings into tags. Only the first `:` separates; a string
/// without one becomes a tag with an empty value.
pub fn key_values_to_tags<S: AsRef<str>>(key_values: &[S]) -> Vec<Tag> {
    key_values
        .iter()
        .map(|kv| match kv.as_ref().split_once(':') {
            Some((key, value)) => Tag::new(key, value),
            None => Tag::new(kv.as_ref(), ""),
        })
        .collect()
}

const KEY_NAMES: &[&str] = &["Key", "key", "Name", "name"];
const VALUE_NAMES: &[&str] = &["Value", "value"];

/// Convert tags as returned by an AWS API into a map.
///
/// Services disagree on the field names (`Key`, `key`, `Name`, `name` and
/// `Value`, `value`). The names are detected from the first tag and then used
/// for all of them.
pub fn tags_to_map(tags: &[Value]) -> Result<BTreeMap<String, String>> {
    let Some(first) = tags.first() else {
        return Ok(BTreeMap::new());
    };

    let key_name = KEY_NAMES.iter().find(|k| first.get(**k).is_some());
    let value_name = VALUE_NAMES.iter().find(|k| first.get(**k).is_some());
    let (Some(key_name), Some(value_name)) = (key_name, value_name) else {
        return Err(Error::validation_with_context(
            "Unable to identify tag key names in dict",
            ErrorContext::new()
                .with_field_path("tags[0]")
                .with_details(first.to_string())
                .with_source("tags"),
        ));
    };

    tags.iter()
        .enumerate()
        .map(|(i, tag)| {
            let key = tag.get(*key_name).and_then(Value::as_str);
            let value = tag.get(*value_name).and_then(Value::as_str);
            match (key, value) {
                (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
                _ => Err(Error::validation_with_context(
                    "Tag is missing its key or value",
                    ErrorContext::new()
                        .with_field_path(format!("tags[{}]", i))
                        .with_source("tags"),
                )),
            }
        })
        .collect()
}

/// Convert typed tags into a map. Later duplicates win.
pub fn tag_list_to_map(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

/// Convert a map into AWS tags.
pub fn map_to_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter().map(|(k, v)| Tag::new(k, v)).collect()
}
