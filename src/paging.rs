//! Collect every page of an AWS listing operation.
//!
//! Each page is fetched through the throttled-call retry loop. Paging stops when
//! the service stops returning a continuation token, or when it hands back the
//! same token twice in a row (some APIs echo the last token instead of omitting it).

use crate::retry::{throttled_call_with, RetryConfig};
use crate::Result;
use futures::Stream;
use serde_json::{Map, Value};
use std::future::Future;

/// One page of a listing call.
pub trait Page {
    type Item;
    /// Continuation token; a plain string for most APIs.
    type Token: Clone + PartialEq;

    /// Split the page into its items and the token for the next page.
    fn into_parts(self) -> (Vec<Self::Item>, Option<Self::Token>);
}

/// Fetch all pages produced by `call` and concatenate their items.
///
/// `call` receives `None` for the first page and the continuation token afterwards.
pub async fn collect_pages<P, F, Fut>(mut call: F, config: &RetryConfig) -> Result<Vec<P::Item>>
where
    P: Page,
    F: FnMut(Option<P::Token>) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let (mut items, mut next_token) = throttled_call_with(config, || call(None)).await?.into_parts();
    if items.is_empty() {
        tracing::warn!("No items found in first page");
    }

    let mut prev_token: Option<P::Token> = None;
    while let Some(token) = next_token.take() {
        if prev_token.as_ref() == Some(&token) {
            break;
        }
        let (page_items, token_after) = throttled_call_with(config, || call(Some(token.clone())))
            .await?
            .into_parts();
        items.extend(page_items);
        prev_token = Some(token);
        next_token = token_after;
    }

    Ok(items)
}

struct PagerState<F, T> {
    call: F,
    next_token: Option<T>,
    prev_token: Option<T>,
    started: bool,
    config: RetryConfig,
}

/// Like [`collect_pages`], but yields each page's items as soon as it arrives.
pub fn page_stream<P, F, Fut>(call: F, config: RetryConfig) -> impl Stream<Item = Result<Vec<P::Item>>>
where
    P: Page,
    F: FnMut(Option<P::Token>) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let state = PagerState {
        call,
        next_token: None,
        prev_token: None,
        started: false,
        config,
    };

    futures::stream::try_unfold(state, |mut st| async move {
        let token = if !st.started {
            st.started = true;
            None
        } else {
            match st.next_token.take() {
                Some(token) if st.prev_token.as_ref() != Some(&token) => Some(token),
                _ => return Ok(None),
            }
        };

        let call = &mut st.call;
        let (items, next) = throttled_call_with(&st.config, || call(token.clone()))
            .await?
            .into_parts();
        st.prev_token = token;
        st.next_token = next;
        Ok::<_, crate::Error>(Some((items, st)))
    })
}

/// Names of the keys a JSON listing response and request use for paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKeys {
    /// Key of the response holding the list items.
    pub results_key: String,
    /// Key of the response holding the continuation token.
    pub next_token_key: String,
    /// Request parameter the continuation token is sent back as.
    pub next_request_token_key: String,
}

impl PageKeys {
    pub fn new(results_key: impl Into<String>) -> Self {
        Self {
            results_key: results_key.into(),
            next_token_key: "NextToken".to_string(),
            next_request_token_key: "NextToken".to_string(),
        }
    }

    pub fn with_tokens(
        mut self,
        next_token_key: impl Into<String>,
        next_request_token_key: impl Into<String>,
    ) -> Self {
        self.next_token_key = next_token_key.into();
        self.next_request_token_key = next_request_token_key.into();
        self
    }
}

struct JsonPage {
    items: Vec<Value>,
    next_token: Option<String>,
}

impl Page for JsonPage {
    type Item = Value;
    type Token = String;

    fn into_parts(self) -> (Vec<Value>, Option<String>) {
        (self.items, self.next_token)
    }
}

impl JsonPage {
    fn from_response(mut response: Value, keys: &PageKeys) -> Self {
        let items = match response.get_mut(&keys.results_key).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let next_token = response
            .get(&keys.next_token_key)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self { items, next_token }
    }
}

/// Page through a listing call that speaks raw JSON documents.
///
/// `call` receives `params` with the continuation token added under
/// `keys.next_request_token_key` for every page after the first.
pub async fn get_paged_results<F, Fut>(
    mut call: F,
    keys: &PageKeys,
    params: Map<String, Value>,
) -> Result<Vec<Value>>
where
    F: FnMut(Map<String, Value>) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let config = RetryConfig::default();
    collect_pages(
        |token: Option<String>| {
            let mut request = params.clone();
            if let Some(token) = token {
                request.insert(keys.next_request_token_key.clone(), Value::String(token));
            }
            let response = call(request);
            async move { Ok(JsonPage::from_response(response.await?, keys)) }
        },
        &config,
    )
    .await
}
