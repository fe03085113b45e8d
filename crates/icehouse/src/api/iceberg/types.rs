use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::api::{ErrorModel, Result};

/// Upper bound for `pageSize`. Larger requests are capped.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// First path segment of every catalog route. It carries the warehouse id handed out by
/// `/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prefix(pub String);

impl Prefix {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropParams {
    #[serde(default)]
    pub purge_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationQuery {
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// A page of `items` sorted by `key`. The token is the encoded key of the last item
/// returned, so pages stay stable when entries before the cursor are removed.
///
/// An empty `page_token` is treated like a missing one. Without `page_size` all
/// remaining items are returned and no token is emitted.
pub fn paginate<T>(
    mut items: Vec<T>,
    key: impl Fn(&T) -> String,
    query: &PaginationQuery,
) -> Result<(Vec<T>, Option<String>)> {
    items.sort_by_key(|item| key(item));

    if let Some(token) = query.page_token.as_deref().filter(|t| !t.is_empty()) {
        let after = decode_page_token(token)?;
        items.retain(|item| key(item) > after);
    }

    let Some(page_size) = query.page_size else {
        return Ok((items, None));
    };
    if page_size == 0 {
        return Err(ErrorModel::bad_request(
            "pageSize must be greater than 0",
            "InvalidPageSize",
            None,
        )
        .into());
    }
    let page_size = page_size.min(MAX_PAGE_SIZE) as usize;
    if items.len() <= page_size {
        return Ok((items, None));
    }
    items.truncate(page_size);
    let next = items.last().map(|item| encode_page_token(&key(item)));
    Ok((items, next))
}

fn encode_page_token(key: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(key)
}

fn decode_page_token(token: &str) -> Result<String> {
    BASE64_URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| {
            ErrorModel::bad_request("Invalid pageToken", "InvalidPageToken", None).into()
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_paginate_walks_all_pages() {
        let items = names(&["d", "a", "c", "b", "e"]);
        let mut query = PaginationQuery {
            page_token: None,
            page_size: Some(2),
        };
        let mut seen = vec![];
        loop {
            let (page, next) = paginate(items.clone(), Clone::clone, &query).unwrap();
            seen.extend(page);
            match next {
                Some(token) => query.page_token = Some(token),
                None => break,
            }
        }
        assert_eq!(seen, names(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn test_paginate_without_page_size_returns_all() {
        let (page, next) =
            paginate(names(&["b", "a"]), Clone::clone, &PaginationQuery::default()).unwrap();
        assert_eq!(page, names(&["a", "b"]));
        assert_eq!(next, None);
    }

    #[test]
    fn test_invalid_token_is_bad_request() {
        let query = PaginationQuery {
            page_token: Some("%%%".to_string()),
            page_size: None,
        };
        let err = paginate(names(&["a"]), Clone::clone, &query).unwrap_err();
        assert_eq!(err.error.code, 400);
    }
}
