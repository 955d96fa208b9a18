//! Rebuild a minimal HTTP action from the user's own words.
//!
//! Used when the model's output yields nothing structured. Everything here
//! is read from the input text; a URL is never invented.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use switchboard_types::extraction::{HeuristicAction, HttpMethod};

/// Reason reported when the input has no URL to build an action from.
pub const NO_URL_REASON: &str = "insufficient information: no URL found in input";

const FALLBACK_NAME: &str = "api_request";

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'"<>\[\]{}|\\^`]+"#).ok());

/// `-X POST`, `--request=put`, `-X 'DELETE'`.
static CURL_METHOD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)(?:-X|--request)(?:\s+|=)['"]?([A-Za-z]+)"#).ok()
});

/// `-H 'Name: value'` or `-H "Name: value"`.
static CURL_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?:-H|--header)\s+(?:'([^']*)'|"([^"]*)")"#).ok()
});

/// Whole-word intent keywords, checked in order.
static METHOD_KEYWORDS: LazyLock<Vec<(HttpMethod, Regex)>> = LazyLock::new(|| {
    [
        (HttpMethod::Post, r"(?i)\b(?:post|create|submit)\b"),
        (HttpMethod::Put, r"(?i)\b(?:put|update)\b"),
        (HttpMethod::Delete, r"(?i)\b(?:delete|remove)\b"),
        (HttpMethod::Patch, r"(?i)\b(?:patch|modify)\b"),
    ]
    .into_iter()
    .filter_map(|(method, pattern)| Regex::new(pattern).ok().map(|re| (method, re)))
    .collect()
});

/// Build an action from `input`, or `None` when it contains no usable URL.
pub fn reconstruct(input: &str) -> Option<HeuristicAction> {
    let mut url = find_url(input)?;
    let method = detect_method(input);

    let params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    url.set_query(None);
    url.set_fragment(None);

    let action = HeuristicAction {
        name: action_name(method, &url),
        method,
        url: url.to_string(),
        params,
        headers: detect_headers(input),
    };
    tracing::debug!(
        name = %action.name,
        method = %action.method,
        params = action.params.len(),
        headers = action.headers.len(),
        "Reconstructed action from input"
    );
    Some(action)
}

fn find_url(input: &str) -> Option<Url> {
    let pattern = URL_PATTERN.as_ref()?;
    pattern
        .find_iter(input)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')']))
        .find_map(|candidate| Url::parse(candidate).ok())
}

/// Explicit curl method first, then intent keywords, else GET.
pub fn detect_method(input: &str) -> HttpMethod {
    let explicit = CURL_METHOD
        .as_ref()
        .and_then(|re| re.captures(input))
        .and_then(|caps| caps.get(1))
        .and_then(|m| HttpMethod::from_name(m.as_str()));
    if let Some(method) = explicit {
        return method;
    }

    METHOD_KEYWORDS
        .iter()
        .find(|(_, re)| re.is_match(input))
        .map(|(method, _)| *method)
        .unwrap_or(HttpMethod::Get)
}

fn action_name(method: HttpMethod, url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.replace('-', "_"));

    match segment {
        Some(segment) => format!("{}_{}", method.as_str().to_lowercase(), segment),
        None => FALLBACK_NAME.to_string(),
    }
}

/// JSON defaults overridden by any curl `-H` headers.
fn detect_headers(input: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ]);

    let Some(pattern) = CURL_HEADER.as_ref() else {
        return headers;
    };
    for caps in pattern.captures_iter(input) {
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let Some((name, value)) = raw.as_str().split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        headers.insert(name.to_string(), value.trim().to_string());
    }
    headers
}
