//! List envelope normalization.
//!
//! The billing backend wraps list results in several shapes depending on the endpoint. Every
//! list read goes through [`normalize_list_envelope`], which tries the known shapes in priority
//! order and never fails: an unrecognized body is an empty list.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pagination metadata after reconciling `total_pages`/`last_page` and friends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: Option<u64>,
    pub current_page: Option<u64>,
    pub total_pages: Option<u64>,
    pub per_page: Option<u64>,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl Pagination {
    /// Current page, defaulting to the first.
    pub fn page(&self) -> u64 {
        self.current_page.unwrap_or(1).max(1)
    }

    /// Whether a following page exists. Unknown page counts mean there is none.
    pub fn has_next(&self) -> bool {
        match self.total_pages {
            Some(total_pages) => self.page() < total_pages,
            None => false,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page() > 1
    }
}

/// Record array plus optional pagination, whatever envelope it arrived in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedList<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

impl<T> NormalizedList<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            pagination: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for NormalizedList<T> {
    fn default() -> Self {
        Self::empty()
    }
}

type Matcher = fn(&Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)>;

// Order matters: the first matcher that finds an array wins.
const MATCHERS: [Matcher; 7] = [
    match_bare_array,
    match_data,
    match_records,
    match_message_data,
    match_message_records,
    match_data_data,
    match_message_array,
];

fn match_bare_array(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    raw.as_array().map(|items| (items, None))
}

fn array_at<'a>(
    holder: &'a Value,
    key: &str,
) -> Option<(&'a Vec<Value>, Option<&'a Map<String, Value>>)> {
    let object = holder.as_object()?;
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| (items, Some(object)))
}

fn match_data(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    array_at(raw, "data")
}

fn match_records(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    array_at(raw, "records")
}

fn match_message_data(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    array_at(raw.get("message")?, "data")
}

fn match_message_records(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    array_at(raw.get("message")?, "records")
}

fn match_data_data(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    array_at(raw.get("data")?, "data")
}

fn match_message_array(raw: &Value) -> Option<(&Vec<Value>, Option<&Map<String, Value>>)> {
    let object = raw.as_object()?;
    object
        .get("message")
        .and_then(Value::as_array)
        .map(|items| (items, Some(object)))
}

/// Extracts the record array and pagination from any known list envelope.
///
/// Passing an already-normalized array through again yields the same array.
pub fn normalize_list_envelope(raw: &Value) -> NormalizedList<Value> {
    for matcher in MATCHERS {
        if let Some((items, holder)) = matcher(raw) {
            return NormalizedList {
                items: items.clone(),
                pagination: extract_pagination(holder, raw),
            };
        }
    }

    if !raw.is_null() {
        tracing::debug!("Unrecognized list envelope, treating as empty");
    }
    NormalizedList::empty()
}

/// Typed variant of [`normalize_list_envelope`].
///
/// Records that do not deserialize into `T` are skipped with a warning rather than failing the
/// whole page.
pub fn normalize_list<T: DeserializeOwned>(raw: &Value) -> NormalizedList<T> {
    let list = normalize_list_envelope(raw);
    let items = list
        .items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed list record: {}", e);
                None
            }
        })
        .collect();

    NormalizedList {
        items,
        pagination: list.pagination,
    }
}

/// Unwraps a singleton response: `{data: X}` yields `X`, anything else is returned as is.
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut object) if object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn extract_pagination(holder: Option<&Map<String, Value>>, root: &Value) -> Option<Pagination> {
    let mut candidates: Vec<&Map<String, Value>> = Vec::new();
    if let Some(holder) = holder {
        candidates.push(holder);
        for nested in ["pagination", "meta"] {
            if let Some(object) = holder.get(nested).and_then(Value::as_object) {
                candidates.push(object);
            }
        }
    }
    if let Some(root) = root.as_object() {
        candidates.push(root);
        for nested in ["pagination", "meta"] {
            if let Some(object) = root.get(nested).and_then(Value::as_object) {
                candidates.push(object);
            }
        }
    }

    let find = |keys: &[&str]| -> Option<u64> {
        candidates.iter().find_map(|object| {
            keys.iter()
                .find_map(|key| object.get(*key).and_then(lenient_u64))
        })
    };

    let pagination = Pagination {
        total: find(&["total"]),
        current_page: find(&["current_page"]),
        total_pages: find(&["total_pages", "last_page"]),
        per_page: find(&["per_page"]),
        from: find(&["from"]),
        to: find(&["to"]),
    };

    let recognized = pagination.total.is_some()
        || pagination.current_page.is_some()
        || pagination.total_pages.is_some();
    recognized.then_some(pagination)
}

/// Reads a non-negative integer sent either as a JSON number or a numeric string.
pub(crate) fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
