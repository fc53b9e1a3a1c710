//! Comparison primitives
//!
//! Every comparator returns `None` on success or a [`Failure`] carrying
//! both sides. Callers can therefore resolve a list of heterogeneous checks
//! with a single "first failure wins" pass.

use regex::Regex;
use serde_json::{Map, Value};

use crate::verdict::{Failure, FailureKind};

/// Anything headers can be read from: an outgoing request or a response.
pub trait HeaderSource {
    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<&str>;
}

/// Expected header value.
#[derive(Debug, Clone)]
pub enum HeaderMatch {
    Exact(String),
    Pattern(Regex),
}

impl HeaderMatch {
    #[must_use]
    pub fn is_match(&self, actual: Option<&str>) -> bool {
        match (self, actual) {
            (Self::Exact(expected), Some(actual)) => expected == actual,
            (Self::Pattern(pattern), Some(actual)) => pattern.is_match(actual),
            (_, None) => false,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Exact(expected) => Value::String(expected.clone()),
            Self::Pattern(pattern) => Value::String(pattern_label(pattern)),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Exact(expected) => inspect(&Value::String(expected.clone())),
            Self::Pattern(pattern) => pattern_label(pattern),
        }
    }
}

impl From<&str> for HeaderMatch {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for HeaderMatch {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for HeaderMatch {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

/// Compact JSON rendering used in failure messages.
#[must_use]
pub fn inspect(value: &Value) -> String {
    value.to_string()
}

/// `/pattern/` rendering of a regular expression.
#[must_use]
pub fn pattern_label(pattern: &Regex) -> String {
    format!("/{}/", pattern.as_str())
}

/// Deep equality. Mapping key order is irrelevant, sequence order matters.
/// Numbers compare by value, so `10` equals `10.0`. A number and a string
/// holding the same number compare equal, as query strings and form bodies
/// only ever carry strings.
#[must_use]
pub fn loose_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| loose_eq(value, other)))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Number(a), Value::Number(b)) => {
            a == b || a.as_f64().zip(b.as_f64()).is_some_and(|(a, b)| a == b)
        }
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(parsed, number)| parsed.to_bits() == number.to_bits()),
        _ => actual == expected,
    }
}

/// Deep-equal `actual` to `expected`.
#[must_use]
pub fn equals(actual: &Value, expected: &Value) -> Option<Failure> {
    if loose_eq(actual, expected) {
        return None;
    }
    Some(Failure::new(
        FailureKind::Equality,
        format!("expected {} but got {}", inspect(expected), inspect(actual)),
        actual.clone(),
        expected.clone(),
    ))
}

/// Strip `ignored` keys from `actual` (in place, recursively) then
/// deep-equal it to `expected`.
#[must_use]
pub fn equals_ignoring<S: AsRef<str>>(
    actual: &mut Value,
    expected: &Value,
    ignored: &[S],
) -> Option<Failure> {
    strip_ignored(actual, ignored);
    equals(actual, expected)
}

/// Remove every object key named in `ignored`, at any depth. Inside arrays,
/// string elements equal to an ignored name are removed as well.
pub fn strip_ignored<S: AsRef<str>>(value: &mut Value, ignored: &[S]) {
    let is_ignored = |name: &str| ignored.iter().any(|key| key.as_ref() == name);
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !is_ignored(key));
            for nested in map.values_mut() {
                strip_ignored(nested, ignored);
            }
        }
        Value::Array(items) => {
            items.retain(|item| !item.as_str().is_some_and(is_ignored));
            for nested in items.iter_mut() {
                strip_ignored(nested, ignored);
            }
        }
        _ => {}
    }
}

/// Every key of `expected` must deep-equal the same key in `actual`;
/// `actual` may hold more.
#[must_use]
pub fn contains(actual: &Value, expected: &Value) -> Option<Failure> {
    let missing = match expected {
        Value::Object(subset) => subset.iter().any(|(key, value)| {
            !loose_eq(actual.get(key).unwrap_or(&Value::Null), value)
        }),
        Value::Array(subset) => subset.iter().enumerate().any(|(index, value)| {
            !loose_eq(actual.get(index).unwrap_or(&Value::Null), value)
        }),
        scalar => !loose_eq(actual, scalar),
    };
    missing.then(|| {
        Failure::new(
            FailureKind::Containment,
            format!("expected {} to exist in {}", inspect(expected), inspect(actual)),
            actual.clone(),
            expected.clone(),
        )
    })
}

/// `actual` must be a string matching `pattern`.
#[must_use]
pub fn matches(actual: &Value, pattern: &Regex) -> Option<Failure> {
    if actual.as_str().is_some_and(|text| pattern.is_match(text)) {
        return None;
    }
    Some(Failure::new(
        FailureKind::Pattern,
        format!("expected {} to match {}", inspect(actual), pattern_label(pattern)),
        actual.clone(),
        pattern_label(pattern),
    ))
}

/// Compare header `name` of `source` against `expected`.
#[must_use]
pub fn header(source: &impl HeaderSource, name: &str, expected: &HeaderMatch) -> Option<Failure> {
    let actual = source.header(name);
    if expected.is_match(actual) {
        return None;
    }
    let actual = actual.map_or(Value::Null, |value| Value::String(value.to_string()));
    Some(Failure::new(
        FailureKind::Header,
        format!(
            "expected header {}: {} to match {}",
            inspect(&Value::String(name.to_string())),
            inspect(&actual),
            expected.render()
        ),
        actual,
        expected.to_value(),
    ))
}

/// Split `path?query` into its two halves.
#[must_use]
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((pathname, query)) => (pathname, Some(query)),
        None => (path, None),
    }
}

/// The query portion of `path` must contain `expected` (leading `?` optional).
#[must_use]
pub fn query(path: &str, expected: &str) -> Option<Failure> {
    let expected = expected.strip_prefix('?').unwrap_or(expected);
    let (_, query) = split_path(path);
    if query.is_some_and(|query| query.contains(expected)) {
        return None;
    }
    let actual = query.map_or(Value::Null, |query| Value::String(query.to_string()));
    Some(Failure::new(
        FailureKind::QueryString,
        format!(
            "expected {} to include {}",
            inspect(&actual),
            inspect(&Value::String(expected.to_string()))
        ),
        actual,
        expected,
    ))
}

/// Highest bracket index still read as an array position; larger indices
/// stay object keys.
const ARRAY_LIMIT: usize = 20;

/// Parse a query string into a mapping.
///
/// Repeated keys collect into arrays. Bracketed keys nest:
/// `properties[revenue]=10` gives `{"properties": {"revenue": "10"}}`,
/// `tags[]=a&tags[]=b` and `tags[0]=a&tags[1]=b` give `{"tags": ["a", "b"]}`.
/// A key whose brackets do not close is kept as written.
///
/// # Errors
///
/// Returns an error if the query string is not valid form encoding.
pub fn parse_query(query: &str) -> Result<Map<String, Value>, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)?;
    let mut parsed = Map::new();
    for (key, value) in &pairs {
        let path = key_path(key).unwrap_or_else(|| vec![Segment::Key(key)]);
        assign(&mut parsed, &path, Value::String(value.clone()));
    }
    for value in parsed.values_mut() {
        compact(value);
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    /// `[]`: the next free position
    Push,
}

/// `a[b][]` -> `[Key("a"), Key("b"), Push]`. `None` for malformed keys.
fn key_path(key: &str) -> Option<Vec<Segment<'_>>> {
    let open = match key.find('[') {
        Some(0) | None => return Some(vec![Segment::Key(key)]),
        Some(open) => open,
    };
    let mut path = vec![Segment::Key(&key[..open])];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let close = inner.find(']')?;
        path.push(match &inner[..close] {
            "" => Segment::Push,
            name => Segment::Key(name),
        });
        rest = &inner[close + 1..];
    }
    rest.is_empty().then_some(path)
}

/// Write `value` at `path`. Positions are object keys until [`compact`]
/// turns index-keyed objects into arrays. A pair that would nest under an
/// existing plain value is dropped.
fn assign(map: &mut Map<String, Value>, path: &[Segment<'_>], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let key = match first {
        Segment::Key(key) => (*key).to_string(),
        Segment::Push => map.len().to_string(),
    };

    if rest.is_empty() {
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
        return;
    }

    if let Value::Object(child) = map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        assign(child, rest, value);
    }
}

fn compact(value: &mut Value) {
    let items = match value {
        Value::Object(map) => {
            map.values_mut().for_each(compact);
            positions(map)
        }
        Value::Array(items) => {
            items.iter_mut().for_each(compact);
            None
        }
        _ => None,
    };
    if let Some(items) = items {
        *value = Value::Array(items);
    }
}

/// Values of an object keyed only by small indices, in index order.
fn positions(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if map.is_empty() {
        return None;
    }
    let mut indexed = map
        .iter()
        .map(|(key, value)| {
            key.parse::<usize>()
                .ok()
                .filter(|index| *index <= ARRAY_LIMIT)
                .map(|index| (index, value))
        })
        .collect::<Option<Vec<_>>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    Some(indexed.into_iter().map(|(_, value)| value.clone()).collect())
}

/// JavaScript-style truthiness, used for "returned something" checks.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Headers(HashMap<String, String>);

    impl HeaderSource for Headers {
        fn header(&self, name: &str) -> Option<&str> {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }
    }

    fn headers() -> Headers {
        Headers(HashMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]))
    }

    #[test]
    fn equals_ignores_key_order() {
        assert!(equals(&json!({"a": 1, "b": [1, 2]}), &json!({"b": [1, 2], "a": 1})).is_none());
    }

    #[test]
    fn equals_respects_sequence_order() {
        let failure = equals(&json!([1, 2]), &json!([2, 1])).unwrap();
        assert_eq!(failure.message, "expected [2,1] but got [1,2]");
        assert_eq!(failure.kind, FailureKind::Equality);
    }

    #[test]
    fn equals_status_message() {
        let failure = equals(&json!(200), &json!(500)).unwrap();
        assert_eq!(failure.message, "expected 500 but got 200");
        assert_eq!(failure.actual, json!(200));
        assert_eq!(failure.expected, json!(500));
    }

    #[test]
    fn loose_number_string() {
        assert!(loose_eq(&json!("1"), &json!(1)));
        assert!(loose_eq(&json!(2.5), &json!("2.5")));
        assert!(!loose_eq(&json!("1a"), &json!(1)));
        assert!(!loose_eq(&json!(true), &json!("true")));
    }

    #[test]
    fn equals_ignoring_strips_nested() {
        let mut actual = json!({
            "id": 1,
            "timestamp": "now",
            "items": [{ "sku": "a", "timestamp": "x" }, "timestamp"],
            "nested": { "deep": { "timestamp": 3, "keep": true } }
        });
        let expected = json!({
            "id": 1,
            "items": [{ "sku": "a" }],
            "nested": { "deep": { "keep": true } }
        });
        assert!(equals_ignoring(&mut actual, &expected, &["timestamp"]).is_none());
        assert_eq!(actual, expected);
    }

    #[test]
    fn equals_ignoring_still_fails_elsewhere() {
        let mut actual = json!({ "id": 1, "timestamp": "now" });
        let failure = equals_ignoring(&mut actual, &json!({ "id": 2 }), &["timestamp"]).unwrap();
        assert_eq!(failure.actual, json!({ "id": 1 }));
    }

    #[test]
    fn contains_superset_passes() {
        assert!(contains(&json!({"a": 1, "b": 2}), &json!({"a": 1})).is_none());
        let failure = contains(&json!({"a": 1}), &json!({"a": 2})).unwrap();
        assert_eq!(failure.message, r#"expected {"a":2} to exist in {"a":1}"#);
        assert_eq!(failure.kind, FailureKind::Containment);
    }

    #[test]
    fn matches_requires_string() {
        let pattern = Regex::new("baz").unwrap();
        assert!(matches(&json!("foobaz"), &pattern).is_none());
        let failure = matches(&json!({"baz": 1}), &pattern).unwrap();
        assert_eq!(failure.expected, json!("/baz/"));
        let failure = matches(&json!("success=true"), &Regex::new("wee").unwrap()).unwrap();
        assert_eq!(failure.message, r#"expected "success=true" to match /wee/"#);
    }

    #[test]
    fn header_exact_and_pattern() {
        let source = headers();
        assert!(header(&source, "Content-Type", &"application/json".into()).is_none());
        assert!(header(&source, "Content-Type", &Regex::new("json").unwrap().into()).is_none());

        let failure = header(&source, "Content-Type", &"baz".into()).unwrap();
        insta::assert_snapshot!(failure.message, @r#"expected header "Content-Type": "application/json" to match "baz""#);

        let failure = header(&source, "Content-Type", &Regex::new("baz").unwrap().into()).unwrap();
        assert_eq!(
            failure.message,
            r#"expected header "Content-Type": "application/json" to match /baz/"#
        );
    }

    #[test]
    fn header_missing() {
        let failure = header(&headers(), "X-Key", &"baz".into()).unwrap();
        assert_eq!(failure.actual, Value::Null);
        assert_eq!(failure.expected, json!("baz"));
    }

    #[test]
    fn query_substring() {
        assert!(query("/json/identify?baz=foo", "?baz").is_none());
        let failure = query("/json/identify?baz=foo", "?baz=wee").unwrap();
        assert_eq!(failure.message, r#"expected "baz=foo" to include "baz=wee""#);
        let failure = query("/json/identify", "baz").unwrap();
        assert_eq!(failure.actual, Value::Null);
    }

    #[test]
    fn parse_query_collects_repeats() {
        let parsed = parse_query("a=1&b=x%20y&a=2&a=3").unwrap();
        assert_eq!(
            Value::Object(parsed),
            json!({ "a": ["1", "2", "3"], "b": "x y" })
        );
    }

    #[test]
    fn parse_query_nests_brackets() {
        let parsed = parse_query(
            "properties%5Brevenue%5D=10&properties[currency]=USD&event=x\
             &tags[]=a&tags[]=b&items[1]=second&items[0]=first&context[page][path]=/home",
        )
        .unwrap();
        assert_eq!(
            Value::Object(parsed),
            json!({
                "properties": { "revenue": "10", "currency": "USD" },
                "event": "x",
                "tags": ["a", "b"],
                "items": ["first", "second"],
                "context": { "page": { "path": "/home" } }
            })
        );
    }

    #[test]
    fn parse_query_keeps_odd_keys() {
        let parsed = parse_query("a[b=1&[c]=2&d[e]x=3&n[99]=4&s=1&s[t]=2").unwrap();
        assert_eq!(
            Value::Object(parsed),
            json!({ "a[b": "1", "[c]": "2", "d[e]x": "3", "n": { "99": "4" }, "s": "1" })
        );
    }

    #[test]
    fn integral_floats_equal_integers() {
        let expected: Value = serde_json::from_str(r#"{"total":10,"items":[1,2.5]}"#).unwrap();
        assert!(equals(&json!({ "total": 10.0, "items": [1.0, 2.5] }), &expected).is_none());
        assert!(equals(&json!({ "total": 10.5 }), &json!({ "total": 10 })).is_some());
        assert!(loose_eq(&json!(-3), &json!(-3.0)));
        assert!(loose_eq(&json!(u64::MAX), &json!(u64::MAX)));
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([])));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn equals_is_reflexive(value in arb_json()) {
            prop_assert!(equals(&value, &value).is_none());
        }

        #[test]
        fn contains_self(value in arb_json()) {
            prop_assert!(contains(&value, &value).is_none());
        }

        #[test]
        fn stripped_value_has_no_ignored_keys(mut value in arb_json(), key in "[a-z]{1,2}") {
            strip_ignored(&mut value, &[key.as_str()]);
            let text = value.to_string();
            let quoted = format!("\"{key}\":");
            prop_assert!(!text.contains(&quoted));
        }
    }
}
