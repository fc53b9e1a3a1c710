//! Per-request query-string expectations
//!
//! Query expectations accumulate key by key into one table per request
//! index and mode, and are evaluated by a single check registered the
//! first time the table is touched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sendcheck_core::compare::{contains, equals, parse_query, split_path};
use sendcheck_core::{Failure, FailureKind};
use serde_json::{Map, Value};

/// Converts the parsed query value before comparison.
pub type ParseFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum QueryMode {
    /// Named keys must deep-equal
    Exact,
    /// Named keys must be contained
    Almost,
}

#[derive(Clone)]
struct Param {
    expected: Value,
    parse: Option<ParseFn>,
}

/// Expected keys for one request, in the order they were first named.
#[derive(Clone, Default)]
pub(crate) struct QuerySet {
    params: Vec<(String, Param)>,
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.params.iter().map(|(key, param)| (key, &param.expected)))
            .finish()
    }
}

impl QuerySet {
    /// Set one expected key; naming a key again replaces it.
    pub fn insert(&mut self, key: String, expected: Value, parse: Option<ParseFn>) {
        let param = Param { expected, parse };
        match self.params.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = param,
            None => self.params.push((key, param)),
        }
    }

    fn expected(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(key, param)| (key.clone(), param.expected.clone()))
                .collect(),
        )
    }

    /// Compare against the query portion of `path`.
    pub fn evaluate(&self, path: &str, mode: QueryMode) -> Option<Failure> {
        let expected = self.expected();
        let Some(query) = split_path(path).1.filter(|query| !query.is_empty()) else {
            return Some(Failure::new(
                FailureKind::QueryString,
                "expected request to include query string but no query string was found",
                Value::Null,
                expected,
            ));
        };

        let mut actual = match parse_query(query) {
            Ok(actual) => actual,
            Err(e) => {
                return Some(Failure::new(
                    FailureKind::QueryString,
                    format!("invalid query string {query:?}: {e}"),
                    query,
                    expected,
                ));
            }
        };
        for (key, param) in &self.params {
            if let (Some(parse), Some(value)) = (&param.parse, actual.get_mut(key)) {
                *value = parse(value.take());
            }
        }

        match mode {
            QueryMode::Exact => {
                let named: Map<String, Value> = self
                    .params
                    .iter()
                    .filter_map(|(key, _)| actual.get(key).map(|value| (key.clone(), value.clone())))
                    .collect();
                equals(&Value::Object(named), &expected)
            }
            QueryMode::Almost => contains(&Value::Object(actual), &expected),
        }
    }
}

/// All query tables of one assertion.
#[derive(Debug, Default)]
pub(crate) struct QueryBook {
    tables: BTreeMap<(QueryMode, usize), QuerySet>,
}

impl QueryBook {
    /// Add an expected key. Returns `true` when this created the table, in
    /// which case the caller registers the evaluating check.
    pub fn insert(
        &mut self,
        mode: QueryMode,
        index: usize,
        key: String,
        expected: Value,
        parse: Option<ParseFn>,
    ) -> bool {
        let created = !self.tables.contains_key(&(mode, index));
        self.tables
            .entry((mode, index))
            .or_default()
            .insert(key, expected, parse);
        created
    }

    pub fn get(&self, mode: QueryMode, index: usize) -> Option<&QuerySet> {
        self.tables.get(&(mode, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(pairs: &[(&str, Value)]) -> QuerySet {
        let mut set = QuerySet::default();
        for (key, value) in pairs {
            set.insert((*key).to_string(), value.clone(), None);
        }
        set
    }

    #[test]
    fn exact_restricted_to_named_keys() {
        let set = set(&[("baz", json!("foo"))]);
        assert!(set.evaluate("/json/track?baz=foo&extra=1", QueryMode::Exact).is_none());

        let failure = set.evaluate("/json/track?baz=wee", QueryMode::Exact).unwrap();
        assert_eq!(failure.actual, json!({ "baz": "wee" }));
        assert_eq!(failure.expected, json!({ "baz": "foo" }));
    }

    #[test]
    fn missing_query_string() {
        let set = set(&[("baz", json!("foo"))]);
        let failure = set.evaluate("/json/track", QueryMode::Almost).unwrap();
        assert_eq!(
            failure.message,
            "expected request to include query string but no query string was found"
        );
        assert!(set.evaluate("/json/track?", QueryMode::Exact).is_some());
    }

    #[test]
    fn almost_reports_full_query() {
        let set = set(&[("baz", json!("qux"))]);
        let failure = set.evaluate("/x?baz=foo&other=1", QueryMode::Almost).unwrap();
        assert_eq!(failure.actual, json!({ "baz": "foo", "other": "1" }));
        assert_eq!(failure.kind, FailureKind::Containment);
    }

    #[test]
    fn parse_fn_applied_before_compare() {
        let mut set = QuerySet::default();
        let parse: ParseFn = Arc::new(|value: Value| {
            let parsed = value.as_str().and_then(|text| serde_json::from_str(text).ok());
            parsed.unwrap_or(value)
        });
        set.insert("data".into(), json!({ "n": 1 }), Some(parse));
        let path = "/x?data=%7B%22n%22%3A1%7D";
        assert!(set.evaluate(path, QueryMode::Exact).is_none());
    }

    #[test]
    fn repeated_keys_compare_as_arrays() {
        let set = set(&[("tag", json!(["a", "b"]))]);
        assert!(set.evaluate("/x?tag=a&tag=b", QueryMode::Exact).is_none());
    }

    #[test]
    fn bracketed_keys_compare_as_objects() {
        let set = set(&[("properties", json!({ "revenue": "10" }))]);
        let path = "/pixel?properties%5Brevenue%5D=10&event=x";
        assert!(set.evaluate(path, QueryMode::Exact).is_none());
        assert!(set.evaluate(path, QueryMode::Almost).is_none());

        let failure = set
            .evaluate("/pixel?properties%5Brevenue%5D=12", QueryMode::Exact)
            .unwrap();
        assert_eq!(failure.actual, json!({ "properties": { "revenue": "12" } }));
    }

    #[test]
    fn book_reports_first_insert() {
        let mut book = QueryBook::default();
        assert!(book.insert(QueryMode::Exact, 0, "a".into(), json!(1), None));
        assert!(!book.insert(QueryMode::Exact, 0, "b".into(), json!(2), None));
        assert!(book.insert(QueryMode::Almost, 0, "a".into(), json!(1), None));
        assert!(book.insert(QueryMode::Exact, 1, "a".into(), json!(1), None));
        assert_eq!(
            book.get(QueryMode::Exact, 0).map(QuerySet::expected),
            Some(json!({ "a": 1, "b": 2 }))
        );
    }
}
