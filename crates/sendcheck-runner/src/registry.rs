//! Expectation registry: checks keyed by the request they target

use std::collections::BTreeMap;

use sendcheck_core::Failure;

use crate::check::{Check, Exchange};
use crate::query::QueryBook;

/// Which request(s) a check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// The run as a whole, e.g. the request count
    All,
    /// The request at this zero-based index
    Request(usize),
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    all: Vec<Check>,
    requests: BTreeMap<usize, Vec<Check>>,
}

impl Registry {
    pub fn push(&mut self, target: Target, check: Check) {
        match target {
            Target::All => self.all.push(check),
            Target::Request(index) => self.requests.entry(index).or_default().push(check),
        }
    }

    pub fn checks(&self, target: Target) -> &[Check] {
        match target {
            Target::All => &self.all,
            Target::Request(index) => self
                .requests
                .get(&index)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    /// Highest request index any check targets.
    pub fn max_index(&self) -> Option<usize> {
        self.requests.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.all.len() + self.requests.values().map(Vec::len).sum::<usize>()
    }

    /// Evaluate `target`'s checks in insertion order; the first failure wins.
    pub fn resolve(
        &self,
        target: Target,
        exchange: &Exchange<'_>,
        queries: &QueryBook,
    ) -> Option<Failure> {
        sendcheck_core::verdict::first_failure(self.checks(target), |check| {
            check.evaluate(exchange, queries)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Expected, Sent};
    use serde_json::json;

    #[test]
    fn targets_are_separate() {
        let mut registry = Registry::default();
        registry.push(Target::All, Check::RequestCount(2));
        registry.push(Target::Request(1), Check::Expects(Expected::from(200)));
        registry.push(Target::Request(0), Check::Sends(Sent::from(json!({}))));
        registry.push(Target::Request(1), Check::Pathname("/x".into()));

        assert_eq!(registry.checks(Target::All).len(), 1);
        assert_eq!(registry.checks(Target::Request(1)).len(), 2);
        assert!(registry.checks(Target::Request(7)).is_empty());
        assert_eq!(registry.max_index(), Some(1));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn first_failure_in_insertion_order() {
        let mut registry = Registry::default();
        registry.push(Target::All, Check::RequestCount(0));
        registry.push(Target::All, Check::RequestCount(3));
        registry.push(Target::All, Check::RequestCount(5));

        let exchange = Exchange {
            index: 0,
            request: None,
            total: 0,
        };
        let failure = registry
            .resolve(Target::All, &exchange, &QueryBook::default())
            .unwrap();
        assert_eq!(failure.expected, json!(3));
    }

    #[test]
    fn empty_registry() {
        let registry = Registry::default();
        assert_eq!(registry.max_index(), None);
        assert_eq!(registry.len(), 0);
    }
}
