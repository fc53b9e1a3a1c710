//! Verdict module - rich failures produced by comparisons

mod failure;

pub use failure::{Failure, FailureKind};

/// Return the first failure produced by `check` over `items`, in order.
///
/// Mirrors how assertion lists are resolved: every check shares the same
/// `Option<Failure>` shape, so evaluation stops at the first `Some`.
pub fn first_failure<T, I, F>(items: I, check: F) -> Option<Failure>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Option<Failure>,
{
    items.into_iter().find_map(check)
}
