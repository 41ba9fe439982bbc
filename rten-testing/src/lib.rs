//! Testing utilities shared by the rten-edit crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Runs table-driven tests.
///
/// Declare a `Debug` struct, conventionally named `Case`, holding the inputs
/// and expected results of one case, build a collection of cases and call
/// `test_each` with the test body. Every case runs even if earlier ones
/// panic. Afterwards `test_each` panics with the debug representations of
/// the failing cases, if there were any.
///
/// ```
/// use rten_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     name: &'static str,
///     valid: bool,
/// }
///
/// let cases = [
///     Case { name: "add_out", valid: true },
///     Case { name: "", valid: false },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(!case.name.is_empty(), case.valid);
/// });
/// ```
///
/// Cases and values captured by the test body must be
/// [unwind safe](std::panic::UnwindSafe). Values which are not, such as a
/// model shared between cases, can be created inside the test body instead or
/// wrapped in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Call `test` with a clone of each case.
    ///
    /// This is convenient when the test body needs to own parts of the case.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Clone + Debug + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| {
                let value = case.clone();
                std::panic::catch_unwind(move || test(value)).is_err()
            })
            .collect();
        report_failures(&failures);
    }
}
