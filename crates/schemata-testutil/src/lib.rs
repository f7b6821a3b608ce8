//! Test utilities for schemata.
//!
//! Loads and runs the JSON test-suite format used under `tests/suite/`:
//!
//! ```json
//! [
//!   {
//!     "description": "minimum",
//!     "schema": { "minimum": 5 },
//!     "tests": [
//!       { "description": "below", "data": 4, "valid": false },
//!       { "description": "at", "data": 5, "valid": true }
//!     ]
//!   }
//! ]
//! ```

pub mod suite;

use std::fmt;

/// The result of running a single test case.
#[derive(Debug, Clone)]
pub enum TestResult {
    /// Test passed.
    Pass,
    /// The verdict differed from the expected one.
    Fail { expected: String, actual: String },
    /// Test was skipped.
    Skip { reason: String },
    /// The schema did not compile or validation aborted.
    Error { message: String },
}

impl TestResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, TestResult::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, TestResult::Fail { .. })
    }
}

/// Summary of running multiple test cases.
#[derive(Debug, Default)]
pub struct TestSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub failures: Vec<TestFailure>,
}

/// A single test failure with context.
#[derive(Debug, Clone)]
pub struct TestFailure {
    /// `group / case` descriptions.
    pub name: String,
    pub result: TestResult,
}

impl TestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, result: TestResult) {
        match &result {
            TestResult::Pass => self.passed += 1,
            TestResult::Skip { .. } => self.skipped += 1,
            TestResult::Fail { .. } => {
                self.failed += 1;
                self.failures.push(TestFailure {
                    name: name.into(),
                    result,
                });
            }
            TestResult::Error { .. } => {
                self.errors += 1;
                self.failures.push(TestFailure {
                    name: name.into(),
                    result,
                });
            }
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errors
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n{}", "═".repeat(60))?;
        writeln!(f, "Test Summary: {} total", self.total())?;
        writeln!(
            f,
            "  ✓ {} passed  ✗ {} failed  ⊘ {} skipped  ⚠ {} errors",
            self.passed, self.failed, self.skipped, self.errors
        )?;

        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for failure in &self.failures {
                writeln!(f, "\n  {}", failure.name)?;
                match &failure.result {
                    TestResult::Fail { expected, actual } => {
                        writeln!(f, "    expected: {expected}")?;
                        writeln!(f, "    actual:   {actual}")?;
                    }
                    TestResult::Error { message } => {
                        writeln!(f, "    error: {message}")?;
                    }
                    _ => {}
                }
            }
        }
        writeln!(f, "{}", "═".repeat(60))?;
        Ok(())
    }
}
