//! JSON test-suite loader and runner.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use schemata_core::Engine;

use crate::{TestResult, TestSummary};

/// One schema with the data it should accept or reject.
#[derive(Debug, Clone, Deserialize)]
pub struct SuiteGroup {
    pub description: String,
    pub schema: Value,
    pub tests: Vec<SuiteCase>,
    /// Reason to skip the whole group.
    #[serde(default)]
    pub skip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiteCase {
    pub description: String,
    pub data: Value,
    pub valid: bool,
}

/// Parse a suite file's contents.
pub fn parse_suite(content: &str) -> Result<Vec<SuiteGroup>> {
    serde_json::from_str(content).context("suite file is not a list of test groups")
}

pub fn load_suite(path: &Path) -> Result<Vec<SuiteGroup>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading suite {}", path.display()))?;
    parse_suite(&content).with_context(|| format!("parsing suite {}", path.display()))
}

impl SuiteGroup {
    /// Compile the group's schema with `engine` and check every case.
    pub fn run(&self, engine: &Engine, summary: &mut TestSummary) {
        if let Some(reason) = &self.skip {
            for case in &self.tests {
                summary.record(
                    self.name(case),
                    TestResult::Skip {
                        reason: reason.clone(),
                    },
                );
            }
            return;
        }
        let validator = match engine.compile(self.schema.clone()) {
            Ok(validator) => validator,
            Err(err) => {
                for case in &self.tests {
                    summary.record(
                        self.name(case),
                        TestResult::Error {
                            message: format!("compile: {err}"),
                        },
                    );
                }
                return;
            }
        };
        for case in &self.tests {
            let result = match validator.check(&case.data) {
                Ok(validation) if validation.is_valid() == case.valid => TestResult::Pass,
                Ok(validation) => TestResult::Fail {
                    expected: verdict(case.valid).to_string(),
                    actual: if validation.is_valid() {
                        verdict(true).to_string()
                    } else {
                        format!("invalid: {}", Engine::errors_text(validation.errors()))
                    },
                },
                Err(err) => TestResult::Error {
                    message: format!("validate: {err}"),
                },
            };
            summary.record(self.name(case), result);
        }
    }

    fn name(&self, case: &SuiteCase) -> String {
        format!("{} / {}", self.description, case.description)
    }
}

fn verdict(valid: bool) -> &'static str {
    if valid { "valid" } else { "invalid" }
}

/// Run every group against one engine.
pub fn run_suite(engine: &Engine, groups: &[SuiteGroup]) -> TestSummary {
    let mut summary = TestSummary::new();
    for group in groups {
        group.run(engine, &mut summary);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemata_core::Options;

    const SUITE: &str = r#"[
        {
            "description": "minimum",
            "schema": { "minimum": 5 },
            "tests": [
                { "description": "below", "data": 4, "valid": false },
                { "description": "at", "data": 5, "valid": true },
                { "description": "wrongly expected", "data": 1, "valid": true }
            ]
        },
        {
            "description": "skipped",
            "schema": { "minimum": 5 },
            "skip": "not today",
            "tests": [{ "description": "any", "data": 1, "valid": true }]
        },
        {
            "description": "broken",
            "schema": { "minLength": "three" },
            "tests": [{ "description": "any", "data": "x", "valid": true }]
        }
    ]"#;

    #[test]
    fn runs_and_counts() {
        let groups = parse_suite(SUITE).expect("parse");
        let summary = run_suite(&Engine::new(Options::default()), &groups);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failures[0].name, "minimum / wrongly expected");
        assert!(!summary.all_passed());
        assert!(summary.to_string().contains("must be >= 5"));
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(parse_suite(r#"{"description": "not a list"}"#).is_err());
    }
}
