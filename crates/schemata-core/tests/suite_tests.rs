//! Runs the JSON test suites under `tests/suite/` in every error mode.

use rstest::rstest;
use schemata_core::{Engine, Options};
use schemata_testutil::suite::{parse_suite, run_suite};

const NUMBER: &str = include_str!("../../../tests/suite/number.json");
const STRING: &str = include_str!("../../../tests/suite/string.json");
const ARRAY: &str = include_str!("../../../tests/suite/array.json");
const OBJECT: &str = include_str!("../../../tests/suite/object.json");
const COMBINATORS: &str = include_str!("../../../tests/suite/combinators.json");
const REFS: &str = include_str!("../../../tests/suite/refs.json");

fn without_inlining() -> Options {
    Options {
        inline_refs: false,
        ..Options::default()
    }
}

fn collect_all_without_inlining() -> Options {
    Options {
        inline_refs: false,
        ..Options::all_errors()
    }
}

#[rstest]
fn suite_file(
    #[values(NUMBER, STRING, ARRAY, OBJECT, COMBINATORS, REFS)] content: &str,
    #[values(
        Options::default(),
        Options::all_errors(),
        without_inlining(),
        collect_all_without_inlining()
    )]
    opts: Options,
) {
    let groups = parse_suite(content).expect("suite parses");
    let engine = Engine::new(opts.clone());
    let summary = run_suite(&engine, &groups);

    println!("{summary}");
    assert!(summary.total() > 0);
    assert!(
        summary.all_passed(),
        "{} failures under {opts:?}",
        summary.failed + summary.errors
    );
}

#[test]
fn suites_share_one_engine() {
    // anonymous schemas are deduplicated, identified ones must not clash
    let engine = Engine::default();
    for content in [NUMBER, STRING, ARRAY, OBJECT, COMBINATORS, REFS] {
        let groups = parse_suite(content).expect("suite parses");
        let summary = run_suite(&engine, &groups);
        assert!(summary.all_passed(), "{summary}");
    }
}
