//! End-to-end behavior of compiled validators through the engine facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use schemata_core::codegen::{CmpOp, Cond, Test};
use schemata_core::keywords::CompiledCheck;
use schemata_core::{
    AsyncValidateError, CoerceTypes, Engine, ExtendRefs, Format, JsonType, KeywordDefinition, KeywordError,
    Options, SchemaError, UnknownFormats, ValidateError,
};

#[fixture]
fn engine() -> Engine {
    Engine::default()
}

fn with(f: impl FnOnce(&mut Options)) -> Engine {
    let mut opts = Options::default();
    f(&mut opts);
    Engine::new(opts)
}

// ============================================================================
// Basic verdicts and error records
// ============================================================================

#[rstest]
fn integer_minimum(engine: Engine) {
    let validator = engine
        .compile(json!({ "type": "integer", "minimum": 5 }))
        .expect("compile");

    let result = validator.check(&json!(4)).expect("run");
    assert!(!result.is_valid());
    assert_eq!(result.errors().len(), 1);
    let error = &result.errors()[0];
    assert_eq!(error.keyword, "minimum");
    assert_eq!(error.message, "must be >= 5");
    assert_eq!(error.instance_path, "");
    assert_eq!(error.schema_path, "#/minimum");
    assert_eq!(Value::Object(error.params.clone()), json!({ "comparison": ">=", "limit": 5 }));

    assert!(validator.is_valid(&json!(5)).expect("run"));
}

#[rstest]
fn required_property(engine: Engine) {
    let validator = engine
        .compile(json!({ "properties": { "a": { "type": "string" } }, "required": ["a"] }))
        .expect("compile");

    let result = validator.check(&json!({})).expect("run");
    assert!(!result.is_valid());
    let error = &result.errors()[0];
    assert_eq!(error.keyword, "required");
    assert_eq!(error.params["missingProperty"], json!("a"));
    assert_eq!(error.message, "must have required property 'a'");

    assert!(validator.is_valid(&json!({ "a": "x" })).expect("run"));
}

#[rstest]
fn mutual_reference_cycle_is_rejected(engine: Engine) {
    engine.add_schema(json!({ "$id": "A", "$ref": "B" }), None).expect("add A");
    engine.add_schema(json!({ "$id": "B", "$ref": "A" }), None).expect("add B");

    let err = engine.get_schema("A").unwrap_err();
    assert!(matches!(err, SchemaError::RefCycle { .. }), "{err}");
    let err = engine.compile(json!({ "$ref": "A" })).unwrap_err();
    assert!(matches!(err, SchemaError::RefCycle { .. }), "{err}");
}

#[test]
fn coercion_rewrites_the_data() {
    let engine = with(|o| o.coerce_types = CoerceTypes::Scalar);
    let validator = engine.compile(json!({ "type": "integer" })).expect("compile");
    assert!(validator.mutates_data());

    let mut data = json!("5");
    assert!(validator.validate(&mut data).expect("run").is_valid());
    assert_eq!(data, json!(5));

    let mut data = json!("5.5");
    assert!(!validator.validate(&mut data).expect("run").is_valid());
    assert_eq!(data, json!("5.5"));
}

#[test]
fn coercion_reaches_nested_values() {
    let engine = with(|o| o.coerce_types = CoerceTypes::Array);
    let validator = engine
        .compile(json!({
            "properties": {
                "n": { "type": "number" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "flag": { "type": "boolean" }
            }
        }))
        .expect("compile");

    let mut data = json!({ "n": "2.5", "tags": 7, "flag": "true" });
    assert!(validator.validate(&mut data).expect("run").is_valid());
    assert_eq!(data, json!({ "n": 2.5, "tags": ["7"], "flag": true }));
}

// ============================================================================
// Error modes
// ============================================================================

fn three_problems() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "string" },
            "b": { "minimum": 3 }
        },
        "required": ["c"]
    })
}

#[test]
fn fail_fast_stops_at_the_first_error() {
    let validator = Engine::default().compile(three_problems()).expect("compile");
    let result = validator.check(&json!({ "a": 1, "b": 1 })).expect("run");
    assert!(!result.is_valid());
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].keyword, "required");
}

#[test]
fn collect_all_reports_every_error_in_order() {
    let validator = Engine::new(Options::all_errors()).compile(three_problems()).expect("compile");
    let result = validator.check(&json!({ "a": 1, "b": 1 })).expect("run");

    let seen: Vec<(&str, &str, &str)> = result
        .errors()
        .iter()
        .map(|e| (e.keyword.as_str(), e.instance_path.as_str(), e.schema_path.as_str()))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("required", "", "#/required"),
            ("type", "/a", "#/properties/a/type"),
            ("minimum", "/b", "#/properties/b/minimum"),
        ]
    );
    assert_eq!(validator.errors().map(|e| e.len()), Some(3));
}

#[test]
fn composite_errors_replace_branch_errors_when_failing_fast() {
    let schema = json!({ "anyOf": [{ "type": "string" }, { "minimum": 10 }] });

    let fast = Engine::default().compile(schema.clone()).expect("compile");
    let result = fast.check(&json!(1)).expect("run");
    let keywords: Vec<&str> = result.errors().iter().map(|e| e.keyword.as_str()).collect();
    assert_eq!(keywords, vec!["anyOf"]);
    assert_eq!(result.errors()[0].message, "must match a schema in anyOf");

    let all = Engine::new(Options::all_errors()).compile(schema).expect("compile");
    let result = all.check(&json!(1)).expect("run");
    let keywords: Vec<&str> = result.errors().iter().map(|e| e.keyword.as_str()).collect();
    assert_eq!(keywords, vec!["type", "minimum", "anyOf"]);
    assert_eq!(result.errors()[1].schema_path, "#/anyOf/1/minimum");
}

#[rstest]
fn one_of_reports_the_passing_branches(engine: Engine) {
    let validator = engine
        .compile(json!({ "oneOf": [{ "type": "integer" }, { "minimum": 2 }] }))
        .expect("compile");
    let result = validator.check(&json!(3)).expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.keyword, "oneOf");
    assert_eq!(error.params["passingSchemas"], json!([0, 1]));
}

#[rstest]
fn additional_properties_name_the_offender(engine: Engine) {
    let validator = engine
        .compile(json!({ "properties": { "a": {} }, "additionalProperties": false }))
        .expect("compile");
    let result = validator.check(&json!({ "a": 1, "zzz": 2 })).expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.keyword, "additionalProperties");
    assert_eq!(error.schema_path, "#/additionalProperties");
    assert_eq!(error.params["additionalProperty"], json!("zzz"));
}

#[rstest]
fn property_name_errors_carry_the_name(engine: Engine) {
    let validator = engine
        .compile(json!({ "propertyNames": { "maxLength": 2 } }))
        .expect("compile");
    let result = validator.check(&json!({ "ok": 1, "long": 2 })).expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.keyword, "propertyNames");
    assert_eq!(error.message, "property name must be valid");
    assert_eq!(error.params["propertyName"], json!("long"));
}

#[rstest]
fn duplicate_items_are_located(engine: Engine) {
    let validator = engine.compile(json!({ "uniqueItems": true })).expect("compile");
    let result = validator.check(&json!([1, 2, 1])).expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.params["i"], json!(2));
    assert_eq!(error.params["j"], json!(0));
    assert_eq!(error.message, "must NOT have duplicate items (items ## 0 and 2 are identical)");

    let result = validator
        .check(&json!([{ "a": 1, "b": 2 }, 1, { "b": 2, "a": 1 }, "1"]))
        .expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.params["i"], json!(2));
    assert_eq!(error.params["j"], json!(0));

    let result = validator.check(&json!([1, "1", 1.0])).expect("run");
    assert_eq!(result.errors()[0].message, "must NOT have duplicate items (items ## 0 and 2 are identical)");
}

#[test]
fn verbose_errors_carry_schema_and_data() {
    let engine = with(|o| o.verbose = true);
    let validator = engine
        .compile(json!({ "properties": { "n": { "maximum": 3 } } }))
        .expect("compile");
    let result = validator.check(&json!({ "n": 7 })).expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.schema, Some(json!(3)));
    assert_eq!(error.data, Some(json!(7)));
}

#[test]
fn error_record_shape() {
    let validator = Engine::default()
        .compile(json!({ "properties": { "age": { "minimum": 18 } } }))
        .expect("compile");
    let result = validator.check(&json!({ "age": 16 })).expect("run");
    insta::assert_json_snapshot!(result.errors(), @r##"
    [
      {
        "keyword": "minimum",
        "instancePath": "/age",
        "schemaPath": "#/properties/age/minimum",
        "message": "must be >= 18",
        "params": {
          "comparison": ">=",
          "limit": 18
        }
      }
    ]
    "##);
}

// ============================================================================
// Data rewriting
// ============================================================================

#[test]
fn defaults_fill_missing_properties() {
    let engine = with(|o| o.use_defaults = true);
    let validator = engine
        .compile(json!({
            "properties": {
                "a": { "default": 1 },
                "b": { "type": "string", "default": "x" },
                "c": { "properties": { "d": { "default": [] } } }
            }
        }))
        .expect("compile");

    let mut data = json!({ "b": "kept", "c": {} });
    assert!(validator.validate(&mut data).expect("run").is_valid());
    assert_eq!(data, json!({ "a": 1, "b": "kept", "c": { "d": [] } }));
}

#[test]
fn additional_properties_are_removed() {
    let engine = with(|o| o.remove_additional = true);
    let validator = engine
        .compile(json!({
            "properties": { "a": {} },
            "patternProperties": { "^x-": {} },
            "additionalProperties": false
        }))
        .expect("compile");

    let mut data = json!({ "a": 1, "x-ok": 2, "b": 3, "c": 4 });
    assert!(validator.validate(&mut data).expect("run").is_valid());
    assert_eq!(data, json!({ "a": 1, "x-ok": 2 }));
}

#[test]
fn check_leaves_the_input_alone() {
    let engine = with(|o| o.use_defaults = true);
    let validator = engine
        .compile(json!({ "properties": { "a": { "default": 1 } } }))
        .expect("compile");
    let data = json!({});
    assert!(validator.check(&data).expect("run").is_valid());
    assert_eq!(data, json!({}));
}

// ============================================================================
// References
// ============================================================================

#[rstest]
#[case(ExtendRefs::Ignore, true)]
#[case(ExtendRefs::Apply, false)]
fn siblings_of_ref(#[case] mode: ExtendRefs, #[case] long_string_valid: bool) {
    let engine = with(|o| o.extend_refs = mode);
    let validator = engine
        .compile(json!({
            "definitions": { "s": { "type": "string" } },
            "properties": { "a": { "$ref": "#/definitions/s", "maxLength": 2 } }
        }))
        .expect("compile");
    assert_eq!(validator.is_valid(&json!({ "a": "abc" })).expect("run"), long_string_valid);
    assert!(!validator.is_valid(&json!({ "a": 1 })).expect("run"));
}

#[test]
fn siblings_of_ref_can_be_an_error() {
    let engine = with(|o| o.extend_refs = ExtendRefs::Fail);
    let err = engine
        .compile(json!({ "definitions": { "s": {} }, "$ref": "#/definitions/s", "minimum": 1 }))
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidSchema { .. }), "{err}");
}

fn linked_list() -> Value {
    json!({
        "$id": "http://example.com/list.json",
        "type": "object",
        "properties": {
            "value": { "type": "integer" },
            "next": { "$ref": "#" }
        },
        "required": ["value"]
    })
}

fn chain(len: usize, last: Value) -> Value {
    let mut node = json!({ "value": last });
    for i in 0..len {
        node = json!({ "value": i, "next": node });
    }
    node
}

#[rstest]
fn recursion_follows_the_data(engine: Engine) {
    let validator = engine.compile(linked_list()).expect("compile");
    assert!(validator.is_valid(&chain(4, json!(0))).expect("run"));

    let result = validator.check(&chain(3, json!("deep"))).expect("run");
    assert!(!result.is_valid());
    assert_eq!(result.errors()[0].instance_path, "/next/next/next/value");
    assert_eq!(result.errors()[0].schema_path, "#/properties/value/type");
}

#[test]
fn runaway_recursion_is_bounded() {
    let engine = with(|o| o.max_call_depth = 4);
    let validator = engine.compile(linked_list()).expect("compile");
    assert!(validator.is_valid(&chain(2, json!(0))).expect("run"));
    assert!(matches!(
        validator.check(&chain(10, json!(0))),
        Err(ValidateError::DepthExceeded { limit: 4 })
    ));
}

#[rstest]
fn references_across_registered_documents(engine: Engine) {
    engine
        .add_schema(
            json!({
                "$id": "http://example.com/defs.json",
                "definitions": { "positive": { "type": "integer", "exclusiveMinimum": 0 } }
            }),
            None,
        )
        .expect("add");
    let validator = engine
        .compile(json!({
            "$id": "http://example.com/order.json",
            "properties": { "qty": { "$ref": "defs.json#/definitions/positive" } }
        }))
        .expect("compile");
    assert!(validator.is_valid(&json!({ "qty": 2 })).expect("run"));
    let result = validator.check(&json!({ "qty": 0 })).expect("run");
    assert_eq!(result.errors()[0].schema_path, "#/definitions/positive/exclusiveMinimum");
}

#[rstest]
fn missing_references_name_the_document(engine: Engine) {
    let err = engine
        .compile(json!({ "$ref": "http://example.com/absent.json#/definitions/a" }))
        .unwrap_err();
    assert_eq!(err.missing_schema(), Some("http://example.com/absent.json"));
}

#[rstest]
fn validation_by_key(engine: Engine) {
    engine
        .add_schema(json!({ "type": "object", "required": ["name"] }), Some("person"))
        .expect("add");
    assert!(engine.validate("person", &mut json!({ "name": "x" })).expect("run").is_valid());
    assert!(!engine.validate("person", &mut json!({})).expect("run").is_valid());
    assert!(engine.schema_ids().expect("ids").contains(&"person".to_string()));
}

#[rstest]
fn duplicate_keys_are_rejected(engine: Engine) {
    engine.add_schema(json!({ "type": "string" }), Some("k")).expect("add");
    engine.add_schema(json!({ "type": "string" }), Some("k")).expect("same again");
    let err = engine.add_schema(json!({ "type": "number" }), Some("k")).unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateKey { .. }), "{err}");
}

#[rstest]
fn conflicting_identifiers_are_rejected(engine: Engine) {
    engine
        .add_schema(json!({ "$id": "http://example.com/x.json", "type": "string" }), None)
        .expect("add");
    let err = engine
        .compile(json!({ "$id": "http://example.com/x.json", "type": "number" }))
        .unwrap_err();
    assert!(matches!(err, SchemaError::AmbiguousIdentifier { .. }), "{err}");
}

#[test]
fn draft4_identifiers() {
    let engine = with(|o| o.schema_id = schemata_core::SchemaId::Id);
    engine
        .add_schema(json!({ "id": "http://example.com/old.json", "type": "boolean" }), None)
        .expect("add");
    let validator = engine.get_schema("http://example.com/old.json").expect("get").expect("present");
    assert!(validator.is_valid(&json!(true)).expect("run"));
    assert!(!validator.is_valid(&json!(1)).expect("run"));
}

// ============================================================================
// Async schemas
// ============================================================================

#[tokio::test]
async fn async_validation_resolves_to_the_data() {
    let engine = with(|o| o.coerce_types = CoerceTypes::Scalar);
    let validator = engine
        .compile(json!({ "$async": true, "properties": { "n": { "type": "integer" } } }))
        .expect("compile");
    assert!(validator.is_async());

    let data = validator.validate_async(json!({ "n": "3" })).await.expect("valid");
    assert_eq!(data, json!({ "n": 3 }));

    match validator.validate_async(json!({ "n": "x" })).await {
        Err(AsyncValidateError::Invalid(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.errors()[0].instance_path, "/n");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn async_references_merge_thrown_errors() {
    let engine = Engine::default();
    engine
        .add_schema(
            json!({ "$id": "http://example.com/name.json", "$async": true, "type": "string" }),
            None,
        )
        .expect("add");

    let err = engine
        .compile(json!({ "properties": { "a": { "$ref": "http://example.com/name.json" } } }))
        .unwrap_err();
    assert!(matches!(err, SchemaError::AsyncRefFromSync { .. }), "{err}");

    let validator = engine
        .compile(json!({
            "$async": true,
            "properties": { "a": { "$ref": "http://example.com/name.json" } }
        }))
        .expect("compile");
    assert!(validator.validate_async(json!({ "a": "x" })).await.is_ok());
    match validator.validate_async(json!({ "a": 1 })).await {
        Err(AsyncValidateError::Invalid(errors)) => {
            assert_eq!(errors.errors()[0].keyword, "type");
            assert_eq!(errors.errors()[0].instance_path, "/a");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

// ============================================================================
// User keywords
// ============================================================================

fn even() -> KeywordDefinition {
    KeywordDefinition::predicate("even", |schema, data, _parent| {
        let wanted = schema.as_bool().unwrap_or(false);
        Ok(!wanted || data.as_i64().is_some_and(|n| n % 2 == 0))
    })
    .for_types([JsonType::Integer])
    .with_metaschema(json!({ "type": "boolean" }))
}

#[rstest]
fn predicate_keyword(engine: Engine) {
    engine.add_keyword(even()).expect("register");
    let validator = engine.compile(json!({ "even": true })).expect("compile");

    assert!(validator.is_valid(&json!(4)).expect("run"));
    assert!(validator.is_valid(&json!("odd strings are not numbers")).expect("run"));
    // fractions are numbers but not integers, so the keyword stays out
    assert!(validator.is_valid(&json!(1.5)).expect("run"));
    assert!(validator.is_valid(&json!(2.5)).expect("run"));
    let result = validator.check(&json!(3)).expect("run");
    let error = &result.errors()[0];
    assert_eq!(error.keyword, "even");
    assert_eq!(error.message, "must pass \"even\" keyword validation");
    assert_eq!(error.schema_path, "#/even");

    let err = engine.compile(json!({ "even": 5 })).unwrap_err();
    assert!(matches!(err, SchemaError::KeywordSchema { .. }), "{err}");
}

#[rstest]
#[case(Options::default())]
#[case(Options::all_errors())]
fn integer_keywords_skip_fractions(#[case] opts: Options) {
    let engine = Engine::new(opts);
    engine.add_keyword(even()).expect("register");
    let validator = engine
        .compile(json!({ "type": "number", "even": true, "maximum": 10 }))
        .expect("compile");

    assert!(validator.is_valid(&json!(1.5)).expect("run"));
    assert!(validator.is_valid(&json!(8)).expect("run"));
    let result = validator.check(&json!(7)).expect("run");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].keyword, "even");
    let result = validator.check(&json!(10.5)).expect("run");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].keyword, "maximum");
}

#[rstest]
fn keyword_names_must_be_unused(engine: Engine) {
    engine.add_keyword(even()).expect("register");
    assert!(matches!(
        engine.add_keyword(even()),
        Err(SchemaError::KeywordRegistration { .. })
    ));
    assert!(matches!(
        engine.add_keyword(KeywordDefinition::predicate("minimum", |_, _, _| Ok(true))),
        Err(SchemaError::KeywordRegistration { .. })
    ));
    assert!(engine.remove_keyword("even").expect("remove"));
    engine.add_keyword(even()).expect("register again");
}

#[rstest]
fn compiled_keyword_builds_once_per_value(engine: Engine) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    engine
        .add_keyword(
            KeywordDefinition::compiled("range", move |schema, _parent| {
                counter.fetch_add(1, Ordering::SeqCst);
                let (Some(lo), Some(hi)) = (schema[0].as_f64(), schema[1].as_f64()) else {
                    return Err("range needs two numbers".into());
                };
                let check: CompiledCheck = Arc::new(move |data: &Value| {
                    Ok(data.as_f64().is_none_or(|n| lo <= n && n <= hi))
                });
                Ok(check)
            })
            .with_message("must be in range"),
        )
        .expect("register");

    let a = engine.compile(json!({ "range": [1, 3] })).expect("compile");
    let b = engine
        .compile(json!({ "type": "number", "range": [1, 3] }))
        .expect("compile");
    assert_eq!(built.load(Ordering::SeqCst), 1);

    assert!(a.is_valid(&json!(2)).expect("run"));
    let result = b.check(&json!(7)).expect("run");
    assert_eq!(result.errors()[0].message, "must be in range");

    let err = engine.compile(json!({ "range": "wide" })).unwrap_err();
    assert_eq!(err.to_string(), "range needs two numbers");
}

#[rstest]
fn macro_keyword(engine: Engine) {
    engine
        .add_keyword(KeywordDefinition::rewrite("between", |schema, _parent| {
            Ok(json!({ "minimum": schema[0], "maximum": schema[1] }))
        }))
        .expect("register");
    let validator = engine.compile(json!({ "between": [1, 3] })).expect("compile");
    assert!(validator.is_valid(&json!(2)).expect("run"));
    let result = validator.check(&json!(5)).expect("run");
    assert_eq!(result.errors()[0].keyword, "maximum");
    assert_eq!(result.errors()[0].schema_path, "#/maximum");

    // collides with the host's own minimum, so it lands in allOf
    let validator = engine
        .compile(json!({ "minimum": 0, "between": [1, 3] }))
        .expect("compile");
    assert!(!validator.is_valid(&json!(0)).expect("run"));
}

#[rstest]
fn code_keyword(engine: Engine) {
    engine
        .add_keyword(
            KeywordDefinition::code("nonEmpty", |cx| {
                if cx.schema() != &Value::Bool(true) {
                    return Ok(());
                }
                let data = cx.data();
                cx.fail_with(
                    Cond::test(data, Test::Length { op: CmpOp::Ge, limit: 1 }).not(),
                    KeywordError::new("must not be empty"),
                );
                Ok(())
            })
            .for_types([JsonType::String, JsonType::Array]),
        )
        .expect("register");
    let validator = engine.compile(json!({ "nonEmpty": true })).expect("compile");
    assert!(validator.is_valid(&json!("x")).expect("run"));
    assert!(validator.is_valid(&json!(0)).expect("run"));
    assert!(validator.is_valid(&json!({})).expect("run"));
    assert!(validator.is_valid(&json!(null)).expect("run"));
    let result = validator.check(&json!("")).expect("run");
    assert_eq!(result.errors()[0].message, "must not be empty");
    let result = validator.check(&json!([])).expect("run");
    assert_eq!(result.errors()[0].message, "must not be empty");
    assert_eq!(result.errors()[0].keyword, "nonEmpty");
}

#[rstest]
fn keyword_dependencies_are_enforced(engine: Engine) {
    engine
        .add_keyword(KeywordDefinition::predicate("unit", |_, _, _| Ok(true)).with_dependencies(["type"]))
        .expect("register");
    let err = engine.compile(json!({ "unit": "m" })).unwrap_err();
    assert!(matches!(err, SchemaError::MissingKeywordDependency { .. }), "{err}");
    engine
        .compile(json!({ "type": "number", "unit": "m" }))
        .expect("compiles with its dependency");
}

#[rstest]
fn extension_failures_surface_unchanged(engine: Engine) {
    engine
        .add_keyword(KeywordDefinition::predicate("explode", |_, _, _| Err("boom".into())))
        .expect("register");
    let validator = engine.compile(json!({ "explode": true })).expect("compile");
    let err = validator.check(&json!(1)).unwrap_err();
    assert!(matches!(err, ValidateError::Extension(_)));
    assert_eq!(err.to_string(), "boom");
}

// ============================================================================
// Formats and strictness
// ============================================================================

#[rstest]
fn formats(engine: Engine) {
    let err = engine.compile(json!({ "format": "digits" })).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownFormat { .. }), "{err}");

    engine
        .add_format("digits", Format::regex(regex::Regex::new(r"^\d+$").expect("regex")))
        .expect("add");
    engine
        .add_format("upper", Format::check(|s| s.chars().all(|c| c.is_ascii_uppercase())))
        .expect("add");

    let validator = engine.compile(json!({ "format": "digits" })).expect("compile");
    assert!(validator.is_valid(&json!("123")).expect("run"));
    assert!(validator.is_valid(&json!(12)).expect("run"));
    let result = validator.check(&json!("12a")).expect("run");
    assert_eq!(result.errors()[0].message, "must match format \"digits\"");

    let validator = engine.compile(json!({ "format": "upper" })).expect("compile");
    assert!(!validator.is_valid(&json!("abc")).expect("run"));
}

#[test]
fn unknown_formats_can_be_ignored() {
    let engine = with(|o| o.unknown_formats = UnknownFormats::Ignore);
    let validator = engine.compile(json!({ "format": "email" })).expect("compile");
    assert!(validator.is_valid(&json!("not an email")).expect("run"));
}

#[test]
fn strict_keywords_reject_unknown_names() {
    let err = with(|o| o.strict_keywords = true)
        .compile(json!({ "minimun": 1 }))
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownKeyword { ref keyword, .. } if keyword == "minimun"));

    let validator = Engine::default().compile(json!({ "minimun": 1 })).expect("lenient");
    assert!(validator.is_valid(&json!(0)).expect("run"));
}

#[rstest]
fn invalid_patterns_are_schema_errors(engine: Engine) {
    let err = engine.compile(json!({ "pattern": "(" })).unwrap_err();
    assert!(matches!(err, SchemaError::InvalidSchema { .. }), "{err}");
}

#[test]
fn kept_source_shows_the_program() {
    let engine = with(|o| o.keep_source = true);
    let validator = engine
        .compile(json!({ "properties": { "a": { "minimum": 1 } } }))
        .expect("compile");
    let source = validator.source().expect("source");
    assert!(!source.is_empty());
    assert!(Engine::default().compile(json!({})).expect("compile").source().is_none());
}
