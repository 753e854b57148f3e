use std::collections::HashMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use proptest::prelude::*;

use crate::*;

fn config(source: &str) -> Config {
    Config::parse(source).unwrap()
}

fn resolution_kind(err: Error) -> ResolutionErrorKind {
    match err {
        Error::Resolution(e) => e.kind,
        other => panic!("expected a resolution error, got {other:?}"),
    }
}

#[test]
fn test_relative_and_absolute_references_agree() {
    let config = config("a: {b: 5, c: {x: $b}}\ny: $a.b\nz: $a.c.x");
    assert_eq!(config.get_by_path("a.c.x").unwrap(), Value::Int(5));
    assert_eq!(config.get("y").unwrap(), Value::Int(5));
    assert_eq!(config.get("z").unwrap(), Value::Int(5));
}

#[test]
fn test_parent_escape_skips_the_nearest_definition() {
    let config = config("a: {b: 1, c: {b: 2, here: $b, up: $_.b}}");
    assert_eq!(config.get_by_path("a.c.here").unwrap(), Value::Int(2));
    assert_eq!(config.get_by_path("a.c.up").unwrap(), Value::Int(1));
}

#[test]
fn test_cycle_does_not_poison_later_reads() {
    let config = config("a: $b\nb: $a\nc: 3");
    assert_eq!(
        resolution_kind(config.get("a").unwrap_err()),
        ResolutionErrorKind::Circular
    );
    assert_eq!(config.get("c").unwrap(), Value::Int(3));
    assert_eq!(
        resolution_kind(config.get("b").unwrap_err()),
        ResolutionErrorKind::Circular
    );
}

#[test]
fn test_cycle_inside_a_unit_scope() {
    let options = LoadOptions::default().scope(ScopePredicate::composable_unit());
    let config = Config::parse_with("unit: {input: 1, output: $a, a: $b, b: $a}\nx: $unit.input", &options).unwrap();
    let Value::Mapping(unit) = config.get("unit").unwrap() else {
        panic!("expected a mapping");
    };
    assert_eq!(
        resolution_kind(unit.get("output").unwrap_err()),
        ResolutionErrorKind::Circular
    );
    assert_eq!(unit.container().marks(), 0);
    assert_eq!(config.container().marks(), 0);
    assert_eq!(config.get("x").unwrap(), Value::Int(1));
}

#[test]
fn test_unresolved_reference() {
    let config = config("a: {b: $nowhere}");
    let err = config.get_by_path("a.b").unwrap_err();
    assert!(err.is_resolution());
    assert_eq!(
        err.to_string(),
        "unable to resolve $nowhere (evaluating `a.b`)"
    );
}

#[test]
fn test_extends_at_top_level() {
    let config = config("base: {x: 1, y: 2}\nchild: {extends: $base, y: 3}");
    let flat = config.instantiate().unwrap();
    let Value::Mapping(child) = flat.get("child").unwrap() else {
        panic!("expected a mapping");
    };
    assert_eq!(child.keys(), vec!["x", "y"]);
    assert_eq!(child.get("x").unwrap(), Value::Int(1));
    assert_eq!(child.get("y").unwrap(), Value::Int(3));
    // The source tree is not changed.
    assert!(config.get_by_path("child.extends").is_ok());
}

#[test]
fn test_ranges() {
    let config = config("a: [1..3]\nb: [1..1]\nc: [3..1]\nn: 2\nd: [0..$n + 1]\ne: [$n..4]\nf: [$n * 2 - 5..$n]");
    let values = |key: &str| config.get(key).unwrap().as_sequence().unwrap().values().unwrap();
    assert_eq!(values("a"), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(values("b"), vec![Value::Int(1)]);
    assert!(values("c").is_empty());
    assert_eq!(values("d").len(), 4);
    assert_eq!(values("e"), vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
    assert_eq!(values("f"), vec![Value::Int(-1), Value::Int(0), Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_comprehension_items_are_isolated() {
    let config = config("c: [{n: $i, sq: $i * $i} | i: [0..2]]");
    let Value::Sequence(c) = config.get("c").unwrap() else {
        panic!("expected a sequence");
    };
    assert_eq!(c.len().unwrap(), 3);
    assert_eq!(config.get_by_path("c[2].sq").unwrap(), Value::Int(4));

    let Value::Mapping(first) = c.get(0).unwrap() else {
        panic!("expected a mapping");
    };
    first.insert("n", Value::Int(100));
    assert_eq!(config.get_by_path("c[0].n").unwrap(), Value::Int(100));
    assert_eq!(config.get_by_path("c[1].n").unwrap(), Value::Int(1));
    assert_eq!(config.get_by_path("c[2].n").unwrap(), Value::Int(2));
}

#[test]
fn test_comprehension_over_outer_sequence() {
    let config = config("v: ['a', 'b', 'c']\nc: [$v[$i] | i: [0..2]]");
    let Value::Sequence(c) = config.get("c").unwrap() else {
        panic!("expected a sequence");
    };
    assert_eq!(
        c.values().unwrap(),
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
}

#[test]
fn test_arithmetic_precedence_and_errors() {
    let config = config("a: 2\nb: 3\nx: $a + $b * 2\ny: ($a + $b) * 2\nz: 1 / 0\nw: 7 % -2\ns: 'ab' + 'cd'");
    assert_eq!(config.get("x").unwrap(), Value::Int(8));
    assert_eq!(config.get("y").unwrap(), Value::Int(10));
    assert_eq!(config.get("w").unwrap(), Value::Int(-1));
    assert_eq!(config.get("s").unwrap(), Value::from("abcd"));

    let err = config.get("z").unwrap_err();
    assert_eq!(err.to_string(), "division by zero in 1 / 0 (evaluating `z`)");
    assert_eq!(resolution_kind(err), ResolutionErrorKind::DivisionByZero);
}

#[test]
fn test_continued_subtraction_in_a_mapping_value() {
    let config = config("a: 1\nb: 2\nx: $a\n  - $b\ns: [$a\n  -$b]");
    assert_eq!(config.get("x").unwrap(), Value::Int(-1));
    assert_eq!(config.get_by_path("s[1]").unwrap(), Value::Int(-2));
}

#[test]
fn test_merge_then_read() {
    let target = config("server: {host: 'a', port: 80}\nplugins: ['x']");
    let source = config("server: {port: 8080, tls: True}\nplugins: ['y']");
    target.merge(&source, &default_merge_resolve).unwrap();
    assert_eq!(target.get_by_path("server.port").unwrap(), Value::Int(8080));
    assert_eq!(target.get_by_path("server.host").unwrap(), Value::from("a"));
    assert_eq!(target.get_by_path("server.tls").unwrap(), Value::Bool(true));
    assert_eq!(target.get_by_path("plugins.length").unwrap(), Value::Int(2));
}

#[derive(Default)]
struct MemoryResolver {
    files: HashMap<String, String>,
    kinds: Rc<std::cell::RefCell<Vec<IncludeKind>>>,
}

impl MemoryResolver {
    fn with(mut self, name: &str, text: &str) -> Self {
        self.files.insert(name.to_string(), text.to_string());
        self
    }
}

impl IncludeResolver for MemoryResolver {
    fn resolve(&self, kind: IncludeKind, name: &str, _current: Option<&Path>) -> io::Result<Included> {
        self.kinds.borrow_mut().push(kind);
        let text = self
            .files
            .get(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
        Ok(Included {
            path: Some(PathBuf::from(name)),
            reader: Box::new(Cursor::new(text.clone().into_bytes())),
        })
    }
}

#[test]
fn test_includes_resolve_against_outer_config() {
    let resolver = MemoryResolver::default()
        .with("svc.cfg", "port: $base_port + 1\nsep: `os.sep`\ndb: @<db.cfg>")
        .with("db.cfg", "name: 'main'");
    let kinds = resolver.kinds.clone();
    let options = LoadOptions::default().resolver(resolver);
    let config = Config::parse_with("base_port: 8000\nsvc: @'svc.cfg'", &options).unwrap();

    assert_eq!(config.get_by_path("svc.port").unwrap(), Value::Int(8001));
    assert_eq!(
        config.get_by_path("svc.sep").unwrap(),
        Value::from(std::path::MAIN_SEPARATOR_STR)
    );
    assert_eq!(config.get_by_path("svc.db.name").unwrap(), Value::from("main"));
    assert_eq!(*kinds.borrow(), vec![IncludeKind::Relative, IncludeKind::Global]);
}

#[test]
fn test_recursive_include_is_rejected() {
    let resolver = MemoryResolver::default()
        .with("a.cfg", "b: @'b.cfg'")
        .with("b.cfg", "a: @'a.cfg'");
    let options = LoadOptions::default().resolver(resolver);
    let err = Config::parse_with("top: @'a.cfg'", &options).unwrap_err();
    assert_eq!(err.to_string(), "cannot include \"a.cfg\": recursive include");
}

#[test]
fn test_missing_include() {
    let options = LoadOptions::default().resolver(MemoryResolver::default());
    let err = Config::parse_with("x: @'gone.cfg'", &options).unwrap_err();
    assert_eq!(err.to_string(), "cannot include \"gone.cfg\": no such file");
}

#[test]
fn test_builtin_namespace() {
    let config = config(
        "items: [1, 2, 3]\nn: ${len($items)}\nname: `os.name`\nlabel: ${str($n)} + ' items'\nmissing: `env.TRELLIS_TEST_SURELY_UNSET`",
    );
    assert_eq!(config.get("n").unwrap(), Value::Int(3));
    assert_eq!(config.get("label").unwrap(), Value::from("3 items"));
    assert!(matches!(config.get("name").unwrap(), Value::Str(_)));
    assert_eq!(
        resolution_kind(config.get("missing").unwrap_err()),
        ResolutionErrorKind::NoNamespace
    );
}

#[test]
fn test_function_failure_is_reported() {
    let config = config("x: ${int('abc')}");
    match resolution_kind(config.get("x").unwrap_err()) {
        ResolutionErrorKind::Function { name, .. } => assert_eq!(name, "int"),
        other => panic!("unexpected error kind {other:?}"),
    }
}

#[test]
fn test_saved_text_reads_back() {
    let source = "# sizes\nn: 3\nr: [1..$n]\nc: [$v * 2 | v: $r]\nm: {a: [1, 'two', None], b: $_.n}\nt: `os.sep`";
    let original = config(source);
    let reread = config(&original.to_document());
    assert_eq!(original.mapping(), reread.mapping());
    assert_eq!(reread.comment("n").as_deref(), Some("sizes"));
}

fn key() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z_][a-z0-9_]{0,6}", "[a-z]{1,3} [a-z]{1,3}"]
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000_000_000i64..1_000_000_000_000).prop_map(Value::Int),
        (-1e12f64..1e12).prop_map(Value::Float),
        "[a-zA-Z0-9 _'\"\\\\\n\t-]{0,12}".prop_map(Value::Str),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|items| {
                let sequence = Sequence::new();
                for item in items {
                    sequence.push(item).unwrap();
                }
                Value::Sequence(sequence)
            }),
            prop::collection::vec((key(), inner), 0..4).prop_map(|entries| {
                let mapping = Mapping::new();
                for (key, value) in entries {
                    mapping.insert(key, value);
                }
                Value::Mapping(mapping)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn test_plain_data_survives_save_and_load(entries in prop::collection::vec((key(), tree()), 0..6)) {
        let root = Mapping::new();
        for (key, value) in entries {
            root.insert(key, value);
        }
        let text = format_mapping_default(&root);
        let reread = Config::parse(&text).unwrap();
        prop_assert_eq!(reread.mapping(), &root, "{}", text);
    }
}
