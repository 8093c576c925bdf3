#![cfg(test)]
//! End-to-end pipeline tests: tier rules, dependency closure, output
//! ordering and the interchange document.

use crate::descriptions::{DescKind, Namespace, Tier};
use crate::error::Error;
use crate::options::Options;
use crate::Run;
use serde_json::json;

fn run_with(header: &str, configure: impl FnOnce(&mut Options)) -> Result<Run, Error> {
    let mut options = Options::default();
    configure(&mut options);
    let mut run = Run::new(options);
    run.parse_text(header, "test.h");
    run.process()?;
    Ok(run)
}

fn run_header(header: &str) -> Run {
    run_with(header, |_| {}).expect("pipeline")
}

fn output_names(run: &Run) -> Vec<&str> {
    run.output().map(|d| d.name.as_str()).collect()
}

#[test]
fn tier_rules_last_match_wins() {
    let run = run_with(
        concat!(
            "#define __SECRET 42\n",
            "#define __UNUSED 7\n",
            "#define NAN 99\n",
            "#define USES_NAN (NAN + 1)\n",
            "#define VISIBLE (__SECRET + 1)\n",
        ),
        |options| {
            options.symbol_rules = vec![
                "never=NAN".to_string(),
                "if_needed=__\\w+".to_string(),
            ];
        },
    )
    .unwrap();

    let names = output_names(&run);
    // __SECRET is pulled in through VISIBLE; __UNUSED is dropped silently;
    // NAN is excluded outright.
    assert!(names.contains(&"VISIBLE"));
    assert!(names.contains(&"__SECRET"));
    assert!(names.contains(&"USES_NAN"));
    assert!(!names.contains(&"NAN"));
    assert!(!names.contains(&"__UNUSED"));

    // The dependent survives but carries a dependency error and a fallback
    // substitution for the excluded reference.
    let uses_nan = run.registry.lookup(Namespace::Ident, "USES_NAN").unwrap();
    let desc = run.registry.get(uses_nan);
    assert!(desc.included);
    assert_eq!(desc.fallback_refs, vec![(Namespace::Ident, "NAN".to_string())]);
    assert!(desc
        .errors
        .iter()
        .any(|d| d.message.contains("opaque fallback")));

    let nan = run.registry.lookup(Namespace::Ident, "NAN").unwrap();
    assert_eq!(run.registry.get(nan).tier, Tier::Never);
    assert!(!run.registry.get(nan).included);
}

#[test]
fn rules_override_each_other_in_order() {
    let run = run_with("#define AB 1\n#define AC 2\n", |options| {
        options.symbol_rules = vec!["never=A\\w".to_string(), "yes=AC".to_string()];
    })
    .unwrap();
    let names = output_names(&run);
    assert!(!names.contains(&"AB"));
    assert!(names.contains(&"AC"));
}

#[test]
fn malformed_rule_is_a_fatal_error() {
    let result = run_with("#define A 1\n", |options| {
        options.symbol_rules = vec!["sometimes=A".to_string()];
    });
    assert!(matches!(result, Err(Error::Rule(_))));
}

#[test]
fn definitions_precede_use_in_output() {
    let run = run_header(concat!(
        "typedef struct point { int x; int y; } point_t;\n",
        "point_t origin(void);\n",
    ));
    let names = output_names(&run);
    let point = names.iter().position(|n| *n == "point").unwrap();
    let point_t = names.iter().position(|n| *n == "point_t").unwrap();
    let origin = names.iter().position(|n| *n == "origin").unwrap();
    assert!(point < point_t);
    assert!(point_t < origin || point < origin);
}

#[test]
fn enum_precedes_its_constants() {
    let run = run_header("typedef enum { TEST_1 = 0, TEST_2 } test_status_t;\n");
    let names = output_names(&run);
    assert_eq!(names, vec!["anon_1", "TEST_1", "TEST_2", "test_status_t"]);
}

#[test]
fn empty_output_is_fatal() {
    let result = run_with("#define A 1\n", |options| {
        options.symbol_rules = vec!["never=.*".to_string()];
    });
    assert!(matches!(result, Err(Error::EmptyOutput)));
}

#[test]
fn builtin_symbols_are_excluded_by_default() {
    let header = concat!(
        "# 1 \"<built-in>\"\n",
        "#define __GNUC__ 4\n",
        "# 1 \"test.h\"\n",
        "#define MINE 1\n",
    );
    let run = run_header(header);
    let names = output_names(&run);
    assert!(!names.contains(&"__GNUC__"));
    assert!(names.contains(&"MINE"));

    let run = run_with(header, |options| options.builtin_symbols = true).unwrap();
    assert!(output_names(&run).contains(&"__GNUC__"));
}

#[test]
fn non_primary_headers_are_on_demand() {
    let header = concat!(
        "# 1 \"test.h\"\n",
        "# 1 \"/usr/include/dep.h\" 1\n",
        "struct from_dep { int x; };\n",
        "struct unrelated { int y; };\n",
        "# 3 \"test.h\" 2\n",
        "struct from_dep first(void);\n",
    );
    let run = run_header(header);
    let names = output_names(&run);
    // from_dep is reached through the closure; unrelated is dropped
    // silently.
    assert!(names.contains(&"from_dep"));
    assert!(names.contains(&"first"));
    assert!(!names.contains(&"unrelated"));

    let run = run_with(header, |options| options.all_headers = true).unwrap();
    assert!(output_names(&run).contains(&"unrelated"));
}

#[test]
fn undef_removes_macro_when_enabled() {
    let header = "#define GONE 1\n#undef GONE\n#define KEPT 2\n";
    let run = run_header(header);
    let gone = run.registry.lookup(Namespace::Ident, "GONE").unwrap();
    assert!(matches!(run.registry.get(gone).kind, DescKind::Undef));

    let run = run_with(header, |options| options.include_undefs = false).unwrap();
    let gone = run.registry.lookup(Namespace::Ident, "GONE").unwrap();
    assert!(matches!(
        run.registry.get(gone).kind,
        DescKind::MacroConst { .. }
    ));
}

#[test]
fn no_macros_switch_excludes_macros_but_rules_override() {
    let run = run_with("#define A 1\n#define B 2\nint f(void);\n", |options| {
        options.include_macros = false;
        options.symbol_rules = vec!["yes=B".to_string()];
    })
    .unwrap();
    let names = output_names(&run);
    assert!(!names.contains(&"A"));
    assert!(names.contains(&"B"));
    assert!(names.contains(&"f"));
}

#[test]
fn explicit_name_lists_override_rules() {
    let run = run_with("#define A 1\n#define B 2\n", |options| {
        options.symbol_rules = vec!["never=.*".to_string()];
        options.include_symbols = vec!["A".to_string()];
    })
    .unwrap();
    assert_eq!(output_names(&run), vec!["A"]);
}

#[test]
fn two_runs_are_byte_identical() {
    let header = concat!(
        "typedef struct { int a; } one_t;\n",
        "typedef struct { char b; } two_t;\n",
        "typedef enum { E1, E2 } e_t;\n",
        "#define M(x) (x + 1)\n",
        "int f(one_t *p, ...);\n",
    );
    let first = run_header(header);
    let second = run_header(header);

    assert_eq!(output_names(&first), output_names(&second));
    assert_eq!(
        serde_json::to_string(&first.interchange()).unwrap(),
        serde_json::to_string(&second.interchange()).unwrap()
    );
}

#[test]
fn runs_do_not_leak_state() {
    let first = run_header("typedef struct { int a; } alpha_t;\n");
    assert!(first.registry.record("anon_1").is_some());

    // A fresh run restarts the anonymous counter and sees none of the
    // previous registry.
    let second = run_header("typedef struct { char z; } beta_t;\n");
    let record = second.registry.record("anon_1").unwrap();
    assert_eq!(record.members[0].name.as_deref(), Some("z"));
    assert!(second.registry.lookup(Namespace::Ident, "alpha_t").is_none());
}

#[test]
fn interchange_macro_entries() {
    let run = run_header("#define A 1\n#define B(x,y) x+y\n");
    let doc = run.interchange();
    let entries = doc.as_array().unwrap();

    let a = entries.iter().find(|e| e["name"] == "A").unwrap();
    assert_eq!(a, &json!({"name": "A", "type": "macro", "value": "1"}));

    let b = entries.iter().find(|e| e["name"] == "B").unwrap();
    assert_eq!(
        b,
        &json!({"args": ["x", "y"], "body": "(x + y)", "name": "B", "type": "macro_function"})
    );
}

#[test]
fn interchange_struct_entry_shape() {
    let run = run_header("struct foo { int a; int d : 15; int : 17; };\n");
    let doc = run.interchange();
    let entry = &doc.as_array().unwrap()[0];

    assert_eq!(entry["name"], "foo");
    assert_eq!(entry["type"], "struct");
    assert_eq!(entry["attrib"], json!({}));

    let fields = entry["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(
        fields[0],
        json!({
            "name": "a",
            "ctype": {
                "Klass": "CtypesSimple",
                "name": "int",
                "signed": true,
                "longs": 0,
                "errors": [],
            },
        })
    );
    assert_eq!(fields[1]["bitfield"], "15");
    assert_eq!(fields[1]["ctype"]["Klass"], "CtypesBitfield");
    assert_eq!(
        fields[1]["ctype"]["bitfield"]["Klass"],
        "ConstantExpressionNode"
    );
    assert_eq!(fields[1]["ctype"]["bitfield"]["value"], 15);
    assert_eq!(fields[1]["ctype"]["bitfield"]["is_literal"], false);
    assert_eq!(fields[2]["name"], serde_json::Value::Null);
}

#[test]
fn interchange_enum_and_typedef_entries() {
    let run = run_header("typedef enum { TEST_1 = 0, TEST_2 } test_status_t;\n");
    let doc = run.interchange();
    let entries = doc.as_array().unwrap();

    let enum_entry = entries.iter().find(|e| e["type"] == "enum").unwrap();
    assert_eq!(enum_entry["name"], "anon_1");
    let fields = enum_entry["fields"].as_array().unwrap();
    assert_eq!(fields[0]["name"], "TEST_1");
    assert_eq!(fields[0]["ctype"]["Klass"], "ConstantExpressionNode");
    assert_eq!(fields[1]["ctype"]["Klass"], "BinaryExpressionNode");
    assert_eq!(fields[1]["ctype"]["name"], "addition");
    assert_eq!(fields[1]["ctype"]["format"], "(%s + %s)");
    assert_eq!(fields[1]["ctype"]["left"]["Klass"], "IdentifierExpressionNode");
    assert_eq!(fields[1]["ctype"]["left"]["name"], "TEST_1");
    assert_eq!(fields[1]["ctype"]["can_be_ctype"], json!([false, false]));

    let constants: Vec<&serde_json::Value> = entries
        .iter()
        .filter(|e| e["type"] == "constant")
        .collect();
    assert_eq!(constants[0]["value"], "0");
    assert_eq!(constants[1]["value"], "(TEST_1 + 1)");

    let typedef = entries.iter().find(|e| e["type"] == "typedef").unwrap();
    assert_eq!(typedef["name"], "test_status_t");
    assert_eq!(typedef["ctype"]["Klass"], "CtypesEnum");
    assert_eq!(typedef["ctype"]["tag"], "anon_1");
    assert_eq!(typedef["ctype"]["anonymous"], true);
    assert_eq!(typedef["ctype"]["opaque"], false);
    let enumerators = typedef["ctype"]["enumerators"].as_array().unwrap();
    assert_eq!(enumerators[0][0], "TEST_1");
    assert_eq!(enumerators[0][1]["Klass"], "ConstantExpressionNode");
}

#[test]
fn interchange_function_entry_shape() {
    let run = run_header("void __stdcall__ foo2(int a);\n");
    let doc = run.interchange();
    let entry = &doc.as_array().unwrap()[0];

    assert_eq!(entry["name"], "foo2");
    assert_eq!(entry["type"], "function");
    assert_eq!(entry["variadic"], false);
    assert_eq!(entry["attrib"], json!({"stdcall": true}));
    assert_eq!(entry["return"]["Klass"], "CtypesSimple");
    assert_eq!(entry["return"]["name"], "void");

    let args = entry["args"].as_array().unwrap();
    assert_eq!(args[0]["Klass"], "CtypesSimple");
    assert_eq!(args[0]["identifier"], "a");
}

#[test]
fn interchange_macro_entry_snapshot() {
    let run = run_header("#define A 1\n");
    let doc = run.interchange();
    let entry = &doc.as_array().unwrap()[0];
    insta::assert_json_snapshot!(entry, @r###"
    {
      "name": "A",
      "type": "macro",
      "value": "1"
    }
    "###);
}

#[test]
fn strict_mode_aborts_on_collected_errors() {
    let result = run_with("#define BROKEN do { } while(0)\nint f(void);\n", |options| {
        options.strict = true;
    });
    assert!(matches!(result, Err(Error::Strict { .. })));
}

#[test]
fn encoding_anomalies_do_not_abort() {
    let mut run = Run::new(Options::default());
    run.parse_bytes(b"#define S \"\xa9ok\xa5\"\nint f(void);\n", "mac.h");
    run.process().unwrap();
    let names: Vec<&str> = run.output().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"S"));
    assert!(names.contains(&"f"));

    let s = run.registry.lookup(Namespace::Ident, "S").unwrap();
    let DescKind::MacroConst { body } = &run.registry.get(s).kind else {
        panic!();
    };
    assert!(body.render().contains('\u{FFFD}'));
}
