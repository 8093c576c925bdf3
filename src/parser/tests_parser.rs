#![cfg(test)]

use crate::descriptions::{DescKind, Namespace};
use crate::expr::{ConstValue, EvalEnv, ExprNode};
use crate::options::Options;
use crate::types::{AttrValue, TypeDesc};
use crate::Run;

fn parse(header: &str) -> Run {
    let mut run = Run::new(Options::default());
    run.parse_text(header, "test.h");
    run
}

#[test]
fn bitfield_struct_members() {
    let run = parse(
        "struct foo { int a; char b; int c: 0b10; int d : 0xf; int : 17; };\n",
    );
    let record = run.registry.record("foo").expect("struct foo");
    assert_eq!(record.members.len(), 5);

    let names: Vec<Option<&str>> = record.members.iter().map(|m| m.name.as_deref()).collect();
    assert_eq!(names, vec![Some("a"), Some("b"), Some("c"), Some("d"), None]);

    let env = EvalEnv::new();
    let widths: Vec<Option<i64>> = record
        .members
        .iter()
        .map(|m| match &m.ty {
            TypeDesc::Bitfield { width, .. } => match width.evaluate(&env).unwrap() {
                Some(ConstValue::Int(v, _)) => Some(v),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(widths, vec![None, None, Some(2), Some(15), Some(17)]);

    // The two trailing bitfields are distinct members despite both lacking
    // an external name.
    assert_ne!(record.members[3].ty, record.members[4].ty);
}

#[test]
fn packed_attribute_forces_pack_one() {
    let run = parse(
        "#pragma pack(push, 8)\nstruct __attribute__((packed)) p { int a; char b; };\n#pragma pack(pop)\n",
    );
    let record = run.registry.record("p").unwrap();
    assert_eq!(record.pack, Some(1));
    assert_eq!(record.attrib.get("packed"), Some(&AttrValue::Flag(true)));
}

#[test]
fn packed_with_aligned_keeps_separate_floor() {
    let run = parse("struct __attribute__((packed, aligned(8))) q { char c; };\n");
    let record = run.registry.record("q").unwrap();
    assert_eq!(record.pack, Some(1));
    let env = EvalEnv::new();
    let aligned = record.aligned.as_ref().unwrap().evaluate(&env).unwrap();
    assert_eq!(aligned, Some(ConstValue::int(8)));
}

#[test]
fn pragma_pack_stack_with_named_frames() {
    let run = parse(concat!(
        "#pragma pack(push, 4)\n",
        "typedef struct { int a; char b; } pragma_packed_foo_t;\n",
        "#pragma pack(pop)\n",
        "#pragma pack(push, thing1, 2)\n",
        "#pragma pack(push, thing2, 4)\n",
        "#pragma pack(pop)\n",
        "#pragma pack(push, thing3, 8)\n",
        "#pragma pack(push, thing4, 16)\n",
        "#pragma pack(pop, thing3)\n",
        "struct pragma_packed_foo2 { int a; char b; };\n",
        "#pragma pack(pop, thing1)\n",
        "struct foo3 { int a; char b; };\n",
    ));

    assert_eq!(run.registry.record("anon_1").unwrap().pack, Some(4));
    assert_eq!(run.registry.record("pragma_packed_foo2").unwrap().pack, Some(2));
    assert_eq!(run.registry.record("foo3").unwrap().pack, None);
}

#[test]
fn member_name_shadows_typedef() {
    let run = parse("typedef int Int;\ntypedef struct { int Int; } id_struct_t;\n");
    let record = run.registry.record("anon_1").unwrap();
    assert_eq!(record.members.len(), 1);
    assert_eq!(record.members[0].name.as_deref(), Some("Int"));
    assert_eq!(record.members[0].ty, TypeDesc::simple("int", true, 0));
}

#[test]
fn typedef_aliases_share_one_record() {
    let run = parse("typedef struct { int a; char b; } BAR0, *PBAR0;\n");

    let bar0 = run.registry.lookup(Namespace::Ident, "BAR0").unwrap();
    let pbar0 = run.registry.lookup(Namespace::Ident, "PBAR0").unwrap();
    let DescKind::Typedef { ty: bar_ty } = &run.registry.get(bar0).kind else {
        panic!("BAR0 is not a typedef");
    };
    let DescKind::Typedef { ty: pbar_ty } = &run.registry.get(pbar0).kind else {
        panic!("PBAR0 is not a typedef");
    };

    let TypeDesc::Record { tag: bar_tag, .. } = bar_ty else {
        panic!("BAR0 target is not a record");
    };
    let TypeDesc::Pointer { destination, .. } = pbar_ty else {
        panic!("PBAR0 is not a pointer typedef");
    };
    let TypeDesc::Record { tag: pbar_tag, .. } = destination.as_ref() else {
        panic!("PBAR0 does not point at a record");
    };

    // Both names resolve through the identical body in the tag namespace.
    assert_eq!(bar_tag, pbar_tag);
    let a = run.registry.record(bar_tag).unwrap() as *const _;
    let b = run.registry.record(pbar_tag).unwrap() as *const _;
    assert_eq!(a, b);
}

#[test]
fn anonymous_tags_count_up_from_one() {
    let run = parse(concat!(
        "typedef struct { int a; } first_t;\n",
        "typedef struct { int b; } second_t;\n",
        "typedef enum { X } third_t;\n",
    ));
    assert!(run.registry.record("anon_1").is_some());
    assert!(run.registry.record("anon_2").is_some());
    assert!(run.registry.enum_desc("anon_3").is_some());
}

#[test]
fn enum_values_stay_symbolic() {
    let run = parse("typedef enum { TEST_1 = 0, TEST_2 } test_status_t;\n");
    let desc = run.registry.enum_desc("anon_1").unwrap();
    assert_eq!(desc.enumerators.len(), 2);

    assert_eq!(desc.enumerators[0].1.render(), "0");
    // Implicit enumerators reference their predecessor, not a folded value.
    assert_eq!(desc.enumerators[1].1.render(), "(TEST_1 + 1)");

    // Each enumerator also produced a standalone constant.
    assert!(run.registry.lookup(Namespace::Ident, "TEST_1").is_some());
    assert!(run.registry.lookup(Namespace::Ident, "TEST_2").is_some());
}

#[test]
fn function_prototypes_and_calling_convention() {
    let run = parse(concat!(
        "int bar2(int a);\n",
        "void __stdcall__ foo2(void);\n",
        "int variadic(const char *fmt, ...);\n",
    ));

    let bar2 = run.registry.lookup(Namespace::Ident, "bar2").unwrap();
    let DescKind::Function { ty, attrib } = &run.registry.get(bar2).kind else {
        panic!("bar2 is not a function");
    };
    assert!(attrib.is_empty());
    let TypeDesc::Function { ret, args, variadic } = ty else {
        panic!("bar2 has no function type");
    };
    assert_eq!(**ret, TypeDesc::simple("int", true, 0));
    assert!(!*variadic);
    assert_eq!(args.len(), 1);
    assert_eq!(args[0].name.as_deref(), Some("a"));

    let foo2 = run.registry.lookup(Namespace::Ident, "foo2").unwrap();
    let DescKind::Function { attrib, ty } = &run.registry.get(foo2).kind else {
        panic!("foo2 is not a function");
    };
    assert_eq!(attrib.get("stdcall"), Some(&AttrValue::Flag(true)));
    let TypeDesc::Function { args, .. } = ty else {
        panic!();
    };
    assert!(args.is_empty());

    let va = run.registry.lookup(Namespace::Ident, "variadic").unwrap();
    let DescKind::Function { ty, .. } = &run.registry.get(va).kind else {
        panic!();
    };
    let TypeDesc::Function { variadic, .. } = ty else {
        panic!();
    };
    assert!(*variadic);
}

#[test]
fn self_referential_struct_through_pointer() {
    let run = parse("struct node { int value; struct node *next; };\n");
    let record = run.registry.record("node").unwrap();
    assert_eq!(record.members.len(), 2);
    let TypeDesc::Pointer { destination, .. } = &record.members[1].ty else {
        panic!("next is not a pointer");
    };
    assert_eq!(
        destination.as_ref(),
        &TypeDesc::Record {
            tag: "node".to_string(),
            is_union: false
        }
    );
}

#[test]
fn forward_declared_struct_is_opaque_until_defined() {
    let run = parse("struct later;\nstruct later *make_one(void);\nstruct later { int x; };\n");
    let record = run.registry.record("later").unwrap();
    assert!(!record.opaque);
    assert_eq!(record.members.len(), 1);
    // Only one description exists for the tag.
    assert!(run.registry.lookup(Namespace::Tag, "later").is_some());
}

#[test]
fn function_pointer_declarator() {
    let run = parse("typedef int (*callback_t)(void *context, int code);\n");
    let id = run.registry.lookup(Namespace::Ident, "callback_t").unwrap();
    let DescKind::Typedef { ty } = &run.registry.get(id).kind else {
        panic!();
    };
    let TypeDesc::Pointer { destination, .. } = ty else {
        panic!("callback_t is not a pointer");
    };
    let TypeDesc::Function { ret, args, variadic } = destination.as_ref() else {
        panic!("callback_t does not point at a function");
    };
    assert_eq!(**ret, TypeDesc::simple("int", true, 0));
    assert!(!*variadic);
    assert_eq!(args.len(), 2);
    assert_eq!(args[0].name.as_deref(), Some("context"));
}

#[test]
fn array_of_pointers_declarator() {
    let run = parse("extern char *names[16];\n");
    let id = run.registry.lookup(Namespace::Ident, "names").unwrap();
    let DescKind::Variable { ty } = &run.registry.get(id).kind else {
        panic!();
    };
    let TypeDesc::Array { element, count } = ty else {
        panic!("names is not an array");
    };
    assert!(matches!(element.as_ref(), TypeDesc::Pointer { .. }));
    let env = EvalEnv::new();
    assert_eq!(
        count.as_ref().unwrap().evaluate(&env).unwrap(),
        Some(ConstValue::int(16))
    );
}

#[test]
fn unparsable_declaration_recovers_locally() {
    let run = parse(concat!(
        "int ok_before(void);\n",
        "int $$$ broken stuff;\n",
        "int ok_after(void);\n",
    ));
    assert!(run.registry.lookup(Namespace::Ident, "ok_before").is_some());
    assert!(run.registry.lookup(Namespace::Ident, "ok_after").is_some());
    assert!(run.diagnostics.has_errors());
}

#[test]
fn seeded_extension_types_resolve() {
    let run = parse("size_t strlen_like(const char *s);\n");
    let id = run.registry.lookup(Namespace::Ident, "strlen_like").unwrap();
    let DescKind::Function { ty, .. } = &run.registry.get(id).kind else {
        panic!();
    };
    let TypeDesc::Function { ret, .. } = ty else {
        panic!();
    };
    assert_eq!(**ret, TypeDesc::Special("c_size_t".to_string()));

    let mut options = Options::default();
    options.no_stddef_types = true;
    let mut bare = Run::new(options);
    bare.parse_text("size_t strlen_like(const char *s);\n", "test.h");
    // Without the seeded typedef the declaration cannot be parsed.
    assert!(bare.registry.lookup(Namespace::Ident, "strlen_like").is_none());
    assert!(bare.diagnostics.has_errors());
}

#[test]
fn nested_anonymous_member_struct() {
    let run = parse("struct outer { struct { int x; } inner; int y; };\n");
    let outer = run.registry.record("outer").unwrap();
    assert_eq!(outer.members.len(), 2);
    assert_eq!(outer.members[0].name.as_deref(), Some("inner"));
    assert_eq!(
        outer.members[0].ty,
        TypeDesc::Record {
            tag: "anon_1".to_string(),
            is_union: false
        }
    );
    let inner = run.registry.record("anon_1").unwrap();
    assert!(inner.anonymous);
    assert_eq!(inner.members.len(), 1);
}

#[test]
fn macro_function_bodies_parse_as_expressions() {
    let mut run = parse(concat!(
        "#define A 1\n",
        "#define B(x,y) x+y\n",
        "#define C(a,b,c) a?b:c\n",
        "#define minus_macro(x,y) x-y\n",
        "#define subcall_macro_minus(x,y) minus_macro(x,y)\n",
    ));
    run.process().unwrap();

    let a = run.registry.lookup(Namespace::Ident, "A").unwrap();
    let DescKind::MacroConst { body } = &run.registry.get(a).kind else {
        panic!("A is not an object-like macro");
    };
    assert_eq!(body.render(), "1");

    let b = run.registry.lookup(Namespace::Ident, "B").unwrap();
    let DescKind::MacroFunction { def } = &run.registry.get(b).kind else {
        panic!("B is not a function-like macro");
    };
    assert_eq!(def.params, vec!["x", "y"]);
    assert_eq!(def.body.render(), "(x + y)");

    // A nested macro call is preserved by name, not inlined at definition.
    let sub = run.registry.lookup(Namespace::Ident, "subcall_macro_minus").unwrap();
    let DescKind::MacroFunction { def } = &run.registry.get(sub).kind else {
        panic!();
    };
    assert_eq!(def.body.render(), "minus_macro(x, y)");
    assert!(matches!(&def.body, ExprNode::Call { callee, .. } if callee == "minus_macro"));
}

#[test]
fn macro_ternary_keeps_branch_values() {
    let mut run = parse("#define C(a,b,c) a?b:c\n");
    run.process().unwrap();
    let env = run.eval_env();

    let call = |cond: i64, yes: i64, no: i64| ExprNode::Call {
        callee: "C".to_string(),
        args: vec![
            ExprNode::Constant {
                value: ConstValue::int(cond),
                is_literal: false,
            },
            ExprNode::Constant {
                value: ConstValue::int(yes),
                is_literal: false,
            },
            ExprNode::Constant {
                value: ConstValue::int(no),
                is_literal: false,
            },
        ],
    };
    assert_eq!(call(1, 99, 100).evaluate(&env).unwrap(), Some(ConstValue::int(99)));
    assert_eq!(call(0, 99, 100).evaluate(&env).unwrap(), Some(ConstValue::int(100)));
}

#[test]
fn unparsable_macro_becomes_diagnostic_stub() {
    let mut run = parse("#define BROKEN do { } while(0)\n#define FINE 3\n");
    run.process().unwrap();

    let broken = run.registry.lookup(Namespace::Ident, "BROKEN").unwrap();
    let desc = run.registry.get(broken);
    assert!(!desc.errors.is_empty());
    assert!(!desc.included);

    let fine = run.registry.lookup(Namespace::Ident, "FINE").unwrap();
    assert!(run.registry.get(fine).included);
}

#[test]
fn macro_redefinition_last_wins_with_warning() {
    let mut run = parse("#define A 1\n#define A 2\n");
    run.process().unwrap();
    let a = run.registry.lookup(Namespace::Ident, "A").unwrap();
    let DescKind::MacroConst { body } = &run.registry.get(a).kind else {
        panic!();
    };
    assert_eq!(body.render(), "2");
    assert!(run
        .diagnostics
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("redefined")));
}
