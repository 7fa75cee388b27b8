use super::helpers::*;
use crate::language::{
    ast::{
        BinOp, Decl, Expr, GlobalDecl, GlobalKind, LExpr, LocalDeclItem, LocalDeclKind, Pattern,
        Stmt, TypeDecl, Version,
    },
    bitvector::Mask,
    types::{ArrayLength, IntConstraint, IntConstraints, Ty},
};
use crate::runtime::{error::EvalError, value::NativeValue};

fn mask(text: &str) -> Mask {
    Mask::parse(text).expect("mask literal")
}

#[test]
fn mask_patterns_follow_dont_care_bits() {
    for (value, expected) in [("100", 1), ("110", 1), ("101", 0)] {
        let body = ret(cond_expr(
            in_pattern(bits(value), Pattern::Mask(mask("1x0"), sp())),
            int(1),
            int(0),
        ));
        assert_eq!(
            run_main(body).expect("run"),
            NativeValue::Int(expected),
            "value {value}"
        );
    }
}

#[test]
fn pattern_alternatives_and_negation() {
    let any = Pattern::Any(vec![Pattern::Single(int(1)), Pattern::Single(int(3))], sp());
    let body = ret(cond_expr(in_pattern(int(3), any), int(1), int(0)));
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(1));

    let not = Pattern::Not(Box::new(Pattern::Leq(int(2))), sp());
    let body = ret(cond_expr(in_pattern(int(3), not), int(1), int(0)));
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(1));
}

#[test]
fn tuple_patterns_match_elementwise() {
    let pattern = Pattern::Tuple(
        vec![Pattern::Single(int(1)), Pattern::Range(int(5), int(9), sp())],
        sp(),
    );
    let tuple = Expr::Tuple(vec![int(1), int(7)], sp());
    let body = ret(cond_expr(in_pattern(tuple, pattern), int(1), int(0)));
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(1));
}

#[test]
fn base_value_picks_minimal_absolute_inhabitant() {
    let cases: Vec<(Vec<IntConstraint>, i128)> = vec![
        (
            vec![
                IntConstraint::Range(int(2), int(5)),
                IntConstraint::Range(int(-3), int(-1)),
            ],
            -1,
        ),
        (vec![IntConstraint::Range(int(-3), int(5))], 0),
        (vec![IntConstraint::Range(int(5), int(10))], 5),
    ];
    for (constraints, expected) in cases {
        let ty = Ty::Int(IntConstraints::WellConstrained(constraints));
        let body = seq(vec![decl_typed("x", ty), ret(var("x"))]);
        assert_eq!(run_main(body).expect("run"), NativeValue::Int(expected));
    }
}

#[test]
fn base_value_of_empty_range_is_fatal() {
    let ty = Ty::Int(IntConstraints::WellConstrained(vec![IntConstraint::Range(
        int(5),
        int(2),
    )]));
    let body = seq(vec![decl_typed("x", ty), ret(var("x"))]);
    let err = run_main(body).expect_err("no inhabitant");
    assert!(matches!(err, EvalError::BaseValueEmptyType { .. }), "{err:?}");
}

#[test]
fn base_value_of_bits_is_all_zeros() {
    let body = seq(vec![
        decl_typed("b", Ty::Bits(Box::new(int(8)))),
        ret(call("UInt", vec![var("b")])),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(0));
}

#[test]
fn unknown_takes_the_base_value_on_the_native_backend() {
    let body = seq(vec![
        decl_var("x", Expr::Unknown(Box::new(Ty::integer()), sp())),
        ret(var("x")),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(0));
}

#[test]
fn type_assertion_passes_and_fails() {
    let constrained = |lo, hi| {
        Ty::Int(IntConstraints::WellConstrained(vec![IntConstraint::Range(
            int(lo),
            int(hi),
        )]))
    };
    let ok = ret(Expr::AsType {
        expr: Box::new(int(7)),
        ty: Box::new(constrained(0, 10)),
        span: sp(),
    });
    assert_eq!(run_main(ok).expect("run"), NativeValue::Int(7));

    let bad = ret(Expr::AsType {
        expr: Box::new(int(7)),
        ty: Box::new(constrained(0, 5)),
        span: sp(),
    });
    let err = run_main(bad).expect_err("outside the constraint");
    assert!(matches!(err, EvalError::MismatchType { .. }), "{err:?}");
}

#[test]
fn array_elements_update_in_place() {
    let array_ty = Ty::Array(
        ArrayLength::Expr(Box::new(int(3))),
        Box::new(Ty::integer()),
    );
    let set = assign_to(
        LExpr::SetArray {
            base: Box::new(LExpr::Var("arr".into(), sp())),
            index: Box::new(int(1)),
            span: sp(),
        },
        int(5),
    );
    let read = |i| Expr::GetArray {
        base: Box::new(var("arr")),
        index: Box::new(int(i)),
        span: sp(),
    };
    let body = seq(vec![
        decl_typed("arr", array_ty),
        set,
        ret(add(read(1), read(0))),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(5));
}

#[test]
fn record_fields_read_and_write() {
    let point = Decl::Type(TypeDecl {
        name: "Point".into(),
        ty: Ty::Record(vec![("x".into(), Ty::integer()), ("y".into(), Ty::integer())]),
        supertype: None,
        span: sp(),
    });
    let set_x = assign_to(
        LExpr::SetField {
            base: Box::new(LExpr::Var("p".into(), sp())),
            field: "x".into(),
            span: sp(),
        },
        int(5),
    );
    let body = seq(vec![
        decl_var("p", record("Point", vec![("x", int(1)), ("y", int(2))])),
        set_x,
        ret(add(get_field(var("p"), "x"), get_field(var("p"), "y"))),
    ]);
    let program = program(vec![point, func("main", body)]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(7));
}

#[test]
fn tuple_declarations_destructure() {
    let item = LocalDeclItem::Tuple(vec![
        LocalDeclItem::Var("a".into()),
        LocalDeclItem::Var("b".into()),
    ]);
    let body = seq(vec![
        Stmt::Decl {
            kind: LocalDeclKind::Var,
            item,
            initializer: Some(Expr::Tuple(vec![int(1), int(2)], sp())),
            span: sp(),
        },
        ret(add(var("a"), var("b"))),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(3));
}

#[test]
fn bitvector_concat_expression() {
    let body = ret(call(
        "UInt",
        vec![Expr::Concat(vec![bits("11"), bits("00")], sp())],
    ));
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(12));
}

#[test]
fn concat_destination_splits_right_to_left() {
    let lhs = LExpr::Concat {
        parts: vec![
            LExpr::Var("a".into(), sp()),
            LExpr::Var("b".into(), sp()),
        ],
        widths: Some(vec![2, 2]),
        span: sp(),
    };
    let body = seq(vec![
        decl_var("a", bits("00")),
        decl_var("b", bits("00")),
        assign_to(lhs, bits("1101")),
        ret(add(
            binop(BinOp::Mul, call("UInt", vec![var("a")]), int(10)),
            call("UInt", vec![var("b")]),
        )),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(31));
}

#[test]
fn concat_destination_without_widths_is_fatal() {
    let lhs = LExpr::Concat {
        parts: vec![LExpr::Var("a".into(), sp())],
        widths: None,
        span: sp(),
    };
    let body = seq(vec![decl_var("a", bits("00")), assign_to(lhs, bits("11")), ret(int(0))]);
    let err = run_main(body).expect_err("widths are required");
    assert!(matches!(err, EvalError::TypeInferenceNeeded { .. }), "{err:?}");
}

#[test]
fn record_bitfields_split_and_concatenate() {
    let reg = Decl::Type(TypeDecl {
        name: "Reg".into(),
        ty: Ty::Record(vec![
            ("hi".into(), Ty::Bits(Box::new(int(4)))),
            ("lo".into(), Ty::Bits(Box::new(int(4)))),
        ]),
        supertype: None,
        span: sp(),
    });
    // The checker locates `hi` in bits 7:4 of the source and `lo` in 3:0.
    let set = assign_to(
        LExpr::SetFields {
            base: Box::new(LExpr::Var("r".into(), sp())),
            fields: vec!["hi".into(), "lo".into()],
            slices: vec![(4, 4), (0, 4)],
            span: sp(),
        },
        bits("10010110"),
    );
    let read = Expr::GetFields {
        base: Box::new(var("r")),
        fields: vec!["hi".into(), "lo".into()],
        span: sp(),
    };
    let body = seq(vec![
        decl_var(
            "r",
            record("Reg", vec![("hi", bits("0000")), ("lo", bits("0000"))]),
        ),
        set,
        ret(call("UInt", vec![read])),
    ]);
    let program = program(vec![reg, func("main", body)]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(150));
}

#[test]
fn named_parameters_bind_in_declaration_order() {
    let double = func_full(
        "double",
        Version::V1,
        vec!["F"],
        Vec::new(),
        Some(Ty::integer()),
        ret(binop(BinOp::Mul, var("F"), int(2))),
    );
    let main_body = ret(Expr::Call {
        name: "double".into(),
        args: Vec::new(),
        named_args: vec![("F".into(), int(21))],
        span: sp(),
    });
    let program = program(vec![double, func("main", main_body)]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(42));
}

#[test]
fn positional_arguments_bind_by_declaration() {
    let sub = func_full(
        "sub",
        Version::V1,
        Vec::new(),
        vec![("a", Ty::integer()), ("b", Ty::integer())],
        Some(Ty::integer()),
        ret(binop(BinOp::Sub, var("a"), var("b"))),
    );
    let program = program(vec![
        sub,
        func("main", ret(call("sub", vec![int(10), int(4)]))),
    ]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(6));
}

#[test]
fn call_arity_is_checked() {
    let sub = func_full(
        "sub",
        Version::V1,
        Vec::new(),
        vec![("a", Ty::integer())],
        Some(Ty::integer()),
        ret(var("a")),
    );
    let program = program(vec![
        sub,
        func("main", ret(call("sub", vec![int(1), int(2)]))),
    ]);
    let err = run_program(&program).expect_err("too many arguments");
    assert!(matches!(err, EvalError::BadArity { .. }), "{err:?}");
}

#[test]
fn v0_assignment_declares_on_first_use() {
    let body = seq(vec![assign("x", int(5)), ret(var("x"))]);
    let v0 = program(vec![func_full(
        "main",
        Version::V0,
        Vec::new(),
        Vec::new(),
        Some(Ty::integer()),
        body.clone(),
    )]);
    assert_eq!(run_program(&v0).expect("run"), NativeValue::Int(5));

    let v1 = program(vec![func("main", body)]);
    let err = run_program(&v1).expect_err("V1 rejects unbound assignment");
    assert!(matches!(err, EvalError::UndefinedIdentifier { .. }), "{err:?}");
}

#[test]
fn global_initialisers_run_in_dependency_order() {
    let program = program(vec![
        global_var("a", add(var("b"), int(1))),
        global_var("b", int(2)),
        func("main", ret(var("a"))),
    ]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(3));
}

#[test]
fn seeded_globals_override_their_initialisers() {
    use crate::runtime::{native::NativeBackend, Config, Interpreter};
    let program = program(vec![
        global_var("g", int(0)),
        func("main", ret(var("g"))),
    ]);
    let mut interpreter = Interpreter::new(NativeBackend::new(), Config::default());
    let result = interpreter
        .run(&program, vec![("g".into(), NativeValue::Int(9))])
        .expect("run");
    assert_eq!(result, NativeValue::Int(9));
}

#[test]
fn globals_without_initialisers_take_base_values() {
    let decl = Decl::GlobalStorage(GlobalDecl {
        kind: GlobalKind::Var,
        name: "g".into(),
        ty: Some(Ty::integer()),
        initializer: None,
        span: sp(),
    });
    let program = program(vec![decl, func("main", ret(var("g")))]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(0));
}

#[test]
fn throwing_inside_a_side_effect_free_position_is_fatal() {
    let boom = func(
        "boom",
        seq(vec![throw("E", Vec::new()), ret(int(0))]),
    );
    let body = ret(in_pattern(
        int(1),
        Pattern::Single(call("boom", Vec::new())),
    ));
    let program = program(vec![exception_type("E", Vec::new()), boom, func("main", body)]);
    let err = run_program(&program).expect_err("throw under a pattern guard");
    assert!(
        matches!(err, EvalError::UnexpectedSideEffect { .. }),
        "{err:?}"
    );
}

#[test]
fn multi_result_calls_in_expressions_build_a_vector() {
    let pair = func_returning(
        "pair",
        Ty::Tuple(vec![Ty::integer(), Ty::integer()]),
        ret(Expr::Tuple(vec![int(4), int(5)], sp())),
    );
    let projected = Expr::GetItem {
        base: Box::new(call("pair", Vec::new())),
        index: 1,
        span: sp(),
    };
    let program = program(vec![pair, func("main", ret(projected))]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(5));
}
