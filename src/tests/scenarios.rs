use super::helpers::*;
use crate::language::ast::{BinOp, Expr, LExpr, Slice, Stmt};
use crate::runtime::{error::EvalError, value::NativeValue};

#[test]
fn addition_returns_three() {
    let result = run_main(ret(add(int(1), int(2)))).expect("run");
    assert_eq!(result, NativeValue::Int(3));
}

#[test]
fn global_write_is_visible_on_return() {
    let program = program(vec![
        global_var("g", int(0)),
        func("main", seq(vec![assign("g", int(7)), ret(var("g"))])),
    ]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(7));
}

#[test]
fn caught_exception_reaches_its_catcher() {
    let body = seq(vec![
        try_stmt(
            throw("MyExc", Vec::new()),
            vec![catcher("MyExc", None, ret(int(42)))],
        ),
        ret(int(0)),
    ]);
    let program = program(vec![exception_type("MyExc", Vec::new()), func("main", body)]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(42));
}

#[test]
fn bit_slice_write_back() {
    let slice_lhs = LExpr::Slice {
        base: Box::new(LExpr::Var("s".into(), sp())),
        slices: vec![Slice::Range(int(3), int(0))],
        span: sp(),
    };
    let body = seq(vec![
        decl_var("s", bits("00000000")),
        assign_to(slice_lhs, bits("1111")),
        ret(call("UInt", vec![var("s")])),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(15));
}

#[test]
fn for_loop_sums_one_to_four() {
    let body = seq(vec![
        decl_var("r", int(0)),
        for_stmt("i", int(1), int(4), assign("r", add(var("r"), var("i")))),
        ret(var("r")),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(10));
}

#[test]
fn failed_assertion_is_fatal() {
    let body = seq(vec![
        Stmt::Assert(binop(BinOp::Eq, int(1), int(2)), sp()),
        ret(int(0)),
    ]);
    let err = run_main(body).expect_err("assertion must fail");
    assert!(matches!(err, EvalError::AssertionFailed { .. }), "{err:?}");
}

#[test]
fn while_loop_with_determined_condition() {
    let body = seq(vec![
        decl_var("r", int(0)),
        Stmt::While {
            cond: binop(BinOp::Lt, var("r"), int(4)),
            body: Box::new(assign("r", add(var("r"), int(1)))),
            span: sp(),
        },
        ret(var("r")),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(4));
}

#[test]
fn repeat_runs_body_then_tests() {
    let body = seq(vec![
        decl_var("r", int(0)),
        Stmt::Repeat {
            body: Box::new(assign("r", add(var("r"), int(1)))),
            cond: binop(BinOp::Ge, var("r"), int(3)),
            span: sp(),
        },
        ret(var("r")),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(3));
}

#[test]
fn case_takes_first_matching_arm() {
    use crate::language::ast::{CaseArm, Pattern};
    let arms = vec![
        CaseArm {
            pattern: Pattern::Single(int(1)),
            body: ret(int(10)),
            span: sp(),
        },
        CaseArm {
            pattern: Pattern::Range(int(2), int(5), sp()),
            body: ret(int(20)),
            span: sp(),
        },
    ];
    let body = seq(vec![
        Stmt::Case {
            discriminant: int(3),
            arms,
            otherwise: Some(Box::new(ret(int(30)))),
            span: sp(),
        },
        ret(int(0)),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(20));
}

#[test]
fn case_falls_through_to_otherwise() {
    use crate::language::ast::{CaseArm, Pattern};
    let arms = vec![CaseArm {
        pattern: Pattern::Single(int(1)),
        body: ret(int(10)),
        span: sp(),
    }];
    let body = seq(vec![
        Stmt::Case {
            discriminant: int(9),
            arms,
            otherwise: Some(Box::new(ret(int(30)))),
            span: sp(),
        },
        ret(int(0)),
    ]);
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(30));
}

#[test]
fn uncaught_exception_reports_type_and_value() {
    let program = program(vec![
        exception_type("MyExc", Vec::new()),
        func("main", seq(vec![throw("MyExc", Vec::new()), ret(int(0))])),
    ]);
    let err = run_program(&program).expect_err("must escape");
    match err {
        EvalError::UncaughtException { message } => {
            assert!(message.contains("MyExc"), "{message}");
        }
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}

#[test]
fn procedure_calls_discard_nothing() {
    let program = program(vec![
        global_var("n", int(0)),
        procedure("tick", assign("n", add(var("n"), int(1)))),
        func(
            "main",
            seq(vec![
                Stmt::Call {
                    name: "tick".into(),
                    args: Vec::new(),
                    named_args: Vec::new(),
                    span: sp(),
                },
                Stmt::Call {
                    name: "tick".into(),
                    args: Vec::new(),
                    named_args: Vec::new(),
                    span: sp(),
                },
                ret(var("n")),
            ]),
        ),
    ]);
    assert_eq!(run_program(&program).expect("run"), NativeValue::Int(2));
}

#[test]
fn conditional_expression_fast_path() {
    let body = ret(cond_expr(
        binop(BinOp::Lt, int(1), int(2)),
        int(5),
        int(9),
    ));
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(5));
}

#[test]
fn tuple_projection() {
    let tuple = Expr::Tuple(vec![int(10), int(20)], sp());
    let body = ret(Expr::GetItem {
        base: Box::new(tuple),
        index: 1,
        span: sp(),
    });
    assert_eq!(run_main(body).expect("run"), NativeValue::Int(20));
}
