use std::cell::RefCell;
use std::rc::Rc;

/// One token per evaluation rule, emitted every time the rule fires.
/// Conformance harnesses compare these sequences across runs or against
/// reference traces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SemanticsRule {
    Literal,
    VarLocal,
    VarGlobal,
    BinopAnd,
    BinopOr,
    BinopImpl,
    Binop,
    Unop,
    CondSimple,
    CondBranch,
    Slice,
    CallExpr,
    GetArray,
    GetItem,
    GetField,
    GetFields,
    RecordExpr,
    Concat,
    TupleExpr,
    Unknown,
    PatternIn,
    TypeAssertion,
    LeDiscard,
    LeVar,
    LeSlice,
    LeSetArray,
    LeSetField,
    LeSetFields,
    LeDestructuring,
    LeConcat,
    PatAll,
    PatAny,
    PatNot,
    PatSingle,
    PatGeq,
    PatLeq,
    PatRange,
    PatMask,
    PatTuple,
    Pass,
    Seq,
    Decl,
    Assign,
    AssignCall,
    CallStmt,
    ReturnNone,
    ReturnOne,
    ReturnTuple,
    CondStmt,
    CaseStmt,
    Assert,
    While,
    Repeat,
    For,
    Throw,
    Rethrow,
    Try,
    Catch,
    CatchNamed,
    CatchOtherwise,
    Print,
    Block,
    Call,
    PrimitiveCall,
}

/// Instrumentation sink. A no-op sink is valid.
pub trait RuleTracer {
    fn on_rule(&mut self, rule: SemanticsRule);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoTrace;

impl RuleTracer for NoTrace {
    fn on_rule(&mut self, _rule: SemanticsRule) {}
}

/// Accumulates the fired rules; clones share the same log, so a test can
/// keep a handle while the interpreter owns the sink.
#[derive(Clone, Debug, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<SemanticsRule>>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SemanticsRule> {
        self.events.borrow().clone()
    }
}

impl RuleTracer for RecordingTracer {
    fn on_rule(&mut self, rule: SemanticsRule) {
        self.events.borrow_mut().push(rule);
    }
}
