use crate::language::{
    ast::{FuncDecl, Identifier},
    static_env::StaticEnv,
};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Where an identifier lives. Two local scopes are equal only when both
/// the subprogram and the call instance match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Global { init: bool },
    Local { name: Identifier, instance: usize },
}

#[derive(Clone, Debug)]
pub enum Lookup<V> {
    Local(V),
    Global(V),
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignTarget {
    Local,
    Global,
    NotFound,
}

/// Bindings of one subprogram invocation (or of the global-initialiser
/// context), plus the unroll budgets of the loops currently entered.
#[derive(Clone, Debug)]
pub struct LocalEnv<V> {
    bindings: HashMap<Identifier, V>,
    pub scope: Scope,
    unroll: Vec<usize>,
}

impl<V: Clone> LocalEnv<V> {
    pub fn new(scope: Scope) -> Self {
        Self {
            bindings: HashMap::new(),
            scope,
            unroll: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// The type checker guarantees declarations are fresh; a duplicate is
    /// an interpreter bug, not a program error.
    pub fn declare(&mut self, name: Identifier, value: V) {
        if self.bindings.insert(name.clone(), value).is_some() {
            panic!("local `{name}` declared twice in one scope");
        }
    }

    pub fn assign(&mut self, name: &str, value: V) -> bool {
        match self.bindings.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.bindings.remove(name);
    }

    /// Close a block: bindings introduced inside it (absent from `outer`)
    /// die, while updates to survivors are kept.
    pub fn pop_scope(outer: &Self, mut inner: Self) -> Self {
        inner
            .bindings
            .retain(|name, _| outer.bindings.contains_key(name));
        inner
    }

    pub fn tick_push(&mut self, budget: usize) {
        self.unroll.push(budget);
    }

    /// Seed a fresh budget on top of whatever the enclosing loops hold.
    pub fn tick_push_bis(&mut self, budget: usize) {
        self.unroll.push(budget);
    }

    /// Consume one iteration from the innermost budget; reports exhaustion.
    pub fn tick_decr(&mut self) -> bool {
        let top = self
            .unroll
            .last_mut()
            .unwrap_or_else(|| panic!("unroll budget consulted outside a loop"));
        if *top == 0 {
            true
        } else {
            *top -= 1;
            false
        }
    }

    pub fn tick_pop(&mut self) {
        if self.unroll.pop().is_none() {
            panic!("unroll budget popped outside a loop");
        }
    }

    pub fn same_scope(&self, other: &Self) -> bool {
        self.scope == other.scope
    }
}

/// One function-table entry. The counter provides the unique instance for
/// every call's local scope; entries are shared, so increments stay
/// visible across environment copies.
#[derive(Debug)]
pub struct FuncEntry {
    pub counter: Cell<usize>,
    pub decl: Rc<FuncDecl>,
}

impl FuncEntry {
    pub fn new(decl: FuncDecl) -> Self {
        Self {
            counter: Cell::new(0),
            decl: Rc::new(decl),
        }
    }

    pub fn next_instance(&self) -> usize {
        let instance = self.counter.get();
        self.counter.set(instance + 1);
        instance
    }
}

/// The shared global view: the checker's static environment, mutable
/// global storage, and the function table.
#[derive(Clone, Debug)]
pub struct GlobalEnv<V> {
    pub static_env: Rc<StaticEnv>,
    pub storage: HashMap<Identifier, V>,
    pub funcs: Rc<BTreeMap<Identifier, FuncEntry>>,
}

impl<V: Clone> GlobalEnv<V> {
    pub fn new(static_env: StaticEnv, funcs: BTreeMap<Identifier, FuncEntry>) -> Self {
        Self {
            static_env: Rc::new(static_env),
            storage: HashMap::new(),
            funcs: Rc::new(funcs),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Env<V> {
    pub local: LocalEnv<V>,
    pub global: GlobalEnv<V>,
}

impl<V: Clone> Env<V> {
    pub fn new(local: LocalEnv<V>, global: GlobalEnv<V>) -> Self {
        Self { local, global }
    }

    /// Local lookup takes precedence over global storage.
    pub fn find(&self, name: &str) -> Lookup<V> {
        if let Some(v) = self.local.get(name) {
            return Lookup::Local(v.clone());
        }
        match self.global.storage.get(name) {
            Some(v) => Lookup::Global(v.clone()),
            None => Lookup::NotFound,
        }
    }

    /// Update the first scope holding the name, local first.
    pub fn assign(&mut self, name: &str, value: V) -> AssignTarget {
        if self.local.assign(name, value.clone()) {
            return AssignTarget::Local;
        }
        match self.global.storage.get_mut(name) {
            Some(slot) => {
                *slot = value;
                AssignTarget::Global
            }
            None => AssignTarget::NotFound,
        }
    }

    pub fn declare_global(&mut self, name: Identifier, value: V) {
        self.global.storage.insert(name, value);
    }

    pub fn mem(&self, name: &str) -> bool {
        self.local.contains(name) || self.global.storage.contains_key(name)
    }

    /// Scope tag to report for accesses to global storage from this
    /// evaluation context.
    pub fn global_scope(&self) -> Scope {
        Scope::Global {
            init: matches!(self.local.scope, Scope::Global { init: true }),
        }
    }
}
