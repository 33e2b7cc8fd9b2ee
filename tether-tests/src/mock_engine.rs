use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tether_core::{DbHandle, Engine, Error, OpenFlags, Result, ResultCode, StmtHandle, Value};

/// Native call observed by [`MockEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(String, OpenFlags),
    Close(DbHandle),
    Prepare(DbHandle, String),
    Finalize(StmtHandle),
    Reset(StmtHandle),
    ClearBindings(StmtHandle),
    Exec(DbHandle, String),
    Step(StmtHandle),
    Bind(StmtHandle, usize, Value),
}

/// Primitive that can be forced to fail with [`MockEngine::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Open,
    Close,
    Prepare,
    Finalize,
    Reset,
    ClearBindings,
    Exec,
    Step,
    Bind,
    ErrorMessage,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    next_handle: usize,
    databases: HashSet<DbHandle>,
    statements: HashMap<StmtHandle, MockStatement>,
    failures: HashMap<Primitive, ResultCode>,
    missing_handles: HashSet<Primitive>,
}

#[derive(Debug)]
struct MockStatement {
    db: DbHandle,
    steps: usize,
    bindings: HashMap<usize, Value>,
}

/// Engine keeping track of every call and of the live handles, without any real database.
///
/// Clones share the same state, so a test can keep one while the connection owns the other.
/// Each statement yields a single row, whose first column is the first bound value (or the
/// number of steps when nothing is bound), then it is done until reset.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    hooks: Arc<Mutex<Hooks>>,
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Hooks(HashMap<Primitive, Hook>);

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Default::default()
    }

    /// Make every following call to `primitive` return `code`.
    pub fn fail(&self, primitive: Primitive, code: ResultCode) {
        self.state().failures.insert(primitive, code);
    }

    /// Make `open` or `prepare` report success without returning any handle.
    pub fn omit_handle(&self, primitive: Primitive) {
        self.state().missing_handles.insert(primitive);
    }

    /// Run `hook` every time `primitive` is called, after the engine is done with it.
    ///
    /// Supported for `Prepare`, `Reset` and `ClearBindings`.
    pub fn on(&self, primitive: Primitive, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .insert(primitive, Arc::new(hook));
    }

    pub fn heal(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.missing_handles.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|v| predicate(v)).count()
    }

    pub fn prepare_count(&self) -> usize {
        self.count(|v| matches!(v, Call::Prepare(..)))
    }

    pub fn finalize_count(&self, stmt: StmtHandle) -> usize {
        self.count(|v| *v == Call::Finalize(stmt))
    }

    pub fn close_count(&self) -> usize {
        self.count(|v| matches!(v, Call::Close(..)))
    }

    pub fn live_databases(&self) -> usize {
        self.state().databases.len()
    }

    pub fn live_statements(&self) -> usize {
        self.state().statements.len()
    }

    pub fn is_live(&self, stmt: StmtHandle) -> bool {
        self.state().statements.contains_key(&stmt)
    }

    fn prepare_native(&self, db: DbHandle, sql: &str) -> (Option<StmtHandle>, ResultCode) {
        let mut state = self.state();
        let rc = state.record(Call::Prepare(db, sql.into()), Primitive::Prepare);
        if !rc.is_ok() || state.missing_handles.contains(&Primitive::Prepare) {
            return (None, rc);
        }
        if !state.databases.contains(&db) {
            return (None, ResultCode::MISUSE);
        }
        let handle = StmtHandle::new(state.mint());
        if let Some(handle) = handle {
            state.statements.insert(
                handle,
                MockStatement {
                    db,
                    steps: 0,
                    bindings: HashMap::new(),
                },
            );
        }
        (handle, rc)
    }

    fn run_hook(&self, primitive: Primitive) {
        let hook = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .get(&primitive)
            .cloned();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockState {
    fn record(&mut self, call: Call, primitive: Primitive) -> ResultCode {
        self.calls.push(call);
        self.failures
            .get(&primitive)
            .copied()
            .unwrap_or(ResultCode::OK)
    }

    fn mint(&mut self) -> usize {
        self.next_handle += 1;
        self.next_handle * 8
    }
}

impl Engine for MockEngine {
    fn open(&self, location: &str, flags: OpenFlags) -> (Option<DbHandle>, ResultCode) {
        let mut state = self.state();
        let rc = state.record(Call::Open(location.into(), flags), Primitive::Open);
        if state.missing_handles.contains(&Primitive::Open) {
            return (None, rc);
        }
        let handle = DbHandle::new(state.mint());
        if let Some(handle) = handle {
            state.databases.insert(handle);
        }
        (handle, rc)
    }

    fn close(&self, db: DbHandle) -> ResultCode {
        let mut state = self.state();
        let rc = state.record(Call::Close(db), Primitive::Close);
        if !rc.is_ok() {
            return rc;
        }
        if state.statements.values().any(|v| v.db == db) {
            return ResultCode::BUSY;
        }
        state.databases.remove(&db);
        rc
    }

    fn prepare(&self, db: DbHandle, sql: &str) -> (Option<StmtHandle>, ResultCode) {
        let result = self.prepare_native(db, sql);
        self.run_hook(Primitive::Prepare);
        result
    }

    fn finalize(&self, stmt: StmtHandle) -> ResultCode {
        let mut state = self.state();
        let rc = state.record(Call::Finalize(stmt), Primitive::Finalize);
        // The statement is released even when an error is reported
        if state.statements.remove(&stmt).is_none() {
            return ResultCode::MISUSE;
        }
        rc
    }

    fn reset(&self, stmt: StmtHandle) -> ResultCode {
        let rc = {
            let mut state = self.state();
            let rc = state.record(Call::Reset(stmt), Primitive::Reset);
            match state.statements.get_mut(&stmt) {
                Some(statement) if rc.is_ok() => {
                    statement.steps = 0;
                    rc
                }
                Some(..) => rc,
                None => ResultCode::MISUSE,
            }
        };
        self.run_hook(Primitive::Reset);
        rc
    }

    fn clear_bindings(&self, stmt: StmtHandle) -> ResultCode {
        let rc = {
            let mut state = self.state();
            let rc = state.record(Call::ClearBindings(stmt), Primitive::ClearBindings);
            match state.statements.get_mut(&stmt) {
                Some(statement) if rc.is_ok() => {
                    statement.bindings.clear();
                    rc
                }
                Some(..) => rc,
                None => ResultCode::MISUSE,
            }
        };
        self.run_hook(Primitive::ClearBindings);
        rc
    }

    fn exec(&self, db: DbHandle, sql: &str) -> (ResultCode, Option<String>) {
        let mut state = self.state();
        let rc = state.record(Call::Exec(db, sql.into()), Primitive::Exec);
        if !rc.is_ok() {
            return (rc, Some(format!("cannot execute `{}`", sql)));
        }
        (rc, None)
    }

    fn error_message(&self, _db: Option<DbHandle>) -> Result<String> {
        let state = self.state();
        match state.failures.get(&Primitive::ErrorMessage) {
            Some(..) => Err(Error::msg("error message unavailable")),
            None => Ok("mock engine error".into()),
        }
    }

    fn step(&self, stmt: StmtHandle) -> ResultCode {
        let mut state = self.state();
        let rc = state.record(Call::Step(stmt), Primitive::Step);
        if !rc.is_ok() {
            return rc;
        }
        match state.statements.get_mut(&stmt) {
            Some(statement) => {
                statement.steps += 1;
                if statement.steps == 1 {
                    ResultCode::ROW
                } else {
                    ResultCode::DONE
                }
            }
            None => ResultCode::MISUSE,
        }
    }

    fn bind(&self, stmt: StmtHandle, index: usize, value: &Value) -> ResultCode {
        let mut state = self.state();
        let rc = state.record(Call::Bind(stmt, index, value.clone()), Primitive::Bind);
        if rc.is_ok() {
            match state.statements.get_mut(&stmt) {
                Some(statement) => {
                    statement.bindings.insert(index, value.clone());
                }
                None => return ResultCode::MISUSE,
            }
        }
        rc
    }

    fn column_count(&self, stmt: StmtHandle) -> usize {
        if self.state().statements.contains_key(&stmt) {
            1
        } else {
            0
        }
    }

    fn column_value(&self, stmt: StmtHandle, index: usize) -> Result<Value> {
        let state = self.state();
        let statement = state
            .statements
            .get(&stmt)
            .ok_or_else(|| Error::msg(format!("Unknown statement {}", stmt)))?;
        if index != 0 {
            return Err(Error::msg(format!("Column {} out of range", index)));
        }
        Ok(statement
            .bindings
            .get(&1)
            .cloned()
            .unwrap_or(Value::Integer(statement.steps as i64)))
    }
}
