use crate::{
    CacheOffer, ConnectionOptions, DbHandle, Engine, MEMORY_LOCATION, OpenFlags, OpenMode, Result,
    ResultCode, SqliteError, Statement, StatementCache, StatementController, StatementRegistry,
    StmtHandle, best_effort, recoverable_error,
};
use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, ThreadId},
};

static CONNECTION_NUMBER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct ConnectionState {
    handle: Option<DbHandle>,
    disposed: bool,
    /// Owner thread, fixed by the first successful open.
    confinement: Option<ThreadId>,
    statements: StatementRegistry,
    cache: StatementCache,
}

impl ConnectionState {
    /// A disposal already dropped the bookkeeping of `stmt`.
    fn abandoned(&self, stmt: StmtHandle) -> bool {
        self.disposed && !self.statements.contains(stmt)
    }
}

/// A single connection to a database.
///
/// Most methods are confined to the thread that opened the connection and fail when called from
/// any other thread. Only [`Connection::is_open`], [`Connection::is_disposed`] and
/// [`Connection::dispose`] can be called from anywhere.
///
/// Statements borrow the connection, so they cannot outlive it. Dropping the connection disposes
/// it.
pub struct Connection<E: Engine> {
    engine: E,
    file: Option<PathBuf>,
    number: u64,
    state: Mutex<ConnectionState>,
}

impl<E: Engine> Connection<E> {
    /// Create a connection to the database located in `file`, or to an in-memory database when
    /// `None`. The database is not opened here.
    pub fn new(engine: E, file: Option<PathBuf>) -> Self {
        let result = Self {
            engine,
            file,
            number: CONNECTION_NUMBER.fetch_add(1, Ordering::Relaxed),
            state: Default::default(),
        };
        log::info!("{} created({:?})", result, result.file);
        result
    }

    pub fn memory(engine: E) -> Self {
        Self::new(engine, None)
    }

    /// Create and open a connection described by an url, see [`ConnectionOptions`].
    pub fn connect(engine: E, url: &str) -> Result<Self> {
        let options = ConnectionOptions::parse(url)?;
        let connection = Self::new(engine, options.file);
        match options.mode {
            OpenMode::ReadOnly => connection.open_read_only()?,
            OpenMode::ReadWrite => connection.open(false)?,
            OpenMode::ReadWriteCreate => connection.open(true)?,
        };
        Ok(connection)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// File hosting the database, `None` when it is in memory.
    pub fn database_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn is_memory_database(&self) -> bool {
        self.file.is_none()
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Open the database, creating it if needed.
    pub fn open_default(&self) -> Result<&Self> {
        self.open(true)
    }

    /// Open the database. An in-memory database requires `allow_create`.
    pub fn open(&self, allow_create: bool) -> Result<&Self> {
        let mut flags = OpenFlags::READWRITE;
        if allow_create {
            flags |= OpenFlags::CREATE;
        } else if self.is_memory_database() {
            return Err(SqliteError::Misuse(
                "cannot open memory database without creation".into(),
            )
            .into());
        }
        self.open_with(flags)?;
        Ok(self)
    }

    /// Open the database in read-only mode, not applicable to in-memory databases.
    pub fn open_read_only(&self) -> Result<&Self> {
        if self.is_memory_database() {
            return Err(SqliteError::Misuse(
                "cannot open memory database in read-only mode".into(),
            )
            .into());
        }
        self.open_with(OpenFlags::READONLY)?;
        Ok(self)
    }

    fn open_with(&self, flags: OpenFlags) -> Result<()> {
        let current = thread::current().id();
        let claimed = {
            let mut state = self.state();
            if state.disposed {
                return Err(SqliteError::Misuse("cannot reopen closed connection".into()).into());
            }
            let claimed = match state.confinement {
                None => {
                    state.confinement = Some(current);
                    log::debug!("{} confined to {:?}", self, current);
                    true
                }
                Some(owner) => {
                    self.check_owner(owner)?;
                    false
                }
            };
            if state.handle.is_some() {
                recoverable_error(self, "already opened", false);
                return Err(SqliteError::Misuse(format!("{} already opened", self)).into());
            }
            claimed
        };
        let opened = self.open_native(flags);
        let mut state = self.state();
        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                if claimed && state.confinement == Some(current) {
                    state.confinement = None;
                }
                return Err(e);
            }
        };
        if state.disposed {
            drop(state);
            let rc = self.engine.close(handle);
            log::warn!("{} disposed while opening, close returned {}", self, rc);
            return Err(SqliteError::NotOpened(
                "connection disposed while open() was in progress".into(),
            )
            .into());
        }
        state.handle = Some(handle);
        drop(state);
        log::info!("{} opened({})", self, flags);
        Ok(())
    }

    fn open_native(&self, flags: OpenFlags) -> Result<DbHandle> {
        let location = self.location();
        let (handle, rc) = self.engine.open(&location, flags);
        if !rc.is_ok() {
            let message = best_effort("cannot get the open error message", || {
                self.engine.error_message(handle)
            })
            .unwrap_or_default();
            if let Some(handle) = handle {
                let rc = self.engine.close(handle);
                if !rc.is_ok() {
                    log::warn!("{} error [{}] closing the handle of a failed open", self, rc);
                }
            }
            let error = SqliteError::Engine {
                code: rc,
                message: format!("{} open({}) {}", self, location, message),
            };
            log::error!("{}", error);
            return Err(error.into());
        }
        handle.ok_or_else(|| SqliteError::Inconsistent("engine didn't return db handle".into()).into())
    }

    fn location(&self) -> String {
        match &self.file {
            Some(file) => std::path::absolute(file)
                .unwrap_or_else(|_| file.clone())
                .to_string_lossy()
                .into_owned(),
            None => MEMORY_LOCATION.into(),
        }
    }

    /// Tells whether the database is open. Can be called from any thread.
    pub fn is_open(&self) -> bool {
        let state = self.state();
        state.handle.is_some() && !state.disposed
    }

    /// Can be called from any thread.
    pub fn is_disposed(&self) -> bool {
        self.state().disposed
    }

    /// Close the connection, finalizing every statement. Can be called from any thread and more
    /// than once, it never fails.
    ///
    /// Statements can only be finalized from the thread that owns the connection: from any other
    /// thread they are abandoned with a warning.
    pub fn dispose(&self) {
        let (handle, confinement) = {
            let mut state = self.state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (state.handle.take(), state.confinement.take())
        };
        let Some(handle) = handle else {
            log::debug!("{} disposed before being opened", self);
            return;
        };
        self.finalize_statements(confinement);
        let rc = self.engine.close(handle);
        // BUSY when statements are still attached
        if !rc.is_ok() {
            let message = best_effort("cannot get the close error message", || {
                self.engine.error_message(Some(handle))
            });
            log::warn!(
                "{} close error {}{}",
                self,
                rc,
                message.map(|v| format!(": {}", v)).unwrap_or_default()
            );
        }
        log::info!("{} closed", self);
    }

    pub fn exec(&self, sql: &str) -> Result<&Self> {
        self.check_thread()?;
        let handle = self.handle()?;
        let (rc, error) = self.engine.exec(handle, sql);
        self.throw_result(rc, "exec()", error.as_deref())?;
        Ok(self)
    }

    /// Prepare a statement and allow it to be reused once released.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_, E>> {
        self.prepare_cached(sql, true)
    }

    /// Prepare a statement, `cached` decides whether it goes back to the statement cache once
    /// released or it is finalized.
    pub fn prepare_cached(&self, sql: &str, cached: bool) -> Result<Statement<'_, E>> {
        self.check_thread()?;
        let (handle, reused) = {
            let mut state = self.state();
            let handle = Self::handle_of(&state)?;
            // While in use, the statement stays out of the cache
            let reused = if cached { state.cache.take(sql) } else { None };
            (handle, reused)
        };
        let fresh = reused.is_none();
        let stmt = match reused {
            Some(stmt) => {
                log::debug!("{} reusing cached statement [{}]", self, sql);
                stmt
            }
            None => {
                let (stmt, rc) = self.engine.prepare(handle, sql);
                self.throw_result(rc, "prepare()", Some(sql))?;
                stmt.ok_or_else(|| {
                    let error = SqliteError::Inconsistent("engine did not return stmt".into());
                    log::error!("{} {}", self, error);
                    error
                })?
            }
        };
        let sql: Arc<str> = sql.into();
        let controller = if cached {
            StatementController::Cached
        } else {
            StatementController::Uncached
        };
        let registered = {
            let mut state = self.state();
            // The connection may be disposed while preparing
            if state.handle.is_some() {
                let previous = state.statements.insert(stmt, sql.clone());
                if fresh && previous.is_some() {
                    recoverable_error(stmt, "appeared in the registry when prepared", true);
                }
                true
            } else {
                false
            }
        };
        if !registered {
            let rc = self.engine.finalize(stmt);
            if !rc.is_ok() {
                log::warn!("{} error [{}] finalizing [{}] in prepare()", self, rc, sql);
            }
            return Err(SqliteError::NotOpened(
                "connection closed while prepare() was in progress".into(),
            )
            .into());
        }
        Ok(Statement::new(self, controller, stmt, sql))
    }

    /// Number of live statements, both lent and cached.
    pub fn statement_count(&self) -> usize {
        self.state().statements.len()
    }

    /// Number of idle statements ready to be reused.
    pub fn cached_statement_count(&self) -> usize {
        self.state().cache.len()
    }

    pub(crate) fn is_registered(&self, stmt: StmtHandle) -> bool {
        self.state().statements.contains(stmt)
    }

    fn finalize_statements(&self, confinement: Option<ThreadId>) {
        let alien_thread = confinement != Some(thread::current().id());
        if !alien_thread {
            loop {
                let Some((stmt, sql)) = self.state().statements.first() else {
                    break;
                };
                self.finalize_statement(stmt, &sql);
            }
        }
        let mut state = self.state();
        if !state.statements.is_empty() {
            let count = state.statements.len();
            if alien_thread {
                log::warn!(
                    "{} cannot finalize {} statements from alien thread",
                    self,
                    count
                );
            } else {
                recoverable_error(self, format!("{} statements are not finalized", count), false);
            }
        }
        state.statements.clear();
        state.cache.clear();
    }

    /// Release the native statement and forget it. Never fails, the registry is updated even
    /// when the engine reports an error.
    pub(crate) fn finalize_statement(&self, stmt: StmtHandle, sql: &Arc<str>) {
        if self.state().abandoned(stmt) {
            log::warn!("{} disposed elsewhere, statement [{}] abandoned", self, sql);
            return;
        }
        let rc = self.engine.finalize(stmt);
        if !rc.is_ok() {
            log::warn!("{} error [{}] finishing statement [{}]", self, rc, sql);
        }
        let mut state = self.state();
        if state.abandoned(stmt) {
            log::debug!("{} statement [{}] forgotten while finalizing", self, sql);
            return;
        }
        match state.statements.remove(stmt) {
            None => recoverable_error(stmt, format!("alien statement for {}", sql), true),
            Some(removed) if removed != *sql => recoverable_error(
                stmt,
                format!("different sql [{}][{}]", sql, removed),
                true,
            ),
            _ => {}
        }
        state.cache.remove_if(sql, stmt);
    }

    /// Make a released statement available again, finalizing it when that is not possible.
    pub(crate) fn push_cache(
        &self,
        stmt: StmtHandle,
        sql: &Arc<str>,
        has_bindings: bool,
        has_stepped: bool,
    ) {
        let finalize = match self.clear_statement(stmt, has_bindings, has_stepped) {
            Ok(()) => {
                let mut state = self.state();
                if state.disposed || state.handle.is_none() {
                    drop(state);
                    log::warn!("{} disposed elsewhere, statement [{}] abandoned", self, sql);
                    return;
                }
                let offer = state.cache.offer(sql.clone(), stmt);
                drop(state);
                match offer {
                    CacheOffer::Cached => false,
                    CacheOffer::Duplicate => {
                        recoverable_error(stmt, "appeared in cache when inserted", true);
                        false
                    }
                    CacheOffer::Occupied(cached) => {
                        log::debug!(
                            "{} cache already holds [{}] as {}, finalizing {}",
                            self,
                            sql,
                            cached,
                            stmt
                        );
                        true
                    }
                }
            }
            Err(e) => {
                log::warn!("{} exception clearing statement: {:#}", self, e);
                true
            }
        };
        if finalize {
            self.finalize_statement(stmt, sql);
        }
    }

    fn clear_statement(&self, stmt: StmtHandle, has_bindings: bool, has_stepped: bool) -> Result<()> {
        if has_stepped {
            self.throw_result(self.engine.reset(stmt), "reset()", None)?;
        }
        if has_bindings {
            self.throw_result(self.engine.clear_bindings(stmt), "clearBindings()", None)?;
        }
        Ok(())
    }

    /// The open handle, or the reason why there is none.
    pub(crate) fn handle(&self) -> Result<DbHandle> {
        Self::handle_of(&self.state())
    }

    fn handle_of(state: &ConnectionState) -> Result<DbHandle> {
        if state.disposed {
            return Err(SqliteError::Misuse("connection is disposed".into()).into());
        }
        state
            .handle
            .ok_or_else(|| SqliteError::NotOpened("connection is not opened".into()).into())
    }

    /// Turn a non success code into an error carrying the operation and the engine message.
    pub(crate) fn throw_result(
        &self,
        rc: ResultCode,
        operation: &str,
        additional: Option<&str>,
    ) -> Result<()> {
        if rc.is_ok() {
            return Ok(());
        }
        let mut message = format!("{} {}", self, operation);
        if let Some(additional) = additional {
            message.push(' ');
            message.push_str(additional);
        }
        let handle = self.state().handle;
        if let Some(handle) = handle {
            let errmsg = best_effort("cannot get the error message", || {
                self.engine.error_message(Some(handle))
            });
            if let Some(errmsg) = errmsg.filter(|v| additional != Some(v.as_str())) {
                message.push_str(&format!(" [{}]", errmsg));
            }
        }
        let error = SqliteError::Engine { code: rc, message };
        log::error!("{}", error);
        Err(error.into())
    }

    pub(crate) fn check_thread(&self) -> Result<()> {
        let confinement = self.state().confinement;
        match confinement {
            Some(owner) => self.check_owner(owner),
            None => Ok(()),
        }
    }

    fn check_owner(&self, owner: ThreadId) -> Result<()> {
        let current = thread::current().id();
        if current != owner {
            return Err(SqliteError::ConfinementViolated(format!(
                "{} confined({:?}) used({:?})",
                self, owner, current
            ))
            .into());
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Engine> Display for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sqlite[{}]", self.number)
    }
}

impl<E: Engine> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("number", &self.number)
            .field("file", &self.file)
            .field("state", &*self.state())
            .finish()
    }
}

impl<E: Engine> Drop for Connection<E> {
    fn drop(&mut self) {
        if self.is_open() {
            log::debug!("{} dropped while open, disposing", self);
        }
        self.dispose();
    }
}
