use crate::{Connection, Engine, Result, ResultCode, StmtHandle, recoverable_error};
use std::{
    fmt::{self, Display},
    sync::Arc,
};

/// Decides what happens to a statement handle when its [`crate::Statement`] is released.
///
/// Chosen once at prepare time and carried by the statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementController {
    /// Give the handle back to the statement cache.
    Cached,
    /// Finalize the handle right away.
    Uncached,
}

impl StatementController {
    /// Checks to run before any native call on behalf of a statement.
    pub(crate) fn validate<E: Engine>(&self, connection: &Connection<E>) -> Result<()> {
        connection.check_thread()?;
        connection.handle()?;
        Ok(())
    }

    pub(crate) fn throw_result<E: Engine>(
        &self,
        connection: &Connection<E>,
        rc: ResultCode,
        operation: &str,
        additional: Option<&str>,
    ) -> Result<()> {
        connection.throw_result(rc, operation, additional)
    }

    /// The statement was released by its user.
    ///
    /// From an alien thread nothing is touched and the handle stays registered. A handle that is
    /// no longer registered was already finalized by the connection disposal.
    pub(crate) fn disposed<E: Engine>(
        &self,
        connection: &Connection<E>,
        stmt: StmtHandle,
        sql: &Arc<str>,
        has_bindings: bool,
        has_stepped: bool,
    ) {
        if connection.check_thread().is_err() {
            recoverable_error(
                self.label(connection),
                format!("disposing [{}] from alien thread", sql),
                true,
            );
            return;
        }
        if !connection.is_registered(stmt) {
            log::debug!(
                "{} statement [{}] already finalized",
                self.label(connection),
                sql
            );
            return;
        }
        match self {
            StatementController::Cached => {
                connection.push_cache(stmt, sql, has_bindings, has_stepped)
            }
            StatementController::Uncached => connection.finalize_statement(stmt, sql),
        }
    }

    pub(crate) fn label<'c, E: Engine>(
        &self,
        connection: &'c Connection<E>,
    ) -> ControllerLabel<'c, E> {
        ControllerLabel(*self, connection)
    }
}

pub(crate) struct ControllerLabel<'c, E: Engine>(StatementController, &'c Connection<E>);

impl<'c, E: Engine> Display for ControllerLabel<'c, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.0 {
            StatementController::Cached => "C",
            StatementController::Uncached => "U",
        };
        write!(f, "{}[{}]", self.1, tag)
    }
}
