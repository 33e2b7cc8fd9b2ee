use crate::{Connection, Engine, Result, ResultCode, StatementController, StmtHandle, Value};
use std::{
    fmt::{self, Display},
    sync::Arc,
};

/// A prepared statement lent by a [`Connection`].
///
/// Releasing it (explicitly with [`Statement::dispose`] or by dropping it) hands the native
/// statement to its controller, which either caches it for the next `prepare` of the same query or
/// finalizes it. Every operation must happen on the thread owning the connection.
pub struct Statement<'c, E: Engine> {
    connection: &'c Connection<E>,
    controller: StatementController,
    handle: StmtHandle,
    sql: Arc<str>,
    has_bindings: bool,
    has_stepped: bool,
    has_row: bool,
}

impl<'c, E: Engine> Statement<'c, E> {
    pub(crate) fn new(
        connection: &'c Connection<E>,
        controller: StatementController,
        handle: StmtHandle,
        sql: Arc<str>,
    ) -> Self {
        Self {
            connection,
            controller,
            handle,
            sql,
            has_bindings: false,
            has_stepped: false,
            has_row: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn handle(&self) -> StmtHandle {
        self.handle
    }

    pub fn controller(&self) -> StatementController {
        self.controller
    }

    pub fn connection(&self) -> &'c Connection<E> {
        self.connection
    }

    pub fn has_bindings(&self) -> bool {
        self.has_bindings
    }

    pub fn has_stepped(&self) -> bool {
        self.has_stepped
    }

    /// Whether the last step produced a row.
    pub fn has_row(&self) -> bool {
        self.has_row
    }

    /// Bind a parameter, `index` starts from 1.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> Result<&mut Self> {
        self.controller.validate(self.connection)?;
        let value = value.into();
        let rc = self.connection.engine().bind(self.handle, index, &value);
        self.has_bindings = true;
        self.controller.throw_result(
            self.connection,
            rc,
            "bind()",
            Some(format!("parameter {} of [{}]", index, self.sql).as_str()),
        )?;
        Ok(self)
    }

    /// Evaluate one more step, returns true when a row is available.
    pub fn step(&mut self) -> Result<bool> {
        self.controller.validate(self.connection)?;
        let rc = self.connection.engine().step(self.handle);
        self.has_stepped = true;
        self.has_row = rc == ResultCode::ROW;
        if rc != ResultCode::ROW && rc != ResultCode::DONE {
            self.controller
                .throw_result(self.connection, rc, "step()", Some(&*self.sql))?;
        }
        Ok(self.has_row)
    }

    pub fn column_count(&self) -> Result<usize> {
        self.controller.validate(self.connection)?;
        Ok(self.connection.engine().column_count(self.handle))
    }

    /// Read a column of the current row, `index` starts from 0.
    pub fn column(&self, index: usize) -> Result<Value> {
        self.controller.validate(self.connection)?;
        if !self.has_row {
            return Err(crate::Error::msg(format!(
                "No row available to read column {} from [{}]",
                index, self.sql
            )));
        }
        self.connection.engine().column_value(self.handle, index)
    }

    /// Rewind the statement so it can be executed again, optionally dropping the bound values.
    pub fn reset(&mut self, clear_bindings: bool) -> Result<&mut Self> {
        self.controller.validate(self.connection)?;
        if self.has_stepped {
            let rc = self.connection.engine().reset(self.handle);
            self.controller
                .throw_result(self.connection, rc, "reset()", Some(&*self.sql))?;
            self.has_stepped = false;
            self.has_row = false;
        }
        if clear_bindings && self.has_bindings {
            let rc = self.connection.engine().clear_bindings(self.handle);
            self.controller
                .throw_result(self.connection, rc, "clearBindings()", Some(&*self.sql))?;
            self.has_bindings = false;
        }
        Ok(self)
    }

    /// Release the statement, same as dropping it.
    pub fn dispose(self) {}
}

impl<'c, E: Engine> Drop for Statement<'c, E> {
    fn drop(&mut self) {
        self.controller.disposed(
            self.connection,
            self.handle,
            &self.sql,
            self.has_bindings,
            self.has_stepped,
        );
    }
}

impl<'c, E: Engine> Display for Statement<'c, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]{}",
            self.sql,
            self.controller.label(self.connection)
        )
    }
}

impl<'c, E: Engine> fmt::Debug for Statement<'c, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("connection", &self.connection.number())
            .field("controller", &self.controller)
            .field("handle", &self.handle)
            .field("sql", &self.sql)
            .field("has_bindings", &self.has_bindings)
            .field("has_stepped", &self.has_stepped)
            .finish()
    }
}
