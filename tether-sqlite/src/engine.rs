use crate::{CBox, error_message_from_ptr, extract::extract_value};
use libsqlite3_sys::*;
use std::{
    ffi::{CStr, CString, c_char, c_int, c_void},
    ptr,
};
use tether_core::{DbHandle, Engine, Error, OpenFlags, Result, ResultCode, StmtHandle, Value};

/// [`Engine`] backed by the bundled SQLite library.
///
/// Handles are the addresses of the native `sqlite3` and `sqlite3_stmt` objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteEngine {}

impl SqliteEngine {
    pub const fn new() -> Self {
        Self {}
    }

    /// Version of the linked SQLite library.
    pub fn library_version(&self) -> String {
        unsafe { error_message_from_ptr(&sqlite3_libversion()).to_string() }
    }
}

fn db(handle: DbHandle) -> *mut sqlite3 {
    handle.raw() as *mut sqlite3
}

fn stmt(handle: StmtHandle) -> *mut sqlite3_stmt {
    handle.raw() as *mut sqlite3_stmt
}

fn native_flags(flags: OpenFlags) -> c_int {
    let mut result = 0;
    if flags.contains(OpenFlags::READONLY) {
        result |= SQLITE_OPEN_READONLY;
    }
    if flags.contains(OpenFlags::READWRITE) {
        result |= SQLITE_OPEN_READWRITE;
    }
    if flags.contains(OpenFlags::CREATE) {
        result |= SQLITE_OPEN_CREATE;
    }
    result
}

fn c_string(value: &str, what: &str) -> Option<CString> {
    match CString::new(value.as_bytes()) {
        Ok(value) => Some(value),
        Err(e) => {
            let error = Error::new(e).context(format!("Could not create a CString from the {}", what));
            log::error!("{:#}", error);
            None
        }
    }
}

impl Engine for SqliteEngine {
    fn open(&self, location: &str, flags: OpenFlags) -> (Option<DbHandle>, ResultCode) {
        let Some(location) = c_string(location, "database location") else {
            return (None, ResultCode::MISUSE);
        };
        let mut connection: *mut sqlite3 = ptr::null_mut();
        let rc = unsafe {
            sqlite3_open_v2(
                location.as_ptr(),
                &mut connection,
                native_flags(flags),
                ptr::null(),
            )
        };
        (DbHandle::new(connection as usize), ResultCode(rc))
    }

    fn close(&self, handle: DbHandle) -> ResultCode {
        // Unlike sqlite3_close_v2, this refuses with SQLITE_BUSY while statements are alive
        ResultCode(unsafe { sqlite3_close(db(handle)) })
    }

    fn prepare(&self, handle: DbHandle, sql: &str) -> (Option<StmtHandle>, ResultCode) {
        let Some(query) = c_string(sql, "query String") else {
            return (None, ResultCode::MISUSE);
        };
        unsafe {
            let mut statement = CBox::new(ptr::null_mut(), |p| {
                sqlite3_finalize(p);
            });
            let mut tail: *const c_char = ptr::null();
            let rc = sqlite3_prepare_v2(
                db(handle),
                query.as_ptr(),
                query.as_bytes().len() as c_int,
                &mut *statement,
                &mut tail,
            );
            if rc != SQLITE_OK {
                return (None, ResultCode(rc));
            }
            if !tail.is_null() && !CStr::from_ptr(tail).to_bytes().trim_ascii().is_empty() {
                log::error!(
                    "Cannot prepare more than one statement at a time, while preparing the query:\n{}",
                    sql
                );
                return (None, ResultCode::MISUSE);
            }
            (StmtHandle::new(statement.release() as usize), ResultCode(rc))
        }
    }

    fn finalize(&self, handle: StmtHandle) -> ResultCode {
        ResultCode(unsafe { sqlite3_finalize(stmt(handle)) })
    }

    fn reset(&self, handle: StmtHandle) -> ResultCode {
        ResultCode(unsafe { sqlite3_reset(stmt(handle)) })
    }

    fn clear_bindings(&self, handle: StmtHandle) -> ResultCode {
        ResultCode(unsafe { sqlite3_clear_bindings(stmt(handle)) })
    }

    fn exec(&self, handle: DbHandle, sql: &str) -> (ResultCode, Option<String>) {
        let Some(query) = c_string(sql, "query String") else {
            return (ResultCode::MISUSE, None);
        };
        unsafe {
            let mut errmsg = CBox::new(ptr::null_mut(), |p: *mut c_char| {
                sqlite3_free(p as *mut c_void);
            });
            let rc = sqlite3_exec(
                db(handle),
                query.as_ptr(),
                None,
                ptr::null_mut(),
                &mut *errmsg,
            );
            let message = (!errmsg.is_null())
                .then(|| error_message_from_ptr(&(*errmsg as *const c_char)).to_string());
            (ResultCode(rc), message)
        }
    }

    fn error_message(&self, handle: Option<DbHandle>) -> Result<String> {
        let Some(handle) = handle else {
            return Err(Error::msg(
                "Cannot get the error message without a database handle",
            ));
        };
        let message = unsafe { sqlite3_errmsg(db(handle)) };
        if message.is_null() {
            return Err(Error::msg("Unknown error (could not extract the error message)"));
        }
        Ok(error_message_from_ptr(&message).to_string())
    }

    fn step(&self, handle: StmtHandle) -> ResultCode {
        ResultCode(unsafe { sqlite3_step(stmt(handle)) })
    }

    fn bind(&self, handle: StmtHandle, index: usize, value: &Value) -> ResultCode {
        let statement = stmt(handle);
        let index = index as c_int;
        let rc = unsafe {
            match value {
                Value::Null => sqlite3_bind_null(statement, index),
                Value::Integer(v) => sqlite3_bind_int64(statement, index, *v),
                Value::Real(v) => sqlite3_bind_double(statement, index, *v),
                Value::Text(v) => sqlite3_bind_text(
                    statement,
                    index,
                    v.as_ptr() as *const c_char,
                    v.len() as c_int,
                    SQLITE_TRANSIENT(),
                ),
                Value::Blob(v) => sqlite3_bind_blob(
                    statement,
                    index,
                    v.as_ptr() as *const c_void,
                    v.len() as c_int,
                    SQLITE_TRANSIENT(),
                ),
            }
        };
        ResultCode(rc)
    }

    fn column_count(&self, handle: StmtHandle) -> usize {
        unsafe { sqlite3_column_count(stmt(handle)) as usize }
    }

    fn column_value(&self, handle: StmtHandle, index: usize) -> Result<Value> {
        let count = self.column_count(handle);
        if index >= count {
            return Err(Error::msg(format!(
                "Column {} out of range, the statement has {} columns",
                index, count
            )));
        }
        extract_value(stmt(handle), index as c_int)
    }
}
