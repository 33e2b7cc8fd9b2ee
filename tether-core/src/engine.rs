use crate::{Result, ResultCode, Value};
use std::{
    fmt::{self, Display},
    num::NonZeroUsize,
    ops::{BitOr, BitOrAssign},
};

/// Location string that asks the engine for a private, ephemeral in-memory database.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Opaque identity of an open database, minted by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DbHandle(NonZeroUsize);

/// Opaque identity of a compiled statement, minted by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StmtHandle(NonZeroUsize);

macro_rules! impl_handle {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw token, `None` when it is zero (the engine returned no handle).
            pub fn new(raw: usize) -> Option<Self> {
                NonZeroUsize::new(raw).map(Self)
            }

            pub fn raw(self) -> usize {
                self.0.get()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0.get())
            }
        }
    };
}

impl_handle!(DbHandle);
impl_handle!(StmtHandle);

/// Intents passed to [`Engine::open`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READONLY: OpenFlags = OpenFlags(0x1);
    pub const READWRITE: OpenFlags = OpenFlags(0x2);
    pub const CREATE: OpenFlags = OpenFlags(0x4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separator = "";
        for (flag, name) in [
            (Self::READONLY, "READONLY"),
            (Self::READWRITE, "READWRITE"),
            (Self::CREATE, "CREATE"),
        ] {
            if self.contains(flag) {
                write!(f, "{}{}", separator, name)?;
                separator = "|";
            }
        }
        Ok(())
    }
}

/// Primitive operations of an embedded database engine.
///
/// The connection layer only stores and compares the handles, it never looks inside them. Every
/// handle passed back to an engine must have been produced by that same engine and not yet been
/// released through [`Engine::close`] or [`Engine::finalize`].
///
/// All the primitives report their outcome through a [`ResultCode`] instead of failing, the caller
/// decides what is an error.
pub trait Engine: Send + Sync {
    /// Open the database at `location` (or [`MEMORY_LOCATION`]).
    ///
    /// The handle may be present even when the code is not [`ResultCode::OK`], in that case the
    /// caller must close it.
    fn open(&self, location: &str, flags: OpenFlags) -> (Option<DbHandle>, ResultCode);

    fn close(&self, db: DbHandle) -> ResultCode;

    /// Compile a single statement.
    fn prepare(&self, db: DbHandle, sql: &str) -> (Option<StmtHandle>, ResultCode);

    fn finalize(&self, stmt: StmtHandle) -> ResultCode;

    fn reset(&self, stmt: StmtHandle) -> ResultCode;

    fn clear_bindings(&self, stmt: StmtHandle) -> ResultCode;

    /// Run one or more statements without handing out statement handles.
    fn exec(&self, db: DbHandle, sql: &str) -> (ResultCode, Option<String>);

    /// Last error text of `db`, or the global one when no handle is available.
    fn error_message(&self, db: Option<DbHandle>) -> Result<String>;

    /// Advance the statement, [`ResultCode::ROW`] when a row is available and
    /// [`ResultCode::DONE`] when it ran to completion.
    fn step(&self, stmt: StmtHandle) -> ResultCode;

    /// Bind a parameter, `index` starts from 1.
    fn bind(&self, stmt: StmtHandle, index: usize, value: &Value) -> ResultCode;

    fn column_count(&self, stmt: StmtHandle) -> usize;

    /// Read a column of the current row, `index` starts from 0.
    fn column_value(&self, stmt: StmtHandle, index: usize) -> Result<Value>;
}
