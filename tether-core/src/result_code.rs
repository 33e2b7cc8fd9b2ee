use std::fmt::{self, Display};

/// Status returned by every engine primitive.
///
/// Non-negative values are the engine's own codes, negative values are produced by this wrapper
/// layer and never by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(0);
    pub const ERROR: ResultCode = ResultCode(1);
    /// Resources are still attached, for example statements left open at close time.
    pub const BUSY: ResultCode = ResultCode(5);
    pub const MISUSE: ResultCode = ResultCode(21);
    pub const ROW: ResultCode = ResultCode(100);
    pub const DONE: ResultCode = ResultCode(101);

    pub const WRAPPER_WEIRD: ResultCode = ResultCode(-99);
    pub const WRAPPER_NOT_OPENED: ResultCode = ResultCode(-97);
    pub const WRAPPER_CONFINEMENT_VIOLATED: ResultCode = ResultCode(-95);
    pub const WRAPPER_MISUSE: ResultCode = ResultCode(-94);

    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ResultCode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
