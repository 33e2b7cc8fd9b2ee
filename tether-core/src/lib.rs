mod cache;
mod connection;
mod controller;
mod engine;
mod error;
mod options;
mod registry;
mod result_code;
mod statement;
mod value;

pub use ::anyhow::Context;
pub use cache::*;
pub use connection::*;
pub use controller::*;
pub use engine::*;
pub use error::*;
pub use options::*;
pub use registry::*;
pub use result_code::*;
pub use statement::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
