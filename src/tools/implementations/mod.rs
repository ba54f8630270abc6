//! Tool implementations module

pub mod filesystem;

pub use filesystem::{builtin_tools, ListDirHandler, ReadFileHandler, WriteFileHandler};
