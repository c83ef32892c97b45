//! cheat-script — an in-process scripting engine for automating and testing
//! a game client: a tab/comment-aware line-oriented language, per-file parse
//! caches with on-disk change detection, a cooperative stack of executing
//! scripts with nested control flow, scoped/global variable arithmetic,
//! inline `$`-substitution, hotkey binding, and pause/try/catch semantics.

pub mod binding;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod frame;
pub mod host;
pub mod interpreter;
pub mod logging;
pub mod parsed_file;
pub mod scheduler;
pub mod scope;
pub mod substitution;
pub mod tokenize;
pub mod value;

pub use config::Config;
pub use error::ScriptError;
pub use host::{ChatSink, ExternalScriptExecutor, FileProbe, FilePicker};
pub use interpreter::Interpreter;
pub use parsed_file::ParsedFile;
pub use value::Value;
