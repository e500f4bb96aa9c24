//! EdgeScript: the script-execution engine of an on-device AI runtime.
//!
//! Hosts hand the engine a parsed Python-ast JSON document and call named
//! entry functions with maps of wire tensors. The engine owns the value
//! model, the AST interpreter, the compile-time scopes and run-time call
//! stack, the script lock and thread pool, and the built-in `nimblenet`,
//! internal-testing and regex modules. Everything else (model execution,
//! persistence, logging transports) stays behind [`HostContext`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use edgescript::{NoopHost, Task, Value};
//!
//! let ast = serde_json::json!({
//!     "_type": "Module",
//!     "body": [/* python ast dump */],
//! });
//! let task = Task::new(ast, Arc::new(NoopHost)).unwrap();
//! let inputs = Value::from_json(&serde_json::json!({"x": 3})).unwrap();
//! let outputs = task.operate("main", &inputs).unwrap();
//! assert!(task.is_ready() || !outputs.is_none());
//! ```

mod builtins;
mod error;
mod events;
mod expressions;
mod intern;
mod modules;
mod ops;
mod parse;
mod pool;
mod scope;
mod stack;
mod statements;
mod task;
mod types;
mod value;
pub mod wire;

pub use crate::error::{ErrorKind, RunResult, ScriptError};
pub use crate::events::{Dataframe, RawEventStore};
pub use crate::intern::{attr_name, intern_attr, AttrId};
pub use crate::modules::BuiltinModule;
pub use crate::pool::{default_threads, set_threadpool_threads};
pub use crate::scope::StackLocation;
pub use crate::task::{HostContext, NoopHost, Task};
pub use crate::types::foreign::{ForeignFunction, ForeignObject, NativeFn};
pub use crate::types::future::FutureValue;
pub use crate::types::map::ScriptMap;
pub use crate::types::slice::SliceBounds;
pub use crate::types::stream::{CharStream, FillCharStreamJob, JobStatus, StreamJob};
pub use crate::types::tensor::{SortDir, Tensor, TensorBuf};
pub use crate::value::{ContainerKind, DataType, Value};
