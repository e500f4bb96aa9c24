//! Tasks: a parsed script, its modules, call stack, registered futures and
//! the host boundary.

use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value as Json;

use crate::error::{RunResult, ScriptError};
use crate::parse;
use crate::scope::StackLocation;
use crate::stack::{CallStack, ScriptLock};
use crate::statements::Body;
use crate::events::EventRegistry;
use crate::types::foreign::ForeignFunction;
use crate::types::function::FunctionValue;
use crate::types::future::FutureValue;
use crate::types::stream::{JobStatus, StreamJob};
use crate::value::Value;

/// The narrow contract through which the engine reaches its collaborators.
///
/// Model loading, logging transports, persistence and configuration all live
/// behind this trait; the engine only ever sees values and JSON.
pub trait HostContext: Send + Sync {
    /// Wall-clock seconds since the Unix epoch.
    fn time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Monotonic-ish microsecond clock used by `get_chrono_time`.
    fn chrono_time_micros(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0)
    }

    /// Deployment configuration returned by `get_config()`.
    fn config(&self) -> Json {
        serde_json::json!({})
    }

    /// Sink for `print(...)` output.
    fn print(&self, _text: &str) {}

    /// Sink for `log(type, map)` records.
    fn log(&self, _kind: &str, _data: Json) {}

    /// Loads a model by name; the result value resolves the script-side
    /// future (typically a `Foreign` handle exposing `run`).
    fn load_model(&self, name: &str) -> RunResult<Value> {
        Err(ScriptError::status(
            1,
            format!("Could not find Model of name {name}"),
        ))
    }

    fn load_llm(&self, _config: &Json) -> RunResult<Value> {
        Err(ScriptError::status(1, "LLM loading is not available"))
    }

    fn load_retriever(&self, name: &str) -> RunResult<Value> {
        Err(ScriptError::status(
            1,
            format!("Could not find Retriever of name {name}"),
        ))
    }

    /// The list returned by `list_compatible_llms()`.
    fn compatible_llms(&self) -> Json {
        serde_json::json!([])
    }

    /// Sink for raw event writes once hooks have run.
    fn write_event(&self, _event_type: &str, _data: &Json) {}
}

/// Host that answers with defaults; unit tests run against this.
#[derive(Debug, Default)]
pub struct NoopHost;

impl HostContext for NoopHost {}

/// One script module: its global name table, body, and frame size.
#[derive(Debug)]
pub(crate) struct Module {
    pub name: String,
    pub index: u32,
    globals: AHashMap<String, StackLocation>,
    body: Body,
    var_count: Arc<AtomicU32>,
}

impl Module {
    fn parse(name: &str, index: u32, ast: &Json) -> RunResult<Self> {
        let parsed = parse::parse_module(index, ast)?;
        Ok(Self {
            name: name.to_owned(),
            index,
            globals: parsed.globals,
            body: parsed.body,
            var_count: parsed.var_count,
        })
    }

    pub(crate) fn global_location(&self, name: &str) -> Option<StackLocation> {
        self.globals.get(name).copied()
    }

    /// Runs the module body in a fresh global frame. The frame stays on the
    /// stack afterwards: module globals live as long as the task.
    fn execute_global(&self, stack: &mut CallStack) -> RunResult<()> {
        let slots = self.var_count.load(std::sync::atomic::Ordering::Relaxed) as usize;
        stack.enter_frame(self.index, 0, slots);
        self.body.execute(stack)?;
        Ok(())
    }
}

#[derive(Default)]
struct StreamThreadState {
    job: Option<Box<dyn StreamJob>>,
    shutdown: bool,
}

/// Shared state of the task's stream-push background thread.
#[derive(Default)]
pub(crate) struct StreamShared {
    state: Mutex<StreamThreadState>,
    cv: Condvar,
}

impl StreamShared {
    fn run(&self) {
        loop {
            let mut job = {
                let mut state = self.state.lock();
                while state.job.is_none() && !state.shutdown {
                    self.cv.wait(&mut state);
                }
                if state.shutdown {
                    return;
                }
                state.job.take().expect("woken with a job")
            };
            // Pump the job to completion, checking for shutdown between
            // chunks so task teardown never hangs on a slow producer.
            loop {
                if self.state.lock().shutdown {
                    return;
                }
                match job.process() {
                    JobStatus::Complete => break,
                    JobStatus::Retry => std::thread::sleep(Duration::from_micros(50)),
                }
            }
        }
    }

    fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.cv.notify_all();
    }
}

/// The task state shared with every call-stack copy.
pub struct TaskCore {
    pub(crate) host: Arc<dyn HostContext>,
    pub(crate) script_lock: Arc<ScriptLock>,
    pub(crate) events: EventRegistry,
    ast: Json,
    modules: Mutex<AHashMap<String, Arc<Module>>>,
    foreign: RwLock<AHashMap<(String, String), Arc<dyn ForeignFunction>>>,
    pending_futures: Mutex<Vec<Weak<FutureValue>>>,
    stream: Arc<StreamShared>,
}

impl fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCore")
            .field("modules", &self.modules.lock().len())
            .field("pending_futures", &self.pending_futures.lock().len())
            .finish_non_exhaustive()
    }
}

impl TaskCore {
    /// Remembers a future for `is_ready` tracking. Called exactly once per
    /// future, the first time it is stored into a frame.
    pub(crate) fn save_future(&self, future: &Arc<FutureValue>) {
        self.pending_futures.lock().push(Arc::downgrade(future));
    }

    /// Non-blocking: true iff every registered future has resolved. Resolved
    /// and dropped futures are swept so the check stays cheap and monotonic.
    pub(crate) fn is_ready(&self) -> bool {
        let mut pending = self.pending_futures.lock();
        while let Some(weak) = pending.last() {
            if let Some(future) = weak.upgrade() {
                if !future.is_available() {
                    return false;
                }
            }
            pending.pop();
        }
        true
    }

    pub(crate) fn has_module(&self, name: &str) -> bool {
        self.modules.lock().contains_key(name)
            || self.ast.get(name).is_some_and(|m| !m.is_null())
    }

    /// Loads (and executes) a sibling script module on first import.
    pub(crate) fn import_module(
        self: &Arc<Self>,
        name: &str,
        stack: &mut CallStack,
    ) -> RunResult<Arc<Module>> {
        if let Some(module) = self.modules.lock().get(name) {
            return Ok(Arc::clone(module));
        }
        let module_ast = self.ast.get(name).ok_or_else(|| {
            ScriptError::status(1, format!("Cannot import module={name}: Module not found"))
        })?;
        // Index 0 belongs to the main module, which registers itself after
        // task construction.
        let index = self.modules.lock().len() as u32 + 1;
        let module = Arc::new(Module::parse(name, index, module_ast)?);
        module.execute_global(stack)?;
        self.modules.lock().insert(name.to_owned(), Arc::clone(&module));
        Ok(module)
    }

    pub(crate) fn foreign_function(
        &self,
        module: &str,
        name: &str,
    ) -> Option<Arc<dyn ForeignFunction>> {
        self.foreign
            .read()
            .get(&(module.to_owned(), name.to_owned()))
            .cloned()
    }

    /// Hands a job to the stream-push thread.
    pub(crate) fn add_stream_job(&self, job: Box<dyn StreamJob>) {
        self.stream.state.lock().job = Some(job);
        self.stream.cv.notify_all();
    }
}

/// A loaded script: parse once, then `operate` any number of times.
pub struct Task {
    core: Arc<TaskCore>,
    stack: Mutex<CallStack>,
    main: Arc<Module>,
    stream_thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("core", &self.core).finish_non_exhaustive()
    }
}

/// Name of the main module in a multi-module AST document.
const MAIN_MODULE: &str = "main";

impl Task {
    /// Parses the AST document (either a bare module dump or
    /// `{"main": ..., "<module>": ...}`), builds the main module, and runs
    /// its global body.
    pub fn new(ast: Json, host: Arc<dyn HostContext>) -> RunResult<Self> {
        let stream = Arc::new(StreamShared::default());
        let core = Arc::new(TaskCore {
            host,
            script_lock: Arc::new(ScriptLock::new()),
            events: EventRegistry::default(),
            ast,
            modules: Mutex::new(AHashMap::new()),
            foreign: RwLock::new(AHashMap::new()),
            pending_futures: Mutex::new(Vec::new()),
            stream: Arc::clone(&stream),
        });
        let main_ast = core.ast.get(MAIN_MODULE).unwrap_or(&core.ast).clone();
        let main = Arc::new(Module::parse(MAIN_MODULE, 0, &main_ast)?);

        let stream_thread = std::thread::Builder::new()
            .name("edgescript-stream-push".to_owned())
            .spawn(move || stream.run())
            .map_err(|e| ScriptError::status(1, format!("failed to spawn stream thread: {e}")))?;

        let mut stack = CallStack::new(Arc::downgrade(&core), Arc::clone(&core.script_lock));
        if let Err(err) = stack.with_script_lock(|stack| main.execute_global(stack)) {
            core.stream.shutdown();
            let _ = stream_thread.join();
            return Err(err);
        }
        core.modules
            .lock()
            .insert(MAIN_MODULE.to_owned(), Arc::clone(&main));

        Ok(Self {
            core,
            stack: Mutex::new(stack),
            main,
            stream_thread: Some(stream_thread),
        })
    }

    /// Parses the AST from its JSON text form.
    pub fn from_ast_str(ast: &str, host: Arc<dyn HostContext>) -> RunResult<Self> {
        let json: Json = serde_json::from_str(ast)
            .map_err(|e| ScriptError::status(1, format!("invalid AST document: {e}")))?;
        Self::new(json, host)
    }

    /// Runs a named top-level function with an input map; the result map is
    /// the output. Parameters bind by name from the input map.
    pub fn operate(&self, function_name: &str, inputs: &Value) -> RunResult<Value> {
        let Value::Map(input_map) = inputs else {
            return Err(ScriptError::argument(format!(
                "operate inputs must be a map, given {}",
                inputs.container_kind()
            )));
        };
        let location = self.main.global_location(function_name).ok_or_else(|| {
            ScriptError::status(1, format!("function {function_name} not found in script"))
        })?;
        let mut stack = self.stack.lock();
        let callee = stack.get_variable(location)?;
        let Value::Function(function) = &callee else {
            return Err(ScriptError::status(
                1,
                format!("{function_name} is not a function"),
            ));
        };
        let args = match &**function {
            FunctionValue::User(user) => {
                let names = user.def.arg_names();
                let mut args = Vec::with_capacity(names.len());
                for name in names {
                    args.push(input_map.try_get(name).ok_or_else(|| {
                        ScriptError::argument(format!(
                            "missing input {name} for function {function_name}"
                        ))
                    })?);
                }
                args
            }
            _ => vec![inputs.clone()],
        };
        let result = callee.execute_function(args, &mut stack)?;
        if !matches!(result, Value::Map(_) | Value::None) {
            return Err(ScriptError::type_error(format!(
                "{function_name} must return a map, returned {}",
                result.container_kind()
            )));
        }
        Ok(result)
    }

    /// Non-blocking readiness: true iff all registered futures are resolved.
    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    /// Registers a host callable importable as `from <module> import <name>`.
    pub fn register_foreign_function(
        &self,
        module: &str,
        name: &str,
        func: Arc<dyn ForeignFunction>,
    ) {
        self.core
            .foreign
            .write()
            .insert((module.to_owned(), name.to_owned()), func);
    }

    /// Feeds an event through the registered pre-add hooks, then the store
    /// hooks, then the host sink.
    pub fn process_event(&self, event_type: &str, data: Value) -> RunResult<()> {
        let mut data = data;
        for hook in self.core.events.pre_hooks_for(event_type) {
            let result = hook.execute_function_detached(vec![
                Value::string(event_type.to_owned()),
                data.clone(),
            ])?;
            if matches!(result, Value::Map(_)) {
                data = result;
            }
        }
        for store in self.core.events.stores_for(event_type) {
            if let Some(hook) = store.hook() {
                hook.execute_function_detached(vec![data.clone()])?;
            }
        }
        self.core.host.write_event(event_type, &data.to_json());
        Ok(())
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.core.stream.shutdown();
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

/// A stack wired to no task, for unit tests of components that never touch
/// task state.
#[cfg(test)]
pub(crate) fn detached_stack() -> CallStack {
    CallStack::new(Weak::new(), Arc::new(ScriptLock::new()))
}
