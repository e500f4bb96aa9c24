//! The `nimblenet` module: tensor constructors, model/LLM/retriever loading,
//! executors, event stores, time, config, logging and JSON helpers.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{RunResult, ScriptError};
use crate::events::{Dataframe, RawEventStore};
use crate::intern::{Attr, AttrId};
use crate::modules::BuiltinModule;
use crate::pool;
use crate::stack::CallStack;
use crate::task::TaskCore;
use crate::types::executor::ConcurrentExecutor;
use crate::types::future::FutureValue;
use crate::types::tensor::Tensor;
use crate::value::{expect_args, DataType, Value};

fn task_of(stack: &CallStack) -> RunResult<Arc<TaskCore>> {
    stack
        .task()
        .ok_or_else(|| ScriptError::status(1, "module call outside a live task"))
}

pub(crate) fn call(attr: AttrId, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
    if attr == Attr::Zeros.id() {
        expect_args("zeros", &args, 2)?;
        return zeros(&args[0], &args[1]);
    }
    if attr == Attr::Tensor.id() {
        expect_args("tensor", &args, 2)?;
        let Value::List(list) = &args[0] else {
            return Err(ScriptError::argument(format!(
                "tensor expects a list, given {}",
                args[0].container_kind()
            )));
        };
        return Ok(Value::Tensor(Arc::new(list.to_tensor(&args[1])?)));
    }
    if attr == Attr::Model.id() {
        expect_args("Model", &args, 1)?;
        let name = args[0].as_str_value()?;
        let task = task_of(stack)?;
        return Ok(spawn_load_job(name.clone(), move |host| host.load_model(&name), &task));
    }
    if attr == Attr::Llm.id() {
        expect_args("llm", &args, 1)?;
        if !matches!(args[0], Value::Map(_)) {
            return Err(ScriptError::argument("Expected LLM argument to be a map"));
        }
        let config = args[0].to_json();
        let task = task_of(stack)?;
        return Ok(spawn_load_job("llm".to_owned(), move |host| host.load_llm(&config), &task));
    }
    if attr == Attr::Retriever.id() {
        expect_args("Retriever", &args, 1)?;
        let name = args[0].as_str_value()?;
        let task = task_of(stack)?;
        return Ok(spawn_load_job(name.clone(), move |host| host.load_retriever(&name), &task));
    }
    if attr == Attr::ConcurrentExecutor.id() {
        expect_args("ConcurrentExecutor", &args, 0)?;
        return Ok(Value::Executor(Arc::new(ConcurrentExecutor::new())));
    }
    if attr == Attr::SetThreadpoolThreads.id() {
        expect_args("set_threadpool_threads", &args, 1)?;
        pool::set_threadpool_threads(args[0].cast_i64()?)?;
        return Ok(Value::None);
    }
    if attr == Attr::RawEventStore.id() {
        expect_args("RawEventStore", &args, 3)?;
        let store = Arc::new(RawEventStore::new(
            args[0].as_str_value()?,
            args[1].as_str_value()?,
            args[2].cast_i64()?,
        )?);
        task_of(stack)?.events.register_store(Arc::clone(&store));
        return Ok(Value::EventStore(store));
    }
    if attr == Attr::Dataframe.id() {
        expect_args("Dataframe", &args, 1)?;
        return Ok(Value::Dataframe(Arc::new(Dataframe::new(&args[0])?)));
    }
    if attr == Attr::Time.id() {
        expect_args("time", &args, 0)?;
        return Ok(Value::Int64(task_of(stack)?.host.time()));
    }
    if attr == Attr::GetConfig.id() {
        expect_args("get_config", &args, 0)?;
        let config = task_of(stack)?.host.config();
        return Value::from_json(&config);
    }
    if attr == Attr::Exp.id() {
        expect_args("exp", &args, 1)?;
        require_numeric_scalar("exp", &args[0])?;
        return Ok(Value::Double(args[0].cast_f64()?.exp()));
    }
    if attr == Attr::Pow.id() {
        expect_args("pow", &args, 2)?;
        require_numeric_scalar("pow", &args[0])?;
        require_numeric_scalar("pow", &args[1])?;
        return Ok(Value::Double(args[0].cast_f64()?.powf(args[1].cast_f64()?)));
    }
    if attr == Attr::Log.id() {
        expect_args("log", &args, 2)?;
        let kind = args[0].as_str_value()?;
        if !matches!(args[1], Value::Map(_)) {
            return Err(ScriptError::argument("Expected second argument of log to be a map"));
        }
        task_of(stack)?.host.log(&kind, args[1].to_json());
        return Ok(Value::None);
    }
    if attr == Attr::Min.id() {
        expect_args("min", &args, 1)?;
        return tensor_arg("min", &args[0])?.min();
    }
    if attr == Attr::Max.id() {
        expect_args("max", &args, 1)?;
        return tensor_arg("max", &args[0])?.max();
    }
    if attr == Attr::Sum.id() {
        expect_args("sum", &args, 1)?;
        return tensor_arg("sum", &args[0])?.sum();
    }
    if attr == Attr::Mean.id() {
        expect_args("mean", &args, 1)?;
        return tensor_arg("mean", &args[0])?.mean();
    }
    if attr == Attr::ParseJson.id() {
        expect_args("parse_json", &args, 1)?;
        let text = args[0].as_str_value()?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ScriptError::argument(format!("parse_json failed: {e}")))?;
        return Value::from_json(&json);
    }
    if attr == Attr::ListCompatibleLlms.id() {
        expect_args("list_compatible_llms", &args, 0)?;
        let llms = task_of(stack)?.host.compatible_llms();
        return Value::from_json(&llms);
    }
    Err(BuiltinModule::unknown_member(attr))
}

/// `zeros(shape, dtype)`: a zero-filled tensor.
fn zeros(shape_arg: &Value, dtype_arg: &Value) -> RunResult<Value> {
    let dims = shape_arg.size()?;
    let mut shape = Vec::with_capacity(dims as usize);
    for i in 0..dims {
        shape.push(shape_arg.get_int_subscript(i)?.cast_i64()?);
    }
    let dtype_name = dtype_arg.as_str_value()?;
    let dtype = DataType::from_str(&dtype_name)
        .map_err(|_| ScriptError::argument(format!("zeros() failed {dtype_name} is not a type")))?;
    Ok(Value::Tensor(Arc::new(Tensor::zeros(&shape, dtype)?)))
}

fn require_numeric_scalar(func: &str, value: &Value) -> RunResult<()> {
    if !value.is_numeric_scalar() {
        return Err(ScriptError::argument(format!(
            "{func} function expects a numeric value. Given {} type.",
            value.data_type()
        )));
    }
    Ok(())
}

fn tensor_arg<'a>(func: &str, value: &'a Value) -> RunResult<&'a Tensor> {
    match value {
        Value::Tensor(t) => Ok(t),
        other => Err(ScriptError::argument(format!(
            "{func} expected a tensor, got {}",
            other.container_kind()
        ))),
    }
}

/// Schedules a host load job on the thread pool, returning the future that
/// will resolve to the loaded handle.
fn spawn_load_job(
    name: String,
    job: impl FnOnce(&dyn crate::task::HostContext) -> RunResult<Value> + Send + 'static,
    task: &Arc<TaskCore>,
) -> Value {
    let future = Arc::new(FutureValue::pending(name));
    let host = Arc::clone(&task.host);
    let future_for_job = Arc::clone(&future);
    pool::global_pool().execute(move || match job(host.as_ref()) {
        Ok(value) => future_for_job.resolve(value),
        Err(err) => future_for_job.fail(err),
    });
    Value::Future(future)
}
