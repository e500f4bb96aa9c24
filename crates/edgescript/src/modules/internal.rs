//! The internal testing module (`nimblenetInternalTesting`).

use std::sync::Arc;

use crate::error::{RunResult, ScriptError};
use crate::intern::{Attr, AttrId};
use crate::modules::BuiltinModule;
use crate::pool;
use crate::stack::CallStack;
use crate::types::future::FutureValue;
use crate::types::stream::{CharStream, FillCharStreamJob};
use crate::value::{expect_args, Value};

pub(crate) fn call(attr: AttrId, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
    let task = stack
        .task()
        .ok_or_else(|| ScriptError::status(1, "module call outside a live task"))?;

    if attr == Attr::GetChronoTime.id() {
        expect_args("get_chrono_time", &args, 0)?;
        return Ok(Value::Int64(task.host.chrono_time_micros()));
    }
    if attr == Attr::CreateSimulatedCharStream.id() {
        expect_args("create_simulated_char_stream", &args, 1)?;
        let text = args[0].as_str_value()?;
        let stream = Arc::new(CharStream::new());
        task.add_stream_job(Box::new(FillCharStreamJob::new(Arc::clone(&stream), &text)));
        return Ok(Value::CharStream(stream));
    }
    if attr == Attr::Retriever.id() {
        expect_args("Retriever", &args, 1)?;
        let name = args[0].as_str_value()?;
        let future = Arc::new(FutureValue::pending(name.clone()));
        let host = Arc::clone(&task.host);
        let future_for_job = Arc::clone(&future);
        pool::global_pool().execute(move || match host.load_retriever(&name) {
            Ok(value) => future_for_job.resolve(value),
            Err(err) => future_for_job.fail(err),
        });
        return Ok(Value::Future(future));
    }
    Err(BuiltinModule::unknown_member(attr))
}
