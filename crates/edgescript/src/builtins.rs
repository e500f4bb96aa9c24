//! Global builtin callables bound by the implicit first statement of every
//! module body.

use std::sync::Arc;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{RunResult, ScriptError};
use crate::events::EventBinder;
use crate::stack::CallStack;
use crate::types::function::FunctionValue;
use crate::value::Value;

/// The builtin functions and decorators visible in every scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    Print,
    Range,
    Str,
    Int,
    Float,
    Bool,
    Len,
    Not,
    #[strum(serialize = "Exception")]
    Exception,
    Concurrent,
    #[strum(serialize = "add_event")]
    AddEvent,
    #[strum(serialize = "pre_add_event")]
    PreAddEvent,
}

fn expect_one(builtin: Builtin, args: &[Value]) -> RunResult<()> {
    if args.len() != 1 {
        return Err(ScriptError::argument(format!(
            "{builtin} expects a single argument, provided {}.",
            args.len()
        )));
    }
    Ok(())
}

pub fn call_builtin(builtin: Builtin, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
    match builtin {
        Builtin::Print => {
            let text = args
                .iter()
                .map(Value::print_string)
                .collect::<Vec<_>>()
                .join(" ");
            if let Some(task) = stack.task() {
                task.host.print(&text);
            }
            Ok(Value::None)
        }
        Builtin::Range => {
            expect_one(builtin, &args)?;
            let size = args[0].cast_i64()?;
            if size < 0 {
                return Err(ScriptError::argument(format!(
                    "range should be +ve got {size}"
                )));
            }
            Ok(Value::Range(size))
        }
        Builtin::Str => {
            expect_one(builtin, &args)?;
            Ok(Value::string(args[0].print_string()))
        }
        Builtin::Int => {
            expect_one(builtin, &args)?;
            Ok(Value::Int32(args[0].cast_i32()?))
        }
        Builtin::Float => {
            expect_one(builtin, &args)?;
            Ok(Value::Float(args[0].cast_f32()?))
        }
        Builtin::Bool => {
            expect_one(builtin, &args)?;
            Ok(Value::Bool(args[0].truthy()))
        }
        Builtin::Len => {
            expect_one(builtin, &args)?;
            Ok(Value::Int32(args[0].size()? as i32))
        }
        Builtin::Not => {
            expect_one(builtin, &args)?;
            Ok(Value::Bool(!args[0].truthy()))
        }
        Builtin::Exception => {
            expect_one(builtin, &args)?;
            Ok(Value::exception(args[0].as_str_value()?))
        }
        Builtin::Concurrent => {
            // Decorator: marks the function static so it runs without the
            // script lock.
            expect_one(builtin, &args)?;
            let Value::Function(f) = &args[0] else {
                return Err(ScriptError::argument(format!(
                    "concurrent decorator expects a function, got {}",
                    args[0].container_kind()
                )));
            };
            if let FunctionValue::User(user) = &**f {
                user.def.set_static();
            }
            Ok(args.into_iter().next().expect("arity checked"))
        }
        Builtin::AddEvent => Ok(Value::Function(Arc::new(FunctionValue::EventBinder(
            EventBinder::add_event(args)?,
        )))),
        Builtin::PreAddEvent => Ok(Value::Function(Arc::new(FunctionValue::EventBinder(
            EventBinder::pre_add_event(args)?,
        )))),
    }
}
