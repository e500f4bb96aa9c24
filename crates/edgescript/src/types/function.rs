//! Function values: user functions, builtins, event-hook binders and host
//! foreign functions.

use std::sync::Arc;

use crate::builtins::{self, Builtin};
use crate::error::{RunResult, ScriptError};
use crate::events::EventBinder;
use crate::stack::CallStack;
use crate::statements::FunctionDef;
use crate::types::foreign::ForeignFunction;
use crate::value::Value;

/// A user function: the definition plus the call stack captured when the
/// `def` executed. The capture is what gives the body access to enclosing
/// frames (module globals, class scopes).
#[derive(Debug)]
pub struct UserFunction {
    pub def: Arc<FunctionDef>,
    stack: CallStack,
}

impl UserFunction {
    pub fn new(def: Arc<FunctionDef>, stack: CallStack) -> Self {
        Self { def, stack }
    }
}

/// Any callable value.
#[derive(Debug)]
pub enum FunctionValue {
    User(UserFunction),
    Builtin(Builtin),
    /// The applied form of `add_event(...)` / `pre_add_event(...)`: a
    /// callable that registers the decorated function as an event hook.
    EventBinder(EventBinder),
    Foreign(Arc<dyn ForeignFunction>),
}

impl FunctionValue {
    /// Calls through a caller's stack. For user functions the caller's lock
    /// state is transferred into a fresh copy of the definition-time stack
    /// and restored afterwards, so nested calls stay under one logical lock.
    pub fn execute_with_stack(&self, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
        match self {
            Self::User(user) => {
                let mut fn_stack = user.stack.clone_frames();
                fn_stack.take_lock_from(stack);
                let result = user.def.call(args, &mut fn_stack);
                stack.take_lock_from(&mut fn_stack);
                result
            }
            Self::Builtin(builtin) => builtins::call_builtin(*builtin, args, stack),
            Self::EventBinder(binder) => binder.apply(args, stack),
            Self::Foreign(func) => func.call(args),
        }
    }

    /// Calls without a caller stack (host-triggered hooks). The function's
    /// own captured stack is copied with a deferred lock and acquires the
    /// script lock itself.
    pub fn execute_detached(&self, args: Vec<Value>) -> RunResult<Value> {
        match self {
            Self::User(user) => {
                let mut fn_stack = user.stack.create_copy_with_deferred_lock();
                user.def.call(args, &mut fn_stack)
            }
            Self::Foreign(func) => func.call(args),
            _ => Err(ScriptError::type_error(
                "cannot call this function without a call stack",
            )),
        }
    }

    pub fn print(&self) -> String {
        match self {
            Self::User(user) => format!("<Function({})>", user.def.name()),
            Self::Builtin(builtin) => format!("<Function({builtin})>"),
            Self::EventBinder(_) => "<Function(event_hook)>".to_owned(),
            Self::Foreign(func) => format!("<Function({})>", func.name()),
        }
    }
}
