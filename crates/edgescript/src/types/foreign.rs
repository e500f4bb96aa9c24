//! The foreign-object boundary: host-supplied callables and opaque objects.

use std::fmt;

use crate::error::RunResult;
use crate::value::Value;

/// A native callable registered by the host. Appears to scripts as an
/// ordinary `Function` value.
pub trait ForeignFunction: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn call(&self, args: Vec<Value>) -> RunResult<Value>;
}

/// An opaque host object. Scripts can only call named methods on it; the
/// engine never inspects its contents.
pub trait ForeignObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    fn call_method(&self, method: &str, args: Vec<Value>) -> RunResult<Value>;

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(format!("[{}]", self.type_name()))
    }
}

/// Wraps a plain closure as a [`ForeignFunction`]; the common host path.
pub struct NativeFn<F> {
    name: String,
    func: F,
}

impl<F> NativeFn<F>
where
    F: Fn(Vec<Value>) -> RunResult<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for NativeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

impl<F> ForeignFunction for NativeFn<F>
where
    F: Fn(Vec<Value>) -> RunResult<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: Vec<Value>) -> RunResult<Value> {
        (self.func)(args)
    }
}
