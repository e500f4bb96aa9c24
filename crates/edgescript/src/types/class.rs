//! Classes and instances.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{RunResult, ScriptError};
use crate::intern::{attr_name, Attr, AttrId};
use crate::stack::CallStack;
use crate::value::Value;

/// A class value: the member table shared by every instance.
///
/// Member tables can form reference cycles through stored values; those
/// cycles leak until the task is torn down.
#[derive(Debug, Default)]
pub struct ClassValue {
    members: RwLock<AHashMap<AttrId, Value>>,
}

impl ClassValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_member(&self, attr: AttrId) -> RunResult<Value> {
        self.members.read().get(&attr).cloned().ok_or_else(|| {
            ScriptError::type_error(format!("Member {} for class does not exist", attr_name(attr)))
        })
    }

    pub fn set_member(&self, attr: AttrId, value: Value) {
        self.members.write().insert(attr, value);
    }

    /// Instantiates the class: builds the object, then runs `__init__` with
    /// the instance prepended if the class defines one.
    pub fn instantiate(
        self: &Arc<Self>,
        args: Vec<Value>,
        stack: &mut CallStack,
    ) -> RunResult<Value> {
        let object = Value::Object(Arc::new(ObjectValue::new(Arc::clone(self))));
        let constructor = self.members.read().get(&Attr::Constructor.id()).cloned();
        if let Some(ctor) = constructor {
            let mut ctor_args = Vec::with_capacity(args.len() + 1);
            ctor_args.push(object.clone());
            ctor_args.extend(args);
            ctor.execute_function(ctor_args, stack)?;
        }
        Ok(object)
    }

    /// Calls a class-level member as a function (static dispatch, no self).
    pub fn call_member(
        &self,
        attr: AttrId,
        args: Vec<Value>,
        stack: &mut CallStack,
    ) -> RunResult<Value> {
        self.get_member(attr)?.execute_function(args, stack)
    }
}

/// An instance of a class with its own per-instance member table.
#[derive(Debug)]
pub struct ObjectValue {
    class: Arc<ClassValue>,
    members: RwLock<AHashMap<AttrId, Value>>,
}

impl ObjectValue {
    pub fn new(class: Arc<ClassValue>) -> Self {
        Self {
            class,
            members: RwLock::new(AHashMap::new()),
        }
    }

    /// Attribute lookup falls back from the instance to the class.
    pub fn get_member(&self, attr: AttrId) -> RunResult<Value> {
        if let Some(value) = self.members.read().get(&attr).cloned() {
            return Ok(value);
        }
        self.class.get_member(attr)
    }

    pub fn set_member(&self, attr: AttrId, value: Value) {
        self.members.write().insert(attr, value);
    }

    /// Method call: an instance-level member is called as-is (a stored
    /// function pointer); a class-level member gets the instance prepended.
    pub fn call_member(
        self: &Arc<Self>,
        attr: AttrId,
        args: Vec<Value>,
        stack: &mut CallStack,
    ) -> RunResult<Value> {
        if let Some(bound) = self.members.read().get(&attr).cloned() {
            return bound.execute_function(args, stack);
        }
        let mut method_args = Vec::with_capacity(args.len() + 1);
        method_args.push(Value::Object(Arc::clone(self)));
        method_args.extend(args);
        self.class.get_member(attr)?.execute_function(method_args, stack)
    }
}
