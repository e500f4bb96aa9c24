//! Built-in module implementations.
//!
//! Scripts import these under fixed names (`from delitepy import nimblenet`)
//! and call their members through attribute dispatch, the same path as any
//! other value.

use crate::error::{RunResult, ScriptError};
use crate::intern::{attr_name, AttrId};
use crate::stack::CallStack;
use crate::value::Value;

pub(crate) mod internal;
pub(crate) mod nimblenet;
pub(crate) mod regex_mod;

/// Built-in modules that can be imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModule {
    /// The primary runtime module (tensors, models, executors, events).
    Nimblenet,
    /// Test-only helpers (`get_chrono_time`, simulated char streams).
    Internal,
    /// Python-like regular expressions with documented divergences.
    Regex,
}

impl BuiltinModule {
    /// Resolves an import name within the builtin package to a module.
    pub fn from_import_name(name: &str) -> Option<Self> {
        match name {
            "nimblenet" => Some(Self::Nimblenet),
            "nimblenetInternalTesting" => Some(Self::Internal),
            "ne_re" => Some(Self::Regex),
            _ => None,
        }
    }

    /// Whether `package` is the builtin package these modules live in.
    pub fn is_builtin_package(package: &str) -> bool {
        package == "delitepy" || package == "nimbleedge"
    }

    pub fn call_attr(
        self,
        attr: AttrId,
        args: Vec<Value>,
        stack: &mut CallStack,
    ) -> RunResult<Value> {
        match self {
            Self::Nimblenet => nimblenet::call(attr, args, stack),
            Self::Internal => internal::call(attr, args, stack),
            Self::Regex => regex_mod::call(attr, args, stack),
        }
    }

    /// The error every module raises when an attribute is not one of its
    /// members.
    pub(crate) fn unknown_member(attr: AttrId) -> ScriptError {
        ScriptError::type_error(format!("{} not implemented for module", attr_name(attr)))
    }
}
