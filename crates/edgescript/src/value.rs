//! The universal polymorphic value.
//!
//! One tagged sum covers every runtime datum. Shared ownership is `Arc`;
//! mutable payloads (lists, maps, tensors, iterator cursors) carry their own
//! locks so values can cross thread-pool workers. Reference cycles through
//! object member tables leak until task teardown.

use std::fmt;
use std::sync::Arc;

use strum::{Display, EnumString, FromRepr, IntoStaticStr};

use crate::error::{arg_count, unsupported, RunResult, ScriptError};
use crate::intern::{attr_name, Attr, AttrId};
use crate::modules::BuiltinModule;
use crate::ops::value_equal;
use crate::stack::CallStack;
use crate::types::class::{ClassValue, ObjectValue};
use crate::types::executor::ConcurrentExecutor;
use crate::types::foreign::ForeignObject;
use crate::types::function::FunctionValue;
use crate::types::future::FutureValue;
use crate::types::iter::ScriptIter;
use crate::types::list::List;
use crate::types::map::ScriptMap;
use crate::types::slice::SliceBounds;
use crate::types::str::ScriptStr;
use crate::types::stream::CharStream;
use crate::types::tensor::{SortDir, Tensor};
use crate::events::{Dataframe, RawEventStore};
use crate::modules::regex_mod::RegexMatch;

/// Element / scalar data types. The discriminants are the wire codes used by
/// the host boundary; they are fixed here because the engine defines the ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, FromRepr)]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    Unknown = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Float = 4,
    Double = 5,
    String = 6,
    UnicodeString = 7,
    Json = 8,
    JsonArray = 9,
    None = 10,
    Function = 11,
    Exception = 12,
    ForeignObject = 13,
    /// Container kinds with no scalar element type (lists, maps, slices).
    Empty = 14,
}

/// Container kinds of the value model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ContainerKind {
    Scalar,
    Tensor,
    Tuple,
    Map,
    Slice,
    Range,
    List,
    Function,
    Class,
}

/// Exception values produced by `Exception(msg)` and bound by `except .. as`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionValue {
    pub message: String,
}

/// The universal runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Unset frame slot; reading one through a name is an error.
    Undefined,
    None,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Str(Arc<ScriptStr>),
    Tensor(Arc<Tensor>),
    List(Arc<List>),
    Tuple(Arc<Vec<Value>>),
    Map(Arc<ScriptMap>),
    Slice(Arc<SliceBounds>),
    Range(i64),
    Iterator(Arc<ScriptIter>),
    Function(Arc<FunctionValue>),
    Class(Arc<ClassValue>),
    Object(Arc<ObjectValue>),
    Future(Arc<FutureValue>),
    Exception(Arc<ExceptionValue>),
    Module(BuiltinModule),
    Executor(Arc<ConcurrentExecutor>),
    EventStore(Arc<RawEventStore>),
    Dataframe(Arc<Dataframe>),
    CharStream(Arc<CharStream>),
    Match(Arc<RegexMatch>),
    Foreign(Arc<dyn ForeignObject>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(Arc::new(ScriptStr::new(s.into())))
    }

    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Arc::new(List::new(items)))
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception(Arc::new(ExceptionValue {
            message: message.into(),
        }))
    }

    /// Builds a value from a JSON document: objects become maps, arrays
    /// become lists, numbers become Int64/Double.
    pub fn from_json(json: &serde_json::Value) -> RunResult<Self> {
        Ok(match json {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Double(f)
                } else {
                    return Err(ScriptError::argument(format!(
                        "Constant value of type=number not supported: {n}"
                    )));
                }
            }
            serde_json::Value::String(s) => Self::string(s.clone()),
            serde_json::Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    list.push(Self::from_json(item)?);
                }
                Self::list(list)
            }
            serde_json::Value::Object(entries) => {
                let map = ScriptMap::new();
                for (key, value) in entries {
                    map.set(key.clone(), Self::from_json(value)?);
                }
                Self::Map(Arc::new(map))
            }
        })
    }

    pub fn container_kind(&self) -> ContainerKind {
        match self {
            Self::Tensor(_) => ContainerKind::Tensor,
            Self::List(_) => ContainerKind::List,
            Self::Tuple(_) => ContainerKind::Tuple,
            Self::Map(_) => ContainerKind::Map,
            Self::Slice(_) => ContainerKind::Slice,
            Self::Range(_) => ContainerKind::Range,
            Self::Function(_) => ContainerKind::Function,
            Self::Class(_) | Self::Object(_) => ContainerKind::Class,
            _ => ContainerKind::Scalar,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::None | Self::Undefined => DataType::None,
            Self::Bool(_) => DataType::Bool,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Str(_) => DataType::String,
            Self::Tensor(t) => t.dtype(),
            Self::Range(_) => DataType::Int64,
            Self::Function(_) => DataType::Function,
            Self::Exception(_) => DataType::Exception,
            Self::Foreign(_) => DataType::ForeignObject,
            Self::List(_) | Self::Tuple(_) | Self::Map(_) | Self::Slice(_) => DataType::Empty,
            _ => DataType::None,
        }
    }

    /// Boolean coercion; total over all kinds.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined => false,
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int32(v) => *v != 0,
            Self::Int64(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Double(v) => *v != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tensor(t) => t.truthy(),
            Self::List(l) => !l.is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::Map(m) => !m.is_empty(),
            Self::Range(n) => *n != 0,
            _ => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_numeric_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int32(_) | Self::Int64(_) | Self::Float(_) | Self::Double(_)
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int32(_) | Self::Int64(_))
    }

    pub fn is_string(&self) -> bool {
        match self {
            Self::Str(_) => true,
            Self::Tensor(t) => t.is_string(),
            _ => false,
        }
    }

    fn cast_error(&self, target: &str) -> ScriptError {
        unsupported(
            &format!("get_{target}"),
            self.container_kind().into(),
            self.data_type().into(),
        )
    }

    /// Numeric cast; strings parse (`int("2")`), bools widen.
    pub fn cast_i64(&self) -> RunResult<i64> {
        match self {
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Int32(v) => Ok(i64::from(*v)),
            Self::Int64(v) => Ok(*v),
            Self::Float(v) => Ok(*v as i64),
            Self::Double(v) => Ok(*v as i64),
            Self::Str(s) => s
                .as_str()
                .trim()
                .parse::<i64>()
                .map_err(|_| ScriptError::argument(format!("cannot cast '{}' to int", s.as_str()))),
            _ => Err(self.cast_error("int64")),
        }
    }

    pub fn cast_i32(&self) -> RunResult<i32> {
        Ok(self.cast_i64()? as i32)
    }

    pub fn cast_f64(&self) -> RunResult<f64> {
        match self {
            Self::Bool(b) => Ok(f64::from(i64::from(*b) as i32)),
            Self::Int32(v) => Ok(f64::from(*v)),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float(v) => Ok(f64::from(*v)),
            Self::Double(v) => Ok(*v),
            Self::Str(s) => s
                .as_str()
                .trim()
                .parse::<f64>()
                .map_err(|_| ScriptError::argument(format!("cannot cast '{}' to float", s.as_str()))),
            _ => Err(self.cast_error("double")),
        }
    }

    pub fn cast_f32(&self) -> RunResult<f32> {
        Ok(self.cast_f64()? as f32)
    }

    /// String content of scalar strings.
    pub fn as_str_value(&self) -> RunResult<String> {
        match self {
            Self::Str(s) => Ok(s.as_str().to_owned()),
            _ => Err(self.cast_error("string")),
        }
    }

    /// `len()`-style size. Scalars report 1, strings their code-point count.
    pub fn size(&self) -> RunResult<i64> {
        match self {
            Self::Str(s) => Ok(s.char_count() as i64),
            Self::Tensor(t) => Ok(t.size()),
            Self::List(l) => Ok(l.len() as i64),
            Self::Tuple(t) => Ok(t.len() as i64),
            Self::Map(m) => Ok(m.len() as i64),
            Self::Range(n) => Ok(*n),
            Self::None
            | Self::Bool(_)
            | Self::Int32(_)
            | Self::Int64(_)
            | Self::Float(_)
            | Self::Double(_)
            | Self::Exception(_) => Ok(1),
            _ => Err(unsupported(
                "get_size",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    pub fn num_elements(&self) -> RunResult<i64> {
        match self {
            Self::Tensor(t) => Ok(t.num_elements() as i64),
            Self::List(l) => Ok(l.len() as i64),
            _ => Err(unsupported(
                "get_numElements",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    pub fn shape(&self) -> RunResult<Vec<i64>> {
        match self {
            Self::Tensor(t) => Ok(t.shape().to_vec()),
            Self::List(l) => Ok(l.shape()),
            _ => Err(unsupported(
                "get_shape",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// Integer subscript with kind-specific index semantics.
    pub fn get_int_subscript(&self, index: i64) -> RunResult<Self> {
        match self {
            Self::Str(s) => Ok(Self::string(s.char_at(index)?.to_owned())),
            Self::Tensor(t) => t.get_int_subscript(index),
            Self::List(l) => l.get(index),
            Self::Tuple(t) => {
                let len = t.len() as i64;
                if index < 0 || index >= len {
                    return Err(ScriptError::index(format!(
                        "trying to access {index} index for tuple of size={len}"
                    )));
                }
                Ok(t[index as usize].clone())
            }
            Self::Range(n) => {
                if index < 0 || index >= *n {
                    return Err(ScriptError::index(format!(
                        "accessing {index} of Range with size={n}"
                    )));
                }
                Ok(Self::Int64(index))
            }
            Self::Future(f) => match f.try_get() {
                Some(value) => value?.get_int_subscript(index),
                None => Err(ScriptError::type_error(format!(
                    "{} is not resolved yet",
                    f.print()
                ))),
            },
            _ => Err(unsupported(
                "get_int_subscript",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    pub fn get_string_subscript(&self, key: &str) -> RunResult<Self> {
        match self {
            Self::Map(m) => m.get(key),
            _ => Err(unsupported(
                "get_string_subscript",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// General subscript: slices dispatch to slice routines, string keys to
    /// map lookup, everything else to integer indexing.
    pub fn get_subscript(&self, subscript: &Self) -> RunResult<Self> {
        if let Self::Slice(bounds) = subscript {
            return match self {
                Self::List(l) => Ok(Self::List(Arc::new(l.slice(bounds)?))),
                Self::Str(s) => Ok(Self::string(s.slice(bounds)?)),
                _ => Err(ScriptError::type_error(
                    "cannot subscript non-list or non-string variable",
                )),
            };
        }
        if subscript.data_type() == DataType::String {
            return self.get_string_subscript(&subscript.as_str_value()?);
        }
        self.get_int_subscript(subscript.cast_i64()?)
    }

    /// In-place subscript assignment; immutable kinds fail.
    pub fn set_subscript(&self, subscript: &Self, value: Self) -> RunResult<()> {
        match self {
            Self::Map(m) => {
                m.set(subscript.as_str_value()?, value);
                Ok(())
            }
            Self::List(l) => l.set(subscript.cast_i64()?, value),
            Self::Tensor(t) => t.set_int_subscript(subscript.cast_i64()?, &value),
            _ => Err(unsupported(
                "set_subscript",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// Membership test (`elem in self`).
    pub fn contains(&self, elem: &Self) -> RunResult<bool> {
        match self {
            Self::Str(s) => Ok(s.contains(&elem.as_str_value()?)),
            Self::Tensor(t) => t.contains(elem),
            Self::List(l) => Ok(l.contains(elem)),
            Self::Map(m) => Ok(m.contains_key(&elem.as_str_value()?)),
            _ => Err(unsupported(
                "in",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// Attribute read by interned index; classes and instances only.
    pub fn get_member(&self, attr: AttrId) -> RunResult<Self> {
        match self {
            Self::Class(c) => c.get_member(attr),
            Self::Object(o) => o.get_member(attr),
            _ => Err(unsupported(
                "get_member",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    pub fn set_member(&self, attr: AttrId, value: Self) -> RunResult<()> {
        match self {
            Self::Class(c) => {
                c.set_member(attr, value);
                Ok(())
            }
            Self::Object(o) => {
                o.set_member(attr, value);
                Ok(())
            }
            _ => Err(unsupported(
                "set_member",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// Calls this value as a function: user/builtin/foreign functions, or a
    /// class (instantiation).
    pub fn execute_function(&self, args: Vec<Self>, stack: &mut CallStack) -> RunResult<Self> {
        match self {
            Self::Function(f) => f.execute_with_stack(args, stack),
            Self::Class(c) => c.instantiate(args, stack),
            _ => Err(unsupported(
                "execute_function",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// Calls this value as a function without a caller stack; used by
    /// host-triggered hooks.
    pub fn execute_function_detached(&self, args: Vec<Self>) -> RunResult<Self> {
        match self {
            Self::Function(f) => f.execute_detached(args),
            _ => Err(unsupported(
                "execute_function",
                self.container_kind().into(),
                self.data_type().into(),
            )),
        }
    }

    /// Calls a named method (`value.attr(args...)`), dispatching first by
    /// kind and then through the shared member surface.
    pub fn call_attr(&self, attr: AttrId, args: Vec<Self>, stack: &mut CallStack) -> RunResult<Self> {
        match self {
            Self::Module(module) => return module.call_attr(attr, args, stack),
            Self::Executor(executor) => {
                if attr == Attr::Sync.id() {
                    return executor.run_sync(args, stack);
                }
                if attr == Attr::RunParallel.id() {
                    return executor.run_parallel(args, stack);
                }
            }
            Self::Class(c) => return c.call_member(attr, args, stack),
            Self::Object(o) => return o.call_member(attr, args, stack),
            Self::Foreign(obj) => return obj.call_method(&attr_name(attr), args),
            Self::Future(f) => {
                if attr == Attr::IsAvailable.id() {
                    expect_args("is_available", &args, 0)?;
                    return Ok(Self::Bool(f.is_available()));
                }
                if attr == Attr::Get.id() || attr == Attr::WaitForCompletion.id() {
                    expect_args("get", &args, 0)?;
                    let future = Arc::clone(f);
                    return stack.with_lock_released(move || future.wait());
                }
                // Anything else forwards to the resolved value.
                return match f.try_get() {
                    Some(value) => value?.call_attr(attr, args, stack),
                    None => Err(ScriptError::type_error(format!(
                        "{} is not resolved yet",
                        f.print()
                    ))),
                };
            }
            Self::Str(s) => {
                if attr == Attr::Upper.id() {
                    expect_args("upper", &args, 0)?;
                    return Ok(Self::string(s.to_uppercase()));
                }
                if attr == Attr::Lower.id() {
                    expect_args("lower", &args, 0)?;
                    return Ok(Self::string(s.to_lowercase()));
                }
                if attr == Attr::Strip.id() {
                    expect_args("strip", &args, 0)?;
                    return Ok(Self::string(s.strip().to_owned()));
                }
                if attr == Attr::Join.id() {
                    expect_args("join", &args, 1)?;
                    let count = args[0].size()?;
                    let mut parts = Vec::with_capacity(count as usize);
                    for i in 0..count {
                        parts.push(args[0].get_int_subscript(i)?.as_str_value()?);
                    }
                    return Ok(Self::string(parts.join(s.as_str())));
                }
            }
            Self::List(l) => {
                if attr == Attr::Pop.id() {
                    expect_args("pop", &args, 1)?;
                    return l.pop(args[0].cast_i64()?);
                }
                if attr == Attr::Tensor.id() {
                    expect_args("tensor", &args, 1)?;
                    return Ok(Self::Tensor(Arc::new(l.to_tensor(&args[0])?)));
                }
                if attr == Attr::Arrange.id() {
                    expect_args("arrange", &args, 1)?;
                    return Ok(Self::List(Arc::new(l.arrange(&args[0])?)));
                }
            }
            Self::Map(m) => {
                if attr == Attr::Pop.id() {
                    expect_args("pop", &args, 1)?;
                    return m.pop(&args[0].as_str_value()?);
                }
                if attr == Attr::Keys.id() {
                    expect_args("keys", &args, 0)?;
                    let keys = m.keys().into_iter().map(Self::string).collect();
                    return Ok(Self::list(keys));
                }
            }
            Self::Tensor(t) => {
                if attr == Attr::Sort.id() {
                    expect_args("sort", &args, 1)?;
                    t.sort(SortDir::parse(&args[0])?)?;
                    return Ok(self.clone());
                }
                if attr == Attr::Argsort.id() {
                    expect_args("argsort", &args, 1)?;
                    return Ok(Self::Tensor(Arc::new(t.argsort(SortDir::parse(&args[0])?)?)));
                }
                if attr == Attr::Topk.id() {
                    expect_args("topk", &args, 2)?;
                    let k = args[0].cast_i64()?;
                    return Ok(Self::Tensor(Arc::new(t.topk(k, SortDir::parse(&args[1])?)?)));
                }
                if attr == Attr::Arrange.id() {
                    expect_args("arrange", &args, 1)?;
                    return Ok(Self::Tensor(Arc::new(t.arrange(&args[0])?)));
                }
            }
            Self::Iterator(it) => {
                if attr == Attr::Next.id() {
                    expect_args("next", &args, 0)?;
                    return it.next(stack);
                }
            }
            Self::CharStream(stream) => {
                if attr == Attr::Finished.id() {
                    expect_args("finished", &args, 0)?;
                    return Ok(Self::Bool(stream.finished()));
                }
                if attr == Attr::NextAvailable.id() {
                    expect_args("next_available", &args, 0)?;
                    return Ok(match stream.next_available() {
                        Some(c) => Self::string(c.to_string()),
                        None => Self::None,
                    });
                }
                if attr == Attr::GetBlockingStr.id() {
                    expect_args("get_blocking_str", &args, 0)?;
                    let stream = Arc::clone(stream);
                    return Ok(Self::string(
                        stack.with_lock_released(move || stream.get_blocking_str()),
                    ));
                }
            }
            Self::Match(m) => return m.call_attr(attr, args),
            Self::Dataframe(df) => {
                if attr == Attr::Append.id() {
                    expect_args("append", &args, 1)?;
                    df.append(&args[0])?;
                    return Ok(Self::None);
                }
            }
            _ => {}
        }
        self.common_call(attr, args, stack)
    }

    /// The shared member surface every kind falls back to.
    fn common_call(&self, attr: AttrId, args: Vec<Self>, _stack: &mut CallStack) -> RunResult<Self> {
        if attr == Attr::Shape.id() {
            expect_args("shape", &args, 0)?;
            let shape = self.shape()?;
            return Ok(Self::list(shape.into_iter().map(Self::Int64).collect()));
        }
        if attr == Attr::Reshape.id() {
            expect_args("reshape", &args, 1)?;
            let dims = args[0].size()?;
            let mut shape = Vec::with_capacity(dims as usize);
            for i in 0..dims {
                shape.push(args[0].get_int_subscript(i)?.cast_i64()?);
            }
            return match self {
                Self::Tensor(t) => {
                    t.reshape(&shape)?;
                    Ok(self.clone())
                }
                _ => Err(unsupported(
                    "reshape",
                    self.container_kind().into(),
                    self.data_type().into(),
                )),
            };
        }
        if attr == Attr::Append.id() {
            expect_args("append", &args, 1)?;
            return match self {
                Self::List(l) => {
                    l.push(args.into_iter().next().expect("arity checked"));
                    Ok(self.clone())
                }
                _ => Err(unsupported(
                    "append",
                    self.container_kind().into(),
                    self.data_type().into(),
                )),
            };
        }
        if attr == Attr::Iterator.id() {
            expect_args("iterator", &args, 0)?;
            return Ok(Self::Iterator(Arc::new(ScriptIter::over_sequence(self.clone())?)));
        }
        if attr == Attr::IsInteger.id() {
            expect_args("is_integer", &args, 0)?;
            return Ok(Self::Bool(self.is_integer()));
        }
        if attr == Attr::IsFloat.id() {
            expect_args("is_float", &args, 0)?;
            return Ok(Self::Bool(
                self.is_numeric_scalar() && !self.is_integer() && !matches!(self, Self::Bool(_)),
            ));
        }
        if attr == Attr::IsString.id() {
            expect_args("is_string", &args, 0)?;
            return Ok(Self::Bool(self.is_string()));
        }
        Err(unsupported(
            &attr_name(attr),
            self.container_kind().into(),
            self.data_type().into(),
        ))
    }

    /// Printable form.
    pub fn print_string(&self) -> String {
        match self {
            Self::Undefined => "<undefined>".to_owned(),
            Self::None => self.fallback_print(),
            Self::Bool(b) => b.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float(v) => ryu::Buffer::new().format(*v).to_owned(),
            Self::Double(v) => ryu::Buffer::new().format(*v).to_owned(),
            Self::Str(s) => s.as_str().to_owned(),
            Self::Tensor(t) => t.print(),
            Self::List(l) => l.print(),
            Self::Tuple(t) => {
                let parts: Vec<String> = t.iter().map(Self::print_string).collect();
                format!("({})", parts.join(", "))
            }
            Self::Map(m) => m.to_json().to_string(),
            Self::Slice(s) => s.print(),
            Self::Iterator(it) => it.print(),
            Self::Exception(e) => e.message.clone(),
            Self::Future(f) => f.print(),
            _ => self.fallback_print(),
        }
    }

    fn fallback_print(&self) -> String {
        format!("<{}({})>", self.container_kind(), self.data_type())
    }

    /// JSON form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::None | Self::Undefined => serde_json::Value::Null,
            Self::Bool(b) => serde_json::json!(b),
            Self::Int32(v) => serde_json::json!(v),
            Self::Int64(v) => serde_json::json!(v),
            Self::Float(v) => serde_json::json!(v),
            Self::Double(v) => serde_json::json!(v),
            Self::Str(s) => serde_json::json!(s.as_str()),
            Self::Tensor(t) => t.to_json(),
            Self::List(l) => l.to_json(),
            Self::Tuple(t) => serde_json::Value::Array(t.iter().map(Self::to_json).collect()),
            Self::Map(m) => m.to_json(),
            Self::Slice(s) => s.to_json(),
            Self::Range(_) => serde_json::json!("[Range]"),
            Self::Function(_) => serde_json::json!("[Function]"),
            Self::Class(_) => serde_json::json!("[Class]"),
            Self::Object(_) => serde_json::json!("[ClassObject]"),
            Self::Exception(_) => serde_json::json!("[Exception]"),
            Self::Future(f) => serde_json::json!(f.print()),
            Self::Foreign(obj) => obj.to_json(),
            _ => serde_json::json!(self.fallback_print()),
        }
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

/// Structural equality used by tests and host-side comparisons. Scalars and
/// strings compare by content (via the promoted-equality rules); composite
/// kinds compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::List(a), Self::List(b)) => Arc::ptr_eq(a, b) || value_equal(self, other),
            (Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b) || value_equal(self, other),
            (Self::Tuple(a), Self::Tuple(b)) => Arc::ptr_eq(a, b) || a.as_slice() == b.as_slice(),
            (Self::Tensor(a), Self::Tensor(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Future(a), Self::Future(b)) => Arc::ptr_eq(a, b),
            _ => {
                if self.container_kind() != other.container_kind() {
                    return false;
                }
                value_equal(self, other)
            }
        }
    }
}

pub(crate) fn expect_args(func: &str, args: &[Value], expected: usize) -> RunResult<()> {
    if args.len() != expected {
        return Err(arg_count(func, expected, args.len()));
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_names_are_wire_spellings() {
        assert_eq!(DataType::Int32.to_string(), "int32");
        assert_eq!("double".parse::<DataType>().unwrap(), DataType::Double);
        assert_eq!(DataType::Int64 as i32, 3);
    }

    #[test]
    fn json_round_trip_through_values() {
        let json = serde_json::json!({"a": 1, "b": [1.5, "x", null], "c": {"d": true}});
        let value = Value::from_json(&json).unwrap();
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn subscript_dispatch() {
        let map = ScriptMap::new();
        map.set("k", Value::Int64(1));
        let m = Value::Map(Arc::new(map));
        assert_eq!(m.get_subscript(&Value::string("k")).unwrap(), Value::Int64(1));
        assert!(m.get_subscript(&Value::string("missing")).is_err());

        let l = Value::list(vec![Value::Int64(10), Value::Int64(20)]);
        assert_eq!(l.get_subscript(&Value::Int64(-1)).unwrap(), Value::Int64(20));
    }

    #[test]
    fn range_subscripting() {
        let r = Value::Range(3);
        assert_eq!(r.get_int_subscript(2).unwrap(), Value::Int64(2));
        assert!(r.get_int_subscript(3).is_err());
        assert_eq!(r.size().unwrap(), 3);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::string("x").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(Value::Range(1).truthy());
        assert!(!Value::Range(0).truthy());
    }
}
