//! The C-ABI wire format for passing values across the host boundary.
//!
//! A [`WireTensor`] is the single struct used for arguments and results.
//! Interpretation of `data` by data type:
//!
//! - primitive scalar types: pointer to the cell
//! - primitive tensors: pointer to the element buffer, row-major
//! - string scalar: pointer to a pointer to a NUL-terminated string
//! - string tensor: pointer to an array of pointers to NUL-terminated strings
//! - `Json` / `JsonArray` / `Function`: pointer to a runtime [`Value`]
//!   handle, opaque to the host
//!
//! Inbound conversion copies (or, per the caller's mode, assumes ownership
//! transfer of) the host buffers. Outbound conversion materializes owned
//! storage inside [`WireTensorOut`]; every exposed pointer is valid exactly
//! while that struct lives.

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use crate::error::{RunResult, ScriptError};
use crate::types::map::ScriptMap;
use crate::types::tensor::{Tensor, TensorBuf};
use crate::value::{DataType, Value};

/// The wire tensor struct shared with the host ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireTensor {
    /// Optional NUL-terminated tensor name; null for anonymous values.
    pub name: *const c_char,
    /// Integer code from [`DataType`].
    pub data_type: i32,
    /// Shape pointer; null for scalars.
    pub shape: *const i64,
    pub shape_len: usize,
    /// Payload pointer, interpreted per the table above.
    pub data: *mut c_void,
}

/// A list of wire tensors (the argument/result map flattened to entries).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireTensorList {
    pub tensors: *const WireTensor,
    pub len: usize,
}

/// Host-boundary status: zero code means success.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireStatus {
    pub code: i32,
    pub message: *const c_char,
}

/// Whether inbound primitive buffers are copied or ownership is assumed to
/// transfer (the host promises not to touch the buffer again).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    Copy,
    Move,
}

fn dtype_of(code: i32) -> RunResult<DataType> {
    DataType::from_repr(code)
        .ok_or_else(|| ScriptError::argument(format!("{code} is not a wire data type")))
}

unsafe fn shape_of(wire: &WireTensor) -> Vec<i64> {
    if wire.shape.is_null() || wire.shape_len == 0 {
        return Vec::new();
    }
    // SAFETY: the host guarantees `shape` points at `shape_len` dimensions.
    unsafe { std::slice::from_raw_parts(wire.shape, wire.shape_len) }.to_vec()
}

unsafe fn copy_buffer<T: Copy>(data: *mut c_void, len: usize) -> Vec<T> {
    // SAFETY: the host guarantees `data` points at `len` elements of T.
    unsafe { std::slice::from_raw_parts(data.cast::<T>(), len) }.to_vec()
}

unsafe fn string_at(ptr: *const c_char) -> RunResult<String> {
    if ptr.is_null() {
        return Err(ScriptError::argument("null string in wire tensor"));
    }
    // SAFETY: the host guarantees NUL-terminated strings.
    let c = unsafe { CStr::from_ptr(ptr) };
    c.to_str()
        .map(str::to_owned)
        .map_err(|_| ScriptError::argument("wire string is not valid UTF-8"))
}

/// Reads the opaque runtime-value handle carried for Json/JsonArray/Function
/// entries.
unsafe fn handle_at(data: *mut c_void) -> RunResult<Value> {
    if data.is_null() {
        return Err(ScriptError::argument("null value handle in wire tensor"));
    }
    // SAFETY: for handle-typed entries, `data` points at a live engine Value.
    Ok(unsafe { &*data.cast::<Value>() }.clone())
}

/// Converts an inbound wire tensor with a shape into a tensor value.
///
/// # Safety
/// `wire` must describe live host memory per the wire contract.
pub unsafe fn tensor_from_wire(wire: &WireTensor, _mode: WireMode) -> RunResult<Value> {
    let dtype = dtype_of(wire.data_type)?;
    // SAFETY: forwarded from the caller's contract.
    let shape = unsafe { shape_of(wire) };
    let numel: i64 = shape.iter().product();
    let numel = numel as usize;
    let buf = match dtype {
        // SAFETY: numeric buffers hold `numel` elements of the coded type.
        DataType::Bool => TensorBuf::Bool(unsafe { copy_buffer::<bool>(wire.data, numel) }),
        DataType::Int32 => TensorBuf::I32(unsafe { copy_buffer::<i32>(wire.data, numel) }),
        DataType::Int64 => TensorBuf::I64(unsafe { copy_buffer::<i64>(wire.data, numel) }),
        DataType::Float => TensorBuf::F32(unsafe { copy_buffer::<f32>(wire.data, numel) }),
        DataType::Double => TensorBuf::F64(unsafe { copy_buffer::<f64>(wire.data, numel) }),
        DataType::String => {
            // SAFETY: a string tensor's data is an array of `numel` C strings.
            let ptrs = unsafe { copy_buffer::<*const c_char>(wire.data, numel) };
            let mut strings = Vec::with_capacity(numel);
            for ptr in ptrs {
                // SAFETY: each entry is NUL-terminated per the contract.
                strings.push(unsafe { string_at(ptr) }?);
            }
            TensorBuf::Str(strings)
        }
        // SAFETY: handle-typed entries carry a runtime value pointer.
        DataType::JsonArray => return unsafe { handle_at(wire.data) },
        other => {
            return Err(ScriptError::argument(format!(
                "{other} datatype is not supported for a tensor variable in input to script."
            )))
        }
    };
    Ok(Value::Tensor(Arc::new(Tensor::new(buf, &shape)?)))
}

/// Converts an inbound wire tensor without a shape into a scalar value.
///
/// # Safety
/// `wire` must describe live host memory per the wire contract.
pub unsafe fn scalar_from_wire(wire: &WireTensor) -> RunResult<Value> {
    let dtype = dtype_of(wire.data_type)?;
    Ok(match dtype {
        DataType::None => Value::None,
        // SAFETY: primitive scalars carry a pointer to one cell.
        DataType::Bool => Value::Bool(unsafe { *wire.data.cast::<bool>() }),
        DataType::Int32 => Value::Int32(unsafe { *wire.data.cast::<i32>() }),
        DataType::Int64 => Value::Int64(unsafe { *wire.data.cast::<i64>() }),
        DataType::Float => Value::Float(unsafe { *wire.data.cast::<f32>() }),
        DataType::Double => Value::Double(unsafe { *wire.data.cast::<f64>() }),
        DataType::String => {
            // SAFETY: string scalar data is a pointer to one C-string pointer.
            let ptr = unsafe { *wire.data.cast::<*const c_char>() };
            // SAFETY: the pointed-to string is NUL-terminated.
            Value::string(unsafe { string_at(ptr) }?)
        }
        // SAFETY: handle-typed entries carry a runtime value pointer.
        DataType::Json | DataType::JsonArray | DataType::Function | DataType::ForeignObject => {
            unsafe { handle_at(wire.data) }?
        }
        other => {
            return Err(ScriptError::argument(format!(
                "{other} datatype is not supported for a single variable in input to script."
            )))
        }
    })
}

/// Converts a full inbound tensor list into the input map for `operate`.
///
/// # Safety
/// Every entry must describe live host memory per the wire contract and
/// carry a non-null name.
pub unsafe fn map_from_wire(list: &WireTensorList, mode: WireMode) -> RunResult<Value> {
    let map = ScriptMap::new();
    if list.len > 0 {
        // SAFETY: the host guarantees `tensors` points at `len` entries.
        let entries = unsafe { std::slice::from_raw_parts(list.tensors, list.len) };
        for wire in entries {
            // SAFETY: names are NUL-terminated per the contract.
            let name = unsafe { string_at(wire.name) }?;
            let value = if wire.shape_len > 0 {
                // SAFETY: forwarded from the caller's contract.
                unsafe { tensor_from_wire(wire, mode) }?
            } else {
                // SAFETY: forwarded from the caller's contract.
                unsafe { scalar_from_wire(wire) }?
            };
            map.set(name, value);
        }
    }
    Ok(Value::Map(Arc::new(map)))
}

/// Owned payload backing an outbound wire tensor.
#[derive(Debug)]
enum WireData {
    Bool(Vec<bool>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Owned strings plus the pointer table exposed to the host.
    Str {
        _owned: Vec<CString>,
        ptrs: Vec<*const c_char>,
    },
    /// Boxed runtime value handle for Json/JsonArray/Function entries.
    Handle(Box<Value>),
    None,
}

impl WireData {
    fn data_ptr(&mut self) -> *mut c_void {
        match self {
            Self::Bool(v) => v.as_mut_ptr().cast(),
            Self::I32(v) => v.as_mut_ptr().cast(),
            Self::I64(v) => v.as_mut_ptr().cast(),
            Self::F32(v) => v.as_mut_ptr().cast(),
            Self::F64(v) => v.as_mut_ptr().cast(),
            Self::Str { ptrs, .. } => ptrs.as_mut_ptr().cast(),
            Self::Handle(value) => std::ptr::from_mut::<Value>(value.as_mut()).cast(),
            Self::None => std::ptr::null_mut(),
        }
    }
}

/// An outbound wire tensor together with the storage its pointers reference.
#[derive(Debug)]
pub struct WireTensorOut {
    name: CString,
    shape: Vec<i64>,
    data: WireData,
    data_type: DataType,
}

impl WireTensorOut {
    /// The raw struct handed to the host; valid while `self` lives.
    pub fn as_wire(&mut self) -> WireTensor {
        WireTensor {
            name: self.name.as_ptr(),
            data_type: self.data_type as i32,
            shape: if self.shape.is_empty() {
                std::ptr::null()
            } else {
                self.shape.as_ptr()
            },
            shape_len: self.shape.len(),
            data: self.data.data_ptr(),
        }
    }
}

fn cstring(name: &str) -> CString {
    CString::new(name).unwrap_or_default()
}

fn strings_to_wire(strings: Vec<String>) -> WireData {
    let owned: Vec<CString> = strings.into_iter().map(|s| cstring(&s)).collect();
    let ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
    WireData::Str { _owned: owned, ptrs }
}

/// Converts one value to its outbound wire representation.
pub fn wire_from_value(name: &str, value: &Value) -> RunResult<WireTensorOut> {
    let name = cstring(name);
    let out = match value {
        Value::None => WireTensorOut {
            name,
            shape: Vec::new(),
            data: WireData::None,
            data_type: DataType::None,
        },
        Value::Bool(b) => scalar_out(name, WireData::Bool(vec![*b]), DataType::Bool),
        Value::Int32(v) => scalar_out(name, WireData::I32(vec![*v]), DataType::Int32),
        Value::Int64(v) => scalar_out(name, WireData::I64(vec![*v]), DataType::Int64),
        Value::Float(v) => scalar_out(name, WireData::F32(vec![*v]), DataType::Float),
        Value::Double(v) => scalar_out(name, WireData::F64(vec![*v]), DataType::Double),
        Value::Str(s) => scalar_out(
            name,
            strings_to_wire(vec![s.as_str().to_owned()]),
            DataType::String,
        ),
        Value::Tensor(tensor) => {
            let shape = tensor.shape().to_vec();
            let data = tensor.with_buf(|buf, offset, numel| match buf {
                TensorBuf::Bool(v) => WireData::Bool(v[offset..offset + numel].to_vec()),
                TensorBuf::I32(v) => WireData::I32(v[offset..offset + numel].to_vec()),
                TensorBuf::I64(v) => WireData::I64(v[offset..offset + numel].to_vec()),
                TensorBuf::F32(v) => WireData::F32(v[offset..offset + numel].to_vec()),
                TensorBuf::F64(v) => WireData::F64(v[offset..offset + numel].to_vec()),
                TensorBuf::Str(v) => strings_to_wire(v[offset..offset + numel].to_vec()),
            });
            WireTensorOut {
                name,
                shape,
                data,
                data_type: tensor.dtype(),
            }
        }
        Value::Map(_) => WireTensorOut {
            name,
            shape: Vec::new(),
            data: WireData::Handle(Box::new(value.clone())),
            data_type: DataType::Json,
        },
        Value::List(list) => WireTensorOut {
            name,
            shape: vec![list.len() as i64],
            data: WireData::Handle(Box::new(value.clone())),
            data_type: DataType::JsonArray,
        },
        Value::Function(_) => WireTensorOut {
            name,
            shape: Vec::new(),
            data: WireData::Handle(Box::new(value.clone())),
            data_type: DataType::Function,
        },
        other => {
            return Err(ScriptError::type_error(format!(
                "Cannot convert container of type {} to wire tensor",
                other.container_kind()
            )))
        }
    };
    Ok(out)
}

fn scalar_out(name: CString, data: WireData, data_type: DataType) -> WireTensorOut {
    WireTensorOut {
        name,
        shape: Vec::new(),
        data,
        data_type,
    }
}

/// The outbound form of an `operate` result map: one entry per key, with a
/// helper to view them as a contiguous wire list.
#[derive(Debug, Default)]
pub struct WireOutputs {
    items: Vec<WireTensorOut>,
    wires: Vec<WireTensor>,
}

impl WireOutputs {
    pub fn from_map(map: &ScriptMap) -> RunResult<Self> {
        let mut items = Vec::with_capacity(map.len());
        for (key, value) in map.snapshot() {
            items.push(wire_from_value(&key, &value)?);
        }
        let wires = items.iter_mut().map(WireTensorOut::as_wire).collect();
        Ok(Self { items, wires })
    }

    pub fn as_list(&self) -> WireTensorList {
        WireTensorList {
            tensors: self.wires.as_ptr(),
            len: self.wires.len(),
        }
    }
}

/// Owned status with its C view; `code` 0 is success.
#[derive(Debug)]
pub struct StatusOut {
    code: i32,
    message: CString,
}

impl StatusOut {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: CString::default(),
        }
    }

    pub fn from_error(err: &ScriptError) -> Self {
        Self {
            code: if err.code != 0 { err.code } else { 1 },
            message: cstring(&err.to_string()),
        }
    }

    pub fn as_wire(&self) -> WireStatus {
        WireStatus {
            code: self.code,
            message: self.message.as_ptr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_tensor_round_trips_byte_for_byte() {
        let source = Value::Tensor(Arc::new(
            Tensor::new(TensorBuf::I64(vec![1, 2, 3, 4, 5, 6]), &[2, 3]).unwrap(),
        ));
        let mut out = wire_from_value("t", &source).unwrap();
        let wire = out.as_wire();
        // SAFETY: `out` owns the buffers `wire` points at and outlives the call.
        let back = unsafe { tensor_from_wire(&wire, WireMode::Copy) }.unwrap();
        let Value::Tensor(t) = &back else {
            panic!("expected tensor");
        };
        assert_eq!(t.dtype(), DataType::Int64);
        assert_eq!(t.shape().as_slice(), &[2, 3]);
        for i in 0..6 {
            assert_eq!(t.element(i), Value::Int64(i as i64 + 1));
        }
    }

    #[test]
    fn string_scalar_round_trips() {
        let mut out = wire_from_value("s", &Value::string("héllo")).unwrap();
        let wire = out.as_wire();
        assert_eq!(wire.shape_len, 0);
        // SAFETY: `out` owns the string table `wire` points at.
        let back = unsafe { scalar_from_wire(&wire) }.unwrap();
        assert_eq!(back, Value::string("héllo"));
    }

    #[test]
    fn map_entries_round_trip() {
        let map = ScriptMap::new();
        map.set("x", Value::Int64(7));
        map.set("s", Value::string("a"));
        let outputs = WireOutputs::from_map(&map).unwrap();
        let list = outputs.as_list();
        // SAFETY: `outputs` owns every buffer referenced by `list`.
        let back = unsafe { map_from_wire(&list, WireMode::Copy) }.unwrap();
        let Value::Map(m) = back else { panic!("expected map") };
        assert_eq!(m.get("x").unwrap(), Value::Int64(7));
        assert_eq!(m.get("s").unwrap(), Value::string("a"));
    }
}
