//! Typed n-dimensional tensors and their kernels.
//!
//! A [`Tensor`] is a view over a shared dense buffer: the buffer is owned
//! behind `Arc<RwLock<..>>` so slice views (produced by integer subscripts on
//! tensors of rank > 1) share storage with their source. Numeric buffers are
//! contiguous vectors in row-major order; string tensors own their strings.
//!
//! Empty tensors are ordinary tensors with zero elements and shape `[0]`;
//! they are falsy and keep their intended element type.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};
use strum::EnumString;

use crate::error::{RunResult, ScriptError};
use crate::value::{DataType, Value};

pub type Shape = SmallVec<[i64; 4]>;

/// Sort direction accepted by `sort`, `argsort` and `topk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(value: &Value) -> RunResult<Self> {
        let text = value.as_str_value()?;
        Self::from_str(&text).map_err(|_| {
            ScriptError::argument(format!(
                "sort direction should be either asc/desc. Given {text} argument."
            ))
        })
    }
}

/// The dense storage of a tensor.
#[derive(Debug)]
pub enum TensorBuf {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TensorBuf {
    pub fn len(&self) -> usize {
        match self {
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::I32(_) => DataType::Int32,
            Self::I64(_) => DataType::Int64,
            Self::F32(_) => DataType::Float,
            Self::F64(_) => DataType::Double,
            Self::Bool(_) => DataType::Bool,
            Self::Str(_) => DataType::String,
        }
    }
}

#[derive(Debug)]
pub struct Tensor {
    buf: Arc<RwLock<TensorBuf>>,
    /// Element offset of this view into the shared buffer.
    offset: usize,
    /// Number of elements in this view.
    numel: usize,
    shape: RwLock<Shape>,
    dtype: DataType,
}

fn shape_product(shape: &[i64]) -> i64 {
    shape.iter().product()
}

impl Tensor {
    fn from_parts(buf: TensorBuf, shape: Shape) -> Self {
        let dtype = buf.dtype();
        let numel = buf.len();
        Self {
            buf: Arc::new(RwLock::new(buf)),
            offset: 0,
            numel,
            shape: RwLock::new(shape),
            dtype,
        }
    }

    /// Builds a tensor from a full buffer, checking the shape is consistent.
    pub fn new(buf: TensorBuf, shape: &[i64]) -> RunResult<Self> {
        if shape_product(shape) != buf.len() as i64 {
            return Err(ScriptError::argument(format!(
                "shape {shape:?} does not match buffer of {} elements",
                buf.len()
            )));
        }
        Ok(Self::from_parts(buf, Shape::from_slice(shape)))
    }

    /// A zero-element tensor of the given element type, shape `[0]`.
    pub fn empty(dtype: DataType) -> Self {
        let buf = match dtype {
            DataType::Int32 => TensorBuf::I32(Vec::new()),
            DataType::Int64 => TensorBuf::I64(Vec::new()),
            DataType::Float => TensorBuf::F32(Vec::new()),
            DataType::Double => TensorBuf::F64(Vec::new()),
            DataType::Bool => TensorBuf::Bool(Vec::new()),
            _ => TensorBuf::Str(Vec::new()),
        };
        let mut tensor = Self::from_parts(buf, smallvec![0]);
        tensor.dtype = dtype;
        tensor
    }

    /// Zero-filled tensor, used by `nimblenet.zeros`.
    pub fn zeros(shape: &[i64], dtype: DataType) -> RunResult<Self> {
        if shape.len() == 1 && shape[0] == 0 {
            return Ok(Self::empty(dtype));
        }
        let mut numel: i64 = 1;
        for &dim in shape {
            if dim <= 0 {
                return Err(ScriptError::argument(format!("dimension {dim} is invalid")));
            }
            numel *= dim;
        }
        let numel = numel as usize;
        let buf = match dtype {
            DataType::Int32 => TensorBuf::I32(vec![0; numel]),
            DataType::Int64 => TensorBuf::I64(vec![0; numel]),
            DataType::Float => TensorBuf::F32(vec![0.0; numel]),
            DataType::Double => TensorBuf::F64(vec![0.0; numel]),
            DataType::Bool => TensorBuf::Bool(vec![false; numel]),
            DataType::String => TensorBuf::Str(vec![String::new(); numel]),
            other => {
                return Err(ScriptError::argument(format!(
                    "cannot create tensor with dType={other}"
                )))
            }
        };
        Self::new(buf, shape)
    }

    /// A rank-1 view into `source` starting at element `offset`.
    fn view(source: &Self, offset: usize, numel: usize, shape: Shape) -> Self {
        Self {
            buf: Arc::clone(&source.buf),
            offset,
            numel,
            shape: RwLock::new(shape),
            dtype: source.dtype,
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> Shape {
        self.shape.read().clone()
    }

    pub fn num_elements(&self) -> usize {
        self.numel
    }

    /// Leading-dimension size; scalar-like views report 1.
    pub fn size(&self) -> i64 {
        let shape = self.shape.read();
        if shape.is_empty() {
            1
        } else {
            shape[0]
        }
    }

    pub fn truthy(&self) -> bool {
        self.numel != 0
    }

    pub fn is_string(&self) -> bool {
        self.dtype == DataType::String
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.dtype, DataType::Int32 | DataType::Int64)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.dtype,
            DataType::Bool | DataType::Int32 | DataType::Int64 | DataType::Float | DataType::Double
        )
    }

    /// Runs `f` with the shared buffer and this view's element range.
    pub fn with_buf<R>(&self, f: impl FnOnce(&TensorBuf, usize, usize) -> R) -> R {
        let buf = self.buf.read();
        f(&buf, self.offset, self.numel)
    }

    fn with_buf_mut<R>(&self, f: impl FnOnce(&mut TensorBuf, usize, usize) -> R) -> R {
        let mut buf = self.buf.write();
        f(&mut buf, self.offset, self.numel)
    }

    /// Reads one element of this view as a scalar value.
    pub fn element(&self, idx: usize) -> Value {
        self.with_buf(|buf, offset, _| match buf {
            TensorBuf::I32(v) => Value::Int32(v[offset + idx]),
            TensorBuf::I64(v) => Value::Int64(v[offset + idx]),
            TensorBuf::F32(v) => Value::Float(v[offset + idx]),
            TensorBuf::F64(v) => Value::Double(v[offset + idx]),
            TensorBuf::Bool(v) => Value::Bool(v[offset + idx]),
            TensorBuf::Str(v) => Value::string(v[offset + idx].clone()),
        })
    }

    fn write_element(&self, idx: usize, value: &Value) -> RunResult<()> {
        self.with_buf_mut(|buf, offset, _| match buf {
            TensorBuf::I32(v) => {
                v[offset + idx] = value.cast_i32()?;
                Ok(())
            }
            TensorBuf::I64(v) => {
                v[offset + idx] = value.cast_i64()?;
                Ok(())
            }
            TensorBuf::F32(v) => {
                v[offset + idx] = value.cast_f32()?;
                Ok(())
            }
            TensorBuf::F64(v) => {
                v[offset + idx] = value.cast_f64()?;
                Ok(())
            }
            TensorBuf::Bool(v) => {
                v[offset + idx] = value.truthy();
                Ok(())
            }
            TensorBuf::Str(v) => {
                v[offset + idx] = value.as_str_value()?;
                Ok(())
            }
        })
    }

    /// Integer subscript: a scalar for rank-1 tensors, a shared slice view
    /// for higher ranks.
    pub fn get_int_subscript(&self, index: i64) -> RunResult<Value> {
        let shape = self.shape.read().clone();
        if shape.is_empty() {
            return Err(ScriptError::index(format!(
                "cannot access index {index} of empty shape"
            )));
        }
        let size = shape[0];
        if index < 0 || index >= size {
            return Err(ScriptError::index(format!(
                "trying to access {index} index for tensor of size={size}"
            )));
        }
        if shape.len() == 1 {
            Ok(self.element(index as usize))
        } else {
            let slice_len = self.numel / size as usize;
            let start = self.offset + slice_len * index as usize;
            let tail: Shape = shape[1..].iter().copied().collect();
            Ok(Value::Tensor(Arc::new(Self::view(self, start, slice_len, tail))))
        }
    }

    /// Subscript assignment: a scalar cell for rank-1 tensors, otherwise a
    /// whole sub-tensor whose dtype and shape must match the tail.
    pub fn set_int_subscript(&self, index: i64, value: &Value) -> RunResult<()> {
        let shape = self.shape.read().clone();
        if shape.is_empty() {
            return Err(ScriptError::index(format!(
                "cannot set index {index} of empty shape"
            )));
        }
        let size = shape[0];
        if index < 0 || index >= size {
            return Err(ScriptError::index(format!(
                "trying to set {index} index for tensor of size={size}"
            )));
        }
        let slice_len = self.numel / size as usize;
        if slice_len == 1 && shape.len() == 1 {
            return self.write_element(index as usize, value);
        }

        let Value::Tensor(src) = value else {
            return Err(ScriptError::type_error(
                "can only assign a tensor to a multi-dimensional tensor index",
            ));
        };
        if src.dtype() != self.dtype {
            return Err(ScriptError::type_error(format!(
                "datatype not matching for setting {}, {}",
                self.dtype,
                src.dtype()
            )));
        }
        let src_shape = src.shape();
        if src_shape.len() != shape.len() - 1 {
            return Err(ScriptError::argument("shape not matching for assignment"));
        }
        for (i, dim) in src_shape.iter().enumerate() {
            if *dim != shape[i + 1] {
                return Err(ScriptError::argument(format!(
                    "shape not matching expected {} at index {i}, but got {dim}",
                    shape[i + 1]
                )));
            }
        }
        for i in 0..slice_len {
            let cell = src.with_buf(|buf, offset, _| match buf {
                TensorBuf::I32(v) => Value::Int32(v[offset + i]),
                TensorBuf::I64(v) => Value::Int64(v[offset + i]),
                TensorBuf::F32(v) => Value::Float(v[offset + i]),
                TensorBuf::F64(v) => Value::Double(v[offset + i]),
                TensorBuf::Bool(v) => Value::Bool(v[offset + i]),
                TensorBuf::Str(v) => Value::string(v[offset + i].clone()),
            });
            self.write_element(index as usize * slice_len + i, &cell)?;
        }
        Ok(())
    }

    /// In-place reshape; fails unless the element count is preserved.
    pub fn reshape(&self, new_shape: &[i64]) -> RunResult<()> {
        if shape_product(new_shape) != self.numel as i64 {
            return Err(ScriptError::argument("reshape failed size does not match"));
        }
        *self.shape.write() = Shape::from_slice(new_shape);
        Ok(())
    }

    fn require_rank_one(&self, op: &str) -> RunResult<i64> {
        let shape = self.shape.read();
        if shape.len() != 1 {
            return Err(ScriptError::argument(format!(
                "{op} expects tensor to be of 1 dimension. Given {} dimensions.",
                shape.len()
            )));
        }
        Ok(shape[0])
    }

    /// In-place 1-D sort; returns nothing, the caller hands back the tensor.
    pub fn sort(&self, dir: SortDir) -> RunResult<()> {
        self.require_rank_one("sort")?;
        self.with_buf_mut(|buf, offset, numel| {
            let range = offset..offset + numel;
            match buf {
                TensorBuf::I32(v) => sort_slice(&mut v[range], dir),
                TensorBuf::I64(v) => sort_slice(&mut v[range], dir),
                TensorBuf::F32(v) => sort_slice_by(&mut v[range], dir),
                TensorBuf::F64(v) => sort_slice_by(&mut v[range], dir),
                TensorBuf::Bool(v) => sort_slice(&mut v[range], dir),
                TensorBuf::Str(v) => sort_slice(&mut v[range], dir),
            }
        });
        Ok(())
    }

    /// Stable 1-D argsort; returns an Int32 index tensor of the same length.
    pub fn argsort(&self, dir: SortDir) -> RunResult<Self> {
        let size = self.require_rank_one("argsort")?;
        let mut indices: Vec<i32> = (0..size as i32).collect();
        self.with_buf(|buf, offset, _| match buf {
            TensorBuf::I32(v) => argsort_indices(&mut indices, &v[offset..], dir),
            TensorBuf::I64(v) => argsort_indices(&mut indices, &v[offset..], dir),
            TensorBuf::F32(v) => argsort_indices_by(&mut indices, &v[offset..], dir),
            TensorBuf::F64(v) => argsort_indices_by(&mut indices, &v[offset..], dir),
            TensorBuf::Bool(v) => argsort_indices(&mut indices, &v[offset..], dir),
            TensorBuf::Str(v) => argsort_indices(&mut indices, &v[offset..], dir),
        });
        Self::new(TensorBuf::I32(indices), &[size])
    }

    /// Indices of the top-`k` elements in the requested order; `k` must not
    /// exceed the length.
    pub fn topk(&self, k: i64, dir: SortDir) -> RunResult<Self> {
        let size = self.require_rank_one("topk")?;
        if k > size {
            return Err(ScriptError::argument(format!(
                "First argument of topk cannot be greater than the size of tensor. \
                 Given {k} argument and size of tensor is: {size}."
            )));
        }
        let sorted = self.argsort(dir)?;
        let indices = sorted.with_buf(|buf, offset, numel| match buf {
            TensorBuf::I32(v) => v[offset..offset + numel.min(k as usize)].to_vec(),
            _ => unreachable!("argsort returns Int32"),
        });
        Self::new(TensorBuf::I32(indices), &[k])
    }

    /// Gathers elements by a 1-D integer index tensor or list.
    pub fn arrange(&self, argument: &Value) -> RunResult<Self> {
        let size = self.require_rank_one("arrange")?;
        let indices = gather_indices(argument, size)?;
        let out_len = indices.len();
        let buf = self.with_buf(|buf, offset, _| match buf {
            TensorBuf::I32(v) => TensorBuf::I32(indices.iter().map(|&i| v[offset + i]).collect()),
            TensorBuf::I64(v) => TensorBuf::I64(indices.iter().map(|&i| v[offset + i]).collect()),
            TensorBuf::F32(v) => TensorBuf::F32(indices.iter().map(|&i| v[offset + i]).collect()),
            TensorBuf::F64(v) => TensorBuf::F64(indices.iter().map(|&i| v[offset + i]).collect()),
            TensorBuf::Bool(v) => TensorBuf::Bool(indices.iter().map(|&i| v[offset + i]).collect()),
            TensorBuf::Str(v) => {
                TensorBuf::Str(indices.iter().map(|&i| v[offset + i].clone()).collect())
            }
        });
        Self::new(buf, &[out_len as i64])
    }

    fn require_non_empty(&self, op: &str) -> RunResult<()> {
        if self.numel == 0 {
            return Err(ScriptError::argument(format!("{op} expected a non-empty tensor")));
        }
        Ok(())
    }

    pub fn min(&self) -> RunResult<Value> {
        self.require_non_empty("min")?;
        Ok(self.with_buf(|buf, offset, numel| {
            let r = offset..offset + numel;
            match buf {
                TensorBuf::I32(v) => Value::Int32(*v[r].iter().min().expect("non-empty")),
                TensorBuf::I64(v) => Value::Int64(*v[r].iter().min().expect("non-empty")),
                TensorBuf::F32(v) => Value::Float(fold_float(&v[r], f32::min)),
                TensorBuf::F64(v) => Value::Double(fold_float(&v[r], f64::min)),
                TensorBuf::Bool(v) => Value::Bool(v[r].iter().all(|&b| b)),
                TensorBuf::Str(v) => Value::string(v[r].iter().min().expect("non-empty").clone()),
            }
        }))
    }

    pub fn max(&self) -> RunResult<Value> {
        self.require_non_empty("max")?;
        Ok(self.with_buf(|buf, offset, numel| {
            let r = offset..offset + numel;
            match buf {
                TensorBuf::I32(v) => Value::Int32(*v[r].iter().max().expect("non-empty")),
                TensorBuf::I64(v) => Value::Int64(*v[r].iter().max().expect("non-empty")),
                TensorBuf::F32(v) => Value::Float(fold_float(&v[r], f32::max)),
                TensorBuf::F64(v) => Value::Double(fold_float(&v[r], f64::max)),
                TensorBuf::Bool(v) => Value::Bool(v[r].iter().any(|&b| b)),
                TensorBuf::Str(v) => Value::string(v[r].iter().max().expect("non-empty").clone()),
            }
        }))
    }

    /// Whole-tensor sum; integral and floating element types only.
    pub fn sum(&self) -> RunResult<Value> {
        self.with_buf(|buf, offset, numel| {
            let r = offset..offset + numel;
            match buf {
                TensorBuf::I32(v) => Ok(Value::Int32(v[r].iter().sum())),
                TensorBuf::I64(v) => Ok(Value::Int64(v[r].iter().sum())),
                TensorBuf::F32(v) => Ok(Value::Float(v[r].iter().sum())),
                TensorBuf::F64(v) => Ok(Value::Double(v[r].iter().sum())),
                _ => Err(ScriptError::argument(
                    "sum only supports integral and floating point tensors",
                )),
            }
        })
    }

    /// Whole-tensor mean; always returns Double.
    pub fn mean(&self) -> RunResult<Value> {
        let total = match self.sum()? {
            Value::Int32(v) => f64::from(v),
            Value::Int64(v) => v as f64,
            Value::Float(v) => f64::from(v),
            Value::Double(v) => v,
            _ => unreachable!("sum returns a numeric scalar"),
        };
        Ok(Value::Double(total / self.numel as f64))
    }

    /// Element membership after promotion to this tensor's element type.
    pub fn contains(&self, elem: &Value) -> RunResult<bool> {
        self.with_buf(|buf, offset, numel| {
            let r = offset..offset + numel;
            Ok(match buf {
                TensorBuf::I32(v) => {
                    let needle = elem.cast_i32()?;
                    v[r].contains(&needle)
                }
                TensorBuf::I64(v) => {
                    let needle = elem.cast_i64()?;
                    v[r].contains(&needle)
                }
                TensorBuf::F32(v) => {
                    let needle = elem.cast_f32()?;
                    v[r].contains(&needle)
                }
                TensorBuf::F64(v) => {
                    let needle = elem.cast_f64()?;
                    v[r].contains(&needle)
                }
                TensorBuf::Bool(v) => v[r].contains(&elem.truthy()),
                TensorBuf::Str(v) => match elem.as_str_value() {
                    Ok(needle) => v[r].iter().any(|s| *s == needle),
                    Err(_) => false,
                },
            })
        })
    }

    /// Printable form: nested bracketed rows following the shape.
    pub fn print(&self) -> String {
        if self.numel == 0 {
            return "[]".to_owned();
        }
        let elems: Vec<String> = (0..self.numel)
            .map(|i| self.element(i).print_string())
            .collect();
        let shape = self.shape.read();
        nest_strings(&shape, &elems)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let elems: Vec<serde_json::Value> = (0..self.numel).map(|i| self.element(i).to_json()).collect();
        let shape = self.shape.read();
        nest_json(&shape, elems)
    }
}

/// Validates a gather-index argument and resolves it to buffer positions.
fn gather_indices(argument: &Value, size: i64) -> RunResult<Vec<usize>> {
    let valid_container = matches!(argument, Value::Tensor(_) | Value::List(_));
    if !valid_container {
        return Err(ScriptError::argument(format!(
            "Argument of arrange should be a tensor/list, provided {}",
            argument.container_kind()
        )));
    }
    if let Value::Tensor(t) = argument {
        let rank = t.shape().len();
        if rank != 1 {
            return Err(ScriptError::argument(format!(
                "Argument of arrange if tensor, should be of dimension 1, provided {rank} dimensions"
            )));
        }
    }
    let count = argument.size()?;
    if count > size {
        return Err(ScriptError::argument(format!(
            "Elements present in argument of arrange should be less than or equal to elements \
             present in tensor, provided {count} elements for a tensor of size {size}"
        )));
    }
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let index = argument.get_int_subscript(i)?;
        if !index.is_integer() {
            return Err(ScriptError::argument(format!(
                "Element present in argument of arrange at index={i} should be of type int, \
                 provided {}",
                index.data_type()
            )));
        }
        let idx = index.cast_i64()?;
        if idx < 0 || idx >= size {
            return Err(ScriptError::index(format!(
                "Tried to access {idx} index of the tensor."
            )));
        }
        out.push(idx as usize);
    }
    Ok(out)
}

fn sort_slice<T: Ord>(slice: &mut [T], dir: SortDir) {
    match dir {
        SortDir::Asc => slice.sort(),
        SortDir::Desc => slice.sort_by(|a, b| b.cmp(a)),
    }
}

fn sort_slice_by<T: PartialOrd + Copy>(slice: &mut [T], dir: SortDir) {
    slice.sort_by(|a, b| float_cmp(*a, *b, dir));
}

fn float_cmp<T: PartialOrd>(a: T, b: T, dir: SortDir) -> Ordering {
    let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}

fn argsort_indices<T: Ord>(indices: &mut [i32], data: &[T], dir: SortDir) {
    match dir {
        SortDir::Asc => indices.sort_by(|&a, &b| data[a as usize].cmp(&data[b as usize])),
        SortDir::Desc => indices.sort_by(|&a, &b| data[b as usize].cmp(&data[a as usize])),
    }
}

fn argsort_indices_by<T: PartialOrd + Copy>(indices: &mut [i32], data: &[T], dir: SortDir) {
    indices.sort_by(|&a, &b| float_cmp(data[a as usize], data[b as usize], dir));
}

fn fold_float<T: Copy>(slice: &[T], f: impl Fn(T, T) -> T) -> T {
    let mut acc = slice[0];
    for &x in &slice[1..] {
        acc = f(acc, x);
    }
    acc
}

/// Nests flat element strings into bracketed rows per the shape.
fn nest_strings(shape: &[i64], elems: &[String]) -> String {
    if shape.len() <= 1 {
        return format!("[{}]", elems.join(","));
    }
    let chunk = elems.len() / shape[0] as usize;
    let rows: Vec<String> = elems
        .chunks(chunk)
        .map(|c| nest_strings(&shape[1..], c))
        .collect();
    format!("[{}]", rows.join(","))
}

fn nest_json(shape: &[i64], elems: Vec<serde_json::Value>) -> serde_json::Value {
    if shape.len() <= 1 {
        return serde_json::Value::Array(elems);
    }
    let chunk = elems.len() / shape[0] as usize;
    let mut rows = Vec::with_capacity(shape[0] as usize);
    let mut iter = elems.into_iter();
    for _ in 0..shape[0] {
        let row: Vec<serde_json::Value> = iter.by_ref().take(chunk).collect();
        rows.push(nest_json(&shape[1..], row));
    }
    serde_json::Value::Array(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i64_tensor(data: Vec<i64>) -> Tensor {
        let len = data.len() as i64;
        Tensor::new(TensorBuf::I64(data), &[len]).unwrap()
    }

    #[test]
    fn reshape_checks_element_count() {
        let t = i64_tensor(vec![1, 2, 3, 4, 5, 6]);
        t.reshape(&[2, 3]).unwrap();
        assert_eq!(t.shape().as_slice(), &[2, 3]);
        assert!(t.reshape(&[4, 2]).is_err());
    }

    #[test]
    fn rank2_subscript_returns_shared_view() {
        let t = i64_tensor(vec![1, 2, 3, 4, 5, 6]);
        t.reshape(&[2, 3]).unwrap();
        let row = match t.get_int_subscript(1).unwrap() {
            Value::Tensor(v) => v,
            other => panic!("expected tensor view, got {other:?}"),
        };
        assert_eq!(row.shape().as_slice(), &[3]);
        assert_eq!(row.element(0), Value::Int64(4));
        // Mutating through the view mutates the source.
        row.set_int_subscript(0, &Value::Int64(40)).unwrap();
        assert_eq!(t.element(3), Value::Int64(40));
    }

    #[test]
    fn argsort_is_stable_and_arrange_matches_sort() {
        let t = i64_tensor(vec![3, 1, 2, 1]);
        let perm = t.argsort(SortDir::Asc).unwrap();
        let perm_vals: Vec<i64> = (0..4)
            .map(|i| perm.get_int_subscript(i).unwrap().cast_i64().unwrap())
            .collect();
        assert_eq!(perm_vals, vec![1, 3, 2, 0]);

        let gathered = t.arrange(&Value::Tensor(Arc::new(perm))).unwrap();
        t.sort(SortDir::Asc).unwrap();
        for i in 0..4 {
            assert_eq!(
                gathered.element(i as usize),
                t.element(i as usize),
                "arrange(argsort) must equal sort at {i}"
            );
        }
    }

    #[test]
    fn topk_returns_leading_indices() {
        let t = i64_tensor(vec![5, 9, 1, 7]);
        let top = t.topk(2, SortDir::Desc).unwrap();
        assert_eq!(top.element(0), Value::Int32(1));
        assert_eq!(top.element(1), Value::Int32(3));
        assert!(t.topk(9, SortDir::Desc).is_err());
    }

    #[test]
    fn reductions() {
        let t = i64_tensor(vec![1, 2, 3, 4]);
        assert_eq!(t.sum().unwrap(), Value::Int64(10));
        assert_eq!(t.min().unwrap(), Value::Int64(1));
        assert_eq!(t.max().unwrap(), Value::Int64(4));
        assert_eq!(t.mean().unwrap(), Value::Double(2.5));
    }

    #[test]
    fn empty_tensor_is_falsy_with_zero_shape() {
        let t = Tensor::empty(DataType::Float);
        assert!(!t.truthy());
        assert_eq!(t.shape().as_slice(), &[0]);
        assert_eq!(t.num_elements(), 0);
        assert_eq!(t.print(), "[]");
    }

    #[test]
    fn arrange_rejects_out_of_range() {
        let t = i64_tensor(vec![1, 2, 3]);
        let idx = i64_tensor(vec![0, 3]);
        assert!(t.arrange(&Value::Tensor(Arc::new(idx))).is_err());
    }
}
