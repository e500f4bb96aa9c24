//! Heterogeneous ordered lists.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RunResult, ScriptError};
use crate::ops::value_equal;
use crate::types::slice::SliceBounds;
use crate::types::tensor::{Shape, Tensor, TensorBuf};
use crate::value::{DataType, Value};

/// An ordered sequence of values. The only structural invariant is
/// `shape[0] == len()`; the shape is derived, never stored.
#[derive(Debug, Default)]
pub struct List {
    items: RwLock<Vec<Value>>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn shape(&self) -> Vec<i64> {
        vec![self.len() as i64]
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    fn resolve_index(&self, index: i64, op: &str) -> RunResult<usize> {
        let len = self.len() as i64;
        let resolved = if index < 0 { index + len } else { index };
        if resolved < 0 || resolved >= len {
            return Err(ScriptError::index(format!(
                "trying to {op} {index} index for list of size={len}"
            )));
        }
        Ok(resolved as usize)
    }

    /// Element access; negative indices count from the end.
    pub fn get(&self, index: i64) -> RunResult<Value> {
        let idx = self.resolve_index(index, "access")?;
        Ok(self.items.read()[idx].clone())
    }

    /// In-place element assignment. Unlike reads, negative indices are not
    /// resolved here.
    pub fn set(&self, index: i64, value: Value) -> RunResult<()> {
        let len = self.len() as i64;
        if index < 0 || index >= len {
            return Err(ScriptError::index(format!(
                "trying to set {index} index for list of size={len}"
            )));
        }
        self.items.write()[index as usize] = value;
        Ok(())
    }

    pub fn push(&self, value: Value) {
        self.items.write().push(value);
    }

    /// Removes and returns the element at `index`.
    pub fn pop(&self, index: i64) -> RunResult<Value> {
        let len = self.len() as i64;
        if index < 0 || index >= len {
            return Err(ScriptError::index(format!(
                "Trying to delete {index} index of list of size={len}"
            )));
        }
        Ok(self.items.write().remove(index as usize))
    }

    /// Python-style slice producing a new list sharing element values.
    pub fn slice(&self, bounds: &SliceBounds) -> RunResult<Self> {
        let items = self.items.read();
        let selected = bounds
            .iter_indices(items.len())?
            .into_iter()
            .map(|i| items[i].clone())
            .collect();
        Ok(Self::new(selected))
    }

    /// List concatenation for the `+` operator.
    pub fn concat(&self, other: &Self) -> Self {
        let mut items = self.snapshot();
        items.extend(other.snapshot());
        Self::new(items)
    }

    /// List repetition for the `*` operator. Counts ≤ 0 yield an empty list;
    /// larger results are produced by repeated doubling.
    pub fn repeat(&self, count: i64) -> Self {
        if count <= 0 {
            return Self::default();
        }
        let base = self.snapshot();
        let mut out = base.clone();
        let target = base.len() * count as usize;
        while out.len() * 2 <= target {
            let copy = out.clone();
            out.extend(copy);
        }
        while out.len() < target {
            out.extend_from_slice(&base);
        }
        Self::new(out)
    }

    /// Membership by value equality.
    pub fn contains(&self, elem: &Value) -> bool {
        self.items.read().iter().any(|item| value_equal(item, elem))
    }

    /// Gathers elements by a 1-D index tensor or list.
    pub fn arrange(&self, argument: &Value) -> RunResult<Self> {
        let valid_container = matches!(argument, Value::Tensor(_) | Value::List(_));
        if !valid_container {
            return Err(ScriptError::argument(format!(
                "Argument of arrange should be a tensor/list, provided {}",
                argument.container_kind()
            )));
        }
        if let Value::Tensor(t) = argument {
            if t.shape().len() != 1 {
                return Err(ScriptError::argument(
                    "Argument of arrange if tensor, should be of dimension 1",
                ));
            }
        }
        let len = self.len() as i64;
        let count = argument.size()?;
        if count > len {
            return Err(ScriptError::argument(format!(
                "Elements present in argument of arrange should be less than or equal to elements \
                 present in tensor, provided {count} elements for a tensor of size {len}"
            )));
        }
        let items = self.items.read();
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
            if idx < 0 || idx >= len {
                return Err(ScriptError::index(format!(
                    "Tried to access {idx} index of the tensor."
                )));
            }
            out.push(items[idx as usize].clone());
        }
        Ok(Self::new(out))
    }

    /// Flattens a rectangular list-of-lists into a typed tensor.
    ///
    /// Supported dtypes: int32, int64, float, double, string. The nesting
    /// must be rectangular; inconsistent dimensions fail.
    pub fn to_tensor(self: &Arc<Self>, dtype_arg: &Value) -> RunResult<Tensor> {
        let dtype_name = dtype_arg.as_str_value()?;
        let dtype = DataType::from_str(&dtype_name)
            .map_err(|_| ScriptError::argument(format!("{dtype_name} is not a dataType")))?;
        if !matches!(
            dtype,
            DataType::Int32 | DataType::Int64 | DataType::Float | DataType::Double | DataType::String
        ) {
            return Err(ScriptError::argument(format!(
                "{dtype} dataType is not supported for tensor()"
            )));
        }

        let root = Value::List(Arc::clone(self));
        let mut shape = Shape::new();
        let mut probe = root.clone();
        loop {
            let next = match &probe {
                Value::List(list) => {
                    shape.push(list.len() as i64);
                    if list.is_empty() {
                        None
                    } else {
                        Some(list.get(0)?)
                    }
                }
                _ => None,
            };
            match next {
                Some(first) => probe = first,
                None => break,
            }
        }

        let numel: i64 = shape.iter().product();
        let numel = numel as usize;
        let mut flat = Vec::with_capacity(numel);
        for i in 0..numel {
            flat.push(element_at(&root, &shape, i)?);
        }

        let buf = match dtype {
            DataType::Int32 => TensorBuf::I32(
                flat.iter()
                    .map(Value::cast_i32)
                    .collect::<RunResult<Vec<_>>>()?,
            ),
            DataType::Int64 => TensorBuf::I64(
                flat.iter()
                    .map(Value::cast_i64)
                    .collect::<RunResult<Vec<_>>>()?,
            ),
            DataType::Float => TensorBuf::F32(
                flat.iter()
                    .map(Value::cast_f32)
                    .collect::<RunResult<Vec<_>>>()?,
            ),
            DataType::Double => TensorBuf::F64(
                flat.iter()
                    .map(Value::cast_f64)
                    .collect::<RunResult<Vec<_>>>()?,
            ),
            _ => TensorBuf::Str(
                flat.iter()
                    .map(Value::as_str_value)
                    .collect::<RunResult<Vec<_>>>()?,
            ),
        };
        Tensor::new(buf, &shape)
    }

    pub fn print(&self) -> String {
        let items = self.items.read();
        let parts: Vec<String> = items.iter().map(Value::print_string).collect();
        format!("[{}]", parts.join(","))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let items = self.items.read();
        serde_json::Value::Array(items.iter().map(Value::to_json).collect())
    }
}

/// Walks the nested lists to the flat element `index`, verifying each level's
/// size against the expected shape.
fn element_at(root: &Value, shape: &[i64], index: usize) -> RunResult<Value> {
    let mut remaining = index as i64;
    let mut node = root.clone();
    let mut chunk: i64 = shape.iter().product();
    for &dim in shape {
        if node.size()? != dim {
            return Err(ScriptError::argument("Shape of list not consistent"));
        }
        chunk /= dim;
        let dim_index = remaining / chunk;
        remaining -= dim_index * chunk;
        node = node.get_int_subscript(dim_index)?;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of_ints(values: &[i64]) -> Arc<List> {
        Arc::new(List::new(values.iter().map(|&v| Value::Int64(v)).collect()))
    }

    #[test]
    fn repetition_size_and_wraparound() {
        let l = list_of_ints(&[1, 2, 3]);
        for k in 0..6 {
            let repeated = l.repeat(k);
            assert_eq!(repeated.len(), 3 * k.max(0) as usize);
            for i in 0..repeated.len() {
                assert_eq!(
                    repeated.get(i as i64).unwrap(),
                    l.get((i % 3) as i64).unwrap()
                );
            }
        }
    }

    #[test]
    fn negative_read_indices_wrap() {
        let l = list_of_ints(&[10, 20, 30]);
        assert_eq!(l.get(-1).unwrap(), Value::Int64(30));
        assert!(l.get(3).is_err());
    }

    #[test]
    fn to_tensor_keeps_rectangular_shape() {
        let inner1 = list_of_ints(&[1, 2]);
        let inner2 = list_of_ints(&[3, 4]);
        let outer = Arc::new(List::new(vec![Value::List(inner1), Value::List(inner2)]));
        let t = outer.to_tensor(&Value::string("int64")).unwrap();
        assert_eq!(t.shape().as_slice(), &[2, 2]);
        assert_eq!(t.element(3), Value::Int64(4));
    }

    #[test]
    fn to_tensor_rejects_ragged_lists() {
        let inner1 = list_of_ints(&[1, 2]);
        let inner2 = list_of_ints(&[3]);
        let outer = Arc::new(List::new(vec![Value::List(inner1), Value::List(inner2)]));
        assert!(outer.to_tensor(&Value::string("int64")).is_err());
    }

    #[test]
    fn slice_reverse() {
        let l = list_of_ints(&[1, 2, 3, 4]);
        let rev = l.slice(&SliceBounds::new(None, None, Some(-1))).unwrap();
        assert_eq!(rev.print(), "[4,3,2,1]");
    }
}
