//! Script strings with O(1) code-point indexing.

use crate::error::{RunResult, ScriptError};
use crate::types::slice::SliceBounds;

/// An immutable UTF-8 string plus the indexing tables built at construction:
/// the code-point count and a code-point → byte-offset map. All subscripting
/// and slicing below works in code points, never bytes.
#[derive(Debug)]
pub struct ScriptStr {
    data: String,
    /// Byte offset of each code point, with one extra entry for the end.
    char_offsets: Vec<u32>,
}

impl ScriptStr {
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        let mut char_offsets: Vec<u32> = data.char_indices().map(|(i, _)| i as u32).collect();
        char_offsets.push(data.len() as u32);
        Self { data, char_offsets }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Number of code points, not bytes.
    pub fn char_count(&self) -> usize {
        self.char_offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte range of the code point at `idx` (already bounds-checked).
    fn char_range(&self, idx: usize) -> std::ops::Range<usize> {
        self.char_offsets[idx] as usize..self.char_offsets[idx + 1] as usize
    }

    /// Resolves a possibly-negative index against the code-point count.
    fn resolve_index(&self, index: i64) -> RunResult<usize> {
        let len = self.char_count() as i64;
        let resolved = if index < 0 { index + len } else { index };
        if resolved < 0 || resolved >= len {
            return Err(ScriptError::index(format!(
                "trying to access {index} index for string of size={len}"
            )));
        }
        Ok(resolved as usize)
    }

    /// Single-code-point subscript; negative indices count from the end.
    pub fn char_at(&self, index: i64) -> RunResult<&str> {
        let idx = self.resolve_index(index)?;
        Ok(&self.data[self.char_range(idx)])
    }

    /// Python-style slice over code points.
    pub fn slice(&self, bounds: &SliceBounds) -> RunResult<String> {
        let len = self.char_count();
        let mut out = String::new();
        for idx in bounds.iter_indices(len)? {
            out.push_str(&self.data[self.char_range(idx)]);
        }
        Ok(out)
    }

    /// Substring membership, used by `in`.
    pub fn contains(&self, needle: &str) -> bool {
        self.data.contains(needle)
    }

    pub fn to_uppercase(&self) -> String {
        self.data.to_uppercase()
    }

    pub fn to_lowercase(&self) -> String {
        self.data.to_lowercase()
    }

    pub fn strip(&self) -> &str {
        self.data.trim()
    }
}

impl PartialEq for ScriptStr {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for ScriptStr {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_count_is_code_points() {
        let s = ScriptStr::new("héllo");
        assert_eq!(s.char_count(), 5);
        assert_eq!(s.as_str().len(), 6);
    }

    #[test]
    fn indexing_by_code_point() {
        let s = ScriptStr::new("héllo");
        assert_eq!(s.char_at(0).unwrap(), "h");
        assert_eq!(s.char_at(1).unwrap(), "é");
        assert_eq!(s.char_at(-1).unwrap(), "o");
        assert!(s.char_at(5).is_err());
        assert!(s.char_at(-6).is_err());
    }

    #[test]
    fn reverse_slice() {
        let s = ScriptStr::new("héllo");
        let rev = s.slice(&SliceBounds::new(None, None, Some(-1))).unwrap();
        assert_eq!(rev, "olléh");
    }

    #[test]
    fn slice_with_bounds() {
        let s = ScriptStr::new("abcdef");
        assert_eq!(s.slice(&SliceBounds::new(Some(1), Some(4), None)).unwrap(), "bcd");
        assert_eq!(s.slice(&SliceBounds::new(Some(-2), None, None)).unwrap(), "ef");
    }
}
