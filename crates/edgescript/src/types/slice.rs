//! Slice values and their resolution against a sequence length.

use crate::error::{RunResult, ScriptError};

/// A `[start:stop:step]` triple. Absent components take the Python defaults
/// at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceBounds {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceBounds {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// Step with its default applied; a zero step is a fatal error.
    pub fn step(&self) -> RunResult<i64> {
        match self.step {
            Some(0) => Err(ScriptError::argument("slice step cannot be zero")),
            Some(s) => Ok(s),
            None => Ok(1),
        }
    }

    /// Resolved start for a sequence of length `len`.
    ///
    /// Negative indices add `len`; the result is clamped to `[0, len]` for a
    /// positive step and `[0, len-1]` for a negative step.
    pub fn resolved_start(&self, len: i64) -> RunResult<i64> {
        let step = self.step()?;
        Ok(match self.start {
            Some(mut start) => {
                if start < 0 {
                    start += len;
                }
                if step > 0 {
                    start.clamp(0, len)
                } else {
                    start.clamp(0, (len - 1).max(0))
                }
            }
            None => {
                if step > 0 {
                    0
                } else {
                    len - 1
                }
            }
        })
    }

    /// Resolved stop for a sequence of length `len`.
    ///
    /// Negative indices add `len`; the result is clamped to `[0, len]` for a
    /// positive step and `[-1, len-1]` for a negative step (`-1` lets a
    /// descending slice include index 0).
    pub fn resolved_stop(&self, len: i64) -> RunResult<i64> {
        let step = self.step()?;
        Ok(match self.stop {
            Some(mut stop) => {
                if stop < 0 {
                    stop += len;
                }
                if step > 0 {
                    stop.clamp(0, len)
                } else {
                    stop.clamp(-1, len - 1)
                }
            }
            None => {
                if step > 0 {
                    len
                } else {
                    -1
                }
            }
        })
    }

    /// Indices selected by this slice over a sequence of length `len`, in
    /// traversal order.
    pub fn iter_indices(&self, len: usize) -> RunResult<Vec<usize>> {
        let n = len as i64;
        let step = self.step()?;
        let start = self.resolved_start(n)?;
        let stop = self.resolved_stop(n)?;

        let mut out = Vec::new();
        if step > 0 {
            let mut i = start;
            while i < stop {
                if i >= 0 && i < n {
                    out.push(i as usize);
                }
                i += step;
            }
        } else {
            let mut i = start;
            while i > stop {
                if i >= 0 && i < n {
                    out.push(i as usize);
                }
                i += step;
            }
        }
        Ok(out)
    }

    pub fn print(&self) -> String {
        let part = |v: Option<i64>| v.map_or_else(|| "None".to_owned(), |x| x.to_string());
        format!(
            "slice({}, {}, {})",
            part(self.start),
            part(self.stop),
            part(self.step)
        )
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "start": self.start,
            "stop": self.stop,
            "step": self.step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(start: Option<i64>, stop: Option<i64>, step: Option<i64>, len: usize) -> Vec<usize> {
        SliceBounds::new(start, stop, step).iter_indices(len).unwrap()
    }

    #[test]
    fn full_slice_is_identity() {
        assert_eq!(indices(None, None, None, 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn negative_step_reverses() {
        assert_eq!(indices(None, None, Some(-1), 4), vec![3, 2, 1, 0]);
    }

    #[test]
    fn negative_bounds_add_length() {
        assert_eq!(indices(Some(-3), Some(-1), None, 5), vec![2, 3]);
    }

    #[test]
    fn out_of_range_bounds_clamp() {
        assert_eq!(indices(Some(-100), Some(100), None, 3), vec![0, 1, 2]);
        assert_eq!(indices(Some(100), None, Some(-2), 5), vec![4, 2, 0]);
    }

    #[test]
    fn zero_step_is_fatal() {
        assert!(SliceBounds::new(None, None, Some(0)).iter_indices(3).is_err());
    }

    #[test]
    fn empty_ranges() {
        assert_eq!(indices(Some(3), Some(1), None, 5), Vec::<usize>::new());
        assert_eq!(indices(Some(1), Some(3), Some(-1), 5), Vec::<usize>::new());
    }
}
