//! Iterator values over sequences and generator chains.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RunResult, ScriptError};
use crate::expressions::GeneratorChain;
use crate::stack::CallStack;
use crate::value::Value;

#[derive(Debug)]
enum IterSource {
    /// A list, tuple, range or string iterated by integer subscript.
    Seq(Value),
    /// A generator-expression driver; each step pulls the chain once.
    Gen(Arc<GeneratorChain>),
}

#[derive(Debug, Default)]
struct IterState {
    pos: i64,
    exhausted: bool,
}

/// A `next()`-style iterator value.
///
/// The cursor is mutex-guarded: iterator values may be captured by shared AST
/// state and touched from parallel static calls, so advancing must be atomic.
#[derive(Debug)]
pub struct ScriptIter {
    source: IterSource,
    state: Mutex<IterState>,
}

impl ScriptIter {
    pub fn over_sequence(data: Value) -> RunResult<Self> {
        match &data {
            Value::List(_) | Value::Tuple(_) | Value::Range(_) | Value::Str(_) => Ok(Self {
                source: IterSource::Seq(data),
                state: Mutex::new(IterState::default()),
            }),
            other => Err(ScriptError::type_error(format!(
                "iterator requires a list or tuple or range got {}",
                other.container_kind()
            ))),
        }
    }

    pub fn over_generator(chain: Arc<GeneratorChain>) -> Self {
        Self {
            source: IterSource::Gen(chain),
            state: Mutex::new(IterState::default()),
        }
    }

    /// Advances the iterator; exhaustion raises `StopIteration`.
    pub fn next(&self, stack: &mut CallStack) -> RunResult<Value> {
        match &self.source {
            IterSource::Seq(data) => {
                let size = data.size()?;
                let mut state = self.state.lock();
                if state.exhausted || state.pos >= size {
                    state.exhausted = true;
                    return Err(ScriptError::stop_iteration());
                }
                let pos = state.pos;
                state.pos += 1;
                drop(state);
                data.get_int_subscript(pos)
            }
            IterSource::Gen(chain) => {
                {
                    let mut state = self.state.lock();
                    if state.exhausted {
                        return Err(ScriptError::stop_iteration());
                    }
                    if state.pos == 0 {
                        chain.reset();
                        state.pos = 1;
                    }
                }
                match chain.step(stack)? {
                    Some(mut elems) => Ok(elems.remove(0)),
                    None => {
                        self.state.lock().exhausted = true;
                        Err(ScriptError::stop_iteration())
                    }
                }
            }
        }
    }

    pub fn print(&self) -> String {
        match &self.source {
            IterSource::Seq(data) => data.print_string(),
            IterSource::Gen(_) => "<generator>".to_owned(),
        }
    }
}
