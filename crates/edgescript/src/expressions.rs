//! Expression AST nodes and their evaluation.
//!
//! Nodes are constructed once from the JSON ast dump, bound to resolved
//! stack locations and interned attribute indices, and evaluated against a
//! call stack. Store-context nodes (`Name`, `Subscript`, `Attribute`, tuple
//! targets) also implement assignment.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RunResult, ScriptError};
use crate::intern::AttrId;
use crate::ops::{
    binary_operate, compare_operate, unary_operate, BinOpKind, BoolOpKind, CmpOpKind, UnaryOpKind,
};
use crate::scope::StackLocation;
use crate::stack::CallStack;
use crate::statements::FunctionDef;
use crate::types::function::{FunctionValue, UserFunction};
use crate::types::iter::ScriptIter;
use crate::types::map::ScriptMap;
use crate::types::slice::SliceBounds;
use crate::value::Value;

/// A named variable reference resolved to its stack location at parse time.
#[derive(Debug)]
pub struct NameExpr {
    pub name: String,
    pub location: StackLocation,
    pub store: bool,
}

/// An expression with its source line.
#[derive(Debug)]
pub struct ExprNode {
    pub line: u32,
    pub expr: Expr,
}

#[derive(Debug)]
pub enum Expr {
    /// JSON `null` in an expression position (e.g. a bare `return`).
    Null,
    Constant(Value),
    Name(NameExpr),
    Attribute {
        target: Box<ExprNode>,
        attr: AttrId,
    },
    Subscript {
        target: Box<ExprNode>,
        index: Box<ExprNode>,
        store: bool,
    },
    SliceLiteral {
        lower: Option<Box<ExprNode>>,
        upper: Option<Box<ExprNode>>,
        step: Option<Box<ExprNode>>,
    },
    BinOp {
        op: BinOpKind,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<ExprNode>,
    },
    Compare {
        left: Box<ExprNode>,
        ops: Vec<CmpOpKind>,
        comparators: Vec<ExprNode>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<ExprNode>,
    },
    Call {
        func: Box<ExprNode>,
        args: Vec<ExprNode>,
    },
    ListLiteral(Vec<ExprNode>),
    TupleLiteral {
        elts: Vec<ExprNode>,
        store: bool,
    },
    DictLiteral {
        keys: Vec<ExprNode>,
        values: Vec<ExprNode>,
    },
    ListComp(Arc<GeneratorChain>),
    DictComp(Arc<GeneratorChain>),
    GeneratorExp(Arc<GeneratorChain>),
    Lambda(Arc<FunctionDef>),
}

impl ExprNode {
    /// Evaluates the expression to a value.
    pub fn eval(&self, stack: &mut CallStack) -> RunResult<Value> {
        match &self.expr {
            Expr::Null => Ok(Value::None),
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Name(name) => {
                if name.store {
                    return Err(ScriptError::type_error(
                        "should call get only of Load Name variable",
                    ));
                }
                let value = stack.get_variable(name.location)?;
                if matches!(value, Value::Undefined) {
                    return Err(ScriptError::type_error(format!(
                        "Local variable {} accessed before assignment",
                        name.name
                    )));
                }
                Ok(value)
            }
            Expr::Attribute { target, attr } => target.eval(stack)?.get_member(*attr),
            Expr::Subscript { target, index, .. } => {
                let subscript = index.eval(stack)?;
                let data = target.eval(stack)?;
                data.get_subscript(&subscript)
            }
            Expr::SliceLiteral { lower, upper, step } => {
                let component = |node: &Option<Box<ExprNode>>,
                                 stack: &mut CallStack|
                 -> RunResult<Option<i64>> {
                    match node {
                        Some(expr) => {
                            let value = expr.eval(stack)?;
                            if value.is_none() {
                                Ok(None)
                            } else {
                                Ok(Some(value.cast_i64()?))
                            }
                        }
                        None => Ok(None),
                    }
                };
                let bounds = SliceBounds::new(
                    component(lower, stack)?,
                    component(upper, stack)?,
                    component(step, stack)?,
                );
                Ok(Value::Slice(Arc::new(bounds)))
            }
            Expr::BinOp { op, left, right } => {
                let a = left.eval(stack)?;
                let b = right.eval(stack)?;
                match binary_operate(*op, &a, &b)? {
                    Some(result) => Ok(result),
                    None => Err(ScriptError::argument(format!(
                        "Could not {op}, check types left={}({}), right={}({})",
                        a.container_kind(),
                        a.data_type(),
                        b.container_kind(),
                        b.data_type()
                    ))),
                }
            }
            Expr::UnaryOp { op, operand } => {
                let value = operand.eval(stack)?;
                match unary_operate(*op, &value)? {
                    Some(result) => Ok(result),
                    None => Err(ScriptError::argument(format!(
                        "Could not {op}, check types operand={}[{}]",
                        value.data_type(),
                        value.container_kind()
                    ))),
                }
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                // Chained comparison: short-circuits on the first falsy link.
                let mut current = left.eval(stack)?;
                let mut result = Value::Bool(true);
                for (op, comparator) in ops.iter().zip(comparators.iter()) {
                    let next = comparator.eval(stack)?;
                    result = match compare_operate(*op, &current, &next)? {
                        Some(result) => result,
                        None => {
                            return Err(ScriptError::argument(format!(
                                "Could not {op}, check types left={}[{}], right={}[{}]",
                                current.data_type(),
                                current.container_kind(),
                                next.data_type(),
                                next.container_kind()
                            )))
                        }
                    };
                    if !result.truthy() {
                        return Ok(result);
                    }
                    current = next;
                }
                Ok(result)
            }
            Expr::BoolOp { op, values } => {
                let mut left = values[0].eval(stack)?;
                let mut result = Value::Bool(left.truthy());
                for value in &values[1..] {
                    match op {
                        BoolOpKind::And if !left.truthy() => return Ok(Value::Bool(false)),
                        BoolOpKind::Or if left.truthy() => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                    let right = value.eval(stack)?;
                    result = Value::Bool(match op {
                        BoolOpKind::And => left.truthy() && right.truthy(),
                        BoolOpKind::Or => left.truthy() || right.truthy(),
                    });
                    left = right;
                }
                Ok(result)
            }
            Expr::Call { func, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(arg.eval(stack)?);
                }
                match &func.expr {
                    Expr::Name(name) => {
                        if name.store {
                            return Err(ScriptError::type_error(
                                "Should not call variable of Store type",
                            ));
                        }
                        let callee = stack.get_variable(name.location)?;
                        if matches!(callee, Value::Undefined) {
                            return Err(ScriptError::type_error(format!(
                                "Local variable {} accessed before assignment",
                                name.name
                            )));
                        }
                        callee.execute_function(arg_values, stack)
                    }
                    Expr::Attribute { target, attr } => {
                        let object = target.eval(stack)?;
                        object.call_attr(*attr, arg_values, stack)
                    }
                    _ => Err(ScriptError::type_error("Cannot call variable")),
                }
            }
            Expr::ListLiteral(elts) => {
                let mut members = Vec::with_capacity(elts.len());
                for elt in elts {
                    members.push(elt.eval(stack)?);
                }
                Ok(Value::list(members))
            }
            Expr::TupleLiteral { elts, store } => {
                if *store {
                    return Err(ScriptError::type_error(
                        "should not call get of store Tuple variable",
                    ));
                }
                let mut members = Vec::with_capacity(elts.len());
                for elt in elts {
                    members.push(elt.eval(stack)?);
                }
                Ok(Value::Tuple(Arc::new(members)))
            }
            Expr::DictLiteral { keys, values } => {
                let map = ScriptMap::new();
                for (key, value) in keys.iter().zip(values.iter()) {
                    let key = map_key(&key.eval(stack)?);
                    map.set(key, value.eval(stack)?);
                }
                Ok(Value::Map(Arc::new(map)))
            }
            Expr::ListComp(chain) => {
                chain.reset();
                let mut members = Vec::new();
                while let Some(mut elems) = chain.step(stack)? {
                    members.push(elems.remove(0));
                }
                chain.reset();
                Ok(Value::list(members))
            }
            Expr::DictComp(chain) => {
                chain.reset();
                let map = ScriptMap::new();
                while let Some(mut elems) = chain.step(stack)? {
                    let value = elems.remove(1);
                    let key = map_key(&elems.remove(0));
                    map.set(key, value);
                }
                chain.reset();
                Ok(Value::Map(Arc::new(map)))
            }
            Expr::GeneratorExp(chain) => Ok(Value::Iterator(Arc::new(
                ScriptIter::over_generator(Arc::clone(chain)),
            ))),
            Expr::Lambda(def) => Ok(Value::Function(Arc::new(FunctionValue::User(
                UserFunction::new(Arc::clone(def), stack.clone_frames()),
            )))),
        }
    }

    /// Assigns `value` through a store-context node.
    pub fn store(&self, value: Value, stack: &mut CallStack) -> RunResult<()> {
        match &self.expr {
            Expr::Name(name) => {
                if !name.store {
                    return Err(ScriptError::type_error(
                        "can only call set for store name variable",
                    ));
                }
                stack.set_variable(name.location, value)
            }
            Expr::Attribute { target, attr } => {
                let object = target.eval(stack)?;
                object.set_member(*attr, value)
            }
            Expr::Subscript { target, index, store } => {
                if !store {
                    return Err(ScriptError::type_error("cannot set rvalue variable"));
                }
                let subscript = index.eval(stack)?;
                let data = target.eval(stack)?;
                data.set_subscript(&subscript, value)
            }
            Expr::TupleLiteral { elts, store } => {
                if !store {
                    return Err(ScriptError::type_error("cannot set rvalue variable"));
                }
                let count = value.size()?;
                if count != elts.len() as i64 {
                    return Err(ScriptError::argument(format!(
                        "expecting {} targets but {count} vals returned",
                        elts.len()
                    )));
                }
                for (i, target) in elts.iter().enumerate() {
                    target.store(value.get_int_subscript(i as i64)?, stack)?;
                }
                Ok(())
            }
            _ => Err(ScriptError::type_error("cannot assign")),
        }
    }
}

/// Map keys are strings; string values keep their content, everything else
/// keys by its printable form.
fn map_key(value: &Value) -> String {
    match value {
        Value::Str(s) => s.as_str().to_owned(),
        other => other.print_string(),
    }
}

/// Cursor state of one generator in a comprehension chain.
#[derive(Debug, Default)]
struct GenState {
    data: Option<Value>,
    pos: i64,
    exhausted: bool,
    cached: Option<Value>,
}

/// One `for target in iter if cond...` clause.
///
/// Generators hold their cursor behind a mutex because the chain lives in
/// the shared AST; parallel static calls may drive distinct iterations and
/// every advance must be atomic.
#[derive(Debug)]
pub struct GeneratorLink {
    iterable: ExprNode,
    target: ExprNode,
    conditions: Vec<ExprNode>,
    /// Element expressions; only the last link of a chain carries them.
    elements: Vec<ExprNode>,
    next: Option<Box<GeneratorLink>>,
    state: Mutex<GenState>,
}

impl GeneratorLink {
    pub(crate) fn new(
        iterable: ExprNode,
        target: ExprNode,
        conditions: Vec<ExprNode>,
    ) -> Self {
        Self {
            iterable,
            target,
            conditions,
            elements: Vec::new(),
            next: None,
            state: Mutex::new(GenState::default()),
        }
    }

    pub(crate) fn set_elements(&mut self, elements: Vec<ExprNode>) {
        self.elements = elements;
    }

    pub(crate) fn set_next(&mut self, next: GeneratorLink) {
        self.next = Some(Box::new(next));
    }

    fn reset(&self) {
        {
            let mut state = self.state.lock();
            *state = GenState::default();
        }
        if let Some(next) = &self.next {
            next.reset();
        }
    }

    /// Pulls the next item of this generator's iterable, resetting the
    /// downstream chain so nested loops restart for the new item.
    fn advance(&self) -> RunResult<Option<Value>> {
        let item = {
            let mut state = self.state.lock();
            let data = state.data.clone().expect("iterable bound before advance");
            let size = data.size()?;
            if state.exhausted || state.pos >= size {
                state.exhausted = true;
                None
            } else {
                let item = data.get_int_subscript(state.pos)?;
                state.pos += 1;
                Some(item)
            }
        };
        if let Some(next) = &self.next {
            next.reset();
        }
        Ok(item)
    }

    /// Advances this generator until it yields one element tuple, or `None`
    /// when the (sub-)chain is exhausted.
    fn step(&self, stack: &mut CallStack) -> RunResult<Option<Vec<Value>>> {
        // Re-bind the iterable on every drive; its value may change between
        // pulls when the comprehension references mutated state.
        let data = self.iterable.eval(stack)?;
        let mut cached = {
            let mut state = self.state.lock();
            state.data = Some(data);
            state.cached.take()
        };
        if cached.is_none() {
            cached = self.advance()?;
        }
        while let Some(item) = cached {
            self.target.store(item.clone(), stack)?;
            let mut conditions_passed = true;
            for condition in &self.conditions {
                if !condition.eval(stack)?.truthy() {
                    conditions_passed = false;
                    break;
                }
            }
            if !conditions_passed {
                cached = self.advance()?;
                continue;
            }
            if let Some(next) = &self.next {
                match next.step(stack)? {
                    Some(result) => {
                        // Keep the current item; the next call continues the
                        // inner chain for it.
                        self.state.lock().cached = Some(item);
                        return Ok(Some(result));
                    }
                    None => {
                        cached = self.advance()?;
                        continue;
                    }
                }
            }
            let mut elems = Vec::with_capacity(self.elements.len());
            for element in &self.elements {
                elems.push(element.eval(stack)?);
            }
            self.state.lock().cached = self.advance()?;
            return Ok(Some(elems));
        }
        Ok(None)
    }
}

/// A full comprehension: the outermost generator of the linked chain.
#[derive(Debug)]
pub struct GeneratorChain {
    first: GeneratorLink,
}

impl GeneratorChain {
    pub(crate) fn new(first: GeneratorLink) -> Self {
        Self { first }
    }

    pub fn reset(&self) {
        self.first.reset();
    }

    /// One pull: the next element tuple, or `None` once exhausted.
    pub fn step(&self, stack: &mut CallStack) -> RunResult<Option<Vec<Value>>> {
        self.first.step(stack)
    }
}
