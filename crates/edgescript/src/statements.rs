//! Statement AST nodes: control flow, definitions, imports, exceptions.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::builtins::Builtin;
use crate::error::{ErrorKind, RunResult, ScriptError};
use crate::expressions::ExprNode;
use crate::intern::AttrId;
use crate::modules::BuiltinModule;
use crate::scope::StackLocation;
use crate::stack::CallStack;
use crate::types::class::ClassValue;
use crate::types::function::{FunctionValue, UserFunction};
use crate::value::{DataType, Value};

/// Control-flow token unwinding out of a body.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// A statement with its source line.
#[derive(Debug)]
pub struct Statement {
    pub line: u32,
    pub kind: StatementKind,
}

#[derive(Debug)]
pub enum StatementKind {
    Assign {
        target: ExprNode,
        value: ExprNode,
    },
    Expr(ExprNode),
    Return(ExprNode),
    Break,
    Continue,
    If {
        test: ExprNode,
        body: Body,
        orelse: Body,
    },
    While {
        test: ExprNode,
        body: Body,
    },
    For {
        target: ExprNode,
        iter: ExprNode,
        body: Body,
    },
    Assert {
        test: ExprNode,
        msg: Option<ExprNode>,
    },
    Raise {
        exc: ExprNode,
    },
    Try {
        body: Body,
        handlers: Vec<Handler>,
    },
    FunctionDef(Arc<FunctionDef>),
    ClassDef(Arc<ClassDef>),
    Import(Vec<ImportItem>),
    /// Implicit first statement of every module body: binds the builtin
    /// callables into the global scope.
    Inbuilt(Vec<(Builtin, StackLocation)>),
}

/// A sequence of statements executed top to bottom.
#[derive(Debug, Default)]
pub struct Body {
    lines: Vec<Statement>,
}

impl Body {
    pub fn new(lines: Vec<Statement>) -> Self {
        Self { lines }
    }

    /// Executes each line; errors are annotated with the line number of the
    /// failing statement.
    pub fn execute(&self, stack: &mut CallStack) -> RunResult<Flow> {
        for statement in &self.lines {
            match statement.execute(stack) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(err) => return Err(err.with_line(statement.line)),
            }
        }
        Ok(Flow::Normal)
    }
}

impl Statement {
    fn execute(&self, stack: &mut CallStack) -> RunResult<Flow> {
        match &self.kind {
            StatementKind::Assign { target, value } => {
                let result = value.eval(stack)?;
                target.store(result, stack)?;
                Ok(Flow::Normal)
            }
            StatementKind::Expr(expr) => {
                expr.eval(stack)?;
                Ok(Flow::Normal)
            }
            StatementKind::Return(expr) => Ok(Flow::Return(expr.eval(stack)?)),
            StatementKind::Break => Ok(Flow::Break),
            StatementKind::Continue => Ok(Flow::Continue),
            StatementKind::If { test, body, orelse } => {
                if test.eval(stack)?.truthy() {
                    body.execute(stack)
                } else {
                    orelse.execute(stack)
                }
            }
            StatementKind::While { test, body } => {
                while test.eval(stack)?.truthy() {
                    match body.execute(stack)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StatementKind::For { target, iter, body } => {
                let iterable = iter.eval(stack)?;
                let mut index = 0;
                // The size is re-read every iteration: the body may grow or
                // shrink the iterable.
                while index < iterable.size()? {
                    let element = iterable.get_int_subscript(index)?;
                    target.store(element, stack)?;
                    match body.execute(stack)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    index += 1;
                }
                Ok(Flow::Normal)
            }
            StatementKind::Assert { test, msg } => {
                if test.eval(stack)?.truthy() {
                    return Ok(Flow::Normal);
                }
                match msg {
                    None => Err(ScriptError::assertion("Assertion failed")),
                    Some(msg) => {
                        let rendered = msg.eval(stack)?.print_string();
                        Err(ScriptError::assertion(format!(
                            "Assertion failed with error: {rendered}"
                        )))
                    }
                }
            }
            StatementKind::Raise { exc } => {
                let value = exc.eval(stack)?;
                if value.data_type() != DataType::Exception {
                    return Err(ScriptError::type_error(format!(
                        "Only Exception() can be thrown, but got {}",
                        value.data_type()
                    )));
                }
                Err(ScriptError::user(value.print_string()))
            }
            StatementKind::Try { body, handlers } => match body.execute(stack) {
                Ok(flow) => Ok(flow),
                Err(err) => {
                    for handler in handlers {
                        if handler.matches(&err) {
                            return handler.catch(stack, &err);
                        }
                    }
                    Err(err)
                }
            },
            StatementKind::FunctionDef(def) => {
                def.execute_def(stack)?;
                Ok(Flow::Normal)
            }
            StatementKind::ClassDef(def) => {
                def.execute_def(stack)?;
                Ok(Flow::Normal)
            }
            StatementKind::Import(items) => {
                for item in items {
                    item.execute(stack)?;
                }
                Ok(Flow::Normal)
            }
            StatementKind::Inbuilt(bindings) => {
                for (builtin, location) in bindings {
                    stack.set_variable(
                        *location,
                        Value::Function(Arc::new(FunctionValue::Builtin(*builtin))),
                    )?;
                }
                Ok(Flow::Normal)
            }
        }
    }
}

/// One `except` clause.
#[derive(Debug)]
pub struct Handler {
    /// Exception type name to match; `None` catches everything.
    pub exception_type: Option<String>,
    /// Location of the `as` binding, if one was written.
    pub binding: Option<StackLocation>,
    pub body: Body,
}

impl Handler {
    /// Only the generic `Exception` name (or a bare `except`) matches.
    fn matches(&self, _err: &ScriptError) -> bool {
        match &self.exception_type {
            None => true,
            Some(name) => name == "Exception",
        }
    }

    fn catch(&self, stack: &mut CallStack, err: &ScriptError) -> RunResult<Flow> {
        if let Some(location) = self.binding {
            stack.set_variable(location, Value::exception(err.message.clone()))?;
        }
        self.body.execute(stack)
    }
}

/// A function definition: body, argument locations, and the metadata needed
/// to enter a frame at call time.
#[derive(Debug)]
pub struct FunctionDef {
    module: u32,
    index: u32,
    name: String,
    arg_names: Vec<String>,
    args: Vec<StackLocation>,
    /// Frame size for this function, shared with the scope machinery; read
    /// at call time once parsing has finished.
    var_count: Arc<AtomicU32>,
    body: Body,
    decorators: Vec<ExprNode>,
    is_static: AtomicBool,
    /// Where the function value is stored when the `def` executes. Lambdas
    /// have no binding.
    location: Option<StackLocation>,
}

impl FunctionDef {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        module: u32,
        index: u32,
        name: String,
        arg_names: Vec<String>,
        args: Vec<StackLocation>,
        var_count: Arc<AtomicU32>,
        body: Body,
        decorators: Vec<ExprNode>,
        location: Option<StackLocation>,
    ) -> Self {
        Self {
            module,
            index,
            name,
            arg_names,
            args,
            var_count,
            body,
            decorators,
            is_static: AtomicBool::new(false),
            location,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    pub fn is_static(&self) -> bool {
        self.is_static.load(Ordering::SeqCst)
    }

    /// Marks the function static: it will execute without acquiring the
    /// script lock (the `concurrent` decorator).
    pub fn set_static(&self) {
        self.is_static.store(true, Ordering::SeqCst);
    }

    /// Runs the `def` statement: builds the function value over the current
    /// stack, applies decorators in order, stores the result.
    pub fn execute_def(self: &Arc<Self>, stack: &mut CallStack) -> RunResult<()> {
        let mut value = Value::Function(Arc::new(FunctionValue::User(UserFunction::new(
            Arc::clone(self),
            stack.clone_frames(),
        ))));
        for decorator in &self.decorators {
            let applied = decorator.eval(stack)?;
            value = applied.execute_function(vec![value], stack)?;
        }
        let location = self
            .location
            .ok_or_else(|| ScriptError::type_error("lambda cannot be stored as a definition"))?;
        stack.set_variable(location, value)
    }

    /// Calls the function body on `stack`. Non-static functions hold the
    /// script lock for the duration.
    pub fn call(&self, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
        let run = move |stack: &mut CallStack| -> RunResult<Value> {
            if args.len() != self.args.len() {
                return Err(ScriptError::argument(format!(
                    "function arguments number not matching {} given {} expected",
                    args.len(),
                    self.args.len()
                )));
            }
            let slots = self.var_count.load(Ordering::Relaxed) as usize;
            stack.enter_frame(self.module, self.index, slots);
            let mut bind_result = Ok(());
            for (location, arg) in self.args.iter().zip(args) {
                bind_result = stack.set_variable(*location, arg);
                if bind_result.is_err() {
                    break;
                }
            }
            let flow = match bind_result {
                Ok(()) => self.body.execute(stack),
                Err(err) => Err(err),
            };
            stack.exit_frame()?;
            match flow? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::None),
            }
        };
        if self.is_static() {
            run(stack)
        } else {
            stack.with_script_lock(run)
        }
    }
}

/// A class definition: statements of the body plus the mapping from class
/// member attributes to the body-scope locations holding their values.
#[derive(Debug)]
pub struct ClassDef {
    location: StackLocation,
    members: Vec<(AttrId, StackLocation)>,
    body: Vec<Statement>,
}

impl ClassDef {
    pub(crate) fn new(
        location: StackLocation,
        members: Vec<(AttrId, StackLocation)>,
        body: Vec<Statement>,
    ) -> Self {
        Self {
            location,
            members,
            body,
        }
    }

    /// Executes the class body, then copies every class-scope binding into
    /// the class value's member table.
    pub fn execute_def(&self, stack: &mut CallStack) -> RunResult<()> {
        let class = Arc::new(ClassValue::new());
        stack.set_variable(self.location, Value::Class(Arc::clone(&class)))?;
        for statement in &self.body {
            match statement.execute(stack) {
                Ok(_) => {}
                Err(err) => return Err(err.with_line(statement.line)),
            }
        }
        for (attr, location) in &self.members {
            class.set_member(*attr, stack.get_variable(*location)?);
        }
        Ok(())
    }
}

/// One name of an `from module import name [as alias]` statement.
#[derive(Debug)]
pub struct ImportItem {
    pub module: String,
    pub name: String,
    pub location: StackLocation,
    pub line: u32,
}

impl ImportItem {
    fn execute(&self, stack: &mut CallStack) -> RunResult<Value> {
        let value = self.resolve(stack)?;
        stack.set_variable(self.location, value.clone())?;
        Ok(value)
    }

    fn resolve(&self, stack: &mut CallStack) -> RunResult<Value> {
        if BuiltinModule::is_builtin_package(&self.module) {
            return match BuiltinModule::from_import_name(&self.name) {
                Some(module) => Ok(Value::Module(module)),
                None => Err(ScriptError::new(
                    ErrorKind::StatusError,
                    format!(
                        "Cannot import={} from module={} at lineno={}",
                        self.name, self.module, self.line
                    ),
                )),
            };
        }
        let task = stack
            .task()
            .ok_or_else(|| ScriptError::status(1, "import outside a live task"))?;
        if let Some(func) = task.foreign_function(&self.module, &self.name) {
            return Ok(Value::Function(Arc::new(FunctionValue::Foreign(func))));
        }
        if !task.has_module(&self.module) {
            return Err(ScriptError::status(
                1,
                format!(
                    "Cannot import module={} at lineno={}: Module not found",
                    self.module, self.line
                ),
            ));
        }
        let module = task.import_module(&self.module, stack)?;
        match module.global_location(&self.name) {
            Some(location) => stack.get_variable(location),
            None => Err(ScriptError::status(
                1,
                format!(
                    "Cannot import={} from module={} at lineno={}: import not found in module",
                    self.name, self.module, self.line
                ),
            )),
        }
    }
}
