//! Builds statement and expression trees from a Python-ast JSON dump.
//!
//! Every node carries `_type` and `lineno`; unrecognized node types are
//! fatal with the line number. Name resolution happens here, once: the
//! resulting trees address variables by [`StackLocation`] only.

use std::str::FromStr;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use ahash::AHashMap;
use serde_json::Value as Json;
use strum::IntoEnumIterator;

use crate::builtins::Builtin;
use crate::error::{RunResult, ScriptError};
use crate::expressions::{Expr, ExprNode, GeneratorChain, GeneratorLink, NameExpr};
use crate::intern::intern_attr;
use crate::ops::{BinOpKind, BoolOpKind, CmpOpKind, UnaryOpKind};
use crate::scope::{ScopeId, ScopeSet, StackLocation};
use crate::statements::{
    Body, ClassDef, FunctionDef, Handler, ImportItem, Statement, StatementKind,
};
use crate::value::Value;

/// A parsed module body plus the name table of its global scope.
#[derive(Debug)]
pub(crate) struct ParsedModule {
    pub body: Body,
    pub globals: AHashMap<String, StackLocation>,
    pub var_count: Arc<AtomicU32>,
}

/// Parses one module's AST. The implicit `Inbuilt` statement binding the
/// global builtins is prepended to the body.
pub(crate) fn parse_module(index: u32, ast: &Json) -> RunResult<ParsedModule> {
    let mut scopes = ScopeSet::new(index);
    let global = scopes.global();

    let mut inbuilt = Vec::new();
    for builtin in Builtin::iter() {
        let name: &'static str = builtin.into();
        let location = scopes.add_variable(global, name)?;
        inbuilt.push((builtin, location));
    }

    let body_json = field(ast, "body")?;
    let mut parser = Parser { scopes: &mut scopes };
    let mut lines = vec![Statement {
        line: 0,
        kind: StatementKind::Inbuilt(inbuilt),
    }];
    lines.extend(parser.parse_statements(global, body_json)?);

    let globals = scopes
        .locations_in_scope(global)
        .into_iter()
        .collect::<AHashMap<_, _>>();
    let var_count = scopes.var_counter(0);
    Ok(ParsedModule {
        body: Body::new(lines),
        globals,
        var_count,
    })
}

fn field<'a>(json: &'a Json, key: &str) -> RunResult<&'a Json> {
    json.get(key)
        .ok_or_else(|| ScriptError::status(1, format!("AST node missing field '{key}'")))
}

fn str_field<'a>(json: &'a Json, key: &str) -> RunResult<&'a str> {
    field(json, key)?
        .as_str()
        .ok_or_else(|| ScriptError::status(1, format!("AST field '{key}' is not a string")))
}

fn line_of(json: &Json) -> u32 {
    json.get("lineno").and_then(Json::as_u64).unwrap_or(0) as u32
}

fn node_type(json: &Json) -> RunResult<&str> {
    str_field(json, "_type")
}

fn is_store_ctx(json: &Json) -> bool {
    json.get("ctx")
        .and_then(|ctx| ctx.get("_type"))
        .and_then(Json::as_str)
        == Some("Store")
}

struct Parser<'a> {
    scopes: &'a mut ScopeSet,
}

impl Parser<'_> {
    fn parse_statements(&mut self, scope: ScopeId, body: &Json) -> RunResult<Vec<Statement>> {
        let lines = body
            .as_array()
            .ok_or_else(|| ScriptError::status(1, "AST body is not an array"))?;
        let mut statements = Vec::with_capacity(lines.len());
        for line in lines {
            statements.push(self.parse_statement(scope, line)?);
        }
        Ok(statements)
    }

    fn parse_body(&mut self, scope: ScopeId, body: &Json) -> RunResult<Body> {
        Ok(Body::new(self.parse_statements(scope, body)?))
    }

    fn parse_statement(&mut self, scope: ScopeId, json: &Json) -> RunResult<Statement> {
        let line = line_of(json);
        let kind = match node_type(json)? {
            "Assign" => {
                let targets = field(json, "targets")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "Assign targets is not an array"))?;
                let target = targets
                    .first()
                    .ok_or_else(|| ScriptError::status(1, "Assign without targets"))?;
                StatementKind::Assign {
                    value: self.parse_expr(scope, field(json, "value")?)?,
                    target: self.parse_expr(scope, target)?,
                }
            }
            "Expr" => StatementKind::Expr(self.parse_expr(scope, field(json, "value")?)?),
            "Return" => StatementKind::Return(self.parse_expr(scope, field(json, "value")?)?),
            "Break" => StatementKind::Break,
            "Continue" => StatementKind::Continue,
            "If" => {
                let test = self.parse_expr(scope, field(json, "test")?)?;
                let true_scope = self.scopes.add_scope(scope);
                let body = self.parse_body(true_scope, field(json, "body")?)?;
                let else_scope = self.scopes.add_scope(scope);
                let orelse = self.parse_body(else_scope, field(json, "orelse")?)?;
                StatementKind::If { test, body, orelse }
            }
            "While" => {
                let test = self.parse_expr(scope, field(json, "test")?)?;
                let loop_scope = self.scopes.add_scope(scope);
                let body = self.parse_body(loop_scope, field(json, "body")?)?;
                StatementKind::While { test, body }
            }
            "For" => {
                let loop_scope = self.scopes.add_scope(scope);
                let target = self.parse_expr(loop_scope, field(json, "target")?)?;
                let iter = self.parse_expr(loop_scope, field(json, "iter")?)?;
                let body = self.parse_body(loop_scope, field(json, "body")?)?;
                StatementKind::For { target, iter, body }
            }
            "Assert" => {
                let test = self.parse_expr(scope, field(json, "test")?)?;
                let msg_json = field(json, "msg")?;
                let msg = if msg_json.is_null() {
                    None
                } else {
                    Some(self.parse_expr(scope, msg_json)?)
                };
                StatementKind::Assert { test, msg }
            }
            "Raise" => StatementKind::Raise {
                exc: self.parse_expr(scope, field(json, "exc")?)?,
            },
            "Try" => {
                let body = self.parse_body(scope, field(json, "body")?)?;
                let handler_jsons = field(json, "handlers")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "Try handlers is not an array"))?;
                let mut handlers = Vec::with_capacity(handler_jsons.len());
                for handler_json in handler_jsons {
                    handlers.push(self.parse_handler(scope, handler_json)?);
                }
                StatementKind::Try { body, handlers }
            }
            "FunctionDef" => {
                let name = str_field(json, "name")?.to_owned();
                let location = self.scopes.add_variable(scope, &name)?;
                StatementKind::FunctionDef(self.parse_function_def(scope, json, Some(location))?)
            }
            "ClassDef" => StatementKind::ClassDef(Arc::new(self.parse_class_def(scope, json)?)),
            "ImportFrom" => {
                let module = str_field(json, "module")?.to_owned();
                let names = field(json, "names")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "ImportFrom names is not an array"))?;
                let mut items = Vec::with_capacity(names.len());
                for name_json in names {
                    let import_name = str_field(name_json, "name")?.to_owned();
                    let alias = field(name_json, "asname")?;
                    let bind_name = match alias.as_str() {
                        Some(alias) => alias.to_owned(),
                        None => import_name.clone(),
                    };
                    let location = self.scopes.add_variable(scope, &bind_name)?;
                    items.push(ImportItem {
                        module: module.clone(),
                        name: import_name,
                        location,
                        line,
                    });
                }
                StatementKind::Import(items)
            }
            other => {
                return Err(ScriptError::status(
                    1,
                    format!("Could not find implementation for Statement={other} at lineNo={line}"),
                ))
            }
        };
        Ok(Statement { line, kind })
    }

    fn parse_handler(&mut self, scope: ScopeId, json: &Json) -> RunResult<Handler> {
        let name_json = field(json, "name")?;
        let binding = match name_json.as_str() {
            Some(name) => Some(self.scopes.add_variable(scope, name)?),
            None => None,
        };
        let type_json = field(json, "type")?;
        let exception_type = if type_json.is_null() {
            None
        } else {
            Some(str_field(type_json, "id")?.to_owned())
        };
        let body = self.parse_body(scope, field(json, "body")?)?;
        Ok(Handler {
            exception_type,
            binding,
            body,
        })
    }

    fn parse_function_def(
        &mut self,
        outer_scope: ScopeId,
        json: &Json,
        location: Option<StackLocation>,
    ) -> RunResult<Arc<FunctionDef>> {
        let name = str_field(json, "name")?.to_owned();
        let fn_scope = self.scopes.add_function_scope(outer_scope);
        let index = self.scopes.function_of(fn_scope);

        let arg_jsons = field(field(json, "args")?, "args")?
            .as_array()
            .ok_or_else(|| ScriptError::status(1, "function args is not an array"))?;
        let mut arg_names = Vec::with_capacity(arg_jsons.len());
        let mut args = Vec::with_capacity(arg_jsons.len());
        for arg_json in arg_jsons {
            let arg_name = str_field(arg_json, "arg")?.to_owned();
            args.push(self.scopes.add_variable(fn_scope, &arg_name)?);
            arg_names.push(arg_name);
        }

        let body = self.parse_body(fn_scope, field(json, "body")?)?;

        let mut decorators = Vec::new();
        if let Some(list) = json.get("decorator_list").and_then(Json::as_array) {
            for decorator in list {
                decorators.push(self.parse_expr(outer_scope, decorator)?);
            }
        }

        Ok(Arc::new(FunctionDef::new(
            self.scopes.module(),
            index,
            name,
            arg_names,
            args,
            self.scopes.var_counter(index),
            body,
            decorators,
            location,
        )))
    }

    fn parse_class_def(&mut self, scope: ScopeId, json: &Json) -> RunResult<ClassDef> {
        let name = str_field(json, "name")?.to_owned();
        let location = self.scopes.add_variable(scope, &name)?;
        let class_vars_scope = self.scopes.add_scope(scope);
        let method_scope = self.scopes.add_scope(scope);

        let lines = field(json, "body")?
            .as_array()
            .ok_or_else(|| ScriptError::status(1, "class body is not an array"))?;
        let mut body = Vec::with_capacity(lines.len());
        for line in lines {
            if node_type(line)? == "FunctionDef" {
                // Methods bind into the class-variable scope but their bodies
                // compile in a sibling scope, so method locals never collide
                // with class members.
                let method_name = str_field(line, "name")?;
                let member_location = self.scopes.add_variable(class_vars_scope, method_name)?;
                let def = self.parse_function_def(method_scope, line, Some(member_location))?;
                body.push(Statement {
                    line: line_of(line),
                    kind: StatementKind::FunctionDef(def),
                });
            } else {
                body.push(self.parse_statement(class_vars_scope, line)?);
            }
        }

        let members = self
            .scopes
            .locations_in_scope(class_vars_scope)
            .into_iter()
            .map(|(member_name, member_location)| (intern_attr(&member_name), member_location))
            .collect();
        Ok(ClassDef::new(location, members, body))
    }

    fn parse_expr(&mut self, scope: ScopeId, json: &Json) -> RunResult<ExprNode> {
        if json.is_null() {
            return Ok(ExprNode {
                line: 0,
                expr: Expr::Null,
            });
        }
        let line = line_of(json);
        let expr = match node_type(json)? {
            "Constant" => Expr::Constant(Value::from_json(field(json, "value")?)?),
            "Name" => {
                let name = str_field(json, "id")?.to_owned();
                let store = is_store_ctx(json);
                let location = if store {
                    // Writes bind in the innermost scope only when no
                    // enclosing scope already declares the name.
                    match self.scopes.lookup(scope, &name) {
                        Some(location) => location,
                        None => self.scopes.add_variable(scope, &name)?,
                    }
                } else {
                    self.scopes.lookup(scope, &name).ok_or_else(|| {
                        ScriptError::status(
                            1,
                            format!("Variable {name} used before definition"),
                        )
                    })?
                };
                Expr::Name(NameExpr {
                    name,
                    location,
                    store,
                })
            }
            "Attribute" => Expr::Attribute {
                target: Box::new(self.parse_expr(scope, field(json, "value")?)?),
                attr: intern_attr(str_field(json, "attr")?),
            },
            "Subscript" => {
                let slice_json = field(json, "slice")?;
                let index = if slice_json.get("_type").and_then(Json::as_str) == Some("Slice") {
                    self.parse_slice(scope, slice_json)?
                } else {
                    self.parse_expr(scope, slice_json)?
                };
                Expr::Subscript {
                    target: Box::new(self.parse_expr(scope, field(json, "value")?)?),
                    index: Box::new(index),
                    store: is_store_ctx(json),
                }
            }
            "Slice" => return self.parse_slice(scope, json),
            "BinOp" => Expr::BinOp {
                op: parse_op::<BinOpKind>(field(json, "op")?, line)?,
                left: Box::new(self.parse_expr(scope, field(json, "left")?)?),
                right: Box::new(self.parse_expr(scope, field(json, "right")?)?),
            },
            "UnaryOp" => Expr::UnaryOp {
                op: parse_op::<UnaryOpKind>(field(json, "op")?, line)?,
                operand: Box::new(self.parse_expr(scope, field(json, "operand")?)?),
            },
            "Compare" => {
                let op_jsons = field(json, "ops")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "Compare ops is not an array"))?;
                let mut ops = Vec::with_capacity(op_jsons.len());
                for op_json in op_jsons {
                    ops.push(parse_op::<CmpOpKind>(op_json, line)?);
                }
                let comparator_jsons = field(json, "comparators")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "comparators is not an array"))?;
                if ops.len() != comparator_jsons.len() {
                    return Err(ScriptError::status(
                        1,
                        format!(
                            "No. of operands={} not equal to no. of comparators={}",
                            comparator_jsons.len(),
                            ops.len()
                        ),
                    ));
                }
                let mut comparators = Vec::with_capacity(comparator_jsons.len());
                for comparator in comparator_jsons {
                    comparators.push(self.parse_expr(scope, comparator)?);
                }
                Expr::Compare {
                    left: Box::new(self.parse_expr(scope, field(json, "left")?)?),
                    ops,
                    comparators,
                }
            }
            "BoolOp" => {
                let value_jsons = field(json, "values")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "BoolOp values is not an array"))?;
                let mut values = Vec::with_capacity(value_jsons.len());
                for value in value_jsons {
                    values.push(self.parse_expr(scope, value)?);
                }
                Expr::BoolOp {
                    op: parse_op::<BoolOpKind>(field(json, "op")?, line)?,
                    values,
                }
            }
            "Call" => {
                let arg_jsons = field(json, "args")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "Call args is not an array"))?;
                let mut args = Vec::with_capacity(arg_jsons.len());
                for arg in arg_jsons {
                    args.push(self.parse_expr(scope, arg)?);
                }
                Expr::Call {
                    func: Box::new(self.parse_expr(scope, field(json, "func")?)?),
                    args,
                }
            }
            "List" => {
                let elts = self.parse_expr_list(scope, field(json, "elts")?)?;
                Expr::ListLiteral(elts)
            }
            "Tuple" => Expr::TupleLiteral {
                elts: self.parse_expr_list(scope, field(json, "elts")?)?,
                store: is_store_ctx(json),
            },
            "Dict" => {
                let key_jsons = field(json, "keys")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "Dict keys is not an array"))?;
                let mut keys = Vec::with_capacity(key_jsons.len());
                for key in key_jsons {
                    if key.is_null() {
                        return Err(ScriptError::status(
                            1,
                            format!("Dict unpacking is not supported at lineNo={line}"),
                        ));
                    }
                    keys.push(self.parse_expr(scope, key)?);
                }
                let values = self.parse_expr_list(scope, field(json, "values")?)?;
                if keys.len() != values.len() {
                    return Err(ScriptError::status(
                        1,
                        format!("keys={} not equal to values={}", keys.len(), values.len()),
                    ));
                }
                Expr::DictLiteral { keys, values }
            }
            "ListComp" => {
                let elements = vec![field(json, "elt")?];
                Expr::ListComp(Arc::new(self.parse_comprehension(scope, json, &elements)?))
            }
            "DictComp" => {
                let elements = vec![field(json, "key")?, field(json, "value")?];
                Expr::DictComp(Arc::new(self.parse_comprehension(scope, json, &elements)?))
            }
            "GeneratorExp" => {
                let elements = vec![field(json, "elt")?];
                Expr::GeneratorExp(Arc::new(self.parse_comprehension(scope, json, &elements)?))
            }
            "Lambda" => {
                let fn_scope = self.scopes.add_function_scope(scope);
                let index = self.scopes.function_of(fn_scope);
                let arg_jsons = field(field(json, "args")?, "args")?
                    .as_array()
                    .ok_or_else(|| ScriptError::status(1, "lambda args is not an array"))?;
                let mut arg_names = Vec::with_capacity(arg_jsons.len());
                let mut args = Vec::with_capacity(arg_jsons.len());
                for arg_json in arg_jsons {
                    let arg_name = str_field(arg_json, "arg")?.to_owned();
                    args.push(self.scopes.add_variable(fn_scope, &arg_name)?);
                    arg_names.push(arg_name);
                }
                let body_expr = self.parse_expr(fn_scope, field(json, "body")?)?;
                let body = Body::new(vec![Statement {
                    line,
                    kind: StatementKind::Return(body_expr),
                }]);
                Expr::Lambda(Arc::new(FunctionDef::new(
                    self.scopes.module(),
                    index,
                    "<lambda>".to_owned(),
                    arg_names,
                    args,
                    self.scopes.var_counter(index),
                    body,
                    Vec::new(),
                    None,
                )))
            }
            other => {
                return Err(ScriptError::status(
                    1,
                    format!("Could not find implementation for Node={other} at lineNo={line}"),
                ))
            }
        };
        Ok(ExprNode { line, expr })
    }

    fn parse_expr_list(&mut self, scope: ScopeId, json: &Json) -> RunResult<Vec<ExprNode>> {
        let items = json
            .as_array()
            .ok_or_else(|| ScriptError::status(1, "expected an AST array"))?;
        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            nodes.push(self.parse_expr(scope, item)?);
        }
        Ok(nodes)
    }

    fn parse_slice(&mut self, scope: ScopeId, json: &Json) -> RunResult<ExprNode> {
        let line = line_of(json);
        let part = |parser: &mut Self, key: &str| -> RunResult<Option<Box<ExprNode>>> {
            match json.get(key) {
                Some(value) if !value.is_null() => {
                    Ok(Some(Box::new(parser.parse_expr(scope, value)?)))
                }
                _ => Ok(None),
            }
        };
        let lower = part(self, "lower")?;
        let upper = part(self, "upper")?;
        let step = part(self, "step")?;
        Ok(ExprNode {
            line,
            expr: Expr::SliceLiteral { lower, upper, step },
        })
    }

    /// Builds the linked generator chain of a comprehension. Each generator
    /// gets a child scope; the element expressions compile in the innermost
    /// generator's scope.
    fn parse_comprehension(
        &mut self,
        scope: ScopeId,
        json: &Json,
        element_jsons: &[&Json],
    ) -> RunResult<GeneratorChain> {
        let generator_jsons = field(json, "generators")?
            .as_array()
            .ok_or_else(|| ScriptError::status(1, "comprehension generators is not an array"))?;
        if generator_jsons.is_empty() {
            return Err(ScriptError::status(1, "comprehension without generators"));
        }

        let mut links = Vec::with_capacity(generator_jsons.len());
        let mut gen_scope = scope;
        for generator in generator_jsons {
            gen_scope = self.scopes.add_scope(gen_scope);
            let target_json = field(generator, "target")?;
            let target_type = node_type(target_json)?;
            if target_type != "Name" && target_type != "Tuple" {
                return Err(ScriptError::status(
                    1,
                    format!("Unsupported target type {target_type} in comprehension"),
                ));
            }
            let target = self.parse_expr(gen_scope, target_json)?;
            let iterable = self.parse_expr(gen_scope, field(generator, "iter")?)?;
            let mut conditions = Vec::new();
            if let Some(ifs) = generator.get("ifs").and_then(Json::as_array) {
                for condition in ifs {
                    conditions.push(self.parse_expr(gen_scope, condition)?);
                }
            }
            links.push(GeneratorLink::new(iterable, target, conditions));
        }

        let mut elements = Vec::with_capacity(element_jsons.len());
        for element in element_jsons {
            elements.push(self.parse_expr(gen_scope, element)?);
        }

        let mut tail = links.pop().expect("checked non-empty");
        tail.set_elements(elements);
        while let Some(mut link) = links.pop() {
            link.set_next(tail);
            tail = link;
        }
        Ok(GeneratorChain::new(tail))
    }
}

fn parse_op<T: FromStr>(json: &Json, line: u32) -> RunResult<T> {
    let name = str_field(json, "_type")?;
    T::from_str(name).map_err(|_| {
        ScriptError::status(
            1,
            format!("Could not find operator {name} at lineNo={line}"),
        )
    })
}
