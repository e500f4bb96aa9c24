//! Builders for Python-ast JSON dumps, shared by the integration tests.
//!
//! Only the node shapes the engine recognizes are produced here; `lineno`
//! is threaded through everything because the parser requires it.
#![allow(dead_code)]

use serde_json::{json, Value as Json};

pub fn module(body: Vec<Json>) -> Json {
    json!({"_type": "Module", "body": body, "lineno": 0})
}

pub fn constant(line: u64, value: Json) -> Json {
    json!({"_type": "Constant", "value": value, "lineno": line})
}

pub fn name_load(line: u64, id: &str) -> Json {
    json!({"_type": "Name", "id": id, "ctx": {"_type": "Load"}, "lineno": line})
}

pub fn name_store(line: u64, id: &str) -> Json {
    json!({"_type": "Name", "id": id, "ctx": {"_type": "Store"}, "lineno": line})
}

pub fn assign(line: u64, target: Json, value: Json) -> Json {
    json!({"_type": "Assign", "targets": [target], "value": value, "lineno": line})
}

pub fn expr_stmt(line: u64, value: Json) -> Json {
    json!({"_type": "Expr", "value": value, "lineno": line})
}

pub fn ret(line: u64, value: Json) -> Json {
    json!({"_type": "Return", "value": value, "lineno": line})
}

pub fn binop(line: u64, op: &str, left: Json, right: Json) -> Json {
    json!({
        "_type": "BinOp",
        "op": {"_type": op},
        "left": left,
        "right": right,
        "lineno": line,
    })
}

pub fn compare(line: u64, left: Json, ops: Vec<&str>, comparators: Vec<Json>) -> Json {
    let ops: Vec<Json> = ops.into_iter().map(|op| json!({"_type": op})).collect();
    json!({
        "_type": "Compare",
        "left": left,
        "ops": ops,
        "comparators": comparators,
        "lineno": line,
    })
}

pub fn call(line: u64, func: Json, args: Vec<Json>) -> Json {
    json!({"_type": "Call", "func": func, "args": args, "lineno": line})
}

pub fn call_name(line: u64, func: &str, args: Vec<Json>) -> Json {
    call(line, name_load(line, func), args)
}

pub fn attribute_load(line: u64, value: Json, attr: &str) -> Json {
    json!({
        "_type": "Attribute",
        "value": value,
        "attr": attr,
        "ctx": {"_type": "Load"},
        "lineno": line,
    })
}

pub fn method_call(line: u64, object: Json, method: &str, args: Vec<Json>) -> Json {
    call(line, attribute_load(line, object, method), args)
}

pub fn list_literal(line: u64, elts: Vec<Json>) -> Json {
    json!({"_type": "List", "elts": elts, "ctx": {"_type": "Load"}, "lineno": line})
}

pub fn tuple_load(line: u64, elts: Vec<Json>) -> Json {
    json!({"_type": "Tuple", "elts": elts, "ctx": {"_type": "Load"}, "lineno": line})
}

pub fn tuple_store(line: u64, elts: Vec<Json>) -> Json {
    json!({"_type": "Tuple", "elts": elts, "ctx": {"_type": "Store"}, "lineno": line})
}

pub fn dict(line: u64, entries: Vec<(Json, Json)>) -> Json {
    let (keys, values): (Vec<Json>, Vec<Json>) = entries.into_iter().unzip();
    json!({"_type": "Dict", "keys": keys, "values": values, "lineno": line})
}

pub fn subscript_load(line: u64, value: Json, index: Json) -> Json {
    json!({
        "_type": "Subscript",
        "value": value,
        "slice": index,
        "ctx": {"_type": "Load"},
        "lineno": line,
    })
}

pub fn subscript_store(line: u64, value: Json, index: Json) -> Json {
    json!({
        "_type": "Subscript",
        "value": value,
        "slice": index,
        "ctx": {"_type": "Store"},
        "lineno": line,
    })
}

pub fn slice(line: u64, lower: Json, upper: Json, step: Json) -> Json {
    json!({
        "_type": "Slice",
        "lower": lower,
        "upper": upper,
        "step": step,
        "lineno": line,
    })
}

pub fn usub(line: u64, operand: Json) -> Json {
    json!({
        "_type": "UnaryOp",
        "op": {"_type": "USub"},
        "operand": operand,
        "lineno": line,
    })
}

pub fn func_def(line: u64, name: &str, args: &[&str], body: Vec<Json>) -> Json {
    func_def_decorated(line, name, args, body, vec![])
}

pub fn func_def_decorated(
    line: u64,
    name: &str,
    args: &[&str],
    body: Vec<Json>,
    decorators: Vec<Json>,
) -> Json {
    let args: Vec<Json> = args.iter().map(|a| json!({"arg": a})).collect();
    json!({
        "_type": "FunctionDef",
        "name": name,
        "args": {"args": args},
        "body": body,
        "decorator_list": decorators,
        "lineno": line,
    })
}

pub fn lambda(line: u64, args: &[&str], body: Json) -> Json {
    let args: Vec<Json> = args.iter().map(|a| json!({"arg": a})).collect();
    json!({"_type": "Lambda", "args": {"args": args}, "body": body, "lineno": line})
}

pub fn class_def(line: u64, name: &str, body: Vec<Json>) -> Json {
    json!({"_type": "ClassDef", "name": name, "body": body, "lineno": line})
}

pub fn for_stmt(line: u64, target: Json, iter: Json, body: Vec<Json>) -> Json {
    json!({
        "_type": "For",
        "target": target,
        "iter": iter,
        "body": body,
        "lineno": line,
    })
}

pub fn while_stmt(line: u64, test: Json, body: Vec<Json>) -> Json {
    json!({"_type": "While", "test": test, "body": body, "lineno": line})
}

pub fn if_stmt(line: u64, test: Json, body: Vec<Json>, orelse: Vec<Json>) -> Json {
    json!({
        "_type": "If",
        "test": test,
        "body": body,
        "orelse": orelse,
        "lineno": line,
    })
}

pub fn break_stmt(line: u64) -> Json {
    json!({"_type": "Break", "lineno": line})
}

pub fn assert_stmt(line: u64, test: Json, msg: Json) -> Json {
    json!({"_type": "Assert", "test": test, "msg": msg, "lineno": line})
}

pub fn raise_stmt(line: u64, exc: Json) -> Json {
    json!({"_type": "Raise", "exc": exc, "lineno": line})
}

pub fn try_stmt(line: u64, body: Vec<Json>, handlers: Vec<Json>) -> Json {
    json!({"_type": "Try", "body": body, "handlers": handlers, "lineno": line})
}

pub fn handler(line: u64, exception_type: Option<&str>, name: Option<&str>, body: Vec<Json>) -> Json {
    let type_json = match exception_type {
        Some(t) => json!({"_type": "Name", "id": t, "ctx": {"_type": "Load"}, "lineno": line}),
        None => Json::Null,
    };
    let name_json = match name {
        Some(n) => json!(n),
        None => Json::Null,
    };
    json!({
        "_type": "ExceptHandler",
        "type": type_json,
        "name": name_json,
        "body": body,
        "lineno": line,
    })
}

pub fn import_from(line: u64, module: &str, name: &str, alias: Option<&str>) -> Json {
    let asname = match alias {
        Some(a) => json!(a),
        None => Json::Null,
    };
    json!({
        "_type": "ImportFrom",
        "module": module,
        "names": [{"name": name, "asname": asname}],
        "lineno": line,
    })
}

pub fn list_comp(line: u64, elt: Json, generators: Vec<Json>) -> Json {
    json!({"_type": "ListComp", "elt": elt, "generators": generators, "lineno": line})
}

pub fn dict_comp(line: u64, key: Json, value: Json, generators: Vec<Json>) -> Json {
    json!({
        "_type": "DictComp",
        "key": key,
        "value": value,
        "generators": generators,
        "lineno": line,
    })
}

pub fn comprehension(line: u64, target: Json, iter: Json, ifs: Vec<Json>) -> Json {
    json!({
        "_type": "comprehension",
        "target": target,
        "iter": iter,
        "ifs": ifs,
        "lineno": line,
    })
}
