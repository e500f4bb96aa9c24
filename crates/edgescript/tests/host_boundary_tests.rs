//! Host-facing surface: multi-module scripts, foreign functions, event
//! hooks, char streams, and print capture.

mod common;

use std::sync::Arc;

use common::*;
use edgescript::{HostContext, NativeFn, NoopHost, Task, Value};
use parking_lot::Mutex;
use serde_json::json;

fn operate(task: &Task, function: &str, inputs: serde_json::Value) -> Value {
    let inputs = Value::from_json(&inputs).unwrap();
    task.operate(function, &inputs).expect("operate should succeed")
}

/// Host that records print output, log records and event writes.
#[derive(Debug, Default)]
struct CollectHost {
    printed: Mutex<Vec<String>>,
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl HostContext for CollectHost {
    fn print(&self, text: &str) {
        self.printed.lock().push(text.to_owned());
    }

    fn config(&self) -> serde_json::Value {
        json!({"deployment": "test", "shard": 7})
    }

    fn write_event(&self, event_type: &str, data: &serde_json::Value) {
        self.events.lock().push((event_type.to_owned(), data.clone()));
    }
}

#[test]
fn imports_bind_names_from_sibling_modules() {
    // helpers.py: def double(v): return v + v
    // main.py:    from helpers import double
    //             def main(x): return {"r": double(x)}
    let helpers = module(vec![func_def(
        1,
        "double",
        &["v"],
        vec![ret(2, binop(2, "Add", name_load(2, "v"), name_load(2, "v")))],
    )]);
    let main = module(vec![
        import_from(1, "helpers", "double", None),
        func_def(
            2,
            "main",
            &["x"],
            vec![ret(
                3,
                dict(
                    3,
                    vec![(
                        constant(3, json!("r")),
                        call_name(3, "double", vec![name_load(3, "x")]),
                    )],
                ),
            )],
        ),
    ]);
    let ast = json!({"main": main, "helpers": helpers});
    let task = Task::new(ast, Arc::new(NoopHost)).unwrap();
    let result = operate(&task, "main", json!({"x": 21}));
    assert_eq!(result, Value::from_json(&json!({"r": 42})).unwrap());
}

#[test]
fn missing_import_fails_with_line_number() {
    let task = Task::new(
        module(vec![import_from(9, "delitepy", "no_such_module", None)]),
        Arc::new(NoopHost),
    );
    let err = task.err().expect("import of unknown builtin must fail");
    assert!(err.message.contains("no_such_module"), "{}", err.message);
    assert!(err.message.contains("lineno=9"), "{}", err.message);
}

#[test]
fn foreign_functions_import_from_registered_paths() {
    // def main(x):
    //     from host import triple
    //     return {"r": triple(x)}
    let task = Task::new(
        module(vec![func_def(
            1,
            "main",
            &["x"],
            vec![
                import_from(2, "host", "triple", None),
                ret(
                    3,
                    dict(
                        3,
                        vec![(
                            constant(3, json!("r")),
                            call_name(3, "triple", vec![name_load(3, "x")]),
                        )],
                    ),
                ),
            ],
        )]),
        Arc::new(NoopHost),
    )
    .unwrap();
    task.register_foreign_function(
        "host",
        "triple",
        Arc::new(NativeFn::new("triple", |args: Vec<Value>| {
            Ok(Value::Int64(args[0].cast_i64()? * 3))
        })),
    );
    let result = operate(&task, "main", json!({"x": 5}));
    assert_eq!(result, Value::from_json(&json!({"r": 15})).unwrap());
}

#[test]
fn print_goes_to_the_host_sink() {
    // def main(): print("hello", 42)
    let host = Arc::new(CollectHost::default());
    let task = Task::new(
        module(vec![func_def(
            1,
            "main",
            &[],
            vec![expr_stmt(
                2,
                call_name(
                    2,
                    "print",
                    vec![constant(2, json!("hello")), constant(2, json!(42))],
                ),
            )],
        )]),
        host.clone(),
    )
    .unwrap();
    operate(&task, "main", json!({}));
    assert_eq!(host.printed.lock().as_slice(), ["hello 42"]);
}

#[test]
fn get_config_exposes_host_configuration() {
    let host = Arc::new(CollectHost::default());
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            func_def(
                2,
                "main",
                &[],
                vec![ret(
                    3,
                    dict(
                        3,
                        vec![(
                            constant(3, json!("shard")),
                            subscript_load(
                                3,
                                method_call(3, name_load(3, "nm"), "get_config", vec![]),
                                constant(3, json!("shard")),
                            ),
                        )],
                    ),
                )],
            ),
        ]),
        host,
    )
    .unwrap();
    let result = operate(&task, "main", json!({}));
    assert_eq!(result, Value::from_json(&json!({"shard": 7})).unwrap());
}

#[test]
fn simulated_char_stream_reads_to_completion() {
    // from delitepy import nimblenetInternalTesting as internal
    // def main():
    //     s = internal.create_simulated_char_stream("token stream")
    //     return {"r": s.get_blocking_str()}
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenetInternalTesting", Some("internal")),
            func_def(
                2,
                "main",
                &[],
                vec![
                    assign(
                        3,
                        name_store(3, "s"),
                        method_call(
                            3,
                            name_load(3, "internal"),
                            "create_simulated_char_stream",
                            vec![constant(3, json!("token stream"))],
                        ),
                    ),
                    ret(
                        4,
                        dict(
                            4,
                            vec![(
                                constant(4, json!("r")),
                                method_call(4, name_load(4, "s"), "get_blocking_str", vec![]),
                            )],
                        ),
                    ),
                ],
            ),
        ]),
        Arc::new(NoopHost),
    )
    .unwrap();
    let result = operate(&task, "main", json!({}));
    assert_eq!(result, Value::from_json(&json!({"r": "token stream"})).unwrap());
}

#[test]
fn pre_add_event_hooks_enrich_events_before_the_host_sink() {
    // store = nm.RawEventStore("clicks", "time", 100)
    // @pre_add_event(["clicks"])
    // def enrich(kind, event):
    //     event["seen"] = 1
    let host = Arc::new(CollectHost::default());
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            assign(
                2,
                name_store(2, "store"),
                method_call(
                    2,
                    name_load(2, "nm"),
                    "RawEventStore",
                    vec![
                        constant(2, json!("clicks")),
                        constant(2, json!("time")),
                        constant(2, json!(100)),
                    ],
                ),
            ),
            func_def_decorated(
                3,
                "enrich",
                &["kind", "event"],
                vec![assign(
                    4,
                    subscript_store(4, name_load(4, "event"), constant(4, json!("seen"))),
                    constant(4, json!(1)),
                )],
                vec![call_name(
                    3,
                    "pre_add_event",
                    vec![list_literal(3, vec![constant(3, json!("clicks"))])],
                )],
            ),
        ]),
        host.clone(),
    )
    .unwrap();

    let event = Value::from_json(&json!({"button": "buy"})).unwrap();
    task.process_event("clicks", event).unwrap();

    let events = host.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "clicks");
    assert_eq!(events[0].1, json!({"button": "buy", "seen": 1}));
}

#[test]
fn string_and_map_member_functions() {
    // def main(s):
    //     m = {"a": 1, "b": 2}
    //     m.pop("a")
    //     return {"u": s.upper(), "j": ",".join(["x", "y"]), "k": m.keys()}
    let task = Task::new(
        module(vec![func_def(
            1,
            "main",
            &["s"],
            vec![
                assign(
                    2,
                    name_store(2, "m"),
                    dict(
                        2,
                        vec![
                            (constant(2, json!("a")), constant(2, json!(1))),
                            (constant(2, json!("b")), constant(2, json!(2))),
                        ],
                    ),
                ),
                expr_stmt(
                    3,
                    method_call(3, name_load(3, "m"), "pop", vec![constant(3, json!("a"))]),
                ),
                ret(
                    4,
                    dict(
                        4,
                        vec![
                            (
                                constant(4, json!("u")),
                                method_call(4, name_load(4, "s"), "upper", vec![]),
                            ),
                            (
                                constant(4, json!("j")),
                                method_call(
                                    4,
                                    constant(4, json!(",")),
                                    "join",
                                    vec![list_literal(
                                        4,
                                        vec![constant(4, json!("x")), constant(4, json!("y"))],
                                    )],
                                ),
                            ),
                            (
                                constant(4, json!("k")),
                                method_call(4, name_load(4, "m"), "keys", vec![]),
                            ),
                        ],
                    ),
                ),
            ],
        )]),
        Arc::new(NoopHost),
    )
    .unwrap();
    let result = operate(&task, "main", json!({"s": "edge"}));
    assert_eq!(
        result,
        Value::from_json(&json!({"u": "EDGE", "j": "x,y", "k": ["b"]})).unwrap()
    );
}
