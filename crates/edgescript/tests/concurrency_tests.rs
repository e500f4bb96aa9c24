//! Concurrency contract: run_parallel ordering and cancellation, static
//! functions, futures and readiness.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use edgescript::{HostContext, NoopHost, RunResult, Task, Value};
use serde_json::json;

fn operate(task: &Task, function: &str, inputs: serde_json::Value) -> RunResult<Value> {
    let inputs = Value::from_json(&inputs).unwrap();
    task.operate(function, &inputs)
}

#[test]
fn run_parallel_preserves_input_order() {
    // from delitepy import nimblenet as nm
    // def main():
    //     ex = nm.ConcurrentExecutor()
    //     return {"r": ex.run_parallel(lambda v: v * v, [1, 2, 3, 4])}
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            func_def(
                2,
                "main",
                &[],
                vec![
                    assign(
                        3,
                        name_store(3, "ex"),
                        method_call(3, name_load(3, "nm"), "ConcurrentExecutor", vec![]),
                    ),
                    ret(
                        4,
                        dict(
                            4,
                            vec![(
                                constant(4, json!("r")),
                                method_call(
                                    4,
                                    name_load(4, "ex"),
                                    "run_parallel",
                                    vec![
                                        lambda(
                                            4,
                                            &["v"],
                                            binop(4, "Mult", name_load(4, "v"), name_load(4, "v")),
                                        ),
                                        list_literal(
                                            4,
                                            vec![
                                                constant(4, json!(1)),
                                                constant(4, json!(2)),
                                                constant(4, json!(3)),
                                                constant(4, json!(4)),
                                            ],
                                        ),
                                    ],
                                ),
                            )],
                        ),
                    ),
                ],
            ),
        ]),
        Arc::new(NoopHost),
    )
    .unwrap();
    let result = operate(&task, "main", json!({})).unwrap();
    let expected = Value::from_json(&json!({"r": [1, 4, 9, 16]})).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn run_parallel_rethrows_the_first_worker_error() {
    // def bad(v): return 1 / v     # v == 0 somewhere in the iterable
    // def main():
    //     ex = nm.ConcurrentExecutor()
    //     return {"r": ex.run_parallel(bad, [1, 0, 2])}
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            func_def(
                2,
                "bad",
                &["v"],
                vec![ret(
                    3,
                    binop(3, "Div", constant(3, json!(1)), name_load(3, "v")),
                )],
            ),
            func_def(
                4,
                "main",
                &[],
                vec![
                    assign(
                        5,
                        name_store(5, "ex"),
                        method_call(5, name_load(5, "nm"), "ConcurrentExecutor", vec![]),
                    ),
                    ret(
                        6,
                        dict(
                            6,
                            vec![(
                                constant(6, json!("r")),
                                method_call(
                                    6,
                                    name_load(6, "ex"),
                                    "run_parallel",
                                    vec![
                                        name_load(6, "bad"),
                                        list_literal(
                                            6,
                                            vec![
                                                constant(6, json!(1)),
                                                constant(6, json!(0)),
                                                constant(6, json!(2)),
                                            ],
                                        ),
                                    ],
                                ),
                            )],
                        ),
                    ),
                ],
            ),
        ]),
        Arc::new(NoopHost),
    )
    .unwrap();
    let err = operate(&task, "main", json!({})).unwrap_err();
    assert!(
        err.message.contains("zero"),
        "expected the division error, got: {}",
        err.message
    );
}

#[test]
fn concurrent_decorator_marks_functions_static() {
    // @concurrent
    // def square(v): return v * v
    // def main():
    //     ex = nm.ConcurrentExecutor()
    //     return {"r": ex.run_parallel(square, [5, 6])}
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            func_def_decorated(
                2,
                "square",
                &["v"],
                vec![ret(
                    3,
                    binop(3, "Mult", name_load(3, "v"), name_load(3, "v")),
                )],
                vec![name_load(2, "concurrent")],
            ),
            func_def(
                4,
                "main",
                &[],
                vec![
                    assign(
                        5,
                        name_store(5, "ex"),
                        method_call(5, name_load(5, "nm"), "ConcurrentExecutor", vec![]),
                    ),
                    ret(
                        6,
                        dict(
                            6,
                            vec![(
                                constant(6, json!("r")),
                                method_call(
                                    6,
                                    name_load(6, "ex"),
                                    "run_parallel",
                                    vec![
                                        name_load(6, "square"),
                                        list_literal(
                                            6,
                                            vec![constant(6, json!(5)), constant(6, json!(6))],
                                        ),
                                    ],
                                ),
                            )],
                        ),
                    ),
                ],
            ),
        ]),
        Arc::new(NoopHost),
    )
    .unwrap();
    let result = operate(&task, "main", json!({})).unwrap();
    let expected = Value::from_json(&json!({"r": [25, 36]})).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn executor_sync_serializes_calls() {
    // def main():
    //     ex = nm.ConcurrentExecutor()
    //     return {"r": ex.sync(len, [1, 2, 3])}
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            func_def(
                2,
                "main",
                &[],
                vec![
                    assign(
                        3,
                        name_store(3, "ex"),
                        method_call(3, name_load(3, "nm"), "ConcurrentExecutor", vec![]),
                    ),
                    ret(
                        4,
                        dict(
                            4,
                            vec![(
                                constant(4, json!("r")),
                                method_call(
                                    4,
                                    name_load(4, "ex"),
                                    "sync",
                                    vec![
                                        name_load(4, "len"),
                                        list_literal(
                                            4,
                                            vec![
                                                constant(4, json!(1)),
                                                constant(4, json!(2)),
                                                constant(4, json!(3)),
                                            ],
                                        ),
                                    ],
                                ),
                            )],
                        ),
                    ),
                ],
            ),
        ]),
        Arc::new(NoopHost),
    )
    .unwrap();
    let result = operate(&task, "main", json!({})).unwrap();
    let expected = Value::from_json(&json!({"r": 3})).unwrap();
    assert_eq!(result, expected);
}

/// Host whose model loads block until the test releases them.
#[derive(Debug)]
struct SlowModelHost {
    loads: AtomicUsize,
}

impl HostContext for SlowModelHost {
    fn load_model(&self, name: &str) -> RunResult<Value> {
        std::thread::sleep(Duration::from_millis(50));
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Value::string(format!("model:{name}")))
    }
}

#[test]
fn is_ready_turns_true_once_futures_resolve() {
    // m = nm.Model("ranker")        # module level: future stored in a frame
    let host = Arc::new(SlowModelHost {
        loads: AtomicUsize::new(0),
    });
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            assign(
                2,
                name_store(2, "m"),
                method_call(2, name_load(2, "nm"), "Model", vec![constant(2, json!("ranker"))]),
            ),
        ]),
        host.clone(),
    )
    .unwrap();

    // The load sleeps, so readiness flips from false to true and stays true.
    let mut became_ready = task.is_ready();
    for _ in 0..200 {
        if became_ready {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
        became_ready = task.is_ready();
    }
    assert!(became_ready, "future never resolved");
    assert!(task.is_ready(), "readiness must be stable once true");
    assert_eq!(host.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn future_get_blocks_for_the_resolved_value() {
    // def main():
    //     m = nm.Model("clip")
    //     return {"r": m.get()}
    let task = Task::new(
        module(vec![
            import_from(1, "delitepy", "nimblenet", Some("nm")),
            func_def(
                2,
                "main",
                &[],
                vec![
                    assign(
                        3,
                        name_store(3, "m"),
                        method_call(3, name_load(3, "nm"), "Model", vec![constant(3, json!("clip"))]),
                    ),
                    ret(
                        4,
                        dict(
                            4,
                            vec![(
                                constant(4, json!("r")),
                                method_call(4, name_load(4, "m"), "get", vec![]),
                            )],
                        ),
                    ),
                ],
            ),
        ]),
        Arc::new(SlowModelHost {
            loads: AtomicUsize::new(0),
        }),
    )
    .unwrap();
    let result = operate(&task, "main", json!({})).unwrap();
    let expected = Value::from_json(&json!({"r": "model:clip"})).unwrap();
    assert_eq!(result, expected);
}
