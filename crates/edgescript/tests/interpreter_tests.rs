//! End-to-end interpreter tests: build an AST dump, load a task, operate.

mod common;

use std::sync::Arc;

use common::*;
use edgescript::{NoopHost, Task, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn run_task(body: Vec<serde_json::Value>) -> Task {
    Task::new(module(body), Arc::new(NoopHost)).expect("task should load")
}

fn operate(task: &Task, function: &str, inputs: serde_json::Value) -> Value {
    let inputs = Value::from_json(&inputs).unwrap();
    task.operate(function, &inputs).expect("operate should succeed")
}

fn expect_map(task: &Task, function: &str, inputs: serde_json::Value, expected: serde_json::Value) {
    let result = operate(task, function, inputs);
    let expected = Value::from_json(&expected).unwrap();
    assert_eq!(result, expected, "result {result} != expected {expected}");
}

// ============================================================================
// Arithmetic and control flow
// ============================================================================

#[test]
fn sum_of_squares_over_range() {
    // def main(x):
    //     y = 0
    //     for i in range(x):
    //         y = y + i * i
    //     return {"y": y}
    let task = run_task(vec![func_def(
        1,
        "main",
        &["x"],
        vec![
            assign(2, name_store(2, "y"), constant(2, json!(0))),
            for_stmt(
                3,
                name_store(3, "i"),
                call_name(3, "range", vec![name_load(3, "x")]),
                vec![assign(
                    4,
                    name_store(4, "y"),
                    binop(
                        4,
                        "Add",
                        name_load(4, "y"),
                        binop(4, "Mult", name_load(4, "i"), name_load(4, "i")),
                    ),
                )],
            ),
            ret(5, dict(5, vec![(constant(5, json!("y")), name_load(5, "y"))])),
        ],
    )]);
    expect_map(&task, "main", json!({"x": 3}), json!({"y": 5}));
}

#[test]
fn while_loop_with_break() {
    // def main():
    //     n = 0
    //     while n < 100:
    //         n = n + 1
    //         if n == 7:
    //             break
    //     return {"n": n}
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![
            assign(2, name_store(2, "n"), constant(2, json!(0))),
            while_stmt(
                3,
                compare(3, name_load(3, "n"), vec!["Lt"], vec![constant(3, json!(100))]),
                vec![
                    assign(
                        4,
                        name_store(4, "n"),
                        binop(4, "Add", name_load(4, "n"), constant(4, json!(1))),
                    ),
                    if_stmt(
                        5,
                        compare(5, name_load(5, "n"), vec!["Eq"], vec![constant(5, json!(7))]),
                        vec![break_stmt(6)],
                        vec![],
                    ),
                ],
            ),
            ret(7, dict(7, vec![(constant(7, json!("n")), name_load(7, "n"))])),
        ],
    )]);
    expect_map(&task, "main", json!({}), json!({"n": 7}));
}

#[test]
fn chained_comparison_short_circuits() {
    // def main(a, b, c): return {"r": a < b < c}
    let task = run_task(vec![func_def(
        1,
        "main",
        &["a", "b", "c"],
        vec![ret(
            2,
            dict(
                2,
                vec![(
                    constant(2, json!("r")),
                    compare(
                        2,
                        name_load(2, "a"),
                        vec!["Lt", "Lt"],
                        vec![name_load(2, "b"), name_load(2, "c")],
                    ),
                )],
            ),
        )],
    )]);
    expect_map(&task, "main", json!({"a": 1, "b": 2, "c": 3}), json!({"r": true}));
    expect_map(&task, "main", json!({"a": 1, "b": 5, "c": 3}), json!({"r": false}));
}

// ============================================================================
// UTF-8 string indexing and slicing
// ============================================================================

#[test]
fn utf8_code_point_indexing_and_reverse() {
    // def main(s):
    //     return {"a": s[0], "b": s[1], "c": s[-1], "d": s[::-1], "n": len(s)}
    let sub = |line: u64, idx: serde_json::Value| {
        subscript_load(line, name_load(line, "s"), constant(line, idx))
    };
    let task = run_task(vec![func_def(
        1,
        "main",
        &["s"],
        vec![ret(
            2,
            dict(
                2,
                vec![
                    (constant(2, json!("a")), sub(2, json!(0))),
                    (constant(2, json!("b")), sub(2, json!(1))),
                    (
                        constant(2, json!("c")),
                        subscript_load(2, name_load(2, "s"), usub(2, constant(2, json!(1)))),
                    ),
                    (
                        constant(2, json!("d")),
                        subscript_load(
                            2,
                            name_load(2, "s"),
                            slice(
                                2,
                                serde_json::Value::Null,
                                serde_json::Value::Null,
                                usub(2, constant(2, json!(1))),
                            ),
                        ),
                    ),
                    (
                        constant(2, json!("n")),
                        call_name(2, "len", vec![name_load(2, "s")]),
                    ),
                ],
            ),
        )],
    )]);
    expect_map(
        &task,
        "main",
        json!({"s": "héllo"}),
        json!({"a": "h", "b": "é", "c": "o", "d": "olléh", "n": 5}),
    );
}

// ============================================================================
// List concatenation and repetition
// ============================================================================

#[test]
fn list_concat_and_repetition() {
    // return {"a": [1,2]+[3], "b": [0]*3, "c": 2*["a"]}
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![ret(
            2,
            dict(
                2,
                vec![
                    (
                        constant(2, json!("a")),
                        binop(
                            2,
                            "Add",
                            list_literal(2, vec![constant(2, json!(1)), constant(2, json!(2))]),
                            list_literal(2, vec![constant(2, json!(3))]),
                        ),
                    ),
                    (
                        constant(2, json!("b")),
                        binop(
                            2,
                            "Mult",
                            list_literal(2, vec![constant(2, json!(0))]),
                            constant(2, json!(3)),
                        ),
                    ),
                    (
                        constant(2, json!("c")),
                        binop(
                            2,
                            "Mult",
                            constant(2, json!(2)),
                            list_literal(2, vec![constant(2, json!("a"))]),
                        ),
                    ),
                ],
            ),
        )],
    )]);
    expect_map(
        &task,
        "main",
        json!({}),
        json!({"a": [1, 2, 3], "b": [0, 0, 0], "c": ["a", "a"]}),
    );
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn try_except_binds_raised_message() {
    // def main():
    //     try:
    //         raise Exception("boom")
    //     except Exception as e:
    //         return {"m": str(e)}
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![try_stmt(
            2,
            vec![raise_stmt(
                3,
                call_name(3, "Exception", vec![constant(3, json!("boom"))]),
            )],
            vec![handler(
                4,
                Some("Exception"),
                Some("e"),
                vec![ret(
                    5,
                    dict(
                        5,
                        vec![(
                            constant(5, json!("m")),
                            call_name(5, "str", vec![name_load(5, "e")]),
                        )],
                    ),
                )],
            )],
        )],
    )]);
    expect_map(&task, "main", json!({}), json!({"m": "boom"}));
}

#[test]
fn unmatched_exception_propagates_with_line_number() {
    // def main(): assert 1 == 2, "values differ"
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![assert_stmt(
            7,
            compare(7, constant(7, json!(1)), vec!["Eq"], vec![constant(7, json!(2))]),
            constant(7, json!("values differ")),
        )],
    )]);
    let inputs = Value::from_json(&json!({})).unwrap();
    let err = task.operate("main", &inputs).unwrap_err();
    assert_eq!(err.line, Some(7));
    assert!(err.message.contains("values differ"), "{}", err.message);
}

#[test]
fn division_by_zero_is_fatal_not_catchable_by_name() {
    // def main(x): return {"r": 1 / x}
    let task = run_task(vec![func_def(
        1,
        "main",
        &["x"],
        vec![ret(
            2,
            dict(
                2,
                vec![(
                    constant(2, json!("r")),
                    binop(2, "Div", constant(2, json!(1)), name_load(2, "x")),
                )],
            ),
        )],
    )]);
    let inputs = Value::from_json(&json!({"x": 0})).unwrap();
    assert!(task.operate("main", &inputs).is_err());
}

// ============================================================================
// Comprehensions
// ============================================================================

#[test]
fn dict_comprehension_over_pairs() {
    // {k: v*v for k, v in [("a",1), ("b",2)]}
    let pairs = list_literal(
        2,
        vec![
            tuple_load(2, vec![constant(2, json!("a")), constant(2, json!(1))]),
            tuple_load(2, vec![constant(2, json!("b")), constant(2, json!(2))]),
        ],
    );
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![ret(
            2,
            dict(
                2,
                vec![(
                    constant(2, json!("m")),
                    dict_comp(
                        2,
                        name_load(2, "k"),
                        binop(2, "Mult", name_load(2, "v"), name_load(2, "v")),
                        vec![comprehension(
                            2,
                            tuple_store(2, vec![name_store(2, "k"), name_store(2, "v")]),
                            pairs,
                            vec![],
                        )],
                    ),
                )],
            ),
        )],
    )]);
    expect_map(&task, "main", json!({}), json!({"m": {"a": 1, "b": 4}}));
}

#[test]
fn nested_list_comprehension_with_condition() {
    // [x * y for x in range(3) for y in range(3) if y > x]
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![ret(
            2,
            dict(
                2,
                vec![(
                    constant(2, json!("r")),
                    list_comp(
                        2,
                        binop(2, "Mult", name_load(2, "x"), name_load(2, "y")),
                        vec![
                            comprehension(
                                2,
                                name_store(2, "x"),
                                call_name(2, "range", vec![constant(2, json!(3))]),
                                vec![],
                            ),
                            comprehension(
                                2,
                                name_store(2, "y"),
                                call_name(2, "range", vec![constant(2, json!(3))]),
                                vec![compare(
                                    2,
                                    name_load(2, "y"),
                                    vec!["Gt"],
                                    vec![name_load(2, "x")],
                                )],
                            ),
                        ],
                    ),
                )],
            ),
        )],
    )]);
    // x=0: y in {1,2} -> 0,0 ; x=1: y=2 -> 2 ; x=2: none
    expect_map(&task, "main", json!({}), json!({"r": [0, 0, 2]}));
}

// ============================================================================
// Functions, closures, classes
// ============================================================================

#[test]
fn nested_function_calls_and_recursion() {
    // def fact(n):
    //     if n < 2: return 1
    //     return n * fact(n - 1)
    // def main(n): return {"r": fact(n)}
    let task = run_task(vec![
        func_def(
            1,
            "fact",
            &["n"],
            vec![
                if_stmt(
                    2,
                    compare(2, name_load(2, "n"), vec!["Lt"], vec![constant(2, json!(2))]),
                    vec![ret(2, constant(2, json!(1)))],
                    vec![],
                ),
                ret(
                    3,
                    binop(
                        3,
                        "Mult",
                        name_load(3, "n"),
                        call_name(
                            3,
                            "fact",
                            vec![binop(3, "Sub", name_load(3, "n"), constant(3, json!(1)))],
                        ),
                    ),
                ),
            ],
        ),
        func_def(
            5,
            "main",
            &["n"],
            vec![ret(
                6,
                dict(
                    6,
                    vec![(
                        constant(6, json!("r")),
                        call_name(6, "fact", vec![name_load(6, "n")]),
                    )],
                ),
            )],
        ),
    ]);
    expect_map(&task, "main", json!({"n": 6}), json!({"r": 720}));
}

#[test]
fn class_with_constructor_and_method() {
    // class Counter:
    //     def __init__(self, start):
    //         self.count = start
    //     def bump(self, by):
    //         self.count = self.count + by
    //         return self.count
    // def main():
    //     c = Counter(10)
    //     c.bump(5)
    //     return {"r": c.bump(1)}
    let attribute_store = |line: u64, value: serde_json::Value, attr: &str| {
        json!({
            "_type": "Attribute",
            "value": value,
            "attr": attr,
            "ctx": {"_type": "Store"},
            "lineno": line,
        })
    };
    let task = run_task(vec![
        class_def(
            1,
            "Counter",
            vec![
                func_def(
                    2,
                    "__init__",
                    &["self", "start"],
                    vec![assign(
                        3,
                        attribute_store(3, name_load(3, "self"), "count"),
                        name_load(3, "start"),
                    )],
                ),
                func_def(
                    4,
                    "bump",
                    &["self", "by"],
                    vec![
                        assign(
                            5,
                            attribute_store(5, name_load(5, "self"), "count"),
                            binop(
                                5,
                                "Add",
                                attribute_load(5, name_load(5, "self"), "count"),
                                name_load(5, "by"),
                            ),
                        ),
                        ret(6, attribute_load(6, name_load(6, "self"), "count")),
                    ],
                ),
            ],
        ),
        func_def(
            8,
            "main",
            &[],
            vec![
                assign(
                    9,
                    name_store(9, "c"),
                    call_name(9, "Counter", vec![constant(9, json!(10))]),
                ),
                expr_stmt(
                    10,
                    method_call(10, name_load(10, "c"), "bump", vec![constant(10, json!(5))]),
                ),
                ret(
                    11,
                    dict(
                        11,
                        vec![(
                            constant(11, json!("r")),
                            method_call(11, name_load(11, "c"), "bump", vec![constant(11, json!(1))]),
                        )],
                    ),
                ),
            ],
        ),
    ]);
    expect_map(&task, "main", json!({}), json!({"r": 16}));
}

// ============================================================================
// For-loop size re-reads
// ============================================================================

#[test]
fn for_loop_rereads_size_when_body_shrinks_iterable() {
    // def main():
    //     l = [1, 2, 3, 4]
    //     seen = 0
    //     for x in l:
    //         seen = seen + 1
    //         l.pop(0)
    //     return {"seen": seen}
    //
    // Each iteration removes the head, so the loop observes a shrinking
    // size and stops early.
    let task = run_task(vec![func_def(
        1,
        "main",
        &[],
        vec![
            assign(
                2,
                name_store(2, "l"),
                list_literal(
                    2,
                    vec![
                        constant(2, json!(1)),
                        constant(2, json!(2)),
                        constant(2, json!(3)),
                        constant(2, json!(4)),
                    ],
                ),
            ),
            assign(3, name_store(3, "seen"), constant(3, json!(0))),
            for_stmt(
                4,
                name_store(4, "x"),
                name_load(4, "l"),
                vec![
                    assign(
                        5,
                        name_store(5, "seen"),
                        binop(5, "Add", name_load(5, "seen"), constant(5, json!(1))),
                    ),
                    expr_stmt(
                        6,
                        method_call(6, name_load(6, "l"), "pop", vec![constant(6, json!(0))]),
                    ),
                ],
            ),
            ret(
                7,
                dict(7, vec![(constant(7, json!("seen")), name_load(7, "seen"))]),
            ),
        ],
    )]);
    expect_map(&task, "main", json!({}), json!({"seen": 2}));
}

// ============================================================================
// nimblenet module surface
// ============================================================================

#[test]
fn tensors_through_the_nimblenet_module() {
    // from delitepy import nimblenet as nm
    // def main():
    //     t = nm.tensor([3, 1, 2], "int64")
    //     order = t.argsort("asc")
    //     picked = t.arrange(order)
    //     return {"sum": nm.sum(t), "first": picked[0]}
    let nm = |line: u64| name_load(line, "nm");
    let task = run_task(vec![
        import_from(1, "delitepy", "nimblenet", Some("nm")),
        func_def(
            2,
            "main",
            &[],
            vec![
                assign(
                    3,
                    name_store(3, "t"),
                    method_call(
                        3,
                        nm(3),
                        "tensor",
                        vec![
                            list_literal(
                                3,
                                vec![
                                    constant(3, json!(3)),
                                    constant(3, json!(1)),
                                    constant(3, json!(2)),
                                ],
                            ),
                            constant(3, json!("int64")),
                        ],
                    ),
                ),
                assign(
                    4,
                    name_store(4, "order"),
                    method_call(4, name_load(4, "t"), "argsort", vec![constant(4, json!("asc"))]),
                ),
                assign(
                    5,
                    name_store(5, "picked"),
                    method_call(5, name_load(5, "t"), "arrange", vec![name_load(5, "order")]),
                ),
                ret(
                    6,
                    dict(
                        6,
                        vec![
                            (
                                constant(6, json!("sum")),
                                method_call(6, nm(6), "sum", vec![name_load(6, "t")]),
                            ),
                            (
                                constant(6, json!("first")),
                                subscript_load(6, name_load(6, "picked"), constant(6, json!(0))),
                            ),
                        ],
                    ),
                ),
            ],
        ),
    ]);
    expect_map(&task, "main", json!({}), json!({"sum": 6, "first": 1}));
}

#[test]
fn parse_json_round_trip_preserves_map_equality() {
    // def main(m): return {"r": nm.parse_json(<json text of m>)}
    let task = run_task(vec![
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
                        constant(3, json!("r")),
                        method_call(
                            3,
                            name_load(3, "nm"),
                            "parse_json",
                            vec![constant(3, json!(r#"{"a": 1, "b": [2, 3]}"#))],
                        ),
                    )],
                ),
            )],
        ),
    ]);
    expect_map(&task, "main", json!({}), json!({"r": {"a": 1, "b": [2, 3]}}));
}

#[test]
fn regex_module_match_and_findall() {
    // from delitepy import ne_re as re
    // def main(s):
    //     m = re.search("(h.)llo", s)
    //     return {"g": m.group(1), "all": re.findall("l", s)}
    let task = run_task(vec![
        import_from(1, "delitepy", "ne_re", Some("re")),
        func_def(
            2,
            "main",
            &["s"],
            vec![
                assign(
                    3,
                    name_store(3, "m"),
                    method_call(
                        3,
                        name_load(3, "re"),
                        "search",
                        vec![constant(3, json!("(h.)llo")), name_load(3, "s")],
                    ),
                ),
                ret(
                    4,
                    dict(
                        4,
                        vec![
                            (
                                constant(4, json!("g")),
                                method_call(4, name_load(4, "m"), "group", vec![constant(4, json!(1))]),
                            ),
                            (
                                constant(4, json!("all")),
                                method_call(
                                    4,
                                    name_load(4, "re"),
                                    "findall",
                                    vec![constant(4, json!("l")), name_load(4, "s")],
                                ),
                            ),
                        ],
                    ),
                ),
            ],
        ),
    ]);
    expect_map(
        &task,
        "main",
        json!({"s": "hello"}),
        json!({"g": "he", "all": ["l", "l"]}),
    );
}
