//! End-to-end tests: hand-built syntax trees compiled and run on the VM.

mod common;

use pretty_assertions::assert_eq;

use std::rc::Rc;

use smog::Error;
use smog::bytecode::{SymbolTable, compile, compile_incremental};
use smog::lang::{ClassDef, Expr, Message, MethodDef, Program, Stmt};
use smog::runtime::{RuntimeErrorKind, StepState, Value, Vm, VmConfig};

use common::{SharedBuffer, init_test_logging};

fn run_on(vm: &mut Vm, statements: Vec<Stmt>) -> Result<Value, Error> {
    init_test_logging();
    let code = compile(&Program::new(statements))?;
    Ok(vm.run(code)?)
}

fn run(statements: Vec<Stmt>) -> Result<Value, Error> {
    run_on(&mut Vm::new(), statements)
}

fn runtime_kind(result: Result<Value, Error>) -> RuntimeErrorKind {
    match result {
        Err(Error::Runtime(err)) => err.kind,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

fn var(name: &str) -> Expr {
    Expr::var(name)
}

fn new_instance(class: &str) -> Expr {
    Expr::unary(var(class), "new")
}

// ─────────────────────────── Basics ───────────────────────────

#[test]
fn test_three_plus_four() {
    let value = run(vec![Stmt::expr(Expr::binary(Expr::int(3), "+", Expr::int(4)))]).unwrap();
    assert_eq!(value, Value::Integer(7));
}

#[test]
fn test_empty_program_is_nil() {
    assert_eq!(run(vec![]).unwrap(), Value::Nil);
}

#[test]
fn test_while_loop_sums() {
    // | i sum | i := 0. sum := 0. [i < 5] whileTrue: [sum := sum + i. i := i + 1]. sum
    let value = run(vec![
        Stmt::declare(&["i", "sum"]),
        Stmt::expr(Expr::assign("i", Expr::int(0))),
        Stmt::expr(Expr::assign("sum", Expr::int(0))),
        Stmt::expr(Expr::send(
            Expr::block(&[], vec![Stmt::expr(Expr::binary(var("i"), "<", Expr::int(5)))]),
            "whileTrue:",
            vec![Expr::block(
                &[],
                vec![
                    Stmt::expr(Expr::assign("sum", Expr::binary(var("sum"), "+", var("i")))),
                    Stmt::expr(Expr::assign("i", Expr::binary(var("i"), "+", Expr::int(1)))),
                ],
            )],
        )),
        Stmt::expr(var("sum")),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(10));
}

#[test]
fn test_inject_into() {
    let value = run(vec![Stmt::expr(Expr::send(
        Expr::Array(vec![Expr::int(1), Expr::int(2), Expr::int(3)]),
        "inject:into:",
        vec![
            Expr::int(0),
            Expr::block(&["a", "b"], vec![Stmt::expr(Expr::binary(var("a"), "+", var("b")))]),
        ],
    ))])
    .unwrap();
    assert_eq!(value, Value::Integer(6));
}

#[test]
fn test_collect_and_select() {
    // (#(1 2 3 4) collect: [:x | x * x]) select: [:x | x even]
    let squares = Expr::send(
        Expr::Array((1..=4).map(Expr::int).collect()),
        "collect:",
        vec![Expr::block(&["x"], vec![Stmt::expr(Expr::binary(var("x"), "*", var("x")))])],
    );
    let value = run(vec![Stmt::expr(Expr::send(
        squares,
        "select:",
        vec![Expr::block(&["x"], vec![Stmt::expr(Expr::unary(var("x"), "even"))])],
    ))])
    .unwrap();
    assert_eq!(value.print_string(), "#(4 16)");
}

#[test]
fn test_cascade_answers_receiver() {
    // #() add: 1; add: 2
    let value = run(vec![Stmt::expr(Expr::cascade(
        Expr::Array(vec![]),
        vec![
            Message::new("add:", vec![Expr::int(1)]),
            Message::new("add:", vec![Expr::int(2)]),
        ],
    ))])
    .unwrap();
    assert_eq!(value.print_string(), "#(1 2)");
}

#[test]
fn test_println_output() {
    let buffer = SharedBuffer::new();
    let mut vm = Vm::new().with_output(buffer.clone());
    run_on(
        &mut vm,
        vec![
            Stmt::expr(Expr::unary(Expr::string("hello"), "println")),
            Stmt::expr(Expr::unary(Expr::unary(Expr::int(42), "printString"), "println")),
        ],
    )
    .unwrap();
    assert_eq!(buffer.contents(), "hello\n42\n");
}

// ─────────────────────────── Classes ───────────────────────────

fn counter_class() -> Stmt {
    Stmt::Class(
        ClassDef::new("Counter", Some("Object"))
            .with_fields(&["count"])
            .with_method(MethodDef::new(
                "init",
                &[],
                vec![
                    Stmt::expr(Expr::assign("count", Expr::int(0))),
                    Stmt::ret(Expr::SelfRef),
                ],
            ))
            .with_method(MethodDef::new(
                "increment",
                &[],
                vec![
                    Stmt::expr(Expr::assign("count", Expr::binary(var("count"), "+", Expr::int(1)))),
                    Stmt::ret(var("count")),
                ],
            ))
            .with_method(MethodDef::new("count", &[], vec![Stmt::ret(var("count"))]))
            .with_class_method(MethodDef::new(
                "new",
                &[],
                vec![Stmt::ret(Expr::unary(Expr::unary(Expr::Super, "new"), "init"))],
            )),
    )
}

#[test]
fn test_counter_counts_to_three() {
    let value = run(vec![
        counter_class(),
        Stmt::declare(&["c"]),
        Stmt::expr(Expr::assign("c", new_instance("Counter"))),
        Stmt::expr(Expr::unary(var("c"), "increment")),
        Stmt::expr(Expr::unary(var("c"), "increment")),
        Stmt::expr(Expr::unary(var("c"), "increment")),
        Stmt::expr(Expr::unary(var("c"), "count")),
    ]);
    // declarations must lead the body
    assert!(matches!(value, Err(Error::Compile(_))));

    let value = run(vec![
        Stmt::declare(&["c"]),
        counter_class(),
        Stmt::expr(Expr::assign("c", new_instance("Counter"))),
        Stmt::expr(Expr::unary(var("c"), "increment")),
        Stmt::expr(Expr::unary(var("c"), "increment")),
        Stmt::expr(Expr::unary(var("c"), "increment")),
        Stmt::expr(Expr::unary(var("c"), "count")),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(3));
}

#[test]
fn test_inheritance_and_super() {
    let value = run(vec![
        Stmt::Class(
            ClassDef::new("Animal", Some("Object"))
                .with_method(MethodDef::new("value", &[], vec![Stmt::ret(Expr::int(10))])),
        ),
        Stmt::Class(ClassDef::new("Dog", Some("Animal")).with_method(MethodDef::new(
            "value",
            &[],
            vec![Stmt::ret(Expr::binary(
                Expr::unary(Expr::Super, "value"),
                "+",
                Expr::int(5),
            ))],
        ))),
        Stmt::expr(Expr::unary(new_instance("Dog"), "value")),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(15));
}

#[test]
fn test_inherited_fields_and_kind_checks() {
    let value = run(vec![
        Stmt::Class(ClassDef::new("Point", Some("Object")).with_fields(&["x"])),
        Stmt::Class(
            ClassDef::new("Point3", Some("Point"))
                .with_fields(&["z"])
                .with_method(MethodDef::new(
                    "setUp",
                    &[],
                    vec![
                        Stmt::expr(Expr::assign("x", Expr::int(1))),
                        Stmt::expr(Expr::assign("z", Expr::int(2))),
                        Stmt::ret(Expr::binary(var("x"), "+", var("z"))),
                    ],
                )),
        ),
        Stmt::expr(Expr::Array(vec![
            Expr::unary(new_instance("Point3"), "setUp"),
            Expr::send(new_instance("Point3"), "isKindOf:", vec![var("Point")]),
            Expr::send(new_instance("Point3"), "isMemberOf:", vec![var("Point")]),
            Expr::unary(new_instance("Point3"), "className"),
        ])),
    ])
    .unwrap();
    assert_eq!(value.print_string(), "#(3 true false 'Point3')");
}

#[test]
fn test_empty_method_answers_self() {
    let value = run(vec![
        Stmt::Class(ClassDef::new("Thing", Some("Object")).with_method(MethodDef::new("noop", &[], vec![]))),
        Stmt::expr(Expr::unary(Expr::unary(new_instance("Thing"), "noop"), "className")),
    ])
    .unwrap();
    assert_eq!(value, Value::string("Thing"));
}

#[test]
fn test_does_not_understand_instance() {
    let kind = runtime_kind(run(vec![Stmt::expr(Expr::unary(new_instance("Object"), "frobnicate"))]));
    assert_eq!(
        kind,
        RuntimeErrorKind::DoesNotUnderstand {
            class_name: "Object".into(),
            receiver: "an Object".into(),
            selector: "frobnicate".into()
        }
    );
}

#[test]
fn test_class_variables_shared_and_shadowed() {
    // Account keeps a running Total across instances; Savings declares its
    // own Total that hides the inherited one.
    let account = ClassDef::new("Account", Some("Object"))
        .with_class_vars(&["Total"])
        .with_method(MethodDef::new(
            "deposit:",
            &["amount"],
            vec![Stmt::ret(Expr::assign(
                "Total",
                Expr::binary(
                    Expr::send(var("Total"), "ifNil:", vec![Expr::int(0)]),
                    "+",
                    var("amount"),
                ),
            ))],
        ))
        .with_class_method(MethodDef::new("total", &[], vec![Stmt::ret(var("Total"))]));
    let savings = ClassDef::new("Savings", Some("Account"))
        .with_class_vars(&["Total"])
        .with_method(MethodDef::new(
            "bump",
            &[],
            vec![Stmt::ret(Expr::assign("Total", Expr::int(100)))],
        ))
        .with_class_method(MethodDef::new("ownTotal", &[], vec![Stmt::ret(var("Total"))]));

    let value = run(vec![
        Stmt::Class(account),
        Stmt::Class(savings),
        Stmt::expr(Expr::send(new_instance("Account"), "deposit:", vec![Expr::int(5)])),
        Stmt::expr(Expr::send(new_instance("Account"), "deposit:", vec![Expr::int(7)])),
        Stmt::expr(Expr::unary(new_instance("Savings"), "bump")),
        Stmt::expr(Expr::Array(vec![
            Expr::unary(var("Account"), "total"),
            Expr::unary(var("Savings"), "ownTotal"),
        ])),
    ])
    .unwrap();
    assert_eq!(value.print_string(), "#(12 100)");
}

// ─────────────────────────── Non-local return ───────────────────────────

fn finder_class() -> Stmt {
    // find: n
    //   (n > 0) ifTrue: [(n > 5) ifTrue: [^'big']. ^'small'].
    //   ^'none'
    let inner = Expr::send(
        Expr::binary(var("n"), ">", Expr::int(5)),
        "ifTrue:",
        vec![Expr::block(&[], vec![Stmt::ret(Expr::string("big"))])],
    );
    let outer = Expr::send(
        Expr::binary(var("n"), ">", Expr::int(0)),
        "ifTrue:",
        vec![Expr::block(
            &[],
            vec![Stmt::expr(inner), Stmt::ret(Expr::string("small"))],
        )],
    );
    Stmt::Class(
        ClassDef::new("Finder", Some("Object"))
            .with_method(MethodDef::new(
                "find:",
                &["n"],
                vec![Stmt::expr(outer), Stmt::ret(Expr::string("none"))],
            ))
            .with_method(MethodDef::new(
                "firstEven:",
                &["items"],
                vec![
                    Stmt::expr(Expr::send(
                        var("items"),
                        "do:",
                        vec![Expr::block(
                            &["x"],
                            vec![Stmt::expr(Expr::send(
                                Expr::binary(
                                    Expr::binary(var("x"), "\\\\", Expr::int(2)),
                                    "=",
                                    Expr::int(0),
                                ),
                                "ifTrue:",
                                vec![Expr::block(&[], vec![Stmt::ret(var("x"))])],
                            ))],
                        )],
                    )),
                    Stmt::ret(Expr::nil()),
                ],
            ))
            .with_method(MethodDef::new(
                "escaper",
                &[],
                vec![Stmt::ret(Expr::block(&["x"], vec![Stmt::ret(var("x"))]))],
            )),
    )
}

fn find(n: i64) -> Stmt {
    Stmt::expr(Expr::send(new_instance("Finder"), "find:", vec![Expr::int(n)]))
}

#[test]
fn test_non_local_return_through_nested_conditionals() {
    let value = run(vec![
        finder_class(),
        Stmt::expr(Expr::Array(vec![
            Expr::send(new_instance("Finder"), "find:", vec![Expr::int(10)]),
            Expr::send(new_instance("Finder"), "find:", vec![Expr::int(3)]),
            Expr::send(new_instance("Finder"), "find:", vec![Expr::int(-1)]),
        ])),
    ])
    .unwrap();
    assert_eq!(value.print_string(), "#('big' 'small' 'none')");

    assert_eq!(run(vec![finder_class(), find(7)]).unwrap(), Value::string("big"));
}

#[test]
fn test_non_local_return_out_of_iteration() {
    let items = Expr::Array(vec![Expr::int(1), Expr::int(3), Expr::int(4), Expr::int(5)]);
    let value = run(vec![
        finder_class(),
        Stmt::expr(Expr::send(new_instance("Finder"), "firstEven:", vec![items])),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(4));
}

#[test]
fn test_expired_non_local_return_is_error() {
    let kind = runtime_kind(run(vec![
        finder_class(),
        Stmt::expr(Expr::send(
            Expr::unary(new_instance("Finder"), "escaper"),
            "value:",
            vec![Expr::int(3)],
        )),
    ]));
    assert_eq!(kind, RuntimeErrorKind::NonLocalReturnExpired);
}

#[test]
fn test_top_level_block_return_ends_program() {
    let value = run(vec![
        Stmt::expr(Expr::send(
            Expr::block(&["x"], vec![Stmt::ret(var("x"))]),
            "value:",
            vec![Expr::int(5)],
        )),
        Stmt::expr(Expr::int(99)),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(5));
}

// ─────────────────────────── Closures ───────────────────────────

#[test]
fn test_closure_writes_enclosing_local() {
    let value = run(vec![
        Stmt::declare(&["count", "inc"]),
        Stmt::expr(Expr::assign("count", Expr::int(0))),
        Stmt::expr(Expr::assign(
            "inc",
            Expr::block(
                &[],
                vec![Stmt::expr(Expr::assign(
                    "count",
                    Expr::binary(var("count"), "+", Expr::int(1)),
                ))],
            ),
        )),
        Stmt::expr(Expr::unary(var("inc"), "value")),
        Stmt::expr(Expr::unary(var("inc"), "value")),
        Stmt::expr(var("count")),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(2));
}

#[test]
fn test_closure_outlives_its_method() {
    // makeCounter | n | n := 0. ^[n := n + 1]
    let maker = ClassDef::new("Maker", Some("Object")).with_method(MethodDef::new(
        "makeCounter",
        &[],
        vec![
            Stmt::declare(&["n"]),
            Stmt::expr(Expr::assign("n", Expr::int(0))),
            Stmt::ret(Expr::block(
                &[],
                vec![Stmt::expr(Expr::assign("n", Expr::binary(var("n"), "+", Expr::int(1))))],
            )),
        ],
    ));
    let value = run(vec![
        Stmt::declare(&["counter"]),
        Stmt::Class(maker),
        Stmt::expr(Expr::assign("counter", Expr::unary(new_instance("Maker"), "makeCounter"))),
        Stmt::expr(Expr::unary(var("counter"), "value")),
        Stmt::expr(Expr::unary(var("counter"), "value")),
        Stmt::expr(Expr::unary(var("counter"), "value")),
    ])
    .unwrap();
    assert_eq!(value, Value::Integer(3));
}

#[test]
fn test_self_referencing_closures_are_reclaimed() {
    // 1 to: 500 do: [:i | | f | f := [f]. f]
    let body = Expr::block(
        &["i"],
        vec![
            Stmt::declare(&["f"]),
            Stmt::expr(Expr::assign("f", Expr::block(&[], vec![Stmt::expr(var("f"))]))),
            Stmt::expr(var("f")),
        ],
    );
    let program = Program::new(vec![Stmt::expr(Expr::send(
        Expr::int(1),
        "to:do:",
        vec![Expr::int(500), body],
    ))]);

    let mut vm = Vm::with_config(VmConfig::default().with_gc_threshold(32));
    vm.load(compile(&program).unwrap()).unwrap();

    let mut peak = 0;
    let value = loop {
        peak = peak.max(vm.live_contexts());
        if let StepState::Finished(value) = vm.step().unwrap() {
            break value;
        }
    };

    assert_eq!(value, Value::Integer(1));
    assert!(peak < 100, "contexts were not reclaimed (peak {})", peak);

    vm.collect_garbage();
    assert_eq!(vm.live_contexts(), 1);
}

/// `Holder>>setup  h := [self]. ^self`: the instance holds a block that
/// holds the instance.
fn holder_class() -> Stmt {
    Stmt::Class(
        ClassDef::new("Holder", Some("Object"))
            .with_fields(&["h"])
            .with_method(MethodDef::new(
                "setup",
                &[],
                vec![
                    Stmt::expr(Expr::assign("h", Expr::block(&[], vec![Stmt::expr(Expr::SelfRef)]))),
                    Stmt::ret(Expr::SelfRef),
                ],
            )),
    )
}

#[test]
fn test_instance_block_cycle_freed_with_vm() {
    let mut vm = Vm::new();
    let value = run_on(
        &mut vm,
        vec![holder_class(), Stmt::expr(Expr::unary(new_instance("Holder"), "setup"))],
    )
    .unwrap();

    let Value::Instance(instance) = value else {
        panic!("expected an instance, got {:?}", value);
    };
    let weak = Rc::downgrade(&instance);
    drop(instance);
    drop(vm);

    assert!(weak.upgrade().is_none(), "instance outlived its VM");
}

#[test]
fn test_value_held_by_host_survives_vm() {
    let mut vm = Vm::new();
    let value = run_on(
        &mut vm,
        vec![holder_class(), Stmt::expr(Expr::unary(new_instance("Holder"), "setup"))],
    )
    .unwrap();
    drop(vm);

    let Value::Instance(instance) = value else {
        panic!("expected an instance, got {:?}", value);
    };
    assert!(matches!(instance.field(0), Some(Value::Block(_))));
}

#[test]
fn test_cycles_reclaimed_while_running() {
    // 1 to: 500 do: [:i | Holder new setup]
    let program = Program::new(vec![
        holder_class(),
        Stmt::expr(Expr::send(
            Expr::int(1),
            "to:do:",
            vec![
                Expr::int(500),
                Expr::block(&["i"], vec![Stmt::expr(Expr::unary(new_instance("Holder"), "setup"))]),
            ],
        )),
    ]);

    let mut vm = Vm::with_config(VmConfig::default().with_gc_threshold(64));
    vm.load(compile(&program).unwrap()).unwrap();

    let mut peak = 0;
    loop {
        peak = peak.max(vm.live_objects());
        if let StepState::Finished(_) = vm.step().unwrap() {
            break;
        }
    }
    assert!(peak < 300, "cycles were not reclaimed (peak {})", peak);

    vm.collect_garbage();
    // only the class, held by the globals
    assert_eq!(vm.live_objects(), 1);
}

// ─────────────────────────── Sessions ───────────────────────────

#[test]
fn test_incremental_compilation_keeps_slots() {
    let mut symbols = SymbolTable::new();
    let mut vm = Vm::new();

    let first = Program::new(vec![
        Stmt::declare(&["x"]),
        Stmt::expr(Expr::assign("x", Expr::int(41))),
    ]);
    vm.run_in_session(compile_incremental(&first, &mut symbols).unwrap()).unwrap();
    assert_eq!(symbols.lookup("x"), Some(0));

    let second = Program::new(vec![
        Stmt::declare(&["y"]),
        Stmt::expr(Expr::assign("y", Expr::binary(var("x"), "+", Expr::int(1)))),
    ]);
    let value = vm
        .run_in_session(compile_incremental(&second, &mut symbols).unwrap())
        .unwrap();
    assert_eq!(value, Value::Integer(42));
    assert_eq!(symbols.lookup("y"), Some(1));
}

#[test]
fn test_separate_programs_get_fresh_locals() {
    let mut vm = Vm::new();
    run_on(
        &mut vm,
        vec![Stmt::declare(&["x"]), Stmt::expr(Expr::assign("x", Expr::int(5)))],
    )
    .unwrap();

    // y takes the slot x had; it must still start out nil
    let value = run_on(&mut vm, vec![Stmt::declare(&["y"]), Stmt::expr(var("y"))]).unwrap();
    assert_eq!(value, Value::Nil);
}

#[test]
fn test_plain_run_leaves_session_locals_alone() {
    let mut vm = Vm::new();
    vm.eval(&Program::new(vec![
        Stmt::declare(&["x"]),
        Stmt::expr(Expr::assign("x", Expr::int(1))),
    ]))
    .unwrap();

    run_on(
        &mut vm,
        vec![Stmt::declare(&["y"]), Stmt::expr(Expr::assign("y", Expr::int(99)))],
    )
    .unwrap();

    let value = vm.eval(&Program::new(vec![Stmt::expr(var("x"))])).unwrap();
    assert_eq!(value, Value::Integer(1));
}

#[test]
fn test_failed_fragment_leaves_session_untouched() {
    let mut vm = Vm::new();
    vm.eval(&Program::new(vec![
        Stmt::declare(&["x"]),
        Stmt::expr(Expr::assign("x", Expr::int(1))),
    ]))
    .unwrap();

    // super outside a method fails to compile
    let bad = Program::new(vec![
        Stmt::declare(&["z"]),
        Stmt::expr(Expr::unary(Expr::Super, "foo")),
    ]);
    assert!(matches!(vm.eval(&bad), Err(Error::Compile(_))));

    let value = vm
        .eval(&Program::new(vec![Stmt::expr(Expr::Array(vec![var("x"), var("z")]))]))
        .unwrap_err();
    // z was never committed, so it resolves as an undefined global
    assert!(matches!(
        value,
        Error::Runtime(ref err) if err.kind == RuntimeErrorKind::UndefinedGlobal("z".into())
    ));
}

#[test]
fn test_classes_carry_across_fragments() {
    let mut vm = Vm::new();
    vm.eval(&Program::new(vec![counter_class()])).unwrap();
    let value = vm
        .eval(&Program::new(vec![Stmt::expr(Expr::unary(
            new_instance("Counter"),
            "increment",
        ))]))
        .unwrap();
    assert_eq!(value, Value::Integer(1));
}

// ─────────────────────────── Errors and limits ───────────────────────────

#[test]
fn test_runtime_error_reports_call_stack() {
    let boom = ClassDef::new("Bomb", Some("Object")).with_method(MethodDef::new(
        "explode",
        &[],
        vec![Stmt::ret(Expr::binary(Expr::int(1), "/", Expr::int(0)))],
    ));
    let mut vm = Vm::new();
    let result = run_on(
        &mut vm,
        vec![
            Stmt::Class(boom),
            Stmt::expr(Expr::unary(new_instance("Bomb"), "explode")),
        ],
    );

    let Err(Error::Runtime(err)) = result else {
        panic!("expected runtime error");
    };
    assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    assert_eq!(err.call_stack.len(), 2);
    assert!(err.call_stack[0].starts_with("<top level>"));
    assert!(err.call_stack[1].starts_with("Bomb>>explode"));

    // state stays inspectable until the next load
    let frames = vm.call_stack();
    assert_eq!(frames[0].label, "Bomb>>explode");
}

#[test]
fn test_unbounded_recursion_hits_frame_limit() {
    let deep = ClassDef::new("Deep", Some("Object")).with_method(MethodDef::new(
        "down",
        &[],
        vec![Stmt::ret(Expr::unary(Expr::SelfRef, "down"))],
    ));
    let mut vm = Vm::with_config(VmConfig::default().with_max_frames(64));
    let kind = runtime_kind(run_on(
        &mut vm,
        vec![Stmt::Class(deep), Stmt::expr(Expr::unary(new_instance("Deep"), "down"))],
    ));
    assert_eq!(kind, RuntimeErrorKind::CallDepthExceeded { limit: 64 });
}

#[test]
fn test_user_error() {
    let kind = runtime_kind(run(vec![Stmt::expr(Expr::send(
        Expr::nil(),
        "error:",
        vec![Expr::string("bad input")],
    ))]));
    assert_eq!(kind, RuntimeErrorKind::UserError("bad input".into()));
}

#[test]
fn test_responds_to() {
    let value = run(vec![
        counter_class(),
        Stmt::expr(Expr::Array(vec![
            Expr::send(Expr::int(3), "respondsTo:", vec![Expr::symbol("+")]),
            Expr::send(Expr::int(3), "respondsTo:", vec![Expr::symbol("increment")]),
            Expr::send(new_instance("Counter"), "respondsTo:", vec![Expr::symbol("increment")]),
            Expr::send(new_instance("Counter"), "respondsTo:", vec![Expr::symbol("printString")]),
        ])),
    ])
    .unwrap();
    assert_eq!(value.print_string(), "#(true false true true)");
}

// ─────────────────────────── Stepping ───────────────────────────

#[test]
fn test_single_step_matches_run() {
    let program = Program::new(vec![
        counter_class(),
        Stmt::expr(Expr::unary(new_instance("Counter"), "increment")),
    ]);
    let code = compile(&program).unwrap();

    let mut vm = Vm::new();
    vm.load(code.clone()).unwrap();
    let mut steps = 0;
    let stepped = loop {
        steps += 1;
        if let StepState::Finished(value) = vm.step().unwrap() {
            break value;
        }
        assert!(vm.current_instruction().is_some() || !vm.call_stack().is_empty());
    };

    let mut fresh = Vm::new();
    let ran = fresh.run(code).unwrap();
    assert_eq!(stepped, ran);
    assert_eq!(fresh.steps(), steps);
}
