//! Persisted bytecode: round trips through bytes and files, and rejection
//! of damaged input.

use pretty_assertions::assert_eq;

use std::rc::Rc;

use smog::bytecode::op::{MAX_PACKED_COUNT, MAX_PACKED_INDEX, OperandKind};
use smog::bytecode::{
    Bytecode, ClassDescriptor, CodecError, Constant, Instruction, MethodDescriptor, Opcode,
    compile, decode, encode, read_file, write_file,
};
use smog::lang::{ClassDef, Expr, MethodDef, Program, Stmt};
use smog::runtime::{Value, Vm};

/// A program exercising every constant kind: classes, nested blocks,
/// integers, floats, strings, booleans and nil.
fn sample_program() -> Program {
    let shape = ClassDef::new("Shape", Some("Object"))
        .with_fields(&["size"])
        .with_class_vars(&["Count"])
        .with_method(MethodDef::new(
            "size:",
            &["n"],
            vec![
                Stmt::expr(Expr::assign("size", var("n"))),
                Stmt::ret(Expr::SelfRef),
            ],
        ))
        .with_method(MethodDef::new(
            "area",
            &[],
            vec![Stmt::ret(Expr::binary(var("size"), "*", Expr::float(1.5)))],
        ))
        .with_class_method(MethodDef::new("label", &[], vec![Stmt::ret(Expr::string("shape"))]));

    Program::new(vec![
        Stmt::declare(&["s", "flags"]),
        Stmt::Class(shape),
        Stmt::expr(Expr::assign(
            "s",
            Expr::send(Expr::unary(var("Shape"), "new"), "size:", vec![Expr::int(4)]),
        )),
        Stmt::expr(Expr::assign(
            "flags",
            Expr::Array(vec![Expr::bool(true), Expr::bool(false), Expr::nil()]),
        )),
        Stmt::expr(Expr::send(
            Expr::bool(true),
            "ifTrue:ifFalse:",
            vec![
                Expr::block(&[], vec![Stmt::expr(Expr::unary(var("s"), "area"))]),
                Expr::block(&[], vec![Stmt::expr(Expr::int(0))]),
            ],
        )),
    ])
}

fn var(name: &str) -> Expr {
    Expr::var(name)
}

#[test]
fn test_round_trip_preserves_unit() {
    let code = compile(&sample_program()).unwrap();
    let bytes = encode(&code).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, code);

    // re-encoding is byte-identical
    assert_eq!(encode(&decoded).unwrap(), bytes);
}

/// One instruction per opcode, each with the largest operand its kind
/// allows, over a pool of extreme and non-ASCII constants.
fn every_opcode_unit() -> Bytecode {
    let block = Bytecode::with_parts(
        vec![
            Instruction::outer(Opcode::LoadOuter, 0, 1),
            Instruction::bare(Opcode::NonLocalReturn),
        ],
        vec![],
    );
    let class = ClassDescriptor {
        name: "Größe".to_string(),
        superclass: Some("Object".to_string()),
        fields: vec!["wert".to_string()],
        class_vars: vec!["Zähler".to_string()],
        methods: vec![MethodDescriptor {
            selector: "wert".to_string(),
            params: vec![],
            body: Rc::new(Bytecode::with_parts(
                vec![Instruction::new(Opcode::LoadField, 0), Instruction::bare(Opcode::Return)],
                vec![],
            )),
        }],
        class_methods: vec![],
    };
    let constants = vec![
        Constant::Integer(i64::MIN),
        Constant::Integer(i64::MAX),
        Constant::Integer(-1),
        Constant::Float(-0.0),
        Constant::Float(f64::MAX),
        Constant::Float(f64::MIN_POSITIVE),
        Constant::String("héllo, 世界 🦀".to_string()),
        Constant::String(String::new()),
        Constant::Bool(true),
        Constant::Bool(false),
        Constant::Nil,
        Constant::Block(Rc::new(block)),
        Constant::Class(Rc::new(class)),
    ];
    let (name, block_index, class_index) = (6, 11, 12);
    let len = Opcode::ALL.len() as i32;

    let instructions = Opcode::ALL
        .iter()
        .map(|&opcode| {
            let operand = match opcode.operand_kind() {
                OperandKind::None => 0,
                OperandKind::Constant => class_index,
                OperandKind::Name => name,
                OperandKind::Slot | OperandKind::Field | OperandKind::Count => i32::MAX,
                OperandKind::Outer => Instruction::pack(MAX_PACKED_INDEX, MAX_PACKED_COUNT),
                OperandKind::Send => Instruction::pack(name as usize, MAX_PACKED_COUNT),
                OperandKind::Target => len,
                OperandKind::ClassDescriptor => class_index,
                OperandKind::Closure => Instruction::pack(block_index as usize, MAX_PACKED_COUNT),
            };
            Instruction::new(opcode, operand)
        })
        .collect();

    Bytecode::with_parts(instructions, constants)
}

#[test]
fn test_round_trip_covers_every_opcode_and_extreme_constant() {
    let code = every_opcode_unit();
    let bytes = encode(&code).unwrap();
    let decoded = decode(&bytes).unwrap();

    assert_eq!(decoded, code);
    assert_eq!(encode(&decoded).unwrap(), bytes);

    let opcodes: Vec<Opcode> = decoded.instructions.iter().map(|i| i.opcode).collect();
    assert_eq!(opcodes, Opcode::ALL.to_vec());
    assert_eq!(decoded.instructions[4].operand, i32::MAX);

    // -0.0 == 0.0, so compare the sign bit explicitly
    match &decoded.constants[3] {
        Constant::Float(f) => assert_eq!(f.to_bits(), (-0.0f64).to_bits()),
        other => panic!("expected a float, got {:?}", other),
    }
}

#[test]
fn test_decoded_unit_runs_the_same() {
    let code = compile(&sample_program()).unwrap();
    let decoded = decode(&encode(&code).unwrap()).unwrap();

    let expected = Vm::new().run(code).unwrap();
    let actual = Vm::new().run(decoded).unwrap();
    assert_eq!(expected, Value::Float(6.0));
    assert_eq!(actual, expected);
}

#[test]
fn test_every_truncation_is_rejected() {
    let code = compile(&sample_program()).unwrap();
    let bytes = encode(&code).unwrap();

    for len in 0..bytes.len() {
        match decode(&bytes[..len]) {
            Err(CodecError::Truncated { .. }) => {}
            other => panic!("prefix of {} bytes: expected truncation, got {:?}", len, other),
        }
    }
}

#[test]
fn test_header_damage_is_distinguishable() {
    let code = compile(&Program::new(vec![Stmt::expr(Expr::int(1))])).unwrap();
    let bytes = encode(&code).unwrap();

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    assert!(matches!(decode(&bad_magic), Err(CodecError::InvalidMagic { .. })));

    let mut bad_version = bytes.clone();
    bad_version[4] = 2;
    assert!(matches!(
        decode(&bad_version),
        Err(CodecError::UnsupportedVersion { found: 2, .. })
    ));

    let mut bad_flags = bytes.clone();
    bad_flags[8] = 1;
    assert!(matches!(decode(&bad_flags), Err(CodecError::UnsupportedFlags(1))));

    let mut trailing = bytes;
    trailing.push(0);
    assert!(matches!(decode(&trailing), Err(CodecError::TrailingBytes { count: 1, .. })));
}

#[test]
fn test_file_round_trip() {
    let code = compile(&sample_program()).unwrap();
    let path = std::env::temp_dir().join(format!("smog-codec-{}.sg", std::process::id()));

    write_file(&path, &code).unwrap();
    let loaded = read_file(&path);
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.unwrap(), code);
}

#[test]
fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("smog-codec-does-not-exist.sg");
    assert!(matches!(read_file(&path), Err(CodecError::Io(_))));
}
