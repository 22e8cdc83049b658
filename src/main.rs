use std::{env, path::Path, process};

use smog::bytecode::disasm::{print_bytecode, print_bytecode_stats};
use smog::bytecode::read_file;
use smog::runtime::{Vm, VmConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let disasm = args.iter().any(|a| a == "--disasm");
    let stats = args.iter().any(|a| a == "--stats");
    let max_steps = flag_value(&args, "--max-steps");

    // first non-flag argument is the filename
    let filename = args
        .iter()
        .skip(1)
        .filter(|a| Some(a.as_str()) != max_steps.as_deref())
        .find(|a| !a.starts_with('-'));

    let Some(filename) = filename else {
        print_usage();
        process::exit(2);
    };
    ensure_extension(filename);

    let code = match read_file(filename) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Failed to load '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if disasm || stats {
        if disasm {
            print_bytecode(&code);
        }
        if stats {
            print_bytecode_stats(&code);
        }
        return;
    }

    let mut config = VmConfig::default();
    if let Some(raw) = max_steps {
        match raw.parse() {
            Ok(limit) => config = config.with_max_steps(limit),
            Err(_) => {
                eprintln!("Error: --max-steps expects a number, got '{}'", raw);
                process::exit(2);
            }
        }
    }

    let mut vm = Vm::with_config(config);
    match vm.run(code) {
        Ok(value) => println!("{}", value.print_string()),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SMOG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("sg") {
        eprintln!("Error: expected a .sg file, got {}", filename);
        process::exit(1);
    }
}

fn print_usage() {
    println!("SMOG - object-message language bytecode runner");
    println!();
    println!("Usage:");
    println!("  smog <file.sg>                 Run a compiled program");
    println!("  smog --disasm <file.sg>        Print the disassembly");
    println!("  smog --stats <file.sg>         Print opcode statistics");
    println!("  smog --max-steps N <file.sg>   Abort after N instructions");
    println!("  smog --help, -h                Show this help");
    println!();
    println!("Set SMOG_LOG (e.g. SMOG_LOG=debug) to enable logging.");
}
