//! Crescent CLI: load a precompiled Lua 5.3 chunk, then execute it or
//! print a luac -l style listing.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crescent")]
#[command(about = "Run or list a precompiled Lua 5.3 chunk")]
struct Args {
    /// Path to a .luac file
    chunk: PathBuf,

    /// Disassemble the chunk instead of executing it
    #[arg(short, long)]
    list: bool,

    /// Log every executed instruction
    #[arg(long)]
    trace: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data = match std::fs::read(&args.chunk) {
        Ok(data) => data,
        Err(e) => {
            error!("cannot open {}: {e}", args.chunk.display());
            return ExitCode::from(1);
        }
    };

    let (proto, strings) = match crescent_vm::load(&data) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{}: {e}", args.chunk.display());
            return ExitCode::from(1);
        }
    };
    debug!(
        instructions = proto.code.len(),
        constants = proto.constants.len(),
        "chunk decoded"
    );

    if args.list {
        print!("{}", crescent_vm::disasm::disassemble(&proto, &strings));
        return ExitCode::SUCCESS;
    }

    match crescent_vm::run(proto, strings) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("runtime error: {e}");
            ExitCode::from(2)
        }
    }
}
