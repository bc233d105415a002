//! Patchlang CLI: run and inspect script projects.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Usage, I/O or configuration error
//! - 2: Load error (a script failed to compile)

mod commands;

use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => commands::run(&args[2..]),
        "compile" => commands::compile(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: patchlang <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <project-dir> [--frames N]      Run the project's root script");
    eprintln!("  compile <project-dir> <script>      Print a script's compiled transcript");
    eprintln!();
    eprintln!("Scripts live in <project-dir>/scripts/<name>.patch; settings in patch.toml.");
}
