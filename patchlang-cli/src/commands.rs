//! CLI command implementations.

use log::info;
use patchlang_cli::ProjectConfig;
use patchlang_compiler::{FsSource, ProgramStore};
use patchlang_vm::World;
use std::path::Path;

/// Run a project until `stopall` or the frame limit.
pub fn run(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: run requires a project directory");
        eprintln!("Usage: patchlang run <project-dir> [--frames N]");
        return Err(1);
    }

    let dir = &args[0];
    let frames = parse_frames(&args[1..])?;
    let project = project_dir(dir)?;

    let config = ProjectConfig::load(project).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let globals = config.initial_globals().map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let frames = frames.unwrap_or(config.frames);

    let mut world = World::new(FsSource::new(project), config.runtime.clone());
    for (name, value) in globals {
        world.set_global(&name, value);
    }

    world.spawn_root(&config.root).map_err(|e| {
        eprintln!("error: {e}");
        2
    })?;
    info!("running '{}' for up to {frames} frame(s)", config.root);
    let ran = world.run(frames).map_err(|e| {
        eprintln!("error: {e}");
        2
    })?;

    let stopped = if world.is_finished() { ", stopped" } else { "" };
    eprintln!(
        "ran {ran} frame(s): {} entities, {} error(s){stopped}",
        world.entity_count(),
        world.errors().len()
    );
    Ok(())
}

/// Compile one script of a project and print its transcript.
pub fn compile(args: &[String]) -> Result<(), i32> {
    if args.len() < 2 {
        eprintln!("error: compile requires a project directory and a script name");
        eprintln!("Usage: patchlang compile <project-dir> <script>");
        return Err(1);
    }

    let project = project_dir(&args[0])?;
    let name = &args[1];
    let mut store = ProgramStore::new(FsSource::new(project));
    let program = store.get_or_compile(name).map_err(|e| {
        eprintln!("error: {e}");
        2
    })?;

    print!("{}", program.transcript());
    let statics = store.statics();
    if !statics.is_empty() {
        println!("statics:");
        for index in 0..statics.len() {
            if let Some(text) = statics.get(index) {
                println!("  '{index} = {text:?}");
            }
        }
    }
    Ok(())
}

fn project_dir(dir: &str) -> Result<&Path, i32> {
    let path = Path::new(dir);
    if path.is_dir() {
        Ok(path)
    } else {
        eprintln!("error: cannot read '{dir}': not a directory");
        Err(1)
    }
}

/// Parse an optional `--frames N`.
fn parse_frames(args: &[String]) -> Result<Option<u64>, i32> {
    match args {
        [] => Ok(None),
        [flag, n] if flag == "--frames" => n.parse().map(Some).map_err(|_| {
            eprintln!("error: --frames expects a non-negative integer, got '{n}'");
            1
        }),
        _ => {
            eprintln!("error: unexpected arguments: {}", args.join(" "));
            eprintln!("Usage: patchlang run <project-dir> [--frames N]");
            Err(1)
        }
    }
}
