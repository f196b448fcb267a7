//! Command-line entry point: `asda <bytecode-file>`.
//!
//! Resolves and runs the file's whole import graph, then tears the module
//! graph down. Argument handling and exit-code mapping live here; the
//! actual run is delegated to `asda::import`.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use asda::{import, Builtins, ImportError};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <bytecode-file>", args.first().map_or("asda", String::as_str));
        return ExitCode::from(2);
    }
    let file_arg = &args[1];

    let path = PathBuf::from(file_arg);
    let (base_dir, entry) = split_entry(&path);

    match import(base_dir, &entry, Builtins::default()) {
        Ok(driver) => {
            let leaked = driver.teardown();
            debug_assert_eq!(leaked, 0, "objects still live after teardown");
            ExitCode::SUCCESS
        }
        Err(ImportError::Io { path, source }) => {
            eprintln!("cannot read {}: {source}", path.display());
            ExitCode::FAILURE
        }
        Err(ImportError::Cycle { path }) => {
            eprintln!("import cycle involving {}", path.display());
            ExitCode::FAILURE
        }
        Err(ImportError::Run(err)) => {
            eprintln!("{}", err.diagnostic_line());
            ExitCode::FAILURE
        }
    }
}

/// Splits a CLI path argument into the directory imports should be resolved
/// against and the entry file's path relative to it, so a bare filename
/// (`prog.asdac`) and a path with directories (`examples/prog.asdac`) both
/// resolve the same way `Driver::import` expects.
fn split_entry(path: &Path) -> (PathBuf, PathBuf) {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            (parent.to_path_buf(), PathBuf::from(name))
        }
        _ => (PathBuf::from("."), path.to_path_buf()),
    }
}
