//! `procstream`: run a program and print its stdout/stderr line by line.
//!
//! Lines are delivered by background pumps (or blocking readers with
//! `--sync`) and printed as `stdout: <line>` / `stderr: <line>`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use procstream::core::types::{LineEvent, StreamKind};
use procstream::exit_codes;
use procstream::io::child::{ChildHost, Redirects};
use procstream::io::config::{StreamConfig, load_config, write_config};
use procstream::io::process::StreamedProcess;
use procstream::io::reader::StreamReader;
use procstream::logging;

#[derive(Parser)]
#[command(
    name = "procstream",
    version,
    about = "Stream a child process's output line by line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program and print each output line as it arrives.
    Run {
        /// TOML config file (defaults apply when omitted or missing).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the timed wait before the child is killed.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Cancel the stdout pump after this many lines.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        cancel_after: Option<u64>,
        /// Leave stderr attached to the terminal instead of redirecting it.
        #[arg(long)]
        no_stderr: bool,
        /// Use blocking readers instead of background pumps.
        #[arg(long, conflicts_with = "cancel_after")]
        sync: bool,
        /// Program and arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        program: Vec<String>,
    },
    /// Write the default configuration to PATH.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        path: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            timeout_ms,
            cancel_after,
            no_stderr,
            sync,
            program,
        } => {
            let mut cfg = match config {
                Some(path) => load_config(&path)?,
                None => StreamConfig::default(),
            };
            if let Some(ms) = timeout_ms {
                cfg.wait_timeout_ms = ms;
                cfg.validate()?;
            }
            let redirects = if no_stderr {
                Redirects::output_only()
            } else {
                Redirects::output_and_error()
            };
            let process = build_process(&program, redirects, cfg)?;
            if sync {
                cmd_run_sync(process)
            } else {
                cmd_run(process, cancel_after)
            }
        }
        Command::InitConfig { force, path } => cmd_init_config(&path, force),
    }
}

fn build_process(
    program: &[String],
    redirects: Redirects,
    cfg: StreamConfig,
) -> Result<StreamedProcess<ChildHost>> {
    let (name, args) = program.split_first().context("missing program")?;
    let mut command = ProcessCommand::new(name);
    command.args(args);
    Ok(StreamedProcess::from_command(command, redirects, cfg))
}

fn print_event(event: &LineEvent) {
    if let Some(line) = event.text() {
        println!("{}: {}", event.kind, line);
    }
}

fn cmd_run(mut process: StreamedProcess<ChildHost>, cancel_after: Option<u64>) -> Result<i32> {
    process.start()?;

    match cancel_after {
        Some(limit) => {
            let canceller = process.read_canceller(StreamKind::Output)?;
            let mut seen = 0u64;
            process.on_line(StreamKind::Output, move |event| {
                print_event(&event);
                if !event.is_terminal() {
                    seen += 1;
                    if seen == limit && canceller.cancel().is_ok() {
                        debug!(lines = seen, "stdout read cancelled");
                    }
                }
            })?;
        }
        None => process.on_line(StreamKind::Output, |event| print_event(&event))?,
    }
    process.begin_read(StreamKind::Output)?;

    if process.host().redirects().stderr {
        process.on_line(StreamKind::Error, |event| print_event(&event))?;
        process.begin_read(StreamKind::Error)?;
    }

    finish(process)
}

fn cmd_run_sync(mut process: StreamedProcess<ChildHost>) -> Result<i32> {
    process.start()?;
    let mut readers = vec![spawn_reader(process.blocking_reader(StreamKind::Output)?)];
    if process.host().redirects().stderr {
        readers.push(spawn_reader(process.blocking_reader(StreamKind::Error)?));
    }

    let timeout = process.config().wait_timeout();
    if !process.wait_for_exit(Some(timeout))? {
        warn!(
            timeout_ms = timeout.as_millis() as u64,
            "child timed out, killing"
        );
        process.kill()?;
        process.wait_for_exit(None)?;
        join_readers(readers)?;
        return Ok(exit_codes::TIMED_OUT);
    }
    join_readers(readers)?;
    process.wait_for_exit(None)?;
    Ok(process.exit_code().unwrap_or(exit_codes::SIGNALLED))
}

fn spawn_reader(mut reader: StreamReader) -> (StreamKind, JoinHandle<io::Result<()>>) {
    let kind = reader.kind();
    let handle = thread::spawn(move || {
        while let Some(line) = reader.read_line()? {
            println!("{kind}: {line}");
        }
        Ok(())
    });
    (kind, handle)
}

fn join_readers(readers: Vec<(StreamKind, JoinHandle<io::Result<()>>)>) -> Result<()> {
    for (kind, handle) in readers {
        match handle.join() {
            Ok(result) => result.with_context(|| format!("read {kind}"))?,
            Err(_) => bail!("{kind} reader thread panicked"),
        }
    }
    Ok(())
}

fn finish(mut process: StreamedProcess<ChildHost>) -> Result<i32> {
    let timeout = process.config().wait_timeout();
    if !process.wait_for_exit(Some(timeout))? {
        warn!(
            timeout_ms = timeout.as_millis() as u64,
            "child timed out, killing"
        );
        process.kill()?;
        process.wait_for_exit(None)?;
        return Ok(exit_codes::TIMED_OUT);
    }
    // Untimed wait drains the pumps before we report.
    process.wait_for_exit(None)?;

    for kind in StreamKind::ALL {
        if let Some(fault) = process.read_fault(kind) {
            warn!(%fault, "stream ended early");
        }
    }
    Ok(process.exit_code().unwrap_or(exit_codes::SIGNALLED))
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &StreamConfig::default())?;
    Ok(exit_codes::OK)
}
