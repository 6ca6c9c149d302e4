//! primeos-cli/src/lib.rs — an interactive REPL driving one
//! `primeos_core::Controller` for the lifetime of the process.
//!
//! Session state (the controller, its `Vm`, its `Teacher`) lives only in
//! this process's memory — there is no on-disk session file, so closing the
//! REPL discards the run (the teacher's `vitte-cli` is similarly a
//! single-invocation tool; this just keeps state across *lines* instead of
//! across *processes*).

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use primeos_core::{Controller, DefaultTeacher, OpcodeTable, PrimeTable, VmConfig, VmSnapshot};

/// Top-level flags, parsed once at process startup.
#[derive(Parser, Debug)]
#[command(name = "primeos", version, about = "PrimeOS goal-seeker REPL")]
pub struct Cli {
    /// Optional TOML file overriding `VmConfig` defaults (a `[vm]` table).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Render every snapshot as JSON instead of a human-readable listing.
    #[arg(long)]
    pub json: bool,
}

/// One REPL command line.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
enum ReplCommand {
    /// Build a fresh controller and print its initial snapshot.
    Init,
    /// Advance exactly one instruction.
    Step,
    /// Step repeatedly until the VM suspends or halts.
    Run {
        #[arg(long, default_value_t = 10_000)]
        max_steps: usize,
    },
    /// Resume a suspended controller. Omit VALUE to let the Teacher decide.
    ProvideInput { value: Option<i64> },
    /// Print program memory as a disassembly listing.
    Disasm,
    /// Exit the REPL.
    Quit,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    vm: Option<VmConfig>,
}

fn load_config(path: Option<&Path>) -> Result<VmConfig> {
    let Some(path) = path else {
        return Ok(VmConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: ConfigFile = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(parsed.vm.unwrap_or_default())
}

fn require_init(initialized: bool) -> bool {
    if !initialized {
        println!("error: no controller yet — run `init` first");
    }
    initialized
}

fn run_until_suspended(controller: &mut Controller, max_steps: usize) -> VmSnapshot {
    let mut snapshot = controller.step();
    let mut taken = 1;
    while !snapshot.halted && !snapshot.needs_input && taken < max_steps {
        snapshot = controller.step();
        taken += 1;
    }
    snapshot
}

fn print_snapshot(snapshot: &VmSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }
    println!(
        "ip={} phase={} target={:?} difficulty={} attempts={} halted={} needs_input={}",
        snapshot.instruction_pointer,
        snapshot.interaction_phase,
        snapshot.current_target,
        snapshot.difficulty_level,
        snapshot.attempts_on_target,
        snapshot.halted,
        snapshot.needs_input,
    );
    if let Some(err) = &snapshot.error {
        println!("error: {err}");
    }
    if !snapshot.output_log.is_empty() {
        println!("output: [{}]", snapshot.output_log.join(", "));
    }
    Ok(())
}

fn print_disasm(snapshot: &VmSnapshot) {
    for cell in &snapshot.program_memory {
        println!("{:>5}: {:<28} ; raw={}", cell.address, cell.decoded, cell.raw_chunk);
    }
}

fn print_help() {
    println!("commands: init | step | run [--max-steps N] | provide-input [VALUE] | disasm | quit");
}

/// Entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let primes = Arc::new(PrimeTable::new());
    let opcodes = Arc::new(OpcodeTable::build(&primes));
    let teacher = Box::new(DefaultTeacher::new(&config));
    let mut controller = Controller::new(primes, opcodes, config, teacher);
    let mut initialized = false;

    println!("primeos REPL — type `help` for commands, `quit` to exit.");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "help" {
            print_help();
            continue;
        }

        let command = match ReplCommand::try_parse_from(trimmed.split_whitespace()) {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            ReplCommand::Quit => break,
            ReplCommand::Init => {
                initialized = true;
                print_snapshot(&controller.init(), cli.json)?;
            }
            ReplCommand::Step => {
                if require_init(initialized) {
                    print_snapshot(&controller.step(), cli.json)?;
                }
            }
            ReplCommand::Run { max_steps } => {
                if require_init(initialized) {
                    print_snapshot(&run_until_suspended(&mut controller, max_steps), cli.json)?;
                }
            }
            ReplCommand::ProvideInput { value } => {
                if require_init(initialized) {
                    match controller.provide_input(value) {
                        Ok(snapshot) => print_snapshot(&snapshot, cli.json)?,
                        Err(e) => println!("error: {e}"),
                    }
                }
            }
            ReplCommand::Disasm => {
                if require_init(initialized) {
                    print_disasm(&controller.snapshot());
                }
            }
        }
        io::stdout().flush().ok();
    }

    Ok(())
}
