//! Tritium emulator - CLI entry point.
//!
//! Usage:
//! - `tritium-emu boot.trd [more.trd ...]` - boot from the first disk and
//!   run until the machine stops
//! - `tritium-emu --debug boot.trd` - single-step debugger
//! - `tritium-emu --dump-state state.json boot.trd` - write a JSON
//!   machine snapshot after the run

use clap::Parser;
use tritium::{Console, Cpu, Device, FileDisk};

#[derive(Parser)]
#[command(name = "tritium-emu")]
#[command(version)]
#[command(about = "An emulator of a balanced ternary computer")]
struct Cli {
    /// Disk image files; the first is the boot device (device 0)
    #[arg(required = true)]
    disks: Vec<String>,

    /// Interactive single-step debugging instead of a free run
    #[arg(short, long)]
    debug: bool,

    /// Stop after at most this many cycles (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    max_cycles: u64,

    /// Write a JSON machine snapshot to this file once the run stops
    #[arg(long)]
    dump_state: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let mut devices: Vec<Box<dyn Device>> = Vec::new();
    for path in &cli.disks {
        match FileDisk::open(path) {
            Ok(disk) => devices.push(Box::new(disk)),
            Err(e) => {
                eprintln!("cannot open disk {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    let mut cpu = Cpu::new(devices, Console::stdio());
    if let Err(e) = cpu.boot() {
        eprintln!("boot failed: {}", e);
        std::process::exit(1);
    }

    if cli.debug {
        run_debugger(cpu, cli.dump_state.as_deref());
        return;
    }

    let result = if cli.max_cycles > 0 {
        cpu.run_limited(cli.max_cycles)
    } else {
        cpu.run()
    };

    match result {
        Ok(cycles) => {
            println!();
            println!("state: {:?} after {} cycles", cpu.state, cycles);
            if cli.max_cycles > 0 && cpu.is_running() {
                println!("cycle limit reached; rerun with a higher --max-cycles");
            }
        }
        Err(e) => {
            eprintln!("machine fault: {}", e);
            write_snapshot(&cpu, cli.dump_state.as_deref());
            std::process::exit(1);
        }
    }

    write_snapshot(&cpu, cli.dump_state.as_deref());
}

#[cfg(feature = "tui")]
fn run_debugger(cpu: Cpu, dump_state: Option<&str>) {
    match tritium::run_debugger(cpu) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("debugger error: {}", e);
            std::process::exit(1);
        }
    }
    // the debugger consumes the machine; snapshots come from its own view
    if dump_state.is_some() {
        eprintln!("--dump-state is ignored under the TUI debugger");
    }
}

/// Line-driven fallback stepper when the TUI feature is compiled out.
#[cfg(not(feature = "tui"))]
fn run_debugger(mut cpu: Cpu, dump_state: Option<&str>) {
    use std::io::{BufRead, Write};

    let stdin = std::io::stdin();
    println!("debugger: s = step, d = dump, r = run to stop, q = quit");
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        match line.trim() {
            "s" | "" => match cpu.step() {
                Ok(()) => println!(
                    "{}",
                    cpu.last_op()
                        .map(|op| op.to_string())
                        .unwrap_or_else(|| "<invalid opcode>".into())
                ),
                Err(e) => {
                    println!("{}", e);
                    break;
                }
            },
            "d" => print!("{}", cpu.dump()),
            "r" => match cpu.run() {
                Ok(cycles) => println!("stopped after {} cycles", cycles),
                Err(e) => {
                    println!("{}", e);
                    break;
                }
            },
            "q" => break,
            other => println!("unknown command {:?}", other),
        }
    }
    write_snapshot(&cpu, dump_state);
}

fn write_snapshot(cpu: &Cpu, path: Option<&str>) {
    let Some(path) = path else { return };
    match serde_json::to_string_pretty(&cpu.snapshot()) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                eprintln!("cannot write snapshot {}: {}", path, e);
            }
        }
        Err(e) => eprintln!("cannot serialise snapshot: {}", e),
    }
}
