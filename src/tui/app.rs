//! Debugger application state and logic.

use crate::cpu::decode;
use crate::cpu::Cpu;
use crate::ternary::Tryte;
use std::collections::HashSet;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged (already booted).
    pub cpu: Cpu,
    /// Breakpoints, by signed address.
    pub breakpoints: HashSet<i16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status line.
    pub status: String,
    /// Memory window base address.
    pub mem_base: i16,
}

impl DebuggerApp {
    /// Wrap a booted machine.
    pub fn new(cpu: Cpu) -> Self {
        Self {
            cpu,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_base: 0,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("Machine stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let at = self.cpu.ctx.iptr.value();
        match self.cpu.step() {
            Ok(()) => {
                let op = self
                    .cpu
                    .last_op()
                    .map(|op| op.to_string())
                    .unwrap_or_else(|| "<invalid opcode>".into());
                self.status = format!("{:>6}: {}", at, op);
            }
            Err(e) => {
                self.status = format!("Fatal: {}", e);
                self.running = false;
            }
        }
    }

    /// Start continuous execution.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// One iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Stopped after {} cycles", self.cpu.ctx.clock);
            return;
        }
        let at = self.cpu.ctx.iptr.value();
        if self.breakpoints.contains(&at) {
            self.running = false;
            self.status = format!("Breakpoint at {}", at);
            return;
        }
        self.step();
    }

    /// Toggle a breakpoint at the instruction pointer.
    pub fn toggle_breakpoint(&mut self) {
        let at = self.cpu.ctx.iptr.value();
        if self.breakpoints.remove(&at) {
            self.status = format!("Removed breakpoint at {}", at);
        } else {
            self.breakpoints.insert(at);
            self.status = format!("Set breakpoint at {}", at);
        }
    }

    /// Disassemble forward from the instruction pointer, following
    /// instruction widths.
    pub fn disassembly(&self, lines: usize) -> Vec<(i16, String, bool)> {
        let mut out = Vec::with_capacity(lines);
        let mut addr = self.cpu.ctx.iptr;
        for i in 0..lines {
            let cell = self.cpu.mem[addr];
            let (text, width) = match decode::decode(cell) {
                Ok(op) => (op.to_string(), op.width()),
                Err(_) => (format!("?? {}", cell), 1),
            };
            out.push((addr.value(), text, i == 0));
            addr += Tryte::from_int(width);
        }
        out
    }

    /// A window of raw memory cells starting at the scroll base.
    pub fn memory_window(&self, rows: usize) -> Vec<(i16, Tryte, bool)> {
        let iptr = self.cpu.ctx.iptr.value();
        (0..rows)
            .map(|i| {
                let addr = Tryte::from_int(self.mem_base as i64 + i as i64);
                (addr.value(), self.cpu.mem[addr], addr.value() == iptr)
            })
            .collect()
    }
}

/// Run the debugger over a booted machine.
pub fn run_debugger(cpu: Cpu) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(cpu);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Up => {
                            app.mem_base = app.mem_base.saturating_sub(1).max(Tryte::MIN);
                        }
                        KeyCode::Down => {
                            app.mem_base = app.mem_base.saturating_add(1).min(Tryte::MAX);
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
