//! UI rendering for the debugger.

use super::app::DebuggerApp;
use crate::cpu::registers::TrintReg;
use crate::ternary::Trit;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(frame.area());

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(5),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left[0], app);
    draw_registers(frame, left[1], app);
    draw_floats(frame, left[2], app);
    draw_status(frame, left[3], app);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(5)])
        .split(chunks[1]);

    draw_memory(frame, right[0], app);
    draw_help(frame, right[1]);
}

fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let lines = (area.height as usize).saturating_sub(2);
    let items: Vec<ListItem> = app
        .disassembly(lines)
        .into_iter()
        .map(|(addr, text, is_current)| {
            let prefix = if is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(&addr) {
                "●"
            } else {
                " "
            };
            let style = if is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(&addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            ListItem::new(format!("{} {}{:>6}: {}", bp, prefix, addr, text)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(list, area);
}

fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let mut content = Vec::new();
    for row in 0..3 {
        let mut spans = Vec::new();
        for col in 0..3 {
            let reg = TrintReg(row * 3 + col);
            spans.push(Span::raw(format!("{}: ", reg.name())));
            spans.push(Span::styled(
                format!("{:>14}  ", app.cpu.regs.trint(reg).value()),
                Style::default().fg(Color::White),
            ));
        }
        content.push(Line::from(spans));
    }
    let flags = app.cpu.ctx.flags;
    content.push(Line::from(vec![
        Span::raw("iptr: "),
        Span::styled(
            format!("{}", app.cpu.ctx.iptr.value()),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!("  sptr: {}", app.cpu.ctx.sptr.value())),
        Span::raw(format!("  clock: {}", app.cpu.ctx.clock)),
    ]));
    content.push(Line::from(vec![
        Span::raw(format!(
            "pri: {}/{}  ",
            flags.stored_priority(),
            flags.current_priority()
        )),
        Span::raw("ovf: "),
        trit_span(flags.overflow()),
        Span::raw("  carry: "),
        trit_span(flags.carry()),
        Span::raw("  cmp: "),
        trit_span(flags.compare()),
        Span::raw("  state: "),
        Span::styled(
            format!("{:?}", app.cpu.state),
            if app.cpu.is_running() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Red)
            },
        ),
    ]));

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    frame.render_widget(paragraph, area);
}

fn draw_floats(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let mut content = Vec::new();
    for row in 0..3 {
        let mut spans = Vec::new();
        for col in 0..3 {
            let i = row * 3 + col;
            spans.push(Span::raw(format!("f{}: ", i + 1)));
            spans.push(Span::styled(
                format!("{:>14}  ", app.cpu.fpu.regs()[i].to_f64()),
                Style::default().fg(Color::White),
            ));
        }
        content.push(Line::from(spans));
    }
    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Float registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    frame.render_widget(paragraph, area);
}

fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = (area.height as usize).saturating_sub(2);
    let items: Vec<ListItem> = app
        .memory_window(rows)
        .into_iter()
        .map(|(addr, cell, is_iptr)| {
            let style = if is_iptr {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if !cell.is_zero() {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(format!("{:>6}: {} = {}", addr, cell, cell.value())).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    frame.render_widget(list, area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));
    frame.render_widget(status, area);
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));
    frame.render_widget(help, area);
}

fn trit_span(t: Trit) -> Span<'static> {
    let style = match t {
        Trit::N => Style::default().fg(Color::Red),
        Trit::O => Style::default().fg(Color::Gray),
        Trit::P => Style::default().fg(Color::Green),
    };
    Span::styled(format!("{}", t), style)
}
