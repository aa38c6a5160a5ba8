// Crossterm drawing: header, GPU table, process table, footer, modal overlay.

use super::state::{Focus, Modal, ModalContent, UiState};
use crate::models::{ModelState, ProcessRecord, Snapshot};
use crossterm::{
    cursor, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use std::io::{self, Write};

const ENV_VALUE_CHARS: usize = 60;
const BAR_WIDTH: usize = 10;

/// Static header lines, fetched once at start.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub title: String,
    pub driver: Option<String>,
    pub host: Option<String>,
}

pub fn bar_color(percent: u32) -> Color {
    if percent < 75 {
        Color::Green
    } else if percent < 90 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn usage_bar(percent: u32, width: usize) -> String {
    let filled = (percent.min(100) as usize * width) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Truncate to `width` chars, padding short text so columns line up.
pub fn fit(text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if text.chars().count() > width {
        let mut s: String = text.chars().take(width.saturating_sub(1)).collect();
        s.push('…');
        s
    } else {
        format!("{:<width$}", text, width = width)
    }
}

fn state_color(state: ModelState) -> Color {
    match state {
        ModelState::Ready => Color::Green,
        ModelState::Loading | ModelState::Unloading => Color::Yellow,
        ModelState::Unavailable => Color::Red,
        ModelState::Unknown => Color::DarkGrey,
    }
}

/// Text lines of a modal body, before scrolling.
pub fn modal_lines(modal: &Modal, gpu_name: &str) -> Vec<(String, Color)> {
    let mut lines = Vec::new();
    match &modal.content {
        ModalContent::Loading => {
            lines.push((format!("PID {}", modal.pid), Color::Cyan));
            lines.push(("Loading…".into(), Color::DarkGrey));
        }
        ModalContent::Error(msg) => {
            lines.push((format!("PID {}", modal.pid), Color::Cyan));
            lines.push((msg.clone(), Color::Red));
        }
        ModalContent::Process(d) => {
            lines.push((format!("Process Information  PID: {}", d.pid), Color::Cyan));
            lines.push((format!("GPU: {} (Index: {})", gpu_name, modal.gpu_index), Color::Yellow));
            if !d.exe.is_empty() {
                lines.push((format!("Executable: {}", d.exe), Color::White));
            }
            if !d.cwd.is_empty() {
                lines.push((format!("Working Dir: {}", d.cwd), Color::White));
            }
            lines.push((format!("Status: {}", d.status), Color::White));
            if !d.env.is_empty() {
                lines.push((String::new(), Color::White));
                lines.push(("Environment Variables".into(), Color::Yellow));
                for (k, v) in &d.env {
                    let v: String = if v.chars().count() > ENV_VALUE_CHARS {
                        format!("{}...", v.chars().take(ENV_VALUE_CHARS).collect::<String>())
                    } else {
                        v.clone()
                    };
                    lines.push((format!("  {}={}", k, v), Color::White));
                }
                if d.env_hidden() > 0 {
                    lines.push((format!("  ... and {} more", d.env_hidden()), Color::DarkGrey));
                }
            }
            if !d.open_files.is_empty() {
                lines.push((String::new(), Color::White));
                lines.push(("Open Files".into(), Color::Yellow));
                for f in &d.open_files {
                    lines.push((format!("  FD {}: {}", f.fd, f.path), Color::White));
                }
            }
            if !d.connections.is_empty() {
                lines.push((String::new(), Color::White));
                lines.push(("Network Connections".into(), Color::Yellow));
                for c in &d.connections {
                    lines.push((
                        format!(
                            "  {}: {} -> {} [{}]",
                            c.kind.to_uppercase(),
                            c.local,
                            c.remote,
                            c.state
                        ),
                        Color::White,
                    ));
                }
            }
        }
        ModalContent::Inference(info) => {
            lines.push((format!("Triton Model Server  PID: {}", modal.pid), Color::Cyan));
            lines.push(("✓ Triton Server Detected".into(), Color::Green));
            lines.push((format!("Server URL: {}", info.server_url), Color::Yellow));
            if let Some(v) = &info.server_version {
                lines.push((format!("Server: {}", v), Color::Yellow));
            }
            if info.models.is_empty() {
                lines.push(("No models currently loaded".into(), Color::Yellow));
            } else {
                lines.push((String::new(), Color::White));
                lines.push((
                    format!("Loaded Models ({}, {} ready)", info.models.len(), info.ready_models()),
                    Color::Yellow,
                ));
            }
            for m in &info.models {
                lines.push((String::new(), Color::White));
                lines.push((format!("  {}", m.name), Color::White));
                lines.push((format!("    State: {}", m.state), state_color(m.state)));
                if let Some(reason) = &m.reason {
                    lines.push((format!("    Reason: {}", reason), Color::DarkGrey));
                }
                if let Some(v) = &m.version {
                    lines.push((format!("    Version: {}", v), Color::Blue));
                }
                if let Some(s) = &m.stats {
                    lines.push((format!("    Inference Count: {}", s.inference_count), Color::Blue));
                    lines.push((format!("    Execution Count: {}", s.execution_count), Color::Blue));
                    if let Some(ms) = s.avg_latency_ms() {
                        lines.push((format!("    Avg Latency: {:.2} ms", ms), Color::Blue));
                    }
                }
                if let Some(c) = &m.config {
                    lines.push((format!("    Config: {}", c), Color::DarkGrey));
                }
            }
        }
    }
    lines
}

fn line<W: Write>(out: &mut W, row: u16, text: &str, fg: Color, bg: Option<Color>, cols: u16) -> io::Result<()> {
    queue!(out, cursor::MoveTo(0, row), terminal::Clear(ClearType::CurrentLine))?;
    if let Some(bg) = bg {
        queue!(out, SetBackgroundColor(bg))?;
    }
    queue!(out, SetForegroundColor(fg), Print(fit(text, cols as usize)), ResetColor)
}

fn process_row(p: &ProcessRecord) -> String {
    format!(
        "{:>3} {:>8} {} {} {:>9.1} {:<4} {} {}",
        p.gpu_index,
        p.pid,
        fit(&p.name, 16),
        fit(&p.cmdline, 36),
        p.mem_mb,
        if p.is_containerized() { "yes" } else { "no" },
        fit(p.container_name(), 20),
        p.container_ports(),
    )
}

pub fn draw<W: Write>(
    out: &mut W,
    snapshot: &Snapshot,
    state: &UiState,
    header: &Header,
    (cols, rows): (u16, u16),
) -> io::Result<()> {
    queue!(out, cursor::Hide)?;
    let mut row: u16 = 0;

    queue!(out, cursor::MoveTo(0, row), terminal::Clear(ClearType::CurrentLine))?;
    queue!(
        out,
        SetAttribute(Attribute::Bold),
        SetForegroundColor(Color::Cyan),
        Print(&header.title),
        SetAttribute(Attribute::Reset),
        ResetColor
    )?;
    row += 1;
    if let Some(driver) = &header.driver {
        line(out, row, driver, Color::White, None, cols)?;
        row += 1;
    }
    if let Some(host) = &header.host {
        line(out, row, host, Color::DarkGrey, None, cols)?;
        row += 1;
    }
    row += 1;

    let device_focus = state.focus == Focus::Devices;
    let heading = format!(
        "{:>3} {} {:>5} {:>5} {:>17} {:<width$} {:>6} {:>8}",
        "GPU",
        fit("Name", 24),
        "%Util",
        "Mem %",
        "Mem [used/total]",
        "Mem Bar",
        "Temp C",
        "Power W",
        width = BAR_WIDTH
    );
    line(out, row, &heading, Color::Black, Some(if device_focus { Color::Cyan } else { Color::DarkGrey }), cols)?;
    row += 1;

    if snapshot.devices.is_empty() {
        line(out, row, "  - No NVIDIA GPUs detected", Color::DarkGrey, None, cols)?;
        row += 1;
    }
    for (i, d) in snapshot.devices.iter().enumerate() {
        let pct = d.mem_percent();
        let selected = i == state.selected_device;
        let bg = selected.then_some(if device_focus { Color::DarkBlue } else { Color::DarkGrey });
        queue!(out, cursor::MoveTo(0, row), terminal::Clear(ClearType::CurrentLine))?;
        if let Some(bg) = bg {
            queue!(out, SetBackgroundColor(bg))?;
        }
        let used_total = format!("{}/{}", d.mem_used, d.mem_total);
        queue!(
            out,
            SetForegroundColor(Color::White),
            Print(format!(
                "{:>3} {} {:>5} {:>4}% {:>17} ",
                d.index,
                fit(&d.name, 24),
                d.util,
                pct,
                used_total
            )),
            SetForegroundColor(bar_color(pct)),
            Print(usage_bar(pct, BAR_WIDTH)),
            SetForegroundColor(Color::White),
            Print(format!(" {:>6} {:>8.1}", d.temp, d.power)),
            ResetColor
        )?;
        row += 1;
    }
    row += 1;

    let proc_heading = format!(
        "{:>3} {:>8} {} {} {:>9} {:<4} {} {}",
        "GPU",
        "PID",
        fit("Name", 16),
        fit("Cmdline", 36),
        "GPU MiB",
        "Ctr",
        fit("Container Name", 20),
        "Ports"
    );
    line(out, row, &proc_heading, Color::Black, Some(if device_focus { Color::DarkGrey } else { Color::Cyan }), cols)?;
    row += 1;

    let footer_row = rows.saturating_sub(1);
    let procs = state.processes(snapshot);
    let visible = footer_row.saturating_sub(row) as usize;
    let first = state.selected_process.saturating_sub(visible.saturating_sub(1));
    if snapshot.devices.is_empty() {
        line(out, row, "  - No NVIDIA GPUs detected", Color::DarkGrey, None, cols)?;
        row += 1;
    } else if procs.is_empty() {
        line(out, row, "  - No processes", Color::DarkGrey, None, cols)?;
        row += 1;
    }
    for (i, p) in procs.iter().enumerate().skip(first).take(visible) {
        let bg = (!device_focus && i == state.selected_process).then_some(Color::DarkBlue);
        line(out, row, &process_row(p), Color::White, bg, cols)?;
        row += 1;
    }
    while row < footer_row {
        queue!(out, cursor::MoveTo(0, row), terminal::Clear(ClearType::CurrentLine))?;
        row += 1;
    }

    let mut footer = String::from(" q Quit  ↑/↓ Navigate  Tab Focus  i Process Info  m Triton Models");
    if snapshot.budget_exceeded {
        footer.push_str("  (partial tick)");
    }
    line(out, footer_row, &footer, Color::Black, Some(Color::DarkGrey), cols)?;

    if let Some(modal) = &state.modal {
        let gpu_name = snapshot
            .device(modal.gpu_index)
            .map_or("?", |d| d.name.as_str());
        draw_modal(out, modal, gpu_name, (cols, rows))?;
    }
    out.flush()
}

fn draw_modal<W: Write>(out: &mut W, modal: &Modal, gpu_name: &str, (cols, rows): (u16, u16)) -> io::Result<()> {
    let width = cols.saturating_sub(8).max(20);
    let height = rows.saturating_sub(4).max(6);
    let (x, y) = ((cols - width.min(cols)) / 2, (rows - height.min(rows)) / 2);
    let inner = width.saturating_sub(4) as usize;
    let body_rows = height.saturating_sub(3) as usize;

    let lines = modal_lines(modal, gpu_name);
    let scroll = modal.scroll.min(lines.len().saturating_sub(body_rows));

    let border = format!("┌{}┐", "─".repeat(width.saturating_sub(2) as usize));
    queue!(out, cursor::MoveTo(x, y), SetForegroundColor(Color::DarkGrey), Print(border), ResetColor)?;
    for r in 0..body_rows {
        let (text, fg) = lines
            .get(scroll + r)
            .cloned()
            .unwrap_or((String::new(), Color::White));
        queue!(
            out,
            cursor::MoveTo(x, y + 1 + r as u16),
            SetForegroundColor(Color::DarkGrey),
            Print("│ "),
            SetForegroundColor(fg),
            Print(fit(&text, inner)),
            SetForegroundColor(Color::DarkGrey),
            Print(" │"),
            ResetColor
        )?;
    }
    let hint = fit(" Esc/q close  PgUp/PgDn scroll", inner);
    queue!(
        out,
        cursor::MoveTo(x, y + 1 + body_rows as u16),
        SetForegroundColor(Color::DarkGrey),
        Print(format!("│ {} │", hint)),
        cursor::MoveTo(x, y + 2 + body_rows as u16),
        Print(format!("└{}┘", "─".repeat(width.saturating_sub(2) as usize))),
        ResetColor
    )
}
