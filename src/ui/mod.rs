// Interactive terminal view. Runs on a blocking thread: it polls the keyboard,
// renders the latest published snapshot, and never waits on assembly.

pub mod render;
pub mod state;

pub use render::Header;
pub use state::{Action, Focus, Modal, ModalContent, UiState};

use crate::detail::{DetailHandle, DetailService};
use crate::error::DetailError;
use crate::models::{InferenceServerInfo, ProcessDetail, ProcessRecord};
use crate::worker::SnapshotReceiver;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    terminal::{self, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

const INPUT_POLL: Duration = Duration::from_millis(50);

pub struct App {
    pub rx: SnapshotReceiver,
    pub details: Arc<DetailService>,
    pub header: Header,
}

/// Raw mode + alternate screen for the guard's lifetime.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn take_ready<T>(pending: &mut Option<DetailHandle<T>>) -> Option<(u64, Result<T, DetailError>)> {
    let result = pending.as_mut()?.try_take()?;
    let handle = pending.take()?;
    Some((handle.request_id, result))
}

/// Blocks until the user quits. Must be called from within the runtime
/// (e.g. `spawn_blocking`) since detail fetches are spawned onto it.
pub fn run(app: App) -> anyhow::Result<()> {
    let App {
        mut rx,
        details,
        header,
    } = app;
    let is_inference = |p: &ProcessRecord| details.is_inference_process(p);

    let _guard = TerminalGuard::enter()?;
    let mut out = io::stdout();
    let mut state = UiState::default();
    let mut pending_process: Option<DetailHandle<ProcessDetail>> = None;
    let mut pending_inference: Option<DetailHandle<InferenceServerInfo>> = None;
    let mut dirty = true;

    loop {
        if rx.has_changed().unwrap_or(false) {
            dirty = true;
        }
        let snapshot = rx.borrow_and_update().clone();
        state.clamp(&snapshot);

        if let Some((id, result)) = take_ready(&mut pending_process) {
            dirty |= state.deliver(
                id,
                result.map_or_else(|e| ModalContent::Error(e.to_string()), ModalContent::Process),
            );
        }
        if let Some((id, result)) = take_ready(&mut pending_inference) {
            dirty |= state.deliver(
                id,
                result.map_or_else(|e| ModalContent::Error(e.to_string()), ModalContent::Inference),
            );
        }

        if dirty {
            render::draw(&mut out, &snapshot, &state, &header, terminal::size()?)?;
            dirty = false;
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    break;
                }
                dirty = true;
                match state.handle_key(key.code, &snapshot, &is_inference) {
                    Action::None => {}
                    Action::Quit => break,
                    Action::OpenProcessDetail { pid, gpu_index } => {
                        let handle = details.process_detail(pid);
                        state.open_modal(pid, gpu_index, handle.request_id);
                        pending_inference = None;
                        pending_process = Some(handle);
                    }
                    Action::OpenInference { pid, gpu_index, ports } => {
                        let handle = details.inference(pid, ports);
                        state.open_modal(pid, gpu_index, handle.request_id);
                        pending_process = None;
                        pending_inference = Some(handle);
                    }
                    Action::CloseModal => {
                        state.close_modal();
                        // Dropping the handles cancels the fetches.
                        pending_process = None;
                        pending_inference = None;
                    }
                }
            }
            Event::Resize(_, _) => {
                queue!(out, terminal::Clear(ClearType::All))?;
                out.flush()?;
                dirty = true;
            }
            _ => {}
        }
    }
    Ok(())
}
