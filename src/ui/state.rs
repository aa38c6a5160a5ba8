// Selection, focus and modal state for the interactive view

use crate::models::{InferenceServerInfo, PortMapping, ProcessDetail, ProcessRecord, Snapshot};
use crossterm::event::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Devices,
    Processes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalContent {
    Loading,
    Process(ProcessDetail),
    Inference(InferenceServerInfo),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Modal {
    pub pid: u32,
    pub gpu_index: u32,
    pub request_id: u64,
    pub content: ModalContent,
    pub scroll: usize,
}

/// What the event loop must do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    Quit,
    OpenProcessDetail { pid: u32, gpu_index: u32 },
    OpenInference { pid: u32, gpu_index: u32, ports: Vec<PortMapping> },
    CloseModal,
}

#[derive(Debug)]
pub struct UiState {
    pub focus: Focus,
    pub selected_device: usize,
    pub selected_process: usize,
    pub modal: Option<Modal>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            focus: Focus::Devices,
            selected_device: 0,
            selected_process: 0,
            modal: None,
        }
    }
}

const PAGE: usize = 10;

impl UiState {
    /// Keep selections inside the current snapshot; counts may change between ticks.
    pub fn clamp(&mut self, snapshot: &Snapshot) {
        self.selected_device = self
            .selected_device
            .min(snapshot.devices.len().saturating_sub(1));
        let procs = self.processes(snapshot).len();
        self.selected_process = self.selected_process.min(procs.saturating_sub(1));
    }

    pub fn selected_device_index(&self, snapshot: &Snapshot) -> Option<u32> {
        snapshot.devices.get(self.selected_device).map(|d| d.index)
    }

    pub fn processes<'a>(&self, snapshot: &'a Snapshot) -> &'a [ProcessRecord] {
        self.selected_device_index(snapshot)
            .map(|i| snapshot.processes_for(i))
            .unwrap_or_default()
    }

    pub fn selected_process<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a ProcessRecord> {
        self.processes(snapshot).get(self.selected_process)
    }

    /// `is_inference` decides whether `m` may open the models modal for a process.
    pub fn handle_key(
        &mut self,
        key: KeyCode,
        snapshot: &Snapshot,
        is_inference: impl Fn(&ProcessRecord) -> bool,
    ) -> Action {
        if let Some(modal) = &mut self.modal {
            return match key {
                KeyCode::Esc | KeyCode::Char('q') => Action::CloseModal,
                KeyCode::Up => {
                    modal.scroll = modal.scroll.saturating_sub(1);
                    Action::None
                }
                KeyCode::Down => {
                    modal.scroll += 1;
                    Action::None
                }
                KeyCode::PageUp => {
                    modal.scroll = modal.scroll.saturating_sub(PAGE);
                    Action::None
                }
                KeyCode::PageDown => {
                    modal.scroll += PAGE;
                    Action::None
                }
                _ => Action::None,
            };
        }

        match key {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Devices => Focus::Processes,
                    Focus::Processes => Focus::Devices,
                };
                Action::None
            }
            KeyCode::Up => {
                match self.focus {
                    Focus::Devices => {
                        if self.selected_device > 0 {
                            self.selected_device -= 1;
                            self.selected_process = 0;
                        }
                    }
                    Focus::Processes => self.selected_process = self.selected_process.saturating_sub(1),
                }
                Action::None
            }
            KeyCode::Down => {
                match self.focus {
                    Focus::Devices => {
                        if self.selected_device + 1 < snapshot.devices.len() {
                            self.selected_device += 1;
                            self.selected_process = 0;
                        }
                    }
                    Focus::Processes => {
                        if self.selected_process + 1 < self.processes(snapshot).len() {
                            self.selected_process += 1;
                        }
                    }
                }
                Action::None
            }
            KeyCode::Char('i') if self.focus == Focus::Processes => self
                .selected_process(snapshot)
                .map_or(Action::None, |p| Action::OpenProcessDetail {
                    pid: p.pid,
                    gpu_index: p.gpu_index,
                }),
            KeyCode::Char('m') if self.focus == Focus::Processes => self
                .selected_process(snapshot)
                .filter(|p| is_inference(p))
                .map_or(Action::None, |p| Action::OpenInference {
                    pid: p.pid,
                    gpu_index: p.gpu_index,
                    ports: p
                        .container
                        .as_ref()
                        .map(|c| c.ports.clone())
                        .unwrap_or_default(),
                }),
            _ => Action::None,
        }
    }

    pub fn open_modal(&mut self, pid: u32, gpu_index: u32, request_id: u64) {
        self.modal = Some(Modal {
            pid,
            gpu_index,
            request_id,
            content: ModalContent::Loading,
            scroll: 0,
        });
    }

    /// Fill the open modal. Results for a modal that has since been closed or
    /// replaced are discarded; returns whether the result was used.
    pub fn deliver(&mut self, request_id: u64, content: ModalContent) -> bool {
        match &mut self.modal {
            Some(modal) if modal.request_id == request_id => {
                modal.content = content;
                true
            }
            _ => false,
        }
    }

    pub fn close_modal(&mut self) -> Option<u64> {
        self.modal.take().map(|m| m.request_id)
    }
}
