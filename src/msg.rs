use crossterm::event::KeyEvent;
use std::path::PathBuf;
use std::sync::mpsc;

use crate::workspace::Presenter;

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    /// Bracketed paste.
    Paste(String),
    Resize(u16, u16),

    // -- Workspace notifications
    Redraw,
    Notify(String),

    // -- Background I/O
    ImportLoaded {
        path: PathBuf,
        result: Result<String, String>,
    },
    ExportFinished {
        path: PathBuf,
        result: Result<(), String>,
    },

    // -- System
    Tick,
}

impl Presenter for mpsc::Sender<Msg> {
    fn request_redraw(&self) {
        let _ = self.send(Msg::Redraw);
    }

    fn notify(&self, message: String) {
        let _ = self.send(Msg::Notify(message));
    }
}
