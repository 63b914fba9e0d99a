use std::io::{self, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Base64 bytes most terminals accept in one OSC 52 sequence.
pub const MAX_OSC52_PAYLOAD: usize = 74_994;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard payload too large ({size} > {max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("failed to write clipboard sequence: {0}")]
    Write(#[from] io::Error),
}

pub trait Clipboard {
    fn copy(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Sets the system clipboard by asking the terminal through OSC 52.
#[derive(Debug, Clone)]
pub struct Osc52Clipboard {
    tmux: bool,
}

impl Osc52Clipboard {
    /// Wraps sequences for tmux when `$TMUX` is set.
    pub fn detect() -> Self {
        Self {
            tmux: std::env::var_os("TMUX").is_some(),
        }
    }

    pub fn write_to(&self, writer: &mut impl Write, text: &str) -> Result<(), ClipboardError> {
        let encoded = STANDARD.encode(text.as_bytes());
        if encoded.len() > MAX_OSC52_PAYLOAD {
            return Err(ClipboardError::TooLarge {
                size: encoded.len(),
                max: MAX_OSC52_PAYLOAD,
            });
        }

        let seq = format!("\x1b]52;c;{encoded}\x07");
        if self.tmux {
            // tmux passthrough: ESC P tmux; <seq with ESC doubled> ESC \
            let escaped = seq.replace('\x1b', "\x1b\x1b");
            write!(writer, "\x1bPtmux;{escaped}\x1b\\")?;
        } else {
            writer.write_all(seq.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Clipboard for Osc52Clipboard {
    fn copy(&self, text: &str) -> Result<(), ClipboardError> {
        self.write_to(&mut io::stdout(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_osc52_sequence() {
        let mut out = Vec::new();
        Osc52Clipboard { tmux: false }
            .write_to(&mut out, "node4")
            .expect("small payload");
        let expected = format!("\x1b]52;c;{}\x07", STANDARD.encode("node4"));
        assert_eq!(out, expected.as_bytes());
    }

    #[test]
    fn wraps_for_tmux() {
        let mut out = Vec::new();
        Osc52Clipboard { tmux: true }
            .write_to(&mut out, "hi")
            .expect("small payload");
        let text = String::from_utf8(out).expect("ascii");
        assert!(text.starts_with("\x1bPtmux;\x1b\x1b]52;c;"));
        assert!(text.ends_with("\x07\x1b\\"));
    }

    #[test]
    fn rejects_oversized_payload() {
        let big = "x".repeat(MAX_OSC52_PAYLOAD);
        let err = Osc52Clipboard { tmux: false }
            .write_to(&mut Vec::new(), &big)
            .expect_err("payload over the limit");
        assert!(matches!(err, ClipboardError::TooLarge { .. }));
    }
}
