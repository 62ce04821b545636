// Keyboard halt button: Q, Esc or Ctrl-C stops the loop
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::warn;

use super::{DeviceError, HaltSignal};

/// Terminal in raw mode, polled without blocking
pub struct KeyboardHalt {
    pressed: bool,
}

impl KeyboardHalt {
    pub fn new() -> Result<Self, DeviceError> {
        enable_raw_mode()?;
        Ok(Self { pressed: false })
    }
}

fn is_halt_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

impl HaltSignal for KeyboardHalt {
    fn is_pressed(&mut self) -> Result<bool, DeviceError> {
        // Drain everything queued this tick; a press latches
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                self.pressed |= is_halt_key(&key);
            }
        }
        Ok(self.pressed)
    }
}

impl Drop for KeyboardHalt {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}
