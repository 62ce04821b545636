// Process interrupt as a halt input, for runs without the raw-mode keyboard
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::{DeviceError, HaltSignal};

/// Latches once SIGINT (Ctrl-C) reaches the process
pub struct SignalHalt {
    received: Arc<AtomicBool>,
}

impl SignalHalt {
    /// Install the handler; must be called inside a tokio runtime
    pub fn listen() -> Self {
        let received = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&received);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received");
                    flag.store(true, Ordering::SeqCst);
                }
                Err(e) => warn!("Failed to listen for interrupt: {}", e),
            }
        });
        Self { received }
    }

    #[cfg(test)]
    pub(crate) fn raise(&self) {
        self.received.store(true, Ordering::SeqCst);
    }
}

impl HaltSignal for SignalHalt {
    fn is_pressed(&mut self) -> Result<bool, DeviceError> {
        Ok(self.received.load(Ordering::SeqCst))
    }
}
