//! Console input.
//!
//! One background thread reads stdin line by line; prompts, the post-race
//! menu and the "press Enter to stop" check all consume the same channel so
//! no keystroke is lost between them.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::CliError;

/// What the console produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// stdin reached EOF
    Closed,
    /// Ctrl+C or SIGTERM
    Interrupted,
}

/// Why a race was stopped before every skater finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Enter pressed during the race
    User,
    /// Ctrl+C or SIGTERM
    Signal,
}

pub struct Console {
    lines: mpsc::UnboundedReceiver<String>,
}

impl Console {
    /// Start reading stdin on a dedicated thread.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let spawned = std::thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                debug!("Console input closed");
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start console reader, running without input");
        }

        Self { lines: rx }
    }

    /// Console fed from a fixed script instead of stdin.
    #[cfg(test)]
    pub fn scripted(lines: &[&str]) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for line in lines {
            let _ = tx.send(line.to_string());
        }
        Self { lines: rx }
    }

    /// Next line, EOF, or a shutdown signal, whichever comes first.
    pub async fn read(&mut self) -> Input {
        tokio::select! {
            line = self.lines.recv() => match line {
                Some(line) => Input::Line(line.trim().to_string()),
                None => Input::Closed,
            },
            _ = shutdown_signal() => Input::Interrupted,
        }
    }

    /// Print `message` and wait for Enter.
    ///
    /// Returns `Ok(false)` when interrupted.
    pub async fn pause(&mut self, message: &str) -> Result<bool, CliError> {
        println!("{message}");
        match self.read().await {
            Input::Line(_) => Ok(true),
            Input::Interrupted => Ok(false),
            Input::Closed => Err(CliError::InputClosed),
        }
    }

    /// Drop lines typed while nothing was listening.
    pub fn discard_pending(&mut self) {
        while self.lines.try_recv().is_ok() {}
    }

    /// Resolves when the running race should stop early.
    ///
    /// Once stdin is closed only a signal can stop the race.
    pub async fn wait_for_stop(&mut self) -> StopReason {
        match self.read().await {
            Input::Line(_) => StopReason::User,
            Input::Interrupted => StopReason::Signal,
            Input::Closed => {
                shutdown_signal().await;
                StopReason::Signal
            }
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
