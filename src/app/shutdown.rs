use std::fmt;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::info;

/// Why the session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownSignal {
    /// SIGTERM: the host is hiding the session.
    Hide,
    /// SIGINT / Ctrl+C: the host is about to destroy the session.
    BeforeDestroy,
    /// The ingress stream ended.
    EndOfInput,
    /// A producer recorded a `page_leave`.
    PageLeave,
}

impl TeardownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownSignal::Hide => "hide",
            TeardownSignal::BeforeDestroy => "before-destroy",
            TeardownSignal::EndOfInput => "end-of-input",
            TeardownSignal::PageLeave => "page-leave",
        }
    }
}

impl fmt::Display for TeardownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wait for the first process signal that ends the session.
pub async fn wait_for_signal() -> std::io::Result<TeardownSignal> {
    #[cfg(unix)]
    {
        let mut sigterm = unix_signal(SignalKind::terminate())?;

        let received = tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                TeardownSignal::BeforeDestroy
            }
            _ = sigterm.recv() => TeardownSignal::Hide,
        };

        info!(signal = %received, "Received teardown signal");
        Ok(received)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!(signal = %TeardownSignal::BeforeDestroy, "Received teardown signal");
        Ok(TeardownSignal::BeforeDestroy)
    }
}
