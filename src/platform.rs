use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;
use std::thread;

use crate::cancel::{CancelReason, CancelToken};

#[cfg(unix)]
use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};

#[cfg(windows)]
use signal_hook::{consts::SIGINT, flag};

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
    SignalInt = 130,  // 128 + SIGINT (2)
    SignalPipe = 141, // 128 + SIGPIPE (13)
    SignalTerm = 143, // 128 + SIGTERM (15)
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

/// Turns SIGINT/SIGTERM into a cancellation of the running pipeline.
///
/// The first signal cancels `cancel` with [`CancelReason::Signal`] and lets the
/// run drain; a second one exits the process on the spot.
pub struct SignalHandler {
    received: Arc<OnceCell<ExitCode>>,
    _handle: thread::JoinHandle<()>,
}

impl SignalHandler {
    pub fn new(cancel: CancelToken) -> Result<Self> {
        let received = Arc::new(OnceCell::new());

        #[cfg(unix)]
        {
            let mut signals = Signals::new([SIGINT, SIGTERM])?;
            let first = Arc::clone(&received);
            let handle = thread::spawn(move || {
                for sig in signals.forever() {
                    let code = match sig {
                        SIGTERM => ExitCode::SignalTerm,
                        _ => ExitCode::SignalInt,
                    };
                    if first.set(code).is_err() {
                        code.exit();
                    }
                    tracing::warn!(signal = sig, "signal received, stopping pipeline");
                    cancel.cancel(CancelReason::Signal);
                }
            });

            Ok(SignalHandler {
                received,
                _handle: handle,
            })
        }

        #[cfg(windows)]
        {
            let term_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
            flag::register(SIGINT, Arc::clone(&term_flag))?;

            let first = Arc::clone(&received);
            let handle = thread::spawn(move || loop {
                thread::sleep(std::time::Duration::from_millis(100));
                if term_flag.swap(false, std::sync::atomic::Ordering::Relaxed) {
                    if first.set(ExitCode::SignalInt).is_err() {
                        ExitCode::SignalInt.exit();
                    }
                    cancel.cancel(CancelReason::Signal);
                }
            });

            Ok(SignalHandler {
                received,
                _handle: handle,
            })
        }
    }

    /// Exit code matching the first signal, if any arrived
    pub fn received(&self) -> Option<ExitCode> {
        self.received.get().copied()
    }
}

/// Stdout wrapper that exits quietly when the reader of a pipe goes away
pub struct SafeStdout {
    stdout: io::Stdout,
}

impl SafeStdout {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }

    pub fn write_str(&mut self, data: &str) -> Result<()> {
        let mut lock = self.stdout.lock();
        match lock.write_all(data.as_bytes()).and_then(|_| lock.flush()) {
            Ok(()) => Ok(()),
            Err(e) if is_broken_pipe(&e) => ExitCode::SignalPipe.exit(),
            Err(e) => Err(anyhow!("failed to write to stdout: {}", e)),
        }
    }
}

impl Default for SafeStdout {
    fn default() -> Self {
        Self::new()
    }
}

fn is_broken_pipe(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        e.kind() == io::ErrorKind::BrokenPipe
    }
    #[cfg(windows)]
    {
        e.kind() == io::ErrorKind::BrokenPipe
            || e.raw_os_error() == Some(232) // ERROR_NO_DATA
            || e.raw_os_error() == Some(109) // ERROR_BROKEN_PIPE
    }
}
