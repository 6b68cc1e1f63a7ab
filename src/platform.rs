//! Time and power control.
//!
//! On the host, a hardware reset and a timed deep sleep are both modelled as
//! re-executing the current binary: nothing in memory survives, and the new
//! process starts again from `Init`, reading only the settings file.

use log::{error, info};
use std::time::{Duration, Instant};
use std::{env, thread};

/// What the controller asks of the platform once it is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAction {
    /// Restart immediately
    Reset,
    /// Power down for the given time, then restart
    DeepSleep(Duration),
}

/// Monotonic time and blocking delays.
pub trait Clock {
    fn now(&self) -> Instant;
    fn delay(&mut self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub trait Platform {
    fn reset(&mut self) -> !;
    fn deep_sleep(&mut self, duration: Duration) -> !;

    fn perform(&mut self, action: PowerAction) -> ! {
        match action {
            PowerAction::Reset => self.reset(),
            PowerAction::DeepSleep(duration) => self.deep_sleep(duration),
        }
    }
}

/// Restarts by replacing the current process image.
#[derive(Debug, Default)]
pub struct ProcessPlatform;

impl ProcessPlatform {
    pub fn new() -> Self {
        Self
    }

    fn restart(&self) -> ! {
        let args: Vec<String> = env::args().skip(1).collect();
        match env::current_exe() {
            Ok(exe) => {
                info!("Restarting {}", exe.display());
                let err = exec(&exe, &args);
                error!("restart failed: {}", err);
            }
            Err(e) => error!("cannot locate own executable: {}", e),
        }
        // Let a supervisor (systemd Restart=always) bring us back.
        std::process::exit(1)
    }
}

#[cfg(unix)]
fn exec(exe: &std::path::Path, args: &[String]) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    std::process::Command::new(exe).args(args).exec()
}

#[cfg(not(unix))]
fn exec(exe: &std::path::Path, args: &[String]) -> std::io::Error {
    match std::process::Command::new(exe).args(args).spawn() {
        Ok(_) => std::process::exit(0),
        Err(e) => e,
    }
}

impl Platform for ProcessPlatform {
    fn reset(&mut self) -> ! {
        info!("Resetting");
        self.restart()
    }

    fn deep_sleep(&mut self, duration: Duration) -> ! {
        info!("Deep sleep for {}s", duration.as_secs());
        thread::sleep(duration);
        self.restart()
    }
}
