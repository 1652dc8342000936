//! Child process hygiene
//!
//! The installer shells out to the interpreter for capability probes, package
//! installs and byte-compilation. Each child runs in its own process group and
//! is tracked in a registry, so an interrupted installer takes its children
//! down with it instead of leaving a half-finished `pip install` behind.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of running child process IDs
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// The process-wide registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate every tracked process group: SIGTERM, then SIGKILL for
    /// whatever is still alive after `grace_period`. Runs at most once.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }
        tracing::info!("Terminating {} child process(es)...", self.pids.len());

        let pids: Vec<u32> = self.pids.drain().collect();
        for &pid in &pids {
            signal_group(pid, Termination::Graceful);
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                tracing::info!("All child processes terminated");
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in pids.iter().filter(|&&pid| is_process_alive(pid)) {
            tracing::warn!("Process group {} did not terminate, killing it", pid);
            signal_group(pid, Termination::Forced);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Graceful,
    Forced,
}

#[cfg(unix)]
fn signal_group(pid: u32, how: Termination) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = match how {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forced => Signal::SIGKILL,
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // Negative PID addresses the whole group; fall back to the process itself
    if let Err(e) = kill(Pid::from_raw(-raw), signal) {
        tracing::debug!("Group signal to {} failed ({}), signalling process", pid, e);
        if let Err(e) = kill(Pid::from_raw(raw), signal) {
            tracing::warn!("Failed to send {:?} to PID {}: {}", signal, pid, e);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(pid: u32, _how: Termination) {
    tracing::debug!("Process group signalling unsupported, leaving PID {}", pid);
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if kill(Pid::from_raw(raw), None).is_err() {
        return false;
    }
    // Zombies still accept signals but are done running
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z") | Some("X")),
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that terminate registered children
/// and exit with `128 + signal`.
#[cfg(unix)]
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "signal",
            };
            tracing::warn!("Received {}, stopping child processes", name);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    Ok(())
}

/// Extension trait for `Command` to isolate children in their own group
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

#[cfg(unix)]
impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        self.process_group(0);
        #[cfg(target_os = "linux")]
        unsafe {
            self.pre_exec(|| {
                // The child dies with us even if we are killed outright
                if nix::libc::prctl(nix::libc::PR_SET_PDEATHSIG, nix::libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

#[cfg(not(unix))]
impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        self
    }
}
