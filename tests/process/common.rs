/*!
 * Shared helpers for process tests
 */

use dispatch_kernel::process::affinity;
use dispatch_kernel::CoreId;
use nix::unistd::getpid;
use std::process::{Child, Command};

/// Cores this test process may actually use
pub fn permitted_cores() -> Vec<CoreId> {
    let usable = affinity::usable_cores();
    affinity::current_cores(getpid())
        .expect("affinity query")
        .into_iter()
        .filter(|&core| core < usable)
        .collect()
}

/// `preferred` when permitted, else the first permitted core
pub fn pick_core(preferred: CoreId) -> CoreId {
    let cores = permitted_cores();
    if cores.contains(&preferred) {
        preferred
    } else {
        cores[0]
    }
}

/// Long-lived external process to apply scheduling changes to
pub struct Sleeper(pub Child);

impl Sleeper {
    pub fn spawn() -> Self {
        Self(Command::new("sleep").arg("30").spawn().expect("spawn sleep"))
    }

    pub fn pid(&self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0.id() as i32)
    }
}

impl Drop for Sleeper {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}
