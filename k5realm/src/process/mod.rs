//! Child process handling: one-shot commands and supervised daemons

pub mod output;
pub mod readiness;
pub mod runner;
pub mod supervisor;

pub use output::{OutputStream, OutputTail};
pub use readiness::Readiness;
pub use runner::{Invocation, ProcessRunner};
pub use supervisor::{DaemonHandle, DaemonLaunch, DaemonSupervisor};

use std::process::ExitStatus;

/// Exit code of a finished process; death by signal N reports `-N`
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Human-readable form of an argument vector, used in errors and logs
pub fn command_line(argv: &[String]) -> String {
    argv.join(" ")
}
