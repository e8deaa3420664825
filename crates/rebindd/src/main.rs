//! Entry point for the `rebindd` host daemon.

use std::process::ExitCode;

#[expect(
    clippy::print_stderr,
    reason = "configuration failures happen before telemetry exists"
)]
fn main() -> ExitCode {
    match rebindd::run_host() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "rebindd::process", %error, "host exited with an error");
            eprintln!("rebindd: {error}");
            ExitCode::FAILURE
        }
    }
}
