use std::process::ExitCode;

fn main() -> ExitCode {
    incident_cli::run()
}
