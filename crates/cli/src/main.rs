use std::process::ExitCode;

fn main() -> ExitCode {
    meetbook_cli::run()
}
