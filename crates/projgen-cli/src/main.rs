use std::process::ExitCode;

fn main() -> ExitCode {
    projgen_cli::run()
}
