use std::process::ExitCode;

fn main() -> ExitCode {
    match failsafe::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
