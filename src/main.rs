use std::process;
use weekgate::core::error::WeekgateError;

fn main() {
    match weekgate::run() {
        Ok(()) => {}
        // the gate already rendered its report; only the exit code is left
        Err(WeekgateError::GateFailed(_)) => process::exit(2),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    }
}
