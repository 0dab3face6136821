//! Binary entrypoint that launches the vocal coach chat proxy.

use std::process::ExitCode;

use vocal_coach::start_vocal_coach;

fn main() -> ExitCode {
    start_vocal_coach::run()
}
