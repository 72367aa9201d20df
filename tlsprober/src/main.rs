use std::process::ExitCode;

use tlsprober::conversations::SUITES;

pub fn main() -> ExitCode {
    prober::cli::main("tlsprober", &SUITES)
}
