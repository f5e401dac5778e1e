//! xdisc
//!
//! Command line front end for inspecting, extracting and rehashing Xbox 360
//! disc images.

use std::process::ExitCode;

use env_logger::Env;

fn main() -> ExitCode {
    let matches = xdisc::cli::parse_flags();

    let level = if matches.is_present("debug") {
        "debug".to_string()
    } else {
        xdisc::config::get_config().log.level.clone()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match xdisc::cli::run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
