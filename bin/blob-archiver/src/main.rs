//! Blob archiver command line.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod args;
mod cli;
mod runner;

fn main() {
    if let Err(err) = cli::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
