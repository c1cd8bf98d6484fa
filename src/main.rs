mod platform;
mod simulation;

pub use simulation::*;

fn main() {
    if let Err(err) = platform::start() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
