//! Randomized, seed-reproducible exercise of the statement pool and execution wrappers
//! against the in-memory mock driver. Exits non-zero with the lead-up to the first property
//! violation.

mod args;
mod backend;
mod driver;
mod logging;
mod model;
mod oracle;
mod scheduler;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::args::{Args, SimConfig};
use crate::logging::log_writer;

fn main() {
    let config = SimConfig::from_args(Args::parse());

    let writer = match log_writer(config.log.as_deref()) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("cannot open log file: {err}");
            std::process::exit(2);
        }
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_max_level(tracing::Level::INFO)
        .init();

    match serde_json::to_string(&config) {
        Ok(json) => tracing::info!(seed = config.seed, "starting simulation: {json}"),
        Err(err) => tracing::warn!(seed = config.seed, error = %err, "starting simulation"),
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    driver::run(config, &mut rng);
}
