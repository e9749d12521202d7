use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Preset {
    /// Few tasks, short run
    Quick,
    /// Many tasks, long run, frequent faults
    Stress,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic statement-pool simulator")]
pub(crate) struct Args {
    /// Stop after this much virtual time
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    /// Seed for the step generator; random when omitted
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 16)]
    pub(crate) tasks: usize,
    /// Housekeeping workers behind the mock provider
    #[arg(long, default_value_t = 2)]
    pub(crate) housekeepers: usize,
    /// Chance per step of arming a one-shot driver fault
    #[arg(long, default_value_t = 0.02)]
    pub(crate) fault_rate: f64,
    /// Chance per step of marking a pooled link invalid
    #[arg(long, default_value_t = 0.01)]
    pub(crate) invalidate_rate: f64,
    /// Chance that a wrapped unit of work fails inside its processor
    #[arg(long, default_value_t = 0.1)]
    pub(crate) reject_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    /// Chance per step of waiting for housekeeping and checking for leaked links
    #[arg(long, default_value_t = 0.02)]
    pub(crate) settle_rate: f64,
    /// Also write the log to this file
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    /// Overrides counts and rates given on the command line
    #[arg(long, value_enum)]
    pub(crate) preset: Option<Preset>,
}

/// Per-step probabilities driving the op generator.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct Rates {
    pub(crate) fault: f64,
    pub(crate) invalidate: f64,
    pub(crate) reject: f64,
    pub(crate) sleep: f64,
    pub(crate) settle: f64,
}

impl Rates {
    fn clamped(self) -> Self {
        Self {
            fault: clamp_rate(self.fault),
            invalidate: clamp_rate(self.invalidate),
            reject: clamp_rate(self.reject),
            sleep: clamp_rate(self.sleep),
            settle: clamp_rate(self.settle),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) preset: Option<Preset>,
    pub(crate) seed: u64,
    pub(crate) iterations: Option<u64>,
    pub(crate) duration_ms: Option<u64>,
    pub(crate) tasks: usize,
    pub(crate) housekeepers: usize,
    pub(crate) rates: Rates,
    pub(crate) log: Option<PathBuf>,
    /// Steps kept from the start of the run for failure reports
    pub(crate) first_steps: usize,
    /// Steps kept from the end of the run for failure reports
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            preset: args.preset,
            seed: args.seed.unwrap_or_else(random_seed),
            iterations: args.iterations,
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            tasks: args.tasks,
            housekeepers: args.housekeepers,
            rates: Rates {
                fault: args.fault_rate,
                invalidate: args.invalidate_rate,
                reject: args.reject_rate,
                sleep: args.sleep_rate,
                settle: args.settle_rate,
            },
            log: args.log,
            first_steps: 30,
            tail_steps: 80,
        };

        match config.preset {
            Some(Preset::Quick) => {
                config.iterations = Some(5_000);
                config.duration_ms = None;
                config.tasks = 4;
                config.housekeepers = 1;
                config.rates.settle = 0.05;
            }
            Some(Preset::Stress) => {
                config.iterations = Some(200_000);
                config.duration_ms = None;
                config.tasks = 64;
                config.housekeepers = 4;
                config.rates = Rates {
                    fault: 0.05,
                    invalidate: 0.03,
                    reject: 0.2,
                    sleep: 0.08,
                    settle: 0.01,
                };
            }
            None => {}
        }
        if config.iterations.is_none() && config.duration_ms.is_none() {
            config.iterations = Some(20_000);
        }
        config.tasks = config.tasks.max(1);
        config.housekeepers = config.housekeepers.max(1);
        config.rates = config.rates.clamped();
        config
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}
