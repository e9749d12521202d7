use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::args::SimConfig;
use crate::backend::SimBackend;
use crate::logging::EventLog;
use crate::model::{FAULTS, Op, TaskState};
use crate::oracle::Oracle;
use crate::scheduler::Scheduler;

pub(crate) fn run(config: SimConfig, rng: &mut ChaCha8Rng) {
    let mut events = EventLog::new(config.first_steps, config.tail_steps);
    let mut backend = match SimBackend::new(&config) {
        Ok(backend) => backend,
        Err(reason) => {
            events.dump_failure(&reason);
            std::process::exit(1);
        }
    };
    let mut tasks: Vec<TaskState> = (0..config.tasks)
        .map(|id| TaskState { id, held: None })
        .collect();
    let mut scheduler = Scheduler::new(config.tasks);
    let mut oracle = Oracle::new();

    let max_steps = config.iterations.unwrap_or(u64::MAX);
    let max_time = config.duration_ms.unwrap_or(u64::MAX);

    let mut step: u64 = 0;
    let mut failures: u64 = 0;
    while step < max_steps && scheduler.now_ms() <= max_time {
        let Some(task_id) = scheduler.next_ready(rng) else {
            break;
        };
        let op = next_op(&tasks[task_id], &config, rng);

        let outcome = backend
            .apply(&mut tasks[task_id], op, &mut oracle, rng)
            .and_then(|outcome| {
                oracle.check_links(&backend.mock)?;
                Oracle::check_tasks(&tasks, backend.held_count())?;
                Ok(outcome)
            });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(reason) => {
                events.dump_failure(&reason);
                std::process::exit(1);
            }
        };

        if let Op::Sleep(ms) = op {
            scheduler.sleep(task_id, ms);
        } else {
            scheduler.mark_ready(task_id);
        }
        let result = match &outcome.result {
            Ok(label) => label.clone(),
            Err(err) => {
                failures += 1;
                format!("Err({err})")
            }
        };
        let link = outcome
            .link
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        events.record(format!(
            "step={step} time={}ms task={task_id} op={op:?} link={link} result={result}",
            scheduler.now_ms()
        ));

        scheduler.tick();
        step += 1;
    }

    if let Err(reason) = backend.finish(&mut oracle) {
        events.dump_failure(&reason);
        std::process::exit(1);
    }

    tracing::info!(
        steps = step,
        time_ms = scheduler.now_ms(),
        tasks = config.tasks,
        links_opened = backend.mock.links_opened(),
        failed_steps = failures,
        "simulation complete"
    );
}

fn next_op(task: &TaskState, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
    if rng.random_bool(config.rates.sleep) {
        return Op::Sleep(rng.random_range(1..=20));
    }
    if rng.random_bool(config.rates.fault) {
        return Op::Inject(FAULTS[rng.random_range(0..FAULTS.len())]);
    }
    if rng.random_bool(config.rates.invalidate) {
        return Op::Invalidate;
    }
    if rng.random_bool(config.rates.settle) {
        return Op::Settle;
    }

    let value = rng.random_range(-1_000..1_000);
    let reject = rng.random_bool(config.rates.reject);
    if task.held.is_none() {
        match rng.random_range(0..10) {
            0..=5 => Op::Acquire,
            6..=8 => Op::Wrapped { value, reject },
            _ => Op::Raw,
        }
    } else {
        match rng.random_range(0..10) {
            0..=4 => Op::Query(value),
            5..=6 => Op::Release,
            7..=8 => Op::Drop,
            _ => Op::Wrapped { value, reject },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn quiet_config() -> SimConfig {
        let args = <crate::args::Args as clap::Parser>::parse_from(["simulator", "--seed", "7"]);
        let mut config = SimConfig::from_args(args);
        config.rates.fault = 0.0;
        config.rates.invalidate = 0.0;
        config.rates.sleep = 0.0;
        config.rates.settle = 0.0;
        config
    }

    #[test]
    fn holders_never_acquire_again() {
        let config = quiet_config();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let task = TaskState { id: 0, held: Some(3) };
        for _ in 0..500 {
            assert_ne!(next_op(&task, &config, &mut rng), Op::Acquire);
        }
    }

    #[test]
    fn idle_tasks_never_query() {
        let config = quiet_config();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let task = TaskState::default();
        for _ in 0..500 {
            let op = next_op(&task, &config, &mut rng);
            assert!(!matches!(op, Op::Query(_) | Op::Release | Op::Drop), "{op:?}");
        }
    }
}
