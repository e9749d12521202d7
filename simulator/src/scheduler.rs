use std::collections::BTreeMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Picks which simulated task runs next on a virtual millisecond clock.
///
/// Ready tasks are chosen uniformly at random. Sleeping tasks become ready once the clock
/// reaches their wake time; when nobody is ready the clock jumps to the next wake-up.
pub(crate) struct Scheduler {
    ready: Vec<usize>,
    sleeping: BTreeMap<u64, Vec<usize>>,
    now_ms: u64,
}

impl Scheduler {
    pub(crate) fn new(task_count: usize) -> Self {
        Self {
            ready: (0..task_count).collect(),
            sleeping: BTreeMap::new(),
            now_ms: 0,
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub(crate) fn sleep(&mut self, task_id: usize, duration_ms: u64) {
        let wake_at = self.now_ms.saturating_add(duration_ms.max(1));
        self.sleeping.entry(wake_at).or_default().push(task_id);
    }

    pub(crate) fn tick(&mut self) {
        self.now_ms = self.now_ms.saturating_add(1);
        self.wake_due();
    }

    pub(crate) fn next_ready(&mut self, rng: &mut ChaCha8Rng) -> Option<usize> {
        if self.ready.is_empty() {
            let wake_at = *self.sleeping.first_key_value()?.0;
            self.now_ms = self.now_ms.max(wake_at);
            self.wake_due();
        }
        let idx = rng.random_range(0..self.ready.len());
        Some(self.ready.swap_remove(idx))
    }

    pub(crate) fn mark_ready(&mut self, task_id: usize) {
        self.ready.push(task_id);
    }

    fn wake_due(&mut self) {
        while let Some(entry) = self.sleeping.first_entry() {
            if *entry.key() > self.now_ms {
                break;
            }
            let mut tasks = entry.remove();
            self.ready.append(&mut tasks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sleeping_task_wakes_when_nobody_else_is_ready() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut scheduler = Scheduler::new(1);
        let task = scheduler.next_ready(&mut rng).unwrap();
        scheduler.sleep(task, 25);
        assert_eq!(scheduler.next_ready(&mut rng), Some(0));
        assert_eq!(scheduler.now_ms(), 25);
    }

    #[test]
    fn empty_scheduler_yields_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut scheduler = Scheduler::new(0);
        assert_eq!(scheduler.next_ready(&mut rng), None);
    }
}
