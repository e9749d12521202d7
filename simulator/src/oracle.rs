use std::collections::{BTreeMap, HashMap};

use sql_statement_pool::test_utils::{LinkEvent, MockProvider};

use crate::model::TaskState;

/// Lifecycle of a link owned by the statement pool, rebuilt from the mock's event journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolLink {
    Opened,
    ReadOnly,
    /// statement prepared and usable
    Live,
    /// statement closed, waiting for the commit
    HandedBack,
    /// committed, waiting for the re-prepare
    Committed,
    Closed,
}

#[derive(Debug, Clone, Copy)]
enum Tracked {
    Pool { state: PoolLink, seen: usize },
    Other,
}

/// Checks the pool's properties after every step.
#[derive(Default)]
pub(crate) struct Oracle {
    links: BTreeMap<u64, Tracked>,
}

impl Oracle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// No two tasks hold the same pooled statement.
    pub(crate) fn check_tasks(tasks: &[TaskState], held: usize) -> Result<(), String> {
        let mut owners = HashMap::new();
        for task in tasks {
            if let Some(id) = task.held {
                if let Some(other) = owners.insert(id, task.id) {
                    return Err(format!(
                        "statement {id} held by tasks {other} and {} at once",
                        task.id
                    ));
                }
            }
        }
        if owners.len() != held {
            return Err(format!(
                "tasks claim {} statements but {held} are checked out",
                owners.len()
            ));
        }
        Ok(())
    }

    /// Replay new journal events of every pooled link through its lifecycle.
    ///
    /// Catches a statement used after hand-back, a re-prepare without a commit in between and
    /// a link closed while its statement was still live.
    pub(crate) fn check_links(&mut self, mock: &MockProvider) -> Result<(), String> {
        let violations = mock.violations();
        if let Some(first) = violations.first() {
            return Err(format!("driver misuse: {first}"));
        }

        for link in mock.link_ids() {
            let tracked = self.links.get(&link).copied();
            let (mut state, seen) = match tracked {
                Some(Tracked::Other) => continue,
                Some(Tracked::Pool {
                    state: PoolLink::Closed,
                    ..
                }) => continue,
                Some(Tracked::Pool { state, seen }) => (state, seen),
                None => (PoolLink::Opened, 0),
            };

            let events = mock.events(link);
            if tracked.is_none() {
                match events.first() {
                    None => continue,
                    Some(LinkEvent::SetReadOnly(_) | LinkEvent::Close) => {}
                    Some(_) => {
                        self.links.insert(link, Tracked::Other);
                        continue;
                    }
                }
            }

            for event in events.iter().skip(seen) {
                state = step(state, event)
                    .ok_or_else(|| format!("link {link}: {event:?} not allowed while {state:?}"))?;
            }
            self.links.insert(
                link,
                Tracked::Pool {
                    state,
                    seen: events.len(),
                },
            );
        }
        Ok(())
    }

    /// Pooled links that are still open.
    pub(crate) fn open_pool_links(&self, mock: &MockProvider) -> Vec<u64> {
        self.links
            .iter()
            .filter(|(_, tracked)| matches!(tracked, Tracked::Pool { state, .. } if *state != PoolLink::Closed))
            .map(|(link, _)| *link)
            .filter(|link| !mock.is_closed(*link))
            .collect()
    }

    /// With no housekeeping in flight, every open link is either idle or checked out.
    pub(crate) fn check_settled(
        &mut self,
        mock: &MockProvider,
        idle: usize,
        held: usize,
    ) -> Result<(), String> {
        self.check_links(mock)?;
        let open = mock.open_links();
        if open.len() != idle + held {
            return Err(format!(
                "{} links open but only {idle} idle and {held} checked out: {open:?}",
                open.len()
            ));
        }
        for link in open {
            let statements = mock.open_statements(link);
            if statements != 1 {
                return Err(format!("link {link} has {statements} open statements"));
            }
        }
        Ok(())
    }

    /// A wrapper's link commits on success, never commits on failure, and is closed once.
    pub(crate) fn check_unit_of_work(
        mock: &MockProvider,
        link: u64,
        succeeded: bool,
    ) -> Result<(), String> {
        let commits = mock.commit_count(link);
        let rollbacks = mock.rollback_count(link);
        let closes = mock.close_count(link);
        if closes != 1 {
            return Err(format!("unit of work link {link} closed {closes} times"));
        }
        if commits + rollbacks > 1 {
            return Err(format!(
                "unit of work link {link} committed {commits} and rolled back {rollbacks} times"
            ));
        }
        if succeeded && commits != 1 {
            return Err(format!("successful unit of work on link {link} did not commit"));
        }
        if !succeeded && commits != 0 {
            return Err(format!("failed unit of work on link {link} committed"));
        }
        if mock.open_statements(link) != 0 {
            return Err(format!("unit of work left a statement open on link {link}"));
        }
        Ok(())
    }
}

fn step(state: PoolLink, event: &LinkEvent) -> Option<PoolLink> {
    use PoolLink::{Closed, Committed, HandedBack, Live, Opened, ReadOnly};

    match (state, event) {
        (Opened, LinkEvent::SetReadOnly(_)) => Some(ReadOnly),
        (ReadOnly, LinkEvent::Prepare { .. }) | (Committed, LinkEvent::Prepare { .. }) => Some(Live),
        (
            Live,
            LinkEvent::Bind { .. }
            | LinkEvent::ClearParameters
            | LinkEvent::Query { .. }
            | LinkEvent::Update { .. }
            | LinkEvent::CloseCursor,
        ) => Some(Live),
        (Live, LinkEvent::CloseStatement { .. }) => Some(HandedBack),
        (HandedBack, LinkEvent::Commit) => Some(Committed),
        (Opened | ReadOnly | HandedBack | Committed, LinkEvent::Close) => Some(Closed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_requires_commit_then_prepare() {
        let sql = || "SELECT ?".to_string();
        let mut state = PoolLink::Opened;
        for event in [
            LinkEvent::SetReadOnly(true),
            LinkEvent::Prepare { sql: sql() },
            LinkEvent::Query { sql: sql() },
            LinkEvent::CloseStatement { sql: sql() },
            LinkEvent::Commit,
            LinkEvent::Prepare { sql: sql() },
        ] {
            state = step(state, &event).unwrap();
        }
        assert_eq!(state, PoolLink::Live);
    }

    #[test]
    fn query_after_hand_back_is_rejected() {
        let event = LinkEvent::Query {
            sql: "SELECT ?".to_string(),
        };
        assert_eq!(step(PoolLink::HandedBack, &event), None);
        assert_eq!(step(PoolLink::Committed, &event), None);
        assert_eq!(step(PoolLink::Live, &LinkEvent::Close), None);
    }
}
