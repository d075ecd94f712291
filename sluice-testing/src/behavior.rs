// Scripted node behaviours

use std::time::Duration;

/// How a virtual node answers a call.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Behavior {
    /// Answer normally: bulk bodies go to the bulk responder, the nodes info
    /// path returns the virtual topology, anything else gets `200 {}`.
    #[default]
    Ok,
    /// Answer with this status and a generic error body.
    Status(u16),
    /// Answer with this status and body.
    Body(u16, String),
    /// Refuse the connection.
    Refuse,
    /// Fail with a timeout immediately.
    Timeout,
    /// Never answer; the caller's own timeout has to fire.
    Hang,
    /// Wait, then behave as the inner behaviour.
    Delay(Duration, Box<Behavior>),
    /// One behaviour per call, repeating the last one once exhausted.
    Sequence(Vec<Behavior>),
}

impl Behavior {
    /// Fail `times` calls with `failure`, then answer normally.
    pub fn fail_then_ok(times: usize, failure: Behavior) -> Self {
        let mut steps = vec![failure; times];
        steps.push(Behavior::Ok);
        Behavior::Sequence(steps)
    }

    /// Resolve a sequence for the given zero-based call number.
    pub(crate) fn resolve(&self, call: usize) -> &Behavior {
        match self {
            Behavior::Sequence(steps) if !steps.is_empty() => {
                steps[call.min(steps.len() - 1)].resolve(call)
            }
            other => other,
        }
    }
}
