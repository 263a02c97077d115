//! Per-participant result of a send.

use std::collections::HashMap;

use crate::error::ChannelError;
use crate::identity::Participant;

/// Outcome of delivering one message (or a batch) to its recipients.
///
/// Transport and lock failures never escape the send API; they are recorded
/// here per participant so a fan-out can partially succeed. A report with no
/// entries means nothing had to be transmitted.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    results: HashMap<Participant, Result<(), ChannelError>>,
}

impl DeliveryReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A report recording a single outcome.
    pub fn single(participant: Participant, result: Result<(), ChannelError>) -> Self {
        let mut report = Self::new();
        report.record(participant, result);
        report
    }

    /// Record an outcome. A failure is never overwritten by a later success.
    pub fn record(&mut self, participant: Participant, result: Result<(), ChannelError>) {
        match self.results.get(&participant) {
            Some(Err(_)) if result.is_ok() => {}
            _ => {
                self.results.insert(participant, result);
            }
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: DeliveryReport) {
        for (participant, result) in other.results {
            self.record(participant, result);
        }
    }

    /// True when every recorded delivery succeeded (or nothing was sent).
    pub fn is_successful(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn get(&self, participant: &Participant) -> Option<&Result<(), ChannelError>> {
        self.results.get(participant)
    }

    pub fn delivered(&self) -> impl Iterator<Item = &Participant> {
        self.results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(participant, _)| participant)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Participant, &ChannelError)> {
        self.results
            .iter()
            .filter_map(|(participant, result)| result.as_ref().err().map(|e| (participant, e)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_successful() {
        let report = DeliveryReport::new();
        assert!(report.is_empty());
        assert!(report.is_successful());
    }

    #[test]
    fn test_partial_failure() {
        let ok = Participant::new("127.0.0.1", 4001);
        let bad = Participant::new("127.0.0.1", 4002);

        let mut report = DeliveryReport::new();
        report.record(ok.clone(), Ok(()));
        report.record(bad.clone(), Err(ChannelError::LockTimeout(bad.to_string())));

        assert!(!report.is_successful());
        assert_eq!(report.len(), 2);
        assert_eq!(report.delivered().collect::<Vec<_>>(), vec![&ok]);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, &bad);
    }

    #[test]
    fn test_merge_keeps_failures() {
        let peer = Participant::new("game-1", 4000);
        let mut first = DeliveryReport::single(peer.clone(), Err(ChannelError::NotRunning));
        let second = DeliveryReport::single(peer.clone(), Ok(()));

        first.merge(second);
        assert_eq!(first.len(), 1);
        assert!(matches!(first.get(&peer), Some(Err(ChannelError::NotRunning))));
    }
}
