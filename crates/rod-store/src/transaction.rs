use crate::error::{StoreError, StoreResult};

/// How a finished transaction ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    Aborted,
}

/// Transaction state machine.
///
/// ```text
/// unstarted --begin--> started --commit/abort--> finished --reset--> unstarted
/// ```
///
/// `started` stays `true` after the transaction finishes so a finished
/// transaction can be told apart from one that never began.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    started: bool,
    outcome: Option<TxOutcome>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> StoreResult<()> {
        if self.started {
            return Err(StoreError::InvalidTransaction("transaction already started"));
        }
        self.started = true;
        Ok(())
    }

    pub fn commit(&mut self) -> StoreResult<()> {
        self.finish(TxOutcome::Committed)
    }

    pub fn abort(&mut self) -> StoreResult<()> {
        self.finish(TxOutcome::Aborted)
    }

    /// Return a finished transaction to the unstarted state.
    pub fn reset(&mut self) -> StoreResult<()> {
        if self.outcome.is_none() {
            return Err(StoreError::InvalidTransaction("transaction not finished"));
        }
        self.started = false;
        self.outcome = None;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<TxOutcome> {
        self.outcome
    }

    fn finish(&mut self, outcome: TxOutcome) -> StoreResult<()> {
        if !self.started {
            return Err(StoreError::InvalidTransaction("transaction not started"));
        }
        if self.outcome.is_some() {
            return Err(StoreError::InvalidTransaction("transaction already finished"));
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut tx = Transaction::new();
        assert!(!tx.is_started());
        tx.begin().unwrap();
        assert!(tx.is_started());
        assert!(!tx.is_finished());

        tx.commit().unwrap();
        assert!(tx.is_started());
        assert!(tx.is_finished());
        assert_eq!(tx.outcome(), Some(TxOutcome::Committed));

        tx.reset().unwrap();
        assert!(!tx.is_started());
        assert!(!tx.is_finished());

        tx.begin().unwrap();
        tx.abort().unwrap();
        assert_eq!(tx.outcome(), Some(TxOutcome::Aborted));
        assert!(tx.is_started());
    }

    #[test]
    fn reset_before_finish_fails() {
        let mut tx = Transaction::new();
        assert!(tx.reset().is_err());
        tx.begin().unwrap();
        let err = tx.reset().unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransaction(_)));
    }

    #[test]
    fn illegal_transitions_fail() {
        let mut tx = Transaction::new();
        assert!(tx.commit().is_err());
        assert!(tx.abort().is_err());
        tx.begin().unwrap();
        assert!(tx.begin().is_err());
        tx.commit().unwrap();
        assert!(tx.abort().is_err());
        assert!(tx.begin().is_err());
    }
}
