//! # Precomputed-Result Ledger
//!
//! The ordered record of sub-calls already completed within one call chain.
//! Before a sub-call executes, the chain consults its ledger; a prior result
//! for structurally equal arguments is replayed instead of running the
//! sub-call again.
//!
//! The ledger stays plain data (`Vec<CallResult>`) so it can ride along on the
//! wire with a request and be retained between attempts.

use serde_json::Value;

use plugrpc::CallArgs;
use plugrpc::CallId;
use plugrpc::CallResult;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ledger {
    results: Vec<CallResult>,
}

impl Ledger {
    pub fn new(results: Vec<CallResult>) -> Self {
        Self { results }
    }

    /// The earliest recorded result for `args`, if any.
    pub fn lookup(&self, args: &CallArgs) -> Option<&CallResult> {
        self.results.iter().find(|entry| entry.args == *args)
    }

    /// Appends a completed sub-call. A sub-call already present is not
    /// recorded twice.
    pub fn record(&mut self, id: CallId, args: CallArgs, result: Value) {
        if self.lookup(&args).is_some() {
            return;
        }
        self.results.push(CallResult { id, args, result });
    }

    pub fn results(&self) -> &[CallResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<CallResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl From<Vec<CallResult>> for Ledger {
    fn from(results: Vec<CallResult>) -> Self {
        Self::new(results)
    }
}
