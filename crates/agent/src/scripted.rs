use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::policy::{DecisionPolicy, PolicyError, PolicyMessage, PolicyRequest, PolicyTurn};

/// Replays a fixed queue of answers and records every transcript it was shown.
/// Once the queue is drained it stops without saying anything.
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    answers: Mutex<VecDeque<Result<PolicyTurn, PolicyError>>>,
    requests: Mutex<Vec<Vec<PolicyMessage>>>,
}

impl ScriptedPolicy {
    pub fn new(answers: Vec<Result<PolicyTurn, PolicyError>>) -> Self {
        Self { answers: Mutex::new(answers.into()), requests: Mutex::default() }
    }

    pub fn push(&self, answer: Result<PolicyTurn, PolicyError>) {
        match self.answers.lock() {
            Ok(mut answers) => answers.push_back(answer),
            Err(poisoned) => poisoned.into_inner().push_back(answer),
        }
    }

    /// Transcripts passed to `decide`, one per invocation.
    pub fn requests(&self) -> Vec<Vec<PolicyMessage>> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.answers.lock() {
            Ok(answers) => answers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl DecisionPolicy for ScriptedPolicy {
    async fn decide(&self, request: PolicyRequest<'_>) -> Result<PolicyTurn, PolicyError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.messages.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(request.messages.to_vec()),
        }
        let next = match self.answers.lock() {
            Ok(mut answers) => answers.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(PolicyTurn::default()))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
