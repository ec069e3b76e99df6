//! An executor that records commands instead of running them.
//!
//! Used for dry runs (every command succeeds with empty output) and in
//! tests, where responses are scripted per command substring.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::exec::{CommandOutput, RemoteExecutor};

/// One command seen by a [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub host: String,
    pub command: String,
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    /// Served front to back; the last one repeats.
    responses: VecDeque<CommandOutput>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<RecordedCommand>,
    rules: Vec<Rule>,
}

/// Records `(host, command)` pairs and replies from scripted rules.
///
/// The first rule whose pattern is a substring of the command wins.
/// Commands matching no rule succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    state: Mutex<State>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` as the next reply for commands containing `pattern`.
    pub fn respond(&self, pattern: &str, output: CommandOutput) -> &Self {
        let mut state = self.lock();
        match state.rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.responses.push_back(output),
            None => state.rules.push(Rule {
                pattern: pattern.to_string(),
                responses: VecDeque::from([output]),
            }),
        }
        self
    }

    /// Every command recorded so far, in order.
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.lock().calls.clone()
    }

    /// Recorded commands containing `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<RecordedCommand> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.command.contains(pattern))
            .cloned()
            .collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.matching(pattern).len()
    }

    /// Position of the first command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.lock()
            .calls
            .iter()
            .position(|c| c.command.contains(pattern))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reply(&self, host: &str, command: &str) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RecordedCommand {
            host: host.to_string(),
            command: command.to_string(),
        });
        let Some(rule) = state
            .rules
            .iter_mut()
            .find(|r| command.contains(r.pattern.as_str()))
        else {
            return CommandOutput::ok("");
        };
        if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn run(&self, host: &str, command: &str) -> RemoteResult<CommandOutput> {
        Ok(self.reply(host, command))
    }

    async fn stream(
        &self,
        host: &str,
        command: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> RemoteResult<i32> {
        let output = self.reply(host, command);
        for line in output.stdout.lines() {
            on_line(line);
        }
        Ok(output.exit_code)
    }
}
