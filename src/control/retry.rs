//! Escalation policy for unconfirmed commands.
//!
//! Sends are grouped into rounds of `max_send_attempts`. A round that ends
//! without confirmation is followed by a rehandshake; after
//! `max_reconnect_attempts` rounds the command is abandoned. The counters are
//! plain values so the total attempt count can be checked without a network.

/// Bounds for the two nested retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_send_attempts: u8,
    pub max_reconnect_attempts: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_send_attempts: 3,
            max_reconnect_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Sends performed before giving up when nothing is ever confirmed.
    pub fn total_send_budget(&self) -> u32 {
        self.max_send_attempts as u32 * self.max_reconnect_attempts as u32
    }
}

/// What the executor should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Send (and, if required, verify) the command once more.
    Send { round: u8, attempt: u8 },
    /// The round is exhausted: drop the session and handshake again.
    Rehandshake { round: u8 },
    /// Every round is exhausted.
    GiveUp,
}

/// Cursor through a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    round: u8,
    sends_in_round: u8,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            round: 0,
            sends_in_round: 0,
        }
    }

    /// Advances the cursor. Only called after the previous step failed to
    /// confirm the command.
    pub fn next_step(&mut self) -> RetryStep {
        if self.round >= self.policy.max_reconnect_attempts {
            return RetryStep::GiveUp;
        }
        if self.sends_in_round < self.policy.max_send_attempts {
            self.sends_in_round += 1;
            return RetryStep::Send {
                round: self.round,
                attempt: self.sends_in_round,
            };
        }
        let finished = self.round;
        self.round += 1;
        self.sends_in_round = 0;
        RetryStep::Rehandshake { round: finished }
    }

    pub fn rounds_completed(&self) -> u8 {
        self.round
    }
}
