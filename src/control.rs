use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info, warn};

use crate::handshake::HttpTransport;
use crate::messages::device_info_request;
use crate::session::TapoSession;

pub mod retry;

pub use retry::{RetryPolicy, RetryState, RetryStep};

/// Issues state-changing commands and confirms the device reached the
/// requested state, rehandshaking when a round of attempts gets nowhere.
///
/// `execute` never returns an error: the result is simply whether the device
/// confirmed the change within the retry budget.
#[derive(Debug)]
pub struct CommandExecutor<T, R = OsRng> {
    session: TapoSession<T, R>,
    policy: RetryPolicy,
}

impl<T, R> CommandExecutor<T, R>
where
    T: HttpTransport,
    R: RngCore + CryptoRng,
{
    /// Uses the retry bounds from the session's own configuration.
    pub fn new(session: TapoSession<T, R>) -> Self {
        let policy = session.config().retry_policy();
        Self { session, policy }
    }

    /// Overrides the retry bounds configured on the session.
    pub fn with_policy(session: TapoSession<T, R>, policy: RetryPolicy) -> Self {
        Self { session, policy }
    }

    pub fn session(&self) -> &TapoSession<T, R> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TapoSession<T, R> {
        &mut self.session
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `command` until it is confirmed or the retry budget runs out.
    ///
    /// With no `expected_state` a delivered reply counts as confirmation.
    /// Fails immediately, without touching the network, if the session never
    /// completed a handshake.
    pub async fn execute(&mut self, command: &str, expected_state: Option<&str>) -> bool {
        if !self.session.has_established() {
            warn!("command issued before any handshake completed");
            return false;
        }

        let mut retry = RetryState::new(self.policy);
        loop {
            match retry.next_step() {
                RetryStep::Send { round, attempt } => {
                    debug!(round, attempt, "sending command");
                    if self.attempt(command, expected_state).await {
                        return true;
                    }
                }
                RetryStep::Rehandshake { round } => {
                    warn!(round, "command unconfirmed, rehandshaking");
                    if let Err(err) = self.session.rehandshake().await {
                        warn!(round, error = %err, "rehandshake failed");
                    }
                }
                RetryStep::GiveUp => {
                    warn!("command unconfirmed after all retries, giving up");
                    return false;
                }
            }
        }
    }

    /// True if a fresh `get_device_info` reply contains `expected_state`.
    pub async fn check_state(&mut self, expected_state: &str) -> bool {
        if !self.session.has_established() {
            return false;
        }
        match self.session.send_message(&device_info_request()).await {
            Ok(reply) => reply.contains(expected_state),
            Err(err) => {
                debug!(error = %err, "state query failed");
                false
            }
        }
    }

    async fn attempt(&mut self, command: &str, expected_state: Option<&str>) -> bool {
        if let Err(err) = self.session.send_message(command).await {
            debug!(error = %err, "command not delivered");
            return false;
        }
        match expected_state {
            None => true,
            Some(expected) => {
                let confirmed = self.check_state(expected).await;
                if confirmed {
                    info!(expected, "command confirmed");
                }
                confirmed
            }
        }
    }
}
