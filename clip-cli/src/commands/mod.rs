//! CLI command implementations.

pub mod listen;
pub mod send;
pub mod watch;

use crate::client::{backoff, connect, ConnectOptions, RelaySocket};

/// Reconnect policy shared by the long-running commands.
///
/// The first connect is immediate. Every later one waits out the backoff
/// for the current attempt, and a successful connect resets the attempt.
#[derive(Debug, Default)]
pub struct Reconnect {
    attempt: u32,
    connected_before: bool,
}

impl Reconnect {
    /// Connect, retrying until it succeeds.
    pub async fn connect(&mut self, options: &ConnectOptions) -> RelaySocket {
        loop {
            if self.connected_before || self.attempt > 0 {
                let delay = self.next_delay();
                eprintln!("Reconnecting in {} ms...", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
            match connect(options).await {
                Ok(socket) => {
                    self.attempt = 0;
                    self.connected_before = true;
                    eprintln!("Connected to {} as {}/{}", options.addr, options.user, options.device);
                    return socket;
                }
                Err(e) => {
                    eprintln!("Connect failed: {e:#}");
                    self.attempt = self.attempt.saturating_add(1);
                }
            }
        }
    }

    fn next_delay(&self) -> std::time::Duration {
        backoff(self.attempt)
    }
}
