//! Repeating comment request owned by a session.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::wire::ExtendedWire;
use crate::comment::CommentError;

/// Cancellable task re-sending the same request on a fixed interval.
///
/// The first repeat fires one full period after arming. Traffic in between
/// does not reset the schedule. Cancelling twice is harmless, and dropping the
/// timer cancels it.
#[derive(Debug, Default)]
pub struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Starts re-sending `payload` every `period`, replacing any previous
    /// schedule. A zero period leaves the timer disarmed.
    ///
    /// # Errors
    ///
    /// - `CommentError::RefreshUnavailable` - If called outside a tokio
    ///   runtime; the timer stays disarmed
    pub fn arm(
        &mut self,
        period: Duration,
        wire: Arc<dyn ExtendedWire>,
        extension: String,
        payload: Bytes,
    ) -> Result<(), CommentError> {
        self.cancel();

        if period.is_zero() {
            tracing::warn!("Refusing to arm {} refresh with zero period", extension);
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|e| {
            tracing::warn!("Cannot schedule {} refresh: {}", extension, e);
            CommentError::RefreshUnavailable {
                reason: e.to_string(),
            }
        })?;

        self.handle = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if let Err(e) = wire.send_extended(&extension, payload.clone()) {
                    tracing::debug!("Stopping {} refresh: {}", extension, e);
                    break;
                }
                tracing::trace!("Sent periodic {} request", extension);
            }
        }));
        Ok(())
    }

    /// Stops the schedule. Returns whether a live schedule was stopped.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                was_running
            }
            None => false,
        }
    }

    /// Whether a schedule is currently running.
    pub fn is_armed(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
