use super::{
    protocol::{session::Session, transport::Transport, Error, Result},
    types::RetryPolicy,
};
use backoff::backoff::Backoff;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bring `session` to the negotiated state, retrying under exponential backoff.
///
/// Each attempt reconnects the transport when needed and runs the handshake.
/// Gives up with the last attempt's error once `max_attempts` retries or the
/// backoff's elapsed-time budget are used up. Cancellation yields
/// `Disconnected`.
pub async fn establish<T: Transport>(
    session: &mut Session<T>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u16> {
    let mut bo = policy.build_exponential_backoff();
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Disconnected);
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                // the stream may be left between connect and negotiate
                session.mark_disconnected();
                return Err(Error::Disconnected);
            }
            res = session.handshake() => res,
        };
        let e = match result {
            Ok(pdu_size) => {
                if attempt > 0 {
                    info!(attempt, pdu_size, "S7 connected after retry");
                }
                return Ok(pdu_size);
            }
            Err(e) => e,
        };
        // a half-finished handshake leaves the stream in an unknown state
        session.mark_disconnected();

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            warn!(attempt, error = %e, "S7 connect attempts exhausted");
            return Err(e);
        }
        let Some(delay) = bo.next_backoff() else {
            warn!(attempt, error = %e, "S7 connect backoff exhausted");
            return Err(e);
        };
        attempt = attempt.saturating_add(1);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "S7 connect retry"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Disconnected),
            _ = sleep(delay) => {}
        }
    }
}
