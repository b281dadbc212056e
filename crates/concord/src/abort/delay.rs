//! Cancellable timers
//!
//! [`delay`] is the only timing primitive; timeouts are expressed by racing an
//! operation against [`expire`].

use std::future::Future;
use std::time::Duration;

use tracing::trace;

use super::race::race_with_token;
use super::token::AbortToken;
use crate::core::AsyncError;

/// Sleep for `duration` unless `token` is cancelled first
///
/// Fails with [`AsyncError::Cancelled`] carrying the token's reason. A token
/// that is already cancelled fails immediately without creating a timer.
/// Whichever side loses is dropped: the cancellation listener after the
/// timer fires, the timer after cancellation.
pub async fn delay(duration: Duration, token: Option<&AbortToken>) -> Result<(), AsyncError> {
    let Some(token) = token else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    token.check()?;

    tokio::select! {
        biased;
        reason = token.cancelled() => {
            trace!(%reason, "Delay cancelled");
            Err(AsyncError::cancelled(reason))
        }
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Fail with [`AsyncError::TimeoutExceeded`] once `duration` elapses
///
/// Meant as the losing side of a race: it never succeeds. Cancelling `token`
/// turns the timeout into [`AsyncError::Cancelled`].
pub async fn expire<T>(duration: Duration, token: Option<&AbortToken>) -> Result<T, AsyncError> {
    delay(duration, token).await?;
    Err(AsyncError::timeout(duration))
}

/// Run `op` with a deadline
///
/// Resolves with `op`'s result if it finishes within `duration`, otherwise
/// fails with [`AsyncError::TimeoutExceeded`]. A result that is ready at
/// the deadline still wins. `op` is dropped when the
/// deadline passes or `token` is cancelled.
pub async fn with_timeout<F, T, E>(
    op: F,
    duration: Duration,
    token: Option<&AbortToken>,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<AsyncError>,
{
    let deadline = async { expire::<T>(duration, None).await.map_err(E::from) };
    race_with_token(
        async {
            tokio::select! {
                biased;
                result = op => result,
                timeout = deadline => timeout,
            }
        },
        token,
    )
    .await
}
