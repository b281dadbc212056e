//! Racing operations against cancellation

use std::future::Future;

use super::token::AbortToken;
use crate::core::AsyncError;

/// Resolve with `op`'s result or fail once `token` is cancelled
///
/// Whichever happens first wins; `op` is dropped if cancellation wins. With
/// no token this is a plain `op.await`. A token that is already cancelled
/// fails without polling `op`. The cancellation listener is released as soon
/// as either side settles.
///
/// The operation's error type must accept [`AsyncError`], so both
/// `Result<T, AsyncError>` and `anyhow::Result<T>` operations fit.
pub async fn race_with_token<F, T, E>(op: F, token: Option<&AbortToken>) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<AsyncError>,
{
    let Some(token) = token else {
        return op.await;
    };

    token.check()?;

    tokio::select! {
        biased;
        reason = token.cancelled() => Err(AsyncError::cancelled(reason).into()),
        result = op => result,
    }
}

/// Like [`race_with_token`], but cancellation resolves to `Ok(None)`
///
/// Cancellation reported by `op` itself is mapped the same way, so callers
/// that only care about "finished or not needed anymore" can skip the error.
pub async fn map_cancelled_to_none<F, T>(
    op: F,
    token: Option<&AbortToken>,
) -> Result<Option<T>, AsyncError>
where
    F: Future<Output = Result<T, AsyncError>>,
{
    match race_with_token(op, token).await {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_cancelled() => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancelReason;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_pass_through_without_token() {
        let result: Result<u8, AsyncError> = race_with_token(async { Ok(3) }, None).await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_op() {
        let token = AbortToken::new();
        token.cancel();
        let polled = AtomicBool::new(false);
        let result: Result<u8, AsyncError> = race_with_token(
            async {
                polled.store(true, Ordering::SeqCst);
                Ok(1)
            },
            Some(&token),
        )
        .await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins() {
        let token = AbortToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel_with("search closed");
        });

        let result: anyhow::Result<u8> = race_with_token(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            },
            Some(&token),
        )
        .await;

        let error = result.unwrap_err();
        let error = error.downcast_ref::<AsyncError>().unwrap();
        assert_eq!(error.cancel_reason(), Some(&CancelReason::from("search closed")));
    }

    #[tokio::test]
    async fn test_op_wins_and_releases_listener() {
        let token = AbortToken::new();
        let result: Result<u8, AsyncError> = race_with_token(async { Ok(9) }, Some(&token)).await;
        assert_eq!(result.unwrap(), 9);
        assert_eq!(token.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_map_cancelled_to_none() {
        let token = AbortToken::new();
        token.cancel();
        let value = map_cancelled_to_none(async { Ok(1) }, Some(&token)).await;
        assert_eq!(value.unwrap(), None);

        let inner_cancel = map_cancelled_to_none::<_, u8>(
            async { Err(AsyncError::cancelled(CancelReason::Requested)) },
            None,
        )
        .await;
        assert_eq!(inner_cancel.unwrap(), None);

        let failure =
            map_cancelled_to_none::<_, u8>(async { Err(AsyncError::LockDisposed) }, None).await;
        assert!(failure.is_err());
    }
}
