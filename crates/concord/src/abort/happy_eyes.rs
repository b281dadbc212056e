//! Happy-eyeballs attempt scheduler
//!
//! Tries candidates one after another with staggered starts and keeps the
//! first success, the way RFC 8305 races connection attempts.
//!
//! ```text
//! t=0        start A ─────────────── A fails
//!                                        │ (fail before stagger: start next now)
//!                                        ▼
//!                                     start B ──── B ok ──▶ return B, abort rest
//!                                           ╎ stagger
//!                                           ╎─────────▶ start C (only if B still pending)
//! ```
//!
//! # Semantics
//!
//! - Candidates start strictly in order; candidate *i+1* never starts before *i*.
//! - After starting a candidate the scheduler waits for the first of: any
//!   in-flight attempt settling, the stagger timer, or cancellation.
//! - A failure of the most recently started attempt starts the next
//!   candidate right away. Older failures just leave the in-flight set.
//! - Once the last candidate has started, the scheduler waits for every
//!   in-flight attempt and reports exhaustion only after the last failure.
//! - Every attempt runs under its own child scope of one top-level scope.
//!   Settled or abandoned attempts have their scope aborted, and the
//!   top-level scope is aborted on every exit path.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, debug_span, trace, Instrument};

use super::scope::AbortScope;
use super::token::AbortToken;
use crate::core::{duration_millis, AsyncError, HappyEyesConfig};

/// Reason given to attempts that lost the race
pub const SETTLED_REASON: &str = "happy eyes settled";

/// Race `candidates` with staggered starts, returning the first success
///
/// `start` is called once per started candidate with a token that is
/// cancelled when the attempt is no longer wanted. Attempt failures are
/// collected and only surface inside [`AsyncError::AllAttemptsExhausted`].
///
/// # Errors
///
/// - [`AsyncError::AllAttemptsExhausted`] if every candidate failed, or
///   there were no candidates.
/// - [`AsyncError::Cancelled`] if `parent` is cancelled first.
///
/// # Example
///
/// ```rust
/// use concord::abort::race_happy_eyes;
/// use concord::HappyEyesConfig;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let winner = race_happy_eyes(
///     ["primary", "mirror"],
///     |host, _token| async move {
///         if host == "primary" {
///             Err(anyhow::anyhow!("refused"))
///         } else {
///             Ok(host.to_uppercase())
///         }
///     },
///     HappyEyesConfig::from_millis(50),
///     None,
/// )
/// .await
/// .unwrap();
/// assert_eq!(winner, "MIRROR");
/// # }
/// ```
pub async fn race_happy_eyes<I, C, S, Fut, T, E>(
    candidates: I,
    mut start: S,
    config: HappyEyesConfig,
    parent: Option<&AbortToken>,
) -> Result<T, AsyncError>
where
    I: IntoIterator<Item = C>,
    S: FnMut(C, AbortToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let scope = AbortScope::new(parent);
    let race_span = debug_span!("happy_eyes", stagger_ms = duration_millis(config.stagger));
    let result = drive(candidates, &mut start, config, &scope)
        .instrument(race_span)
        .await;
    scope.abort_with(SETTLED_REASON);
    result
}

async fn drive<I, C, S, Fut, T, E>(
    candidates: I,
    start: &mut S,
    config: HappyEyesConfig,
    scope: &AbortScope,
) -> Result<T, AsyncError>
where
    I: IntoIterator<Item = C>,
    S: FnMut(C, AbortToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let token = scope.token();
    let mut candidates = candidates.into_iter().enumerate().peekable();
    let mut in_flight = FuturesUnordered::new();
    let mut failures: Vec<anyhow::Error> = Vec::new();

    while let Some((index, candidate)) = candidates.next() {
        token.check()?;

        let attempt = AbortScope::new(Some(token));
        let future = start(candidate, attempt.token().clone());
        trace!(index, "Started attempt");
        in_flight.push(async move {
            let outcome = future.await;
            (index, attempt, outcome)
        });

        let has_successor = candidates.peek().is_some();
        let stagger = tokio::time::sleep(config.stagger);
        tokio::pin!(stagger);

        loop {
            tokio::select! {
                biased;
                reason = token.cancelled() => {
                    debug!(%reason, "Race cancelled");
                    return Err(AsyncError::cancelled(reason));
                }
                Some((finished, attempt, outcome)) = in_flight.next() => {
                    match outcome {
                        Ok(value) => {
                            debug!(index = finished, "Attempt succeeded");
                            scope.abort_with(SETTLED_REASON);
                            return Ok(value);
                        }
                        Err(error) => {
                            let error: anyhow::Error = error.into();
                            debug!(index = finished, error = %error, "Attempt failed");
                            attempt.abort_with("attempt failed");
                            failures.push(error);

                            if in_flight.is_empty() || (finished == index && has_successor) {
                                break;
                            }
                        }
                    }
                }
                () = &mut stagger, if has_successor => {
                    trace!(index, "Stagger elapsed");
                    break;
                }
            }
        }
    }

    debug!(attempts = failures.len(), "No variants left");
    Err(AsyncError::exhausted(failures))
}
