//! Abort propagation
//!
//! Tokens and scopes for cooperative cancellation, plus the utilities built
//! on them: cancellable delays, racing against a token and the
//! happy-eyeballs scheduler.

pub mod delay;
pub mod happy_eyes;
pub mod race;
pub mod scope;
pub mod token;

pub use delay::{delay, expire, with_timeout};
pub use happy_eyes::race_happy_eyes;
pub use race::{map_cancelled_to_none, race_with_token};
pub use scope::AbortScope;
pub use token::{AbortToken, Registration};
