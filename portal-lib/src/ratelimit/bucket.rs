use std::time::{Duration, Instant};

/// Token bucket of a single identifier
///
/// Tokens refill continuously at `refill_rate` per second and are capped at
/// `max_tokens`. Each admitted request takes exactly one token.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: u32,
    refill_rate: f64,
}

impl TokenBucket {
    /// A bucket at full capacity
    #[must_use]
    pub fn full(max_tokens: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            tokens: f64::from(max_tokens),
            last_refill: now,
            max_tokens,
            refill_rate,
        }
    }

    /// Add the tokens accrued since the last refill
    ///
    /// A `now` earlier than the last refill adds nothing.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let accrued = elapsed.as_secs_f64() * self.refill_rate;
        self.tokens = (self.tokens + accrued).min(f64::from(self.max_tokens));
        self.last_refill = now.max(self.last_refill);
    }

    /// Take one token if there is one
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current (fractional) number of tokens
    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Whole tokens available
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    /// Capacity of the bucket
    #[must_use]
    pub const fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Time until the next whole token is available, zero if one already is
    #[must_use]
    pub fn time_until_next_token(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate)
                .unwrap_or(Duration::MAX)
        }
    }

    /// Time since the bucket was last refilled
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_refill)
    }
}
