//! Exchange error taxonomy.

use std::fmt;

use ocbot_core::Retryable;
use thiserror::Error;

/// Broad class of an exchange failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeErrorKind {
    /// Timeout, reset, DNS and other transport failures.
    Network,
    RateLimited,
    /// 5xx or exchange-side internal error.
    Server,
    /// Request refused for a reason that will repeat (margin, precision).
    Rejected,
    /// The position is already gone ("ghost position").
    PositionNotFound,
    /// Reduce-only order refused because there is nothing to reduce.
    ReduceOnlyRejected,
    /// Trigger price already crossed.
    WouldTriggerImmediately,
    /// Order to cancel does not exist (already filled or cancelled).
    OrderNotFound,
    InvalidSymbol,
    Other,
}

impl ExchangeErrorKind {
    /// Check if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimited | Self::Server | Self::Other
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::Rejected => "rejected",
            Self::PositionNotFound => "position_not_found",
            Self::ReduceOnlyRejected => "reduce_only_rejected",
            Self::WouldTriggerImmediately => "would_trigger_immediately",
            Self::OrderNotFound => "order_not_found",
            Self::InvalidSymbol => "invalid_symbol",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ExchangeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by an [`ExchangeClient`](crate::ExchangeClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ExchangeError {
    pub kind: ExchangeErrorKind,
    /// Exchange or HTTP error code, when one was returned.
    pub code: Option<i64>,
    pub message: String,
}

impl ExchangeError {
    pub fn new(kind: ExchangeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Network, message)
    }

    pub fn position_not_found(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::PositionNotFound, message)
    }

    /// Classify a raw exchange error from its code and message.
    ///
    /// Codes follow Binance futures conventions (`-2022`, `-2021`, ...) and
    /// HTTP statuses; messages cover the MEXC and Gate spellings.
    pub fn classify(code: Option<i64>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let has = |needle: &str| lower.contains(needle);

        let kind = match code {
            Some(-2022) => ExchangeErrorKind::ReduceOnlyRejected,
            Some(-2021) => ExchangeErrorKind::WouldTriggerImmediately,
            Some(-2011) | Some(-2013) => ExchangeErrorKind::OrderNotFound,
            Some(-1121) => ExchangeErrorKind::InvalidSymbol,
            Some(-1003) | Some(429) | Some(418) => ExchangeErrorKind::RateLimited,
            Some(-1001) | Some(-1007) | Some(408) => ExchangeErrorKind::Network,
            Some(c) if (500..=599).contains(&c) => ExchangeErrorKind::Server,
            _ if has("reduceonly") || has("reduce only") || has("reduce-only") => {
                ExchangeErrorKind::ReduceOnlyRejected
            }
            _ if has("would immediately trigger") || has("immediately trigger") => {
                ExchangeErrorKind::WouldTriggerImmediately
            }
            _ if has("position not found")
                || has("no position")
                || has("ghost position")
                || has("position not exist")
                || has("position does not exist")
                || has("position_not_found") =>
            {
                ExchangeErrorKind::PositionNotFound
            }
            _ if has("unknown order") || has("order does not exist") || has("order not found") => {
                ExchangeErrorKind::OrderNotFound
            }
            _ if has("invalid symbol") || has("contract not found") => {
                ExchangeErrorKind::InvalidSymbol
            }
            _ if has("too many requests") || has("rate limit") => ExchangeErrorKind::RateLimited,
            _ if has("timed out")
                || has("timeout")
                || has("connection")
                || has("econnreset")
                || has("network") =>
            {
                ExchangeErrorKind::Network
            }
            _ if has("insufficient") || has("precision") || has("min notional") => {
                ExchangeErrorKind::Rejected
            }
            Some(c) if c < 0 => ExchangeErrorKind::Rejected,
            _ => ExchangeErrorKind::Other,
        };

        Self {
            kind,
            code,
            message,
        }
    }

    /// Position is gone on the exchange; reduce-only work is moot.
    pub fn is_position_gone(&self) -> bool {
        matches!(
            self.kind,
            ExchangeErrorKind::PositionNotFound | ExchangeErrorKind::ReduceOnlyRejected
        )
    }
}

impl Retryable for ExchangeError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
