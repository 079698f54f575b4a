//! Variable lifetimes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a variable's value lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifetime {
    /// No clock expiry. The value lives until it is killed manually
    /// (line-based lifetimes are driven by the caller).
    #[default]
    Scoped,
    /// Persistent: mirrored into the persistent store, never expires.
    Infinite,
    /// Expires once the duration has elapsed since the variable was created.
    Timed(Duration),
}

impl Lifetime {
    /// Interpret a lifetime written in seconds.
    ///
    /// Positive infinity means persistent, negative values (the front end
    /// uses `-1`) or NaN mean no expiry, anything else is a timed lifetime.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            Self::Scoped
        } else if secs.is_infinite() {
            Self::Infinite
        } else {
            Self::Timed(Duration::from_secs_f64(secs))
        }
    }

    /// Whether values with this lifetime are mirrored to the persistent store.
    pub fn is_persistent(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_secs_regimes() {
        assert_eq!(Lifetime::from_secs_f64(-1.0), Lifetime::Scoped);
        assert_eq!(Lifetime::from_secs_f64(f64::NAN), Lifetime::Scoped);
        assert_eq!(Lifetime::from_secs_f64(f64::INFINITY), Lifetime::Infinite);
        assert_eq!(
            Lifetime::from_secs_f64(1.5),
            Lifetime::Timed(Duration::from_millis(1500))
        );
    }

    #[test]
    fn only_infinite_is_persistent() {
        assert!(Lifetime::Infinite.is_persistent());
        assert!(!Lifetime::Scoped.is_persistent());
        assert!(!Lifetime::Timed(Duration::from_secs(1)).is_persistent());
    }

    #[test]
    fn default_is_scoped() {
        assert_eq!(Lifetime::default(), Lifetime::Scoped);
    }
}
