//! Supervision strategies

use crate::error::{ActorError, Result};
use stage_config::{defaults, ScopeConfig, StrategyConfig};
use std::fmt;
use std::time::Duration;

/// Failures tolerated within one period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    /// Never stop, however often the actor fails
    Forever,
    /// Stop once the count within the period exceeds the limit
    Limited(u32),
}

impl Intensity {
    /// Map the configured integer; `-1` means forever
    pub fn from_config(value: i64) -> Result<Self> {
        if value == defaults::supervision::FOREVER_INTENSITY {
            return Ok(Intensity::Forever);
        }
        u32::try_from(value)
            .ok()
            .filter(|limit| *limit > 0)
            .map(Intensity::Limited)
            .ok_or_else(|| {
                ActorError::configuration(
                    format!("intensity must be positive or -1, got {value}"),
                    Some("intensity"),
                )
            })
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intensity::Forever => f.write_str("forever"),
            Intensity::Limited(limit) => write!(f, "{limit}"),
        }
    }
}

/// Which actors a decision applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the failed actor
    One,
    /// The failed actor and every sibling under the same parent
    All,
}

impl From<ScopeConfig> for Scope {
    fn from(scope: ScopeConfig) -> Self {
        match scope {
            ScopeConfig::One => Scope::One,
            ScopeConfig::All => Scope::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionStrategy {
    pub intensity: Intensity,
    pub period: Duration,
    pub scope: Scope,
}

impl SupervisionStrategy {
    pub const DEFAULT_INTENSITY: u32 = 1;
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(defaults::supervision::PERIOD_MS);
    pub const FOREVER_PERIOD: Duration = Duration::MAX;

    pub fn new(intensity: Intensity, period: Duration, scope: Scope) -> Self {
        Self {
            intensity,
            period,
            scope,
        }
    }

    /// Restart on every failure
    pub fn forever() -> Self {
        Self::new(Intensity::Forever, Self::FOREVER_PERIOD, Scope::One)
    }

    /// Stop on the first failure
    pub fn stopping() -> Self {
        Self::new(
            Intensity::Limited(Self::DEFAULT_INTENSITY),
            Self::DEFAULT_PERIOD,
            Scope::One,
        )
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        Ok(Self::new(
            Intensity::from_config(config.intensity)?,
            Duration::from_millis(config.period_ms),
            config.scope.into(),
        ))
    }
}

impl Default for SupervisionStrategy {
    fn default() -> Self {
        Self::stopping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_from_config() {
        assert_eq!(Intensity::from_config(-1).unwrap(), Intensity::Forever);
        assert_eq!(Intensity::from_config(5).unwrap(), Intensity::Limited(5));
        assert!(Intensity::from_config(0).is_err());
        assert!(Intensity::from_config(-7).is_err());
    }

    #[test]
    fn test_default_strategy_stops_on_first_failure() {
        let strategy = SupervisionStrategy::default();
        assert_eq!(strategy.intensity, Intensity::Limited(1));
        assert_eq!(strategy.period, Duration::from_millis(5_000));
        assert_eq!(strategy.scope, Scope::One);

        let config = StrategyConfig {
            intensity: 3,
            period_ms: 250,
            scope: ScopeConfig::All,
        };
        let strategy = SupervisionStrategy::from_config(&config).unwrap();
        assert_eq!(strategy.intensity, Intensity::Limited(3));
        assert_eq!(strategy.period, Duration::from_millis(250));
        assert_eq!(strategy.scope, Scope::All);
    }
}
