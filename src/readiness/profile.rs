use crate::config::EnvironmentSettings;
use serde::Serialize;
use std::time::Duration;

/// Minimum safety timeout granted to any cold-start platform, even in fast-feedback environments.
const COLD_START_SAFETY_FLOOR: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EnvironmentKind {
    Development,
    Testing,
    Staging,
    Production,
}

impl EnvironmentKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => EnvironmentKind::Production,
            "stage" | "staging" => EnvironmentKind::Staging,
            "test" | "testing" | "ci" => EnvironmentKind::Testing,
            _ => EnvironmentKind::Development,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentKind::Development => "development",
            EnvironmentKind::Testing => "testing",
            EnvironmentKind::Staging => "staging",
            EnvironmentKind::Production => "production",
        }
    }
}

/// Timeout tuning for one deployment context. Pure value; share it freely across tasks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnvironmentProfile {
    pub kind: EnvironmentKind,
    pub is_managed_cloud: bool,
    pub is_cold_start_platform: bool,
    pub timeout_multiplier: f64,
    pub safety_margin: f64,
    pub max_total_timeout: Duration,
    pub min_platform_safety_timeout: Duration,
}

struct ProfileRow {
    multiplier: f64,
    margin: f64,
    max_total: Duration,
    min_safety: Duration,
}

fn lookup(kind: EnvironmentKind) -> ProfileRow {
    match kind {
        EnvironmentKind::Development | EnvironmentKind::Testing => ProfileRow {
            multiplier: 0.3,
            margin: 1.0,
            max_total: Duration::from_secs(3),
            min_safety: Duration::ZERO,
        },
        EnvironmentKind::Staging => ProfileRow {
            multiplier: 0.7,
            margin: 1.2,
            max_total: Duration::from_secs(8),
            min_safety: Duration::from_secs(1),
        },
        EnvironmentKind::Production => ProfileRow {
            multiplier: 1.0,
            margin: 1.5,
            max_total: Duration::from_secs(15),
            min_safety: Duration::from_secs(1),
        },
    }
}

impl EnvironmentProfile {
    pub fn resolve(settings: &EnvironmentSettings) -> Self {
        Self::for_kind(
            EnvironmentKind::from_name(&settings.name),
            settings.managed_cloud,
            settings.cold_start,
        )
    }

    pub fn for_kind(kind: EnvironmentKind, managed_cloud: bool, cold_start: bool) -> Self {
        let row = lookup(kind);
        let min_safety = if cold_start {
            row.min_safety.max(COLD_START_SAFETY_FLOOR)
        } else {
            row.min_safety
        };

        Self {
            kind,
            is_managed_cloud: managed_cloud,
            is_cold_start_platform: cold_start,
            timeout_multiplier: row.multiplier,
            safety_margin: row.margin,
            max_total_timeout: row.max_total,
            min_platform_safety_timeout: min_safety,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn is_production(&self) -> bool {
        self.kind == EnvironmentKind::Production
    }

    /// Scales a base timeout for this environment, capped by the ceiling and, on cold-start
    /// platforms, floored by the minimum safety timeout.
    pub fn optimized_timeout(&self, base: Duration) -> Duration {
        let scaled = base.as_secs_f64() * self.timeout_multiplier * self.safety_margin;
        let scaled = if scaled.is_finite() && scaled > 0.0 {
            Duration::from_secs_f64(scaled.min(self.max_total_timeout.as_secs_f64()))
        } else {
            Duration::ZERO
        };
        let capped = scaled.min(self.max_total_timeout);

        if self.is_cold_start_platform {
            capped.max(self.min_platform_safety_timeout)
        } else {
            capped
        }
    }

    pub fn optimized_timeout_secs(&self, base_secs: f64) -> f64 {
        let base = if base_secs.is_finite() && base_secs > 0.0 {
            Duration::from_secs_f64(base_secs)
        } else {
            Duration::ZERO
        };
        self.optimized_timeout(base).as_secs_f64()
    }
}
