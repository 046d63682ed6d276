//! Cooldown model — closed-form placement cooldowns from the online count.
//!
//! `base(online) = (steepness * sqrt(online + user_offset) + global_offset) * multiplier`.
//! Each extra stacked pixel costs
//! `base * stack_multiplier * (1 + stack + triangular(stack - 1))`.
//! The constants differ between canvas deployments, so they are a named,
//! configurable [`CooldownParams`]; the server's board info overrides them
//! when it publishes its own.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ErrorKind};

/// Entries in a schedule: the free pixel plus five stacked ones.
pub const STACK_SIZE: u32 = 6;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CooldownError {
    #[error("online count must not be negative, got {0}")]
    NegativeOnline(i64),
    #[error("multiplier must be a positive number, got {0}")]
    InvalidMultiplier(f64),
}

impl ErrorCode for CooldownError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NegativeOnline(_) => "E_COOLDOWN_NEGATIVE_ONLINE",
            Self::InvalidMultiplier(_) => "E_COOLDOWN_MULTIPLIER",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooldownParams {
    pub steepness: f64,
    pub global_offset: f64,
    pub user_offset: f64,
    pub multiplier: f64,
    pub stack_multiplier: f64,
}

impl Default for CooldownParams {
    fn default() -> Self {
        Self { steepness: 2.5, global_offset: 6.5, user_offset: 11.96, multiplier: 1.0, stack_multiplier: 3.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CooldownEntry {
    pub stack_index: u32,
    pub incremental_seconds: f64,
    pub cumulative_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownSchedule {
    pub online: i64,
    pub entries: Vec<CooldownEntry>,
}

/// How the canvas computes cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CooldownPolicy {
    Activity(CooldownParams),
    Static { seconds: f64, stack_multiplier: f64 },
}

// `cooldownInfo` as published in the canvas board info.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawCooldownInfo {
    Activity {
        #[serde(rename = "activityCooldown")]
        activity: RawActivityCooldown,
    },
    Static {
        #[serde(rename = "staticCooldownSeconds")]
        seconds: f64,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivityCooldown {
    steepness: f64,
    multiplier: f64,
    global_offset: f64,
    user_offset: f64,
}

// =============================================================================
// FORMULA
// =============================================================================

/// `0 + 1 + … + n`.
#[must_use]
pub fn triangular(n: u32) -> u64 {
    u64::from(n) * (u64::from(n) + 1) / 2
}

impl CooldownParams {
    /// Cooldown of the first pixel.
    ///
    /// # Errors
    ///
    /// [`CooldownError::NegativeOnline`] for `online < 0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn base(&self, online: i64) -> Result<f64, CooldownError> {
        if online < 0 {
            return Err(CooldownError::NegativeOnline(online));
        }
        Ok((self.steepness * (online as f64 + self.user_offset).sqrt() + self.global_offset) * self.multiplier)
    }

    #[must_use]
    pub fn with_multiplier(self, multiplier: f64) -> Self {
        Self { multiplier, ..self }
    }

    /// # Errors
    ///
    /// [`CooldownError::NegativeOnline`] for `online < 0`.
    pub fn schedule(&self, online: i64) -> Result<CooldownSchedule, CooldownError> {
        Ok(schedule_from_base(online, self.base(online)?, self.stack_multiplier))
    }
}

/// Cooldown of stacked pixel `stack` given the base cooldown.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn incremental(base: f64, stack: u32, stack_multiplier: f64) -> f64 {
    if stack == 0 {
        return base;
    }
    base * stack_multiplier * (1 + u64::from(stack) + triangular(stack - 1)) as f64
}

fn schedule_from_base(online: i64, base: f64, stack_multiplier: f64) -> CooldownSchedule {
    let mut cumulative = 0.0;
    let entries = (0..STACK_SIZE)
        .map(|stack_index| {
            let incremental_seconds = incremental(base, stack_index, stack_multiplier);
            cumulative += incremental_seconds;
            CooldownEntry { stack_index, incremental_seconds, cumulative_seconds: cumulative }
        })
        .collect();
    CooldownSchedule { online, entries }
}

// =============================================================================
// POLICY
// =============================================================================

impl CooldownPolicy {
    /// Read `cooldownInfo` from board info; anything unrecognised falls back
    /// to the activity formula with `fallback`.
    #[must_use]
    pub fn from_info(info: Option<&serde_json::Value>, fallback: CooldownParams) -> Self {
        match info.and_then(|v| RawCooldownInfo::deserialize(v).ok()) {
            Some(RawCooldownInfo::Activity { activity }) => Self::Activity(CooldownParams {
                steepness: activity.steepness,
                global_offset: activity.global_offset,
                user_offset: activity.user_offset,
                multiplier: activity.multiplier,
                stack_multiplier: fallback.stack_multiplier,
            }),
            Some(RawCooldownInfo::Static { seconds }) => Self::Static { seconds, stack_multiplier: fallback.stack_multiplier },
            None => Self::Activity(fallback),
        }
    }

    /// Schedule for `online` users, optionally overriding the multiplier.
    /// A static policy ignores the online count and multiplier.
    ///
    /// # Errors
    ///
    /// Negative online count or a non-positive multiplier.
    pub fn schedule(&self, online: i64, multiplier: Option<f64>) -> Result<CooldownSchedule, CooldownError> {
        if online < 0 {
            return Err(CooldownError::NegativeOnline(online));
        }
        if let Some(m) = multiplier.filter(|m| !m.is_finite() || *m <= 0.0) {
            return Err(CooldownError::InvalidMultiplier(m));
        }
        match *self {
            Self::Activity(params) => multiplier.map_or(params, |m| params.with_multiplier(m)).schedule(online),
            Self::Static { seconds, stack_multiplier } => Ok(schedule_from_base(online, seconds, stack_multiplier)),
        }
    }
}

// =============================================================================
// FORMAT
// =============================================================================

/// `mm:ss.ss`, or `hh:mm:ss.ss` from one hour up.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let total_minutes = (seconds / 60.0).floor();
    let secs = seconds - total_minutes * 60.0;
    let hours = (total_minutes / 60.0).floor();
    let minutes = total_minutes - hours * 60.0;

    if hours < 1.0 {
        format!("{minutes:02.0}:{secs:05.2}")
    } else {
        format!("{hours:02.0}:{minutes:02.0}:{secs:05.2}")
    }
}

#[cfg(test)]
#[path = "cooldown_test.rs"]
mod tests;
