//! Dataset sizing: scale targets, auction counts, and run-duration floors.
//!
//! An explicit non-negative scale always wins over a user count. When the
//! target is derived from users, it is bounded below by the configured
//! maximum so one load serves every run up to that size.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lower bound on prepared auctions when loading or preparing a run.
pub const DEFAULT_MIN_AUCTIONS: u32 = 4;

/// The authoritative size of the dataset for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleTarget {
    /// Explicit discrete scale level.
    Scale(u32),
    /// Derived from a simulated-user count.
    Users(u32),
}

impl ScaleTarget {
    /// Resolve a target from a possibly-negative scale and a user count.
    ///
    /// `scale >= 0` takes precedence; `users` is ignored in that case.
    pub fn resolve(scale: i64, users: u32, configured_max_users: u32) -> Self {
        if scale >= 0 {
            Self::Scale(u32::try_from(scale).unwrap_or(u32::MAX))
        } else {
            Self::Users(effective_max_users(users, configured_max_users))
        }
    }

    /// The value that keys backups: the scale, or the effective max users.
    pub fn scale_key(&self) -> u32 {
        match self {
            Self::Scale(s) => *s,
            Self::Users(u) => *u,
        }
    }

    /// Loader/verifier flag selecting this target (`-s` or `-u`).
    pub fn tool_args(&self) -> [String; 2] {
        match self {
            Self::Scale(s) => ["-s".to_string(), s.to_string()],
            Self::Users(u) => ["-u".to_string(), u.to_string()],
        }
    }
}

impl fmt::Display for ScaleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scale(s) => write!(f, "scale {s}"),
            Self::Users(u) => write!(f, "{u} users"),
        }
    }
}

/// Which path an auction count is computed for.
///
/// Loading and run preparation floor the count at the configured minimum;
/// the readiness check deliberately does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingPath {
    Load,
    Check,
}

/// Parameters for deriving auction counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSizing {
    /// Explicit override; used verbatim when set.
    pub explicit: Option<u32>,
    /// Simulated users served by one active auction.
    pub users_per_auction: u32,
    /// Users represented by one scale level.
    pub users_per_scale_unit: u32,
    pub min_auctions: u32,
}

impl Default for AuctionSizing {
    fn default() -> Self {
        Self {
            explicit: None,
            users_per_auction: 15,
            users_per_scale_unit: 1000,
            min_auctions: DEFAULT_MIN_AUCTIONS,
        }
    }
}

impl AuctionSizing {
    /// Auction count for a run of `users` on `path`.
    ///
    /// With a scale target the run's user count is ignored and the scale
    /// level is converted to users instead.
    pub fn auctions(&self, target: ScaleTarget, users: u32, path: SizingPath) -> u32 {
        let users = match target {
            ScaleTarget::Scale(s) => s.saturating_mul(self.users_per_scale_unit),
            ScaleTarget::Users(_) => users,
        };
        let floor = match path {
            SizingPath::Load => Some(self.min_auctions),
            SizingPath::Check => None,
        };
        auctions_for(users, self.explicit, self.users_per_auction, floor)
    }
}

/// Number of auctions needed for `users`.
///
/// `ceil(users / users_per_auction)`, floored at `min_auctions` when given.
pub fn auctions_for(
    users: u32,
    explicit: Option<u32>,
    users_per_auction: u32,
    min_auctions: Option<u32>,
) -> u32 {
    if let Some(n) = explicit {
        return n;
    }
    let auctions = users.div_ceil(users_per_auction.max(1));
    match min_auctions {
        Some(floor) => auctions.max(floor),
        None => auctions,
    }
}

/// The larger of the requested users and the configured maximum.
pub fn effective_max_users(users: u32, configured_max: u32) -> u32 {
    users.max(configured_max)
}

/// Minimum run duration (seconds) the prepared data must cover.
pub fn duration_floor(max_duration: u64, ramp_up: u64, steady_state: u64, ramp_down: u64) -> u64 {
    max_duration.max(ramp_up + steady_state + ramp_down)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_auctions_win() {
        assert_eq!(auctions_for(6000, Some(7), 15, Some(4)), 7);
        assert_eq!(auctions_for(6000, Some(1), 15, None), 1);
    }

    #[test]
    fn sixty_users_gives_four_auctions() {
        assert_eq!(auctions_for(60, None, 15, Some(4)), 4);
        assert_eq!(auctions_for(60, None, 15, None), 4);
    }

    #[test]
    fn load_path_floors_but_check_path_does_not() {
        let sizing = AuctionSizing::default();
        let target = ScaleTarget::Users(16);
        assert_eq!(sizing.auctions(target, 16, SizingPath::Load), 4);
        assert_eq!(sizing.auctions(target, 16, SizingPath::Check), 2);
    }

    #[test]
    fn auctions_round_up() {
        assert_eq!(auctions_for(151, None, 15, None), 11);
        assert_eq!(auctions_for(0, None, 15, None), 0);
    }

    #[test]
    fn zero_factor_does_not_divide_by_zero() {
        assert_eq!(auctions_for(10, None, 0, None), 10);
    }

    #[test]
    fn scale_path_ignores_users() {
        let sizing = AuctionSizing::default();
        let target = ScaleTarget::Scale(2);
        let a = sizing.auctions(target, 10, SizingPath::Load);
        let b = sizing.auctions(target, 50_000, SizingPath::Load);
        assert_eq!(a, b);
        assert_eq!(a, 2000_u32.div_ceil(15));
    }

    #[test]
    fn users_path_uses_users() {
        let sizing = AuctionSizing::default();
        let target = ScaleTarget::Users(3000);
        assert_eq!(sizing.auctions(target, 3000, SizingPath::Check), 200);
        assert_eq!(sizing.auctions(target, 300, SizingPath::Check), 20);
    }

    #[test]
    fn non_negative_scale_takes_precedence() {
        assert_eq!(ScaleTarget::resolve(0, 500, 0), ScaleTarget::Scale(0));
        assert_eq!(ScaleTarget::resolve(3, 500, 1000), ScaleTarget::Scale(3));
    }

    #[test]
    fn negative_scale_uses_effective_max_users() {
        assert_eq!(ScaleTarget::resolve(-1, 125, 0), ScaleTarget::Users(125));
        assert_eq!(ScaleTarget::resolve(-1, 125, 1000), ScaleTarget::Users(1000));
        assert_eq!(ScaleTarget::resolve(-5, 2000, 1000), ScaleTarget::Users(2000));
    }

    #[test]
    fn tool_args_select_flag() {
        assert_eq!(ScaleTarget::Scale(2).tool_args(), ["-s".to_string(), "2".to_string()]);
        assert_eq!(ScaleTarget::Users(125).tool_args(), ["-u".to_string(), "125".to_string()]);
    }

    #[test]
    fn duration_floor_takes_larger() {
        assert_eq!(duration_floor(100, 60, 300, 30), 390);
        assert_eq!(duration_floor(1000, 60, 300, 30), 1000);
    }
}
