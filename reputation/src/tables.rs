//! Pure level and rank lookups.

use crate::config::{PointsConfig, RankThreshold};
use crate::types::Rank;

/// Highest 1-based level whose threshold `total` reaches.
///
/// Totals beyond the last threshold stay at the maximum level.
pub fn level_for(total: u64, thresholds: &[u64]) -> u32 {
    let reached = thresholds.iter().take_while(|&&t| total >= t).count();
    reached.max(1) as u32
}

/// Highest rank whose threshold `total` reaches; exact hits round up.
pub fn rank_for(total: u64, thresholds: &[RankThreshold]) -> Rank {
    thresholds
        .iter()
        .rev()
        .find(|t| total >= t.min_points)
        .map(|t| t.rank)
        .unwrap_or(Rank::Learner)
}

impl PointsConfig {
    pub fn level(&self, total: u64) -> u32 {
        level_for(total, &self.level_thresholds)
    }

    pub fn rank(&self, total: u64) -> Rank {
        rank_for(total, &self.rank_thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        let config = PointsConfig::default();
        assert_eq!(config.level(0), 1);
        assert_eq!(config.level(99), 1);
        assert_eq!(config.level(100), 2);
        assert_eq!(config.level(999), 4);
        assert_eq!(config.level(1000), 5);
        assert_eq!(config.level(7499), 9);
        assert_eq!(config.level(7500), 10);
        assert_eq!(config.level(1_000_000), 10);
    }

    #[test]
    fn test_rank_boundaries_round_up() {
        let config = PointsConfig::default();
        assert_eq!(config.rank(0), Rank::Learner);
        assert_eq!(config.rank(499), Rank::Learner);
        assert_eq!(config.rank(500), Rank::Helper);
        assert_eq!(config.rank(1500), Rank::Tutor);
        assert_eq!(config.rank(2999), Rank::Tutor);
        assert_eq!(config.rank(3000), Rank::Expert);
        assert_eq!(config.rank(6000), Rank::Master);
    }

    #[test]
    fn test_level_is_monotonic() {
        let config = PointsConfig::default();
        let mut last = 1;
        for total in (0..9000).step_by(7) {
            let level = config.level(total);
            assert!(level >= last);
            last = level;
        }
    }
}
