//! ReputationEngine - entry point for all point-earning events.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use tutorug_core::{Clock, RetryPolicy, UserId, UserLocks};

use crate::activity::{ActivityCounts, ActivityLog, QuizAttempt};
use crate::badges::{unlock_achievements, unlock_badges};
use crate::config::PointsConfig;
use crate::error::{ReputationError, Result};
use crate::store::ReputationStore;
use crate::types::{
    AwardResult, LeaderboardEntry, QuizAward, Rank, ReputationRecord, StreakResult, Timeframe,
    WeeklyProgress,
};
use crate::window::week_start;

/// Converts learning events into reputation state.
///
/// Holds its configuration and collaborators explicitly; nothing is looked
/// up globally.
pub struct ReputationEngine {
    config: Arc<PointsConfig>,
    store: Arc<dyn ReputationStore>,
    activity: Option<Arc<dyn ActivityLog>>,
    clock: Arc<dyn Clock>,
    locks: Arc<UserLocks>,
    retry: RetryPolicy,
}

impl ReputationEngine {
    /// Create an engine. The config is validated once here.
    pub fn new(
        config: PointsConfig,
        store: Arc<dyn ReputationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            store,
            activity: None,
            clock,
            locks: Arc::new(UserLocks::new()),
            retry: RetryPolicy::default(),
        })
    }

    /// Attach the quiz-attempt collaborator used for achievements.
    pub fn with_activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PointsConfig {
        &self.config
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Award `amount` points to `user`.
    ///
    /// Achievement counts are fetched from the activity log when one is
    /// attached; a failing log only skips the achievement check.
    pub async fn award_points(
        &self,
        user: &UserId,
        amount: i64,
        reason: &str,
    ) -> Result<AwardResult> {
        let amount = positive(amount)?;
        let counts = self.fetch_counts(user).await;
        self.apply(user, amount, reason, counts).await
    }

    /// Award points with caller-supplied activity counts.
    pub async fn award_points_with_counts(
        &self,
        user: &UserId,
        amount: i64,
        reason: &str,
        counts: ActivityCounts,
    ) -> Result<AwardResult> {
        let amount = positive(amount)?;
        self.apply(user, amount, reason, Some(counts)).await
    }

    /// Count today towards the user's daily streak.
    ///
    /// Call once per session-opening event (first quiz or chat message of
    /// the day), not per award.
    pub async fn update_streak(&self, user: &UserId) -> Result<StreakResult> {
        let today = self.clock.now().date_naive();

        let (result, record) = self
            .mutate(user, |record, _now| {
                if record.last_streak_on == Some(today) {
                    return Ok(StreakResult {
                        streak_continued: false,
                        streak_reset: false,
                        current_streak: record.streak_days,
                        longest_streak: record.longest_streak,
                    });
                }

                let consecutive = record
                    .last_streak_on
                    .and_then(|d| d.succ_opt())
                    .is_some_and(|next| next == today);

                let reset = !consecutive;
                record.streak_days = if consecutive {
                    record.streak_days + 1
                } else {
                    1
                };
                record.longest_streak = record.longest_streak.max(record.streak_days);
                record.last_streak_on = Some(today);

                Ok(StreakResult {
                    streak_continued: true,
                    streak_reset: reset,
                    current_streak: record.streak_days,
                    longest_streak: record.longest_streak,
                })
            })
            .await?;

        if result.streak_continued {
            debug!(
                user_id = %record.user_id,
                streak = result.current_streak,
                longest = result.longest_streak,
                reset = result.streak_reset,
                "Streak updated"
            );
        }
        Ok(result)
    }

    /// Record a completed quiz: streak first, then quiz points.
    ///
    /// The attempt is logged only after the award commits, so a failed
    /// award can be retried without counting the quiz twice.
    pub async fn record_quiz_completion(
        &self,
        user: &UserId,
        quiz_title: &str,
        score: u8,
        passing_score: u8,
    ) -> Result<QuizAward> {
        if score > 100 || passing_score > 100 {
            return Err(ReputationError::InvalidInput(
                "scores are percentages between 0 and 100".into(),
            ));
        }

        let streak = self.update_streak(user).await?;

        let counts = self.fetch_counts(user).await.map(|mut counts| {
            counts.completed_quizzes += 1;
            counts.quizzes_this_week += 1;
            if score == 100 {
                counts.perfect_scores += 1;
            }
            counts
        });
        let points = positive(self.config.points.quiz_points(score, passing_score) as i64)?;
        let award = self
            .apply(
                user,
                points,
                &format!("Completed quiz: {quiz_title}"),
                counts,
            )
            .await?;

        if let Some(activity) = &self.activity {
            let attempt = QuizAttempt {
                user_id: user.clone(),
                quiz_title: quiz_title.to_string(),
                score,
                passing_score,
                completed_at: self.clock.now(),
            };
            // Points are committed; an error here must not prompt a retry
            if let Err(e) = activity.record_quiz(attempt).await {
                warn!(user_id = %user, quiz_title, error = %e, "Quiz attempt not logged");
            }
        }

        Ok(QuizAward { streak, award })
    }

    /// `1 + number of users with strictly more points`; equal totals share a
    /// position.
    pub async fn leaderboard_position(&self, user: &UserId) -> Result<u64> {
        let total = self
            .store
            .load(user)
            .await?
            .map(|v| v.value.total_points)
            .unwrap_or(0);
        Ok(self.store.count_above(total).await? + 1)
    }

    /// Top `limit` users, optionally restricted to recent activity.
    ///
    /// Entries carry their list position; ties are broken by earliest
    /// activity, then user id.
    pub async fn leaderboard(
        &self,
        limit: usize,
        timeframe: Timeframe,
    ) -> Result<Vec<LeaderboardEntry>> {
        let now = self.clock.now();
        let since = match timeframe {
            Timeframe::All => None,
            Timeframe::Weekly => Some(now - Duration::days(7)),
            Timeframe::Monthly => Some(now - Duration::days(30)),
        };

        let records = self.store.top(limit, since).await?;
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, r)| LeaderboardEntry {
                position: i as u64 + 1,
                user_id: r.user_id,
                total_points: r.total_points,
                level: r.current_level,
                rank: r.rank,
                last_activity_at: r.last_activity_at,
            })
            .collect())
    }

    pub async fn rank_distribution(&self) -> Result<BTreeMap<Rank, u64>> {
        Ok(self.store.rank_counts().await?)
    }

    /// Current record, or an empty one for users who never earned points.
    ///
    /// Weekly and monthly counters are reported as of now without writing.
    pub async fn summary(&self, user: &UserId) -> Result<ReputationRecord> {
        let now = self.clock.now();
        Ok(match self.store.load(user).await? {
            Some(v) => {
                let mut record = v.value;
                record.weekly_points = record.weekly_points_at(now);
                record.monthly_points = record.monthly_points_at(now);
                record
            }
            None => ReputationRecord::new(user.clone(), now),
        })
    }

    pub async fn weekly_progress(&self, user: &UserId) -> Result<WeeklyProgress> {
        let now = self.clock.now();
        let start = week_start(now);
        let points = self
            .store
            .load(user)
            .await?
            .map(|v| v.value.weekly_points_at(now))
            .unwrap_or(0);

        let quizzes = match &self.activity {
            Some(activity) => activity.counts(user, start).await?.quizzes_this_week,
            None => 0,
        };

        Ok(WeeklyProgress {
            week_start: start,
            points_this_week: points,
            quizzes_this_week: quizzes,
            target_points: self.config.weekly_targets.points,
            target_quizzes: self.config.weekly_targets.quizzes,
        })
    }

    async fn fetch_counts(&self, user: &UserId) -> Option<ActivityCounts> {
        let activity = self.activity.as_ref()?;
        match activity.counts(user, week_start(self.clock.now())).await {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!(user_id = %user, error = %e, "Activity counts unavailable, skipping achievements");
                None
            }
        }
    }

    async fn apply(
        &self,
        user: &UserId,
        amount: u64,
        reason: &str,
        counts: Option<ActivityCounts>,
    ) -> Result<AwardResult> {
        let config = Arc::clone(&self.config);
        let (result, record) = self
            .mutate(user, |record, now| {
                Ok(apply_award(record, amount, now, &config, counts.as_ref()))
            })
            .await?;

        info!(
            user_id = %record.user_id,
            points = amount,
            bonus = result.bonus_points,
            total = result.new_total,
            reason,
            "Points awarded"
        );
        for badge in &result.new_badges {
            info!(user_id = %record.user_id, badge = %badge, "Badge earned");
        }
        for achievement in &result.new_achievements {
            info!(user_id = %record.user_id, achievement = %achievement, "Achievement unlocked");
        }

        Ok(result)
    }

    /// Serialized read-modify-write of one user's record.
    ///
    /// `f` may run more than once if the store reports a version conflict, so
    /// it must only touch the record it is given.
    async fn mutate<R, F>(&self, user: &UserId, mut f: F) -> Result<(R, ReputationRecord)>
    where
        F: FnMut(&mut ReputationRecord, DateTime<Utc>) -> Result<R>,
    {
        let _guard = self.locks.lock(user).await;

        for attempt in 1..=self.retry.max_attempts {
            let now = self.clock.now();
            let (mut record, expected) = match self.store.load(user).await? {
                Some(v) => (v.value, Some(v.version)),
                None => (ReputationRecord::new(user.clone(), now), None),
            };

            let out = f(&mut record, now)?;

            match self.store.save(&record, expected).await {
                Ok(_) => return Ok((out, record)),
                Err(e) if e.is_conflict() => {
                    debug!(user_id = %user, attempt, "Reputation version conflict, retrying");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReputationError::ConcurrencyConflict {
            user_id: user.to_string(),
            attempts: self.retry.max_attempts,
        })
    }
}

fn positive(amount: i64) -> Result<u64> {
    if amount <= 0 {
        return Err(ReputationError::InvalidAmount(amount));
    }
    Ok(amount as u64)
}

/// Apply one award (plus any badge bonuses it triggers) to `record`.
///
/// Badge bonuses go through a pending queue rather than recursion: every
/// unlocked badge is inserted into the set before its bonus is queued, so
/// a bonus can only unlock *other* badges, and at most
/// `config.max_bonus_awards` bonuses are applied per event.
pub(crate) fn apply_award(
    record: &mut ReputationRecord,
    amount: u64,
    now: DateTime<Utc>,
    config: &PointsConfig,
    counts: Option<&ActivityCounts>,
) -> AwardResult {
    record.roll_windows(now);

    let old_level = record.current_level;
    let old_rank = record.rank;

    add_points(record, amount, config);
    record.last_activity_at = Some(now);

    let mut new_badges = Vec::new();
    let mut bonus_points = 0;
    let mut applied = 0;
    let mut pending: VecDeque<(String, u64)> = VecDeque::new();

    loop {
        for rule in unlock_badges(record, &config.badges) {
            new_badges.push(rule.id.clone());
            if rule.bonus > 0 {
                pending.push_back((rule.id.clone(), rule.bonus));
            }
        }

        let Some((badge, bonus)) = pending.pop_front() else {
            break;
        };
        if applied >= config.max_bonus_awards {
            warn!(
                user_id = %record.user_id,
                badge = %badge,
                dropped = pending.len() + 1,
                "Bonus award limit reached, dropping remaining bonuses"
            );
            break;
        }

        add_points(record, bonus, config);
        bonus_points += bonus;
        applied += 1;
        debug!(user_id = %record.user_id, badge = %badge, bonus, "Badge bonus applied");
    }

    let new_achievements = match counts {
        Some(counts) => unlock_achievements(record, &config.achievements, counts),
        None => Vec::new(),
    };

    AwardResult {
        points_added: amount,
        bonus_points,
        new_total: record.total_points,
        level_changed: old_level != record.current_level,
        rank_changed: old_rank != record.rank,
        new_level: record.current_level,
        new_rank: record.rank,
        new_badges,
        new_achievements,
    }
}

fn add_points(record: &mut ReputationRecord, amount: u64, config: &PointsConfig) {
    record.total_points = record.total_points.saturating_add(amount);
    record.weekly_points = record.weekly_points.saturating_add(amount);
    record.monthly_points = record.monthly_points.saturating_add(amount);
    record.current_level = config.level(record.total_points);
    record.rank = config.rank(record.total_points);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BadgeCriterion, BadgeRule};
    use crate::store::InMemoryReputationStore;
    use chrono::TimeZone;
    use tutorug_core::{ManualClock, StoreError, Versioned};

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 5, 9, 0, 0).unwrap()
    }

    fn engine_with(config: PointsConfig) -> (ReputationEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = ReputationEngine::new(
            config,
            Arc::new(InMemoryReputationStore::new()),
            clock.clone(),
        )
        .unwrap();
        (engine, clock)
    }

    #[tokio::test]
    async fn test_award_rejects_non_positive() {
        let (engine, _) = engine_with(PointsConfig::default());
        let u = user("u1");

        assert!(matches!(
            engine.award_points(&u, 0, "nothing").await,
            Err(ReputationError::InvalidAmount(0))
        ));
        assert!(matches!(
            engine.award_points(&u, -5, "negative").await,
            Err(ReputationError::InvalidAmount(-5))
        ));
        assert_eq!(engine.summary(&u).await.unwrap().total_points, 0);
    }

    #[tokio::test]
    async fn test_award_creates_record_and_levels_up() {
        let (engine, _) = engine_with(PointsConfig::default().without_badge_bonuses());
        let u = user("u1");

        let first = engine.award_points(&u, 60, "quiz").await.unwrap();
        assert_eq!(first.new_total, 60);
        assert_eq!(first.new_level, 1);
        assert!(!first.level_changed);

        let second = engine.award_points(&u, 60, "quiz").await.unwrap();
        assert_eq!(second.new_total, 120);
        assert_eq!(second.new_level, 2);
        assert!(second.level_changed);
        assert_eq!(second.new_rank, Rank::Learner);
    }

    #[tokio::test]
    async fn test_badge_bonus_cascades_once() {
        let (engine, _) = engine_with(PointsConfig::default());
        let u = user("u1");

        engine.award_points(&u, 990, "seed").await.unwrap();
        let result = engine.award_points(&u, 10, "quiz").await.unwrap();

        // 1000 reaches point_hoarder_1000 and level 5, each worth 25
        assert_eq!(result.points_added, 10);
        assert_eq!(result.bonus_points, 50);
        assert_eq!(result.new_total, 1050);
        let mut badges = result.new_badges.clone();
        badges.sort();
        assert_eq!(badges, vec!["level_5_climber", "point_hoarder_1000"]);

        let again = engine.award_points(&u, 10, "quiz").await.unwrap();
        assert!(again.new_badges.is_empty());
        assert_eq!(again.bonus_points, 0);
        assert_eq!(again.new_total, 1060);
    }

    #[test]
    fn test_bonus_chain_is_bounded() {
        // Each badge's bonus reaches the next badge's threshold.
        let mut config = PointsConfig::default();
        config.badges = (1..=10)
            .map(|i| {
                let mut rule = BadgeRule::new(
                    format!("chain_{i}"),
                    BadgeCriterion::TotalPointsAtLeast { points: i * 10 },
                );
                rule.bonus = 10;
                rule
            })
            .collect();
        config.max_bonus_awards = 3;

        let mut record = ReputationRecord::new(user("u"), start());
        let result = apply_award(&mut record, 10, start(), &config, None);

        assert_eq!(result.bonus_points, 30);
        assert_eq!(record.total_points, 40);
        // Badges whose bonus was dropped stay recorded, but never fire twice
        assert_eq!(result.new_badges.len(), 4);
        assert_eq!(record.badges_earned.len(), 4);
    }

    #[tokio::test]
    async fn test_streak_same_day_is_noop() {
        let (engine, clock) = engine_with(PointsConfig::default());
        let u = user("u1");

        let first = engine.update_streak(&u).await.unwrap();
        assert!(first.streak_continued);
        assert_eq!(first.current_streak, 1);

        clock.advance(Duration::hours(3));
        let second = engine.update_streak(&u).await.unwrap();
        assert!(!second.streak_continued);
        assert_eq!(second.current_streak, 1);
    }

    #[tokio::test]
    async fn test_streak_increments_and_resets() {
        let (engine, clock) = engine_with(PointsConfig::default());
        let u = user("u1");

        for expected in 1..=4 {
            let r = engine.update_streak(&u).await.unwrap();
            assert_eq!(r.current_streak, expected);
            clock.advance(Duration::days(1));
        }

        // Skip a day
        clock.advance(Duration::days(1));
        let r = engine.update_streak(&u).await.unwrap();
        assert!(r.streak_reset);
        assert_eq!(r.current_streak, 1);
        assert_eq!(r.longest_streak, 4);
        assert!(r.longest_streak >= r.current_streak);
    }

    #[tokio::test]
    async fn test_streak_uses_utc_calendar_days() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 5, 23, 50, 0).unwrap(),
        ));
        let engine = ReputationEngine::new(
            PointsConfig::default(),
            Arc::new(InMemoryReputationStore::new()),
            clock.clone(),
        )
        .unwrap();
        let u = user("night-owl");

        engine.update_streak(&u).await.unwrap();
        clock.advance(Duration::minutes(20));
        let r = engine.update_streak(&u).await.unwrap();
        assert_eq!(r.current_streak, 2);
    }

    #[tokio::test]
    async fn test_weekly_points_roll_over_lazily() {
        let (engine, clock) = engine_with(PointsConfig::default().without_badge_bonuses());
        let u = user("u1");

        engine.award_points(&u, 40, "quiz").await.unwrap();
        clock.advance(Duration::days(7));

        assert_eq!(engine.weekly_progress(&u).await.unwrap().points_this_week, 0);

        engine.award_points(&u, 5, "chat").await.unwrap();
        let summary = engine.summary(&u).await.unwrap();
        assert_eq!(summary.weekly_points, 5);
        assert_eq!(summary.total_points, 45);
    }

    #[tokio::test]
    async fn test_leaderboard_position_shares_ties() {
        let (engine, _) = engine_with(PointsConfig::default().without_badge_bonuses());
        let (a, b, c) = (user("a"), user("b"), user("c"));

        engine.award_points(&a, 300, "x").await.unwrap();
        engine.award_points(&b, 300, "x").await.unwrap();
        engine.award_points(&c, 500, "x").await.unwrap();

        assert_eq!(engine.leaderboard_position(&c).await.unwrap(), 1);
        assert_eq!(engine.leaderboard_position(&a).await.unwrap(), 2);
        assert_eq!(engine.leaderboard_position(&b).await.unwrap(), 2);
        assert_eq!(engine.leaderboard_position(&user("nobody")).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_leaderboard_timeframes() {
        let (engine, clock) = engine_with(PointsConfig::default().without_badge_bonuses());

        engine.award_points(&user("old"), 900, "x").await.unwrap();
        clock.advance(Duration::days(10));
        engine.award_points(&user("recent"), 100, "x").await.unwrap();

        let all = engine.leaderboard(10, Timeframe::All).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id.as_str(), "old");
        assert_eq!(all[0].position, 1);

        let weekly = engine.leaderboard(10, Timeframe::Weekly).await.unwrap();
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].user_id.as_str(), "recent");

        let monthly = engine.leaderboard(10, Timeframe::Monthly).await.unwrap();
        assert_eq!(monthly.len(), 2);
    }

    #[tokio::test]
    async fn test_rank_distribution() {
        let (engine, _) = engine_with(PointsConfig::default().without_badge_bonuses());
        engine.award_points(&user("a"), 10, "x").await.unwrap();
        engine.award_points(&user("b"), 600, "x").await.unwrap();

        let dist = engine.rank_distribution().await.unwrap();
        assert_eq!(dist[&Rank::Learner], 1);
        assert_eq!(dist[&Rank::Helper], 1);
        assert_eq!(dist[&Rank::Master], 0);
    }

    /// Store that reports a conflict on every write.
    struct AlwaysConflicting;

    #[async_trait::async_trait]
    impl ReputationStore for AlwaysConflicting {
        async fn load(
            &self,
            _user: &UserId,
        ) -> std::result::Result<Option<Versioned<ReputationRecord>>, StoreError> {
            Ok(None)
        }

        async fn save(
            &self,
            record: &ReputationRecord,
            _expected: Option<u64>,
        ) -> std::result::Result<u64, StoreError> {
            Err(StoreError::Conflict {
                key: record.user_id.to_string(),
            })
        }

        async fn count_above(&self, _total: u64) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }

        async fn top(
            &self,
            _limit: usize,
            _since: Option<DateTime<Utc>>,
        ) -> std::result::Result<Vec<ReputationRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn rank_counts(&self) -> std::result::Result<BTreeMap<Rank, u64>, StoreError> {
            Ok(BTreeMap::new())
        }
    }

    #[tokio::test]
    async fn test_conflicts_surface_after_bounded_retries() {
        let engine = ReputationEngine::new(
            PointsConfig::default(),
            Arc::new(AlwaysConflicting),
            Arc::new(ManualClock::new(start())),
        )
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 2,
            backoff: std::time::Duration::from_millis(1),
        });

        let err = engine.award_points(&user("u"), 5, "x").await.unwrap_err();
        assert!(matches!(
            err,
            ReputationError::ConcurrencyConflict { attempts: 2, .. }
        ));
        assert!(err.is_retryable());
    }
}
