//! Cross-cutting properties of the reputation engine.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use reputation::{
    ActivityCounts, ActivityLog, InMemoryActivityLog, InMemoryReputationStore, PointsConfig, Rank,
    ReputationEngine, ReputationRecord, ReputationStore,
};
use tutorug_core::{Clock, ManualClock, StoreError, UserId, Versioned};

/// Delegates to an in-memory store but fails the Nth save once.
struct FlakyStore {
    inner: InMemoryReputationStore,
    saves: AtomicU32,
    fail_on: u32,
}

impl FlakyStore {
    fn failing_save(fail_on: u32) -> Self {
        Self {
            inner: InMemoryReputationStore::new(),
            saves: AtomicU32::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl ReputationStore for FlakyStore {
    async fn load(&self, user: &UserId) -> Result<Option<Versioned<ReputationRecord>>, StoreError> {
        self.inner.load(user).await
    }

    async fn save(
        &self,
        record: &ReputationRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.save(record, expected).await
    }

    async fn count_above(&self, total: u64) -> Result<u64, StoreError> {
        self.inner.count_above(total).await
    }

    async fn top(
        &self,
        limit: usize,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationRecord>, StoreError> {
        self.inner.top(limit, active_since).await
    }

    async fn rank_counts(&self) -> Result<BTreeMap<Rank, u64>, StoreError> {
        self.inner.rank_counts().await
    }
}

fn engine(config: PointsConfig) -> (Arc<ReputationEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap(),
    ));
    let engine = ReputationEngine::new(
        config,
        Arc::new(InMemoryReputationStore::new()),
        clock.clone(),
    )
    .unwrap();
    (Arc::new(engine), clock)
}

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

#[tokio::test]
async fn test_level_depends_only_on_total() {
    let config = PointsConfig::default().without_badge_bonuses();
    let amounts = [7_i64, 250, 13, 600, 91, 40, 1];
    let total: i64 = amounts.iter().sum();

    let mut orders = vec![amounts.to_vec()];
    let mut reversed = amounts.to_vec();
    reversed.reverse();
    orders.push(reversed);
    let mut sorted = amounts.to_vec();
    sorted.sort();
    orders.push(sorted);

    for (i, order) in orders.into_iter().enumerate() {
        let (engine, _) = engine(config.clone());
        let u = user(&format!("order-{i}"));
        for amount in order {
            engine.award_points(&u, amount, "event").await.unwrap();
        }
        let record = engine.summary(&u).await.unwrap();
        assert_eq!(record.total_points, total as u64);
        assert_eq!(record.current_level, config.level(total as u64));
        assert_eq!(record.rank, config.rank(total as u64));
    }
}

#[tokio::test]
async fn test_concurrent_awards_do_not_lose_updates() {
    let (engine, _) = engine(PointsConfig::default().without_badge_bonuses());
    let u = user("racer");
    engine.award_points(&u, 980, "seed").await.unwrap();

    let tasks = (0..2).map(|_| {
        let engine = Arc::clone(&engine);
        let u = u.clone();
        tokio::spawn(async move { engine.award_points(&u, 50, "quiz").await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let record = engine.summary(&u).await.unwrap();
    assert_eq!(record.total_points, 1080);

    let hoarder_awards = results
        .iter()
        .filter(|r| r.new_badges.iter().any(|b| b == "point_hoarder_1000"))
        .count();
    assert_eq!(hoarder_awards, 1);
    assert!(record.badges_earned.contains("point_hoarder_1000"));
}

#[tokio::test]
async fn test_concurrent_awards_with_default_bonuses() {
    let (engine, _) = engine(PointsConfig::default());
    let u = user("racer");
    engine.award_points(&u, 980, "seed").await.unwrap();

    let tasks = (0..2).map(|_| {
        let engine = Arc::clone(&engine);
        let u = u.clone();
        tokio::spawn(async move { engine.award_points(&u, 50, "quiz").await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    // 980 + 2 * 50, plus 25 each for point_hoarder_1000 and level_5_climber
    let record = engine.summary(&u).await.unwrap();
    assert_eq!(record.total_points, 1130);

    let badge_events: usize = results.iter().map(|r| r.new_badges.len()).sum();
    assert_eq!(badge_events, 2);
    assert_eq!(record.badges_earned.len(), 2);
}

#[tokio::test]
async fn test_many_concurrent_users_and_awards() {
    let (engine, _) = engine(PointsConfig::default().without_badge_bonuses());

    let tasks = (0..40).map(|i| {
        let engine = Arc::clone(&engine);
        let u = user(&format!("user-{}", i % 4));
        tokio::spawn(async move { engine.award_points(&u, 5, "chat").await })
    });
    for r in join_all(tasks).await {
        r.unwrap().unwrap();
    }

    for i in 0..4 {
        let record = engine.summary(&user(&format!("user-{i}"))).await.unwrap();
        assert_eq!(record.total_points, 50);
    }
}

#[tokio::test]
async fn test_badges_never_duplicate_across_awards() {
    let (engine, clock) = engine(PointsConfig::default());
    let u = user("streaker");

    for _ in 0..8 {
        engine.update_streak(&u).await.unwrap();
        engine.award_points(&u, 300, "daily").await.unwrap();
        clock.advance(Duration::days(1));
    }

    let record = engine.summary(&u).await.unwrap();
    assert!(record.badges_earned.contains("week_warrior"));
    assert!(record.badges_earned.contains("point_hoarder_1000"));
    assert!(record.longest_streak >= record.streak_days);
    assert_eq!(record.streak_days, 8);
}

#[tokio::test]
async fn test_quiz_completion_unlocks_achievements() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap(),
    ));
    let engine = ReputationEngine::new(
        PointsConfig::default(),
        Arc::new(InMemoryReputationStore::new()),
        clock.clone(),
    )
    .unwrap()
    .with_activity_log(Arc::new(InMemoryActivityLog::new()));
    let u = user("quizzer");

    let mut unlocked = Vec::new();
    for _ in 0..10 {
        let outcome = engine
            .record_quiz_completion(&u, "Algebra basics", 100, 50)
            .await
            .unwrap();
        unlocked.extend(outcome.award.new_achievements);
    }

    unlocked.sort();
    assert_eq!(unlocked, vec!["perfect_scorer_5", "quiz_taker_10"]);

    let progress = engine.weekly_progress(&u).await.unwrap();
    assert_eq!(progress.quizzes_this_week, 10);
    assert_eq!(progress.target_quizzes, 5);
}

#[tokio::test]
async fn test_caller_supplied_counts() {
    let (engine, _) = engine(PointsConfig::default());
    let u = user("counted");

    let counts = ActivityCounts {
        completed_quizzes: 50,
        perfect_scores: 0,
        quizzes_this_week: 0,
    };
    let result = engine
        .award_points_with_counts(&u, 10, "quiz", counts)
        .await
        .unwrap();

    let mut achievements = result.new_achievements;
    achievements.sort();
    assert_eq!(achievements, vec!["quiz_taker_10", "quiz_taker_50"]);
}

#[tokio::test]
async fn test_retried_quiz_is_counted_once() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap(),
    ));
    let activity = Arc::new(InMemoryActivityLog::new());
    // First save is the streak, second is the quiz award
    let engine = ReputationEngine::new(
        PointsConfig::default().without_badge_bonuses(),
        Arc::new(FlakyStore::failing_save(2)),
        clock.clone(),
    )
    .unwrap()
    .with_activity_log(activity.clone());
    let u = user("flaky-quizzer");

    let err = engine
        .record_quiz_completion(&u, "Fractions", 80, 50)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let counts = activity.counts(&u, clock.now() - Duration::days(7)).await.unwrap();
    assert_eq!(counts.completed_quizzes, 0);

    let outcome = engine
        .record_quiz_completion(&u, "Fractions", 80, 50)
        .await
        .unwrap();
    assert!(!outcome.streak.streak_continued);

    let counts = activity.counts(&u, clock.now() - Duration::days(7)).await.unwrap();
    assert_eq!(counts.completed_quizzes, 1);

    let expected = engine.config().points.quiz_points(80, 50);
    let record = engine.summary(&u).await.unwrap();
    assert_eq!(record.total_points, expected);
    assert_eq!(record.streak_days, 1);
}
