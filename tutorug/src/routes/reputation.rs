//! Points, streaks and leaderboards

use hyper::body::Incoming;
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use notify::Notification;
use reputation::{Rank, ReputationRecord, Timeframe};

use super::{auth_header, ok, parse_query, read_json};
use crate::server::{AppState, BoxBody};
use crate::types::{Result, TutorugError};

const DEFAULT_LEADERBOARD: usize = 10;
const MAX_LEADERBOARD: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCompletion {
    pub quiz_title: String,
    pub score: u8,
    #[serde(default = "default_passing_score")]
    pub passing_score: u8,
}

fn default_passing_score() -> u8 {
    60
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    #[serde(flatten)]
    record: ReputationRecord,
    position: u64,
}

/// "week_warrior" -> "Week Warrior"
fn display_title(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// GET /api/reputation
pub async fn handle_summary(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let record = state.reputation.summary(&user).await?;
    let position = state.reputation.leaderboard_position(&user).await?;
    ok(&SummaryResponse { record, position })
}

/// GET /api/reputation/weekly
pub async fn handle_weekly(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    ok(&state.reputation.weekly_progress(&user).await?)
}

/// GET /api/reputation/position
pub async fn handle_position(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let position = state.reputation.leaderboard_position(&user).await?;
    ok(&serde_json::json!({ "position": position }))
}

/// GET /api/reputation/leaderboard?limit=&timeframe=all|weekly|monthly
pub async fn handle_leaderboard(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    state.gate.authenticate(auth_header(&req))?;
    let limit = parse_query(req.uri(), "limit", DEFAULT_LEADERBOARD)?.clamp(1, MAX_LEADERBOARD);
    let timeframe = parse_query(req.uri(), "timeframe", Timeframe::All)?;

    let entries = state.reputation.leaderboard(limit, timeframe).await?;
    ok(&serde_json::json!({ "timeframe": timeframe, "entries": entries }))
}

/// GET /api/reputation/ranks
pub async fn handle_rank_distribution(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    state.gate.authenticate(auth_header(&req))?;
    let counts: BTreeMap<Rank, u64> = state.reputation.rank_distribution().await?;
    let body: BTreeMap<&str, u64> = counts.into_iter().map(|(r, n)| (r.as_str(), n)).collect();
    ok(&body)
}

/// POST /api/reputation/quiz
///
/// Paid feature. Counts towards the streak, awards quiz points and sends a
/// notification for each badge or achievement unlocked.
pub async fn handle_quiz_completion(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authorize(auth_header(&req)).await?;
    let quiz: QuizCompletion = read_json(req, state.args.max_body_bytes).await?;
    if quiz.quiz_title.trim().is_empty() {
        return Err(TutorugError::InvalidInput("quizTitle is required".into()));
    }

    let result = state
        .reputation
        .record_quiz_completion(&user, quiz.quiz_title.trim(), quiz.score, quiz.passing_score)
        .await?;

    for id in result
        .award
        .new_badges
        .iter()
        .chain(result.award.new_achievements.iter())
    {
        state
            .notifier
            .notify(
                &user,
                Notification::AchievementUnlocked {
                    title: display_title(id),
                },
            )
            .await;
    }

    ok(&result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_title() {
        assert_eq!(display_title("week_warrior"), "Week Warrior");
        assert_eq!(display_title("first_quiz"), "First Quiz");
        assert_eq!(display_title("scholar"), "Scholar");
    }
}
