//! Client for the out-of-process reward-optimization advisor.
//!
//! Purely advisory: nothing on the admission path depends on it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc, Weekday};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::Event;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("reward service not configured: {0}")]
    Config(String),

    #[error("reward service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reward service returned an unusable value {0}")]
    InvalidValue(f64),
}

/// Event metadata the advisor scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardRequest {
    pub title: String,
    pub event_type: String,
    pub organizer_type: String,
    pub target_major: String,
    pub target_grade: String,
    pub weekday: String,
    pub brand_score: f64,
    /// Days between now and the event start.
    pub date_gap: i64,
    pub target_participants: f64,
}

impl RewardRequest {
    /// Describe `event` for the advisor as of `now`.
    pub fn new(event: &Event, profile: &RewardProfile, now: DateTime<Utc>) -> Self {
        Self {
            title: event.title.clone(),
            event_type: profile.event_type.clone(),
            organizer_type: profile.organizer_type.clone(),
            target_major: profile.target_major.clone(),
            target_grade: profile.target_grade.clone(),
            weekday: weekday_name(event.start_at.weekday()).to_string(),
            brand_score: profile.brand_score,
            date_gap: (event.start_at.date_naive() - now.date_naive()).num_days(),
            target_participants: profile.target_participants,
        }
    }
}

/// Audience and organizer attributes of an event, plus the participation goal.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardProfile {
    pub event_type: String,
    pub organizer_type: String,
    pub target_major: String,
    pub target_grade: String,
    pub brand_score: f64,
    pub target_participants: f64,
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MONDAY",
        Weekday::Tue => "TUESDAY",
        Weekday::Wed => "WEDNESDAY",
        Weekday::Thu => "THURSDAY",
        Weekday::Fri => "FRIDAY",
        Weekday::Sat => "SATURDAY",
        Weekday::Sun => "SUNDAY",
    }
}

#[derive(Debug, Deserialize)]
struct RewardResponse {
    recommended_reward: f64,
}

#[async_trait]
pub trait RewardAdvisor: Send + Sync {
    /// Recommended reward value for the described event.
    async fn recommend(&self, request: &RewardRequest) -> Result<f64, RewardError>;
}

/// Posts requests as JSON to `{base_url}/optimize`.
pub struct HttpRewardAdvisor {
    client: Client,
    base_url: String,
}

impl HttpRewardAdvisor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RewardError> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(RewardError::Config("empty base url".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self) -> String {
        format!("{}/optimize", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RewardAdvisor for HttpRewardAdvisor {
    async fn recommend(&self, request: &RewardRequest) -> Result<f64, RewardError> {
        let response: RewardResponse = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            title = %request.title,
            reward = response.recommended_reward,
            "reward recommended"
        );
        Ok(response.recommended_reward)
    }
}
