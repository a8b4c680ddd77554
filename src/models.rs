use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on `recent_conversations` in a snapshot.
pub const MAX_RECENT_CONVERSATIONS: usize = 10;
/// Upper bound on `top_users` in a snapshot.
pub const MAX_TOP_USERS: usize = 5;

// ── Statistics ──────────────────────────────────────────────────────────

/// Aggregation period requested from the statistics service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
    Month,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Day, TimeWindow::Week, TimeWindow::Month];

    /// Wire form used in the `period` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(format!(
                "Unknown window '{}'. Supported: day, week, month",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// One KPI with its period-over-period comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub change_percent: f64,
    pub trend: Trend,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_conversations: MetricValue,
    pub active_users: MetricValue,
    pub avg_conversation_length: MetricValue,
    pub growth_rate: MetricValue,
}

impl SummaryMetrics {
    /// Metrics in display order, keyed by their wire name.
    pub fn entries(&self) -> [(&'static str, &MetricValue); 4] {
        [
            ("total_conversations", &self.total_conversations),
            ("active_users", &self.active_users),
            ("avg_conversation_length", &self.avg_conversation_length),
            ("growth_rate", &self.growth_rate),
        ]
    }
}

/// Parallel label/value sequences for the activity chart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivitySeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ActivitySeries {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(rename = "conversation_id")]
    pub id: String,
    #[serde(rename = "user_name")]
    pub user_display_name: String,
    #[serde(with = "flexible_timestamp")]
    pub started_at: DateTime<Utc>,
    pub message_count: u32,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub conversation_count: u32,
    pub message_count: u32,
    #[serde(with = "flexible_timestamp")]
    pub last_active: DateTime<Utc>,
}

/// One complete, internally consistent set of statistics for a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub window: TimeWindow,
    pub summary: SummaryMetrics,
    pub activity: ActivitySeries,
    pub recent_conversations: Vec<ConversationSummary>,
    pub top_users: Vec<UserSummary>,
}

/// Body of `GET /api/v1/stats` as sent by the service.
#[derive(Debug, Deserialize)]
pub(crate) struct StatsPayload {
    #[serde(default)]
    period: Option<TimeWindow>,
    summary: SummaryMetrics,
    activity_chart: ActivitySeries,
    recent_conversations: Vec<ConversationSummary>,
    top_users: Vec<UserSummary>,
}

impl StatsPayload {
    /// Check the payload against the snapshot contract and stamp the window.
    ///
    /// A breach is rejected as a whole; nothing is truncated to fit.
    pub(crate) fn into_snapshot(self, requested: TimeWindow) -> Result<StatsSnapshot, String> {
        if let Some(period) = self.period {
            if period != requested {
                return Err(format!(
                    "requested '{}' statistics but received '{}'",
                    requested, period
                ));
            }
        }
        if self.activity_chart.labels.len() != self.activity_chart.values.len() {
            return Err(format!(
                "activity chart has {} labels but {} values",
                self.activity_chart.labels.len(),
                self.activity_chart.values.len()
            ));
        }
        if self.recent_conversations.len() > MAX_RECENT_CONVERSATIONS {
            return Err(format!(
                "{} recent conversations exceeds the limit of {}",
                self.recent_conversations.len(),
                MAX_RECENT_CONVERSATIONS
            ));
        }
        if self.top_users.len() > MAX_TOP_USERS {
            return Err(format!(
                "{} top users exceeds the limit of {}",
                self.top_users.len(),
                MAX_TOP_USERS
            ));
        }

        Ok(StatsSnapshot {
            window: requested,
            summary: self.summary,
            activity: self.activity_chart,
            recent_conversations: self.recent_conversations,
            top_users: self.top_users,
        })
    }
}

// ── Chat ────────────────────────────────────────────────────────────────

/// Chat operating context, sent with every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// General assistant.
    #[default]
    Normal,
    /// Statistics-focused assistant.
    Admin,
}

impl ChatMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Normal => Self::Admin,
            Self::Admin => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Admin => "admin",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal mode (general assistant)",
            Self::Admin => "Admin mode (statistics questions)",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the visible transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Some(timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub message: &'a str,
    pub mode: ChatMode,
    pub session_id: &'a str,
}

/// Reply to one chat turn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub mode: ChatMode,
    #[serde(with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// The service emits both RFC 3339 timestamps and naive ISO-8601 ones
/// (no offset). Naive values are UTC.
mod flexible_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}
