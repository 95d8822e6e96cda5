use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The subset of a user record safe for external disclosure.
/// Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// Full public profile, returned only to the user themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

/// A message joined with both parties' public profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub from_user: UserSummary,
    pub to_user: UserSummary,
}

/// A message in a user's thread, paired with the *other* party only.
/// `counterparty` is the recipient when listing sent messages and the
/// sender when listing received ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counterparty: Counterparty,
}

/// Which side of the thread the attached profile describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Counterparty {
    #[serde(rename = "to_user")]
    To(UserSummary),
    #[serde(rename = "from_user")]
    From(UserSummary),
}
