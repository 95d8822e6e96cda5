use chrono::{DateTime, Utc};

/// Internal user row. Carries the password hash — this type must never
/// cross the API boundary; handlers map it to the public shapes in
/// courier-types before serializing anything.
#[derive(Debug)]
pub struct UserRow {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

/// One row of a thread query: the message plus the counterparty's public
/// fields, flat as the SQL join produces them.
#[derive(Debug)]
pub struct ThreadMessageRow {
    pub id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug)]
pub struct PartyRow {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// A single message joined with both parties.
#[derive(Debug)]
pub struct MessageDetailRow {
    pub id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub from_user: PartyRow,
    pub to_user: PartyRow,
}
