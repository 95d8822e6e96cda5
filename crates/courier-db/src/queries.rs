use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{MessageDetailRow, PartyRow, ThreadMessageRow, UserRow};
use crate::{Database, Result, StoreError};

impl Database {
    // -- Users --

    /// Insert a new user. `password_hash` is the already-hashed credential;
    /// plaintext never reaches this layer. Both timestamps start at `now`.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, first_name, last_name, phone, join_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![username, password_hash, first_name, last_name, phone, now],
            )
            .map_err(|e| {
                if StoreError::is_unique_violation(&e) {
                    StoreError::Conflict(format!("username {username}"))
                } else {
                    e.into()
                }
            })?;

            Ok(UserRow {
                username: username.to_string(),
                password: password_hash.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                phone: phone.to_string(),
                join_at: now,
                last_login_at: now,
            })
        })
    }

    /// Stored hash for a username, or None if the user does not exist.
    /// The credential check is the only read path allowed to see the hash.
    pub fn get_password_hash(&self, username: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT password FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Bump `last_login_at` to `now`. Absence of the user is a failure, not
    /// a silent no-op.
    pub fn touch_last_login(&self, username: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_login_at = ?2 WHERE username = ?1",
                rusqlite::params![username, now],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {username}")));
            }
            Ok(now)
        })
    }

    pub fn list_users(&self) -> Result<Vec<PartyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, first_name, last_name, phone FROM users ORDER BY username",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PartyRow {
                        username: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        phone: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user(&self, username: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
                 FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserRow {
                        username: row.get(0)?,
                        password: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        phone: row.get(4)?,
                        join_at: row.get(5)?,
                        last_login_at: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("user {username}")))
        })
    }

    /// Messages sent by `username`, newest first, joined with each
    /// recipient's public profile.
    pub fn messages_from(
        &self,
        username: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ThreadMessageRow>> {
        self.with_conn(|conn| {
            query_thread(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 INNER JOIN users u ON u.username = m.to_username
                 WHERE m.from_username = ?1 AND (?3 IS NULL OR m.sent_at < ?3)
                 ORDER BY m.sent_at DESC
                 LIMIT ?2",
                username,
                limit,
                before,
            )
        })
    }

    /// Messages received by `username`, newest first, joined with each
    /// sender's public profile.
    pub fn messages_to(
        &self,
        username: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ThreadMessageRow>> {
        self.with_conn(|conn| {
            query_thread(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 INNER JOIN users u ON u.username = m.from_username
                 WHERE m.to_username = ?1 AND (?3 IS NULL OR m.sent_at < ?3)
                 ORDER BY m.sent_at DESC
                 LIMIT ?2",
                username,
                limit,
                before,
            )
        })
    }

    // -- Messages --

    /// Insert a new message with `read_at` unset. A sender or recipient that
    /// does not reference an existing user fails the foreign key check.
    pub fn insert_message(
        &self,
        id: &str,
        from_username: &str,
        to_username: &str,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, from_username, to_username, body, sent_at, read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                rusqlite::params![id, from_username, to_username, body, sent_at],
            )
            .map_err(|e| {
                if StoreError::is_foreign_key_violation(&e) {
                    StoreError::InvalidReference(format!(
                        "message {from_username} -> {to_username}"
                    ))
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<MessageDetailRow> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        f.username, f.first_name, f.last_name, f.phone,
                        t.username, t.first_name, t.last_name, t.phone
                 FROM messages m
                 INNER JOIN users f ON f.username = m.from_username
                 INNER JOIN users t ON t.username = m.to_username
                 WHERE m.id = ?1",
                [id],
                |row| {
                    Ok(MessageDetailRow {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sent_at: row.get(2)?,
                        read_at: row.get(3)?,
                        from_user: PartyRow {
                            username: row.get(4)?,
                            first_name: row.get(5)?,
                            last_name: row.get(6)?,
                            phone: row.get(7)?,
                        },
                        to_user: PartyRow {
                            username: row.get(8)?,
                            first_name: row.get(9)?,
                            last_name: row.get(10)?,
                            phone: row.get(11)?,
                        },
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
        })
    }

    /// Set `read_at` if it is still unset and return the resulting value.
    /// COALESCE keeps the first-set timestamp, so racing calls cannot move
    /// it backwards or clear it.
    pub fn mark_read(&self, id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = COALESCE(read_at, ?2) WHERE id = ?1",
                rusqlite::params![id, now],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("message {id}")));
            }
            let read_at = conn.query_row(
                "SELECT read_at FROM messages WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(read_at)
        })
    }
}

fn query_thread(
    conn: &Connection,
    sql: &str,
    username: &str,
    limit: u32,
    before: Option<DateTime<Utc>>,
) -> Result<Vec<ThreadMessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params![username, limit, before], |row| {
            Ok(ThreadMessageRow {
                id: row.get(0)?,
                body: row.get(1)?,
                sent_at: row.get(2)?,
                read_at: row.get(3)?,
                username: row.get(4)?,
                first_name: row.get(5)?,
                last_name: row.get(6)?,
                phone: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
