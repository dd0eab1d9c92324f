use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// A login token issued by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(username: impl Into<String>, lifetime: Duration) -> Self {
        Session {
            token: Uuid::new_v4().simple().to_string(),
            username: username.into(),
            expires_at: Utc::now() + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl<'r> FromRow<'r, SqliteRow> for Session {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let expires_at: i64 = row.try_get("expires_at")?;
        Ok(Session {
            token: row.try_get("token")?,
            username: row.try_get("username")?,
            expires_at: DateTime::from_timestamp_millis(expires_at).ok_or_else(|| {
                sqlx::Error::Decode(format!("timestamp {expires_at} out of range").into())
            })?,
        })
    }
}
