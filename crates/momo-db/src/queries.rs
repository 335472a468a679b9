use crate::models::{GroupRow, MessageRow, NewMessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{Local, SecondsFormat, Utc};
use rusqlite::Connection;

/// Display format for the `time` column, e.g. `2026-01-02 15:04:05`.
const FMT_TIME: &str = "%Y-%m-%d %H:%M:%S";

impl Database {
    // -- Users --

    /// Insert a user and return the assigned id.
    pub fn create_user(&self, name: &str, password_hash: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (name, password) VALUES (?1, ?2)",
                (name, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_username_by_id(&self, id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let name = conn
                .query_row("SELECT name FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(name)
        })
    }

    pub fn user_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Messages --

    /// Append a message. Id, creation instant and display time are assigned
    /// here, under the connection lock, so ids and timestamps advance together.
    pub fn append_message(&self, msg: &NewMessageRow<'_>) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let created_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);
            let fmt_time = now.with_timezone(&Local).format(FMT_TIME).to_string();

            conn.execute(
                "INSERT INTO messages (conv_id, user_id, user_name, created_at, fmt_time, text, type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.conv_id,
                    msg.user_id,
                    msg.user_name,
                    created_at,
                    fmt_time,
                    msg.text,
                    msg.kind
                ],
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                conv_id: msg.conv_id,
                user_id: msg.user_id,
                user_name: msg.user_name.to_string(),
                created_at,
                fmt_time,
                text: msg.text.to_string(),
                kind: msg.kind,
            })
        })
    }

    /// Full history of a conversation, oldest first.
    pub fn list_messages(&self, conv_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conv_id))
    }

    // -- Groups --

    /// Create a group and enroll its owner as the first member.
    pub fn create_group(&self, owner_id: i64, name: &str) -> Result<GroupRow> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO groups (owner_id, name) VALUES (?1, ?2)",
                rusqlite::params![owner_id, name],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                [id, owner_id],
            )?;
            tx.commit()?;

            Ok(GroupRow {
                id,
                owner_id,
                name: name.to_string(),
            })
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, owner_id, name FROM groups WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(GroupRow {
                            id: row.get(0)?,
                            owner_id: row.get(1)?,
                            name: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Add a member. Returns false if they were already in the group.
    pub fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                [group_id, user_id],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn is_group_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let member = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
                [group_id, user_id],
                |row| row.get(0),
            )?;
            Ok(member)
        })
    }

    /// Members of a group as (user_id, name), ordered by user id.
    pub fn list_group_members(&self, group_id: i64) -> Result<Vec<(i64, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name
                 FROM group_members gm
                 JOIN users u ON u.id = gm.user_id
                 WHERE gm.group_id = ?1
                 ORDER BY u.id",
            )?;

            let rows = stmt
                .query_map([group_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn groups_for_user(&self, user_id: i64) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.owner_id, g.name
                 FROM groups g
                 JOIN group_members gm ON gm.group_id = g.id
                 WHERE gm.user_id = ?1
                 ORDER BY g.id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(GroupRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, name, password, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, conv_id: i64) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conv_id, user_id, user_name, created_at, fmt_time, text, type
         FROM messages
         WHERE conv_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map([conv_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conv_id: row.get(1)?,
                user_id: row.get(2)?,
                user_name: row.get(3)?,
                created_at: row.get(4)?,
                fmt_time: row.get(5)?,
                text: row.get(6)?,
                kind: row.get(7)?,
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
