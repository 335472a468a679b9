/// Database row types. These map directly to SQLite rows.
/// Distinct from momo-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub password: String,
    pub created_at: String,
}

pub struct GroupRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
}

pub struct MessageRow {
    pub id: i64,
    pub conv_id: i64,
    pub user_id: i64,
    pub user_name: String,
    /// RFC 3339, UTC, microsecond precision. Fixed width, so it sorts
    /// chronologically as text.
    pub created_at: String,
    pub fmt_time: String,
    pub text: String,
    pub kind: i32,
}

/// Column values for a message insert. The database assigns the rest.
pub struct NewMessageRow<'a> {
    pub conv_id: i64,
    pub user_id: i64,
    pub user_name: &'a str,
    pub text: &'a str,
    pub kind: i32,
}
