use crate::db::models::{NewTurn, Turn};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, types::Type, Connection, Error as DbError, Result as DbResult, Row};

const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// Timestamps are selected through strftime so the driver hands back text we can parse
// without enabling duckdb's chrono feature.
const TURN_COLUMNS: &str = r#"id, session_id, user_message, ai_message, is_trap,
    strftime("timestamp", '%Y-%m-%d %H:%M:%S.%f')"#;

pub struct DbService;

impl DbService {
    fn parse_timestamp(idx: usize, raw: &str) -> DbResult<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_READ_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| DbError::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    // DuckDB rejects negative LIMIT values, so oversized limits saturate instead of wrapping.
    fn sql_limit(limit: usize) -> i64 {
        i64::try_from(limit).unwrap_or(i64::MAX)
    }

    fn row_to_turn(row: &Row) -> DbResult<Turn> {
        let raw_ts: String = row.get(5)?;

        Ok(Turn {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_message: row.get(2)?,
            ai_message: row.get(3)?,
            is_trap: row.get(4)?,
            timestamp: Self::parse_timestamp(5, &raw_ts)?,
        })
    }

    // --- Session Operations ---

    pub fn upsert_topic(conn: &Connection, session_id: &str, topic: &str) -> DbResult<()> {
        conn.execute(
            "INSERT INTO sessions (session_id, topic) VALUES (?, ?)
             ON CONFLICT (session_id) DO UPDATE SET topic = excluded.topic, updated_at = CURRENT_TIMESTAMP",
            params![session_id, topic],
        )?;
        Ok(())
    }

    pub fn get_topic(conn: &Connection, session_id: &str) -> DbResult<Option<String>> {
        let mut stmt = conn.prepare("SELECT topic FROM sessions WHERE session_id = ?")?;
        let mut rows = stmt.query_map(params![session_id], |row| row.get::<_, Option<String>>(0))?;

        match rows.next() {
            Some(topic) => Ok(topic?.filter(|t| !t.trim().is_empty())),
            None => Ok(None),
        }
    }

    // --- Turn Operations ---

    pub fn insert_turn(conn: &Connection, turn: &NewTurn) -> DbResult<i64> {
        let ts = turn.timestamp.format(TIMESTAMP_WRITE_FORMAT).to_string();

        conn.query_row(
            r#"INSERT INTO turns (session_id, user_message, ai_message, is_trap, "timestamp")
               VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))
               RETURNING id"#,
            params![turn.session_id, turn.user_message, turn.ai_message, turn.is_trap, ts],
            |row| row.get(0),
        )
    }

    /// The newest `limit` turns of a session, returned oldest first.
    pub fn recent_turns(conn: &Connection, session_id: &str, limit: usize) -> DbResult<Vec<Turn>> {
        let sql = format!(
            r#"SELECT * FROM (
                 SELECT {TURN_COLUMNS}, "timestamp" AS ts_order FROM turns
                 WHERE session_id = ?
                 ORDER BY "timestamp" DESC, id DESC
                 LIMIT ?
               ) ORDER BY ts_order ASC, id ASC"#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id, Self::sql_limit(limit)], Self::row_to_turn)?;
        rows.collect()
    }

    pub fn session_turns(conn: &Connection, session_id: &str, limit: usize) -> DbResult<Vec<Turn>> {
        let sql = format!(
            r#"SELECT {TURN_COLUMNS} FROM turns
               WHERE session_id = ?
               ORDER BY "timestamp" ASC, id ASC
               LIMIT ?"#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id, Self::sql_limit(limit)], Self::row_to_turn)?;
        rows.collect()
    }

    pub fn list_turns(conn: &Connection) -> DbResult<Vec<Turn>> {
        let sql = format!(r#"SELECT {TURN_COLUMNS} FROM turns ORDER BY "timestamp" DESC, id DESC"#);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_turn)?;
        rows.collect()
    }
}
