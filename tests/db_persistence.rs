#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use duckdb::Connection;
    use trapchat::db::connection::init_schema;
    use trapchat::db::service::DbService;
    use trapchat::db::NewTurn;

    fn get_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn turn(session: &str, n: i64, is_trap: bool) -> NewTurn {
        NewTurn {
            session_id: session.to_string(),
            user_message: format!("question {n}"),
            ai_message: format!("answer {n}"),
            is_trap,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(n),
        }
    }

    #[test]
    fn test_topic_lifecycle() {
        let conn = get_test_db();

        // 1. No row yet
        assert_eq!(DbService::get_topic(&conn, "abc").unwrap(), None);

        // 2. Insert
        DbService::upsert_topic(&conn, "abc", "Data Structures").unwrap();
        assert_eq!(DbService::get_topic(&conn, "abc").unwrap().as_deref(), Some("Data Structures"));

        // 3. Last write wins
        DbService::upsert_topic(&conn, "abc", "Graph Theory").unwrap();
        assert_eq!(DbService::get_topic(&conn, "abc").unwrap().as_deref(), Some("Graph Theory"));

        // 4. Other sessions unaffected
        assert_eq!(DbService::get_topic(&conn, "xyz").unwrap(), None);
    }

    #[test]
    fn test_turn_insert_round_trips_fields() {
        let conn = get_test_db();
        let new_turn = turn("abc", 1, true);

        let id = DbService::insert_turn(&conn, &new_turn).unwrap();
        let stored = DbService::list_turns(&conn).unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], new_turn.into_turn(id));
    }

    #[test]
    fn test_ids_are_store_assigned_and_increasing() {
        let conn = get_test_db();
        let first = DbService::insert_turn(&conn, &turn("abc", 1, false)).unwrap();
        let second = DbService::insert_turn(&conn, &turn("abc", 2, false)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_recent_turns_returns_newest_window_oldest_first() {
        let conn = get_test_db();
        for n in 1..=6 {
            DbService::insert_turn(&conn, &turn("abc", n, n % 2 == 0)).unwrap();
        }
        DbService::insert_turn(&conn, &turn("other", 7, false)).unwrap();

        let recent = DbService::recent_turns(&conn, "abc", 4).unwrap();
        let questions: Vec<&str> = recent.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(questions, vec!["question 3", "question 4", "question 5", "question 6"]);

        let all = DbService::session_turns(&conn, "abc", 50).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].user_message, "question 1");
    }

    #[test]
    fn test_list_turns_is_newest_first_and_repeatable() {
        let conn = get_test_db();
        for n in 1..=3 {
            DbService::insert_turn(&conn, &turn(&format!("s{n}"), n, false)).unwrap();
        }

        let first_read = DbService::list_turns(&conn).unwrap();
        let second_read = DbService::list_turns(&conn).unwrap();

        assert_eq!(first_read, second_read);
        let sessions: Vec<&str> = first_read.iter().map(|t| t.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["s3", "s2", "s1"]);
    }

    #[test]
    fn test_oversized_limits_return_every_turn() {
        let conn = get_test_db();
        for n in 1..=3 {
            DbService::insert_turn(&conn, &turn("abc", n, false)).unwrap();
        }

        let all = DbService::session_turns(&conn, "abc", usize::MAX).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].user_message, "question 1");

        let recent = DbService::recent_turns(&conn, "abc", usize::MAX).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].user_message, "question 3");
    }
}
