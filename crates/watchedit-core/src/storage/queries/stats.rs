use std::collections::BTreeMap;
use std::sync::MutexGuard;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::{completion_rate, LibraryStats, WorkStatus};

pub const UNKNOWN_YEAR: &str = "unknown";

pub struct LibraryStatsQuery<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> LibraryStatsQuery<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    pub fn get_stats(&self) -> Result<LibraryStats> {
        let total_works = self.count("SELECT COUNT(*) FROM works")?;
        let total_tags = self.count("SELECT COUNT(*) FROM tags")?;
        let total_episodes =
            self.count("SELECT COALESCE(SUM(json_array_length(episodes)), 0) FROM works")?;
        let watched_episodes = self.count(
            "SELECT COUNT(*) FROM works, json_each(works.episodes)
             WHERE json_extract(json_each.value, '$.watched') = 1",
        )?;

        Ok(LibraryStats {
            total_works,
            total_tags,
            type_stats: self.histogram("SELECT work_type, COUNT(*) FROM works GROUP BY work_type")?,
            status_stats: self.histogram("SELECT status, COUNT(*) FROM works GROUP BY status")?,
            year_stats: self.histogram(&format!(
                "SELECT COALESCE(CAST(year AS TEXT), '{UNKNOWN_YEAR}'), COUNT(*)
                 FROM works GROUP BY year"
            ))?,
            total_episodes,
            watched_episodes,
            completion_rate: completion_rate(watched_episodes, total_episodes),
        })
    }

    pub fn count_by_status(&self, status: WorkStatus) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM works WHERE status = ?1",
            rusqlite::params![status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn histogram(&self, sql: &str) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        let mut map = BTreeMap::new();
        for row in rows {
            let (key, count) = row?;
            map.insert(key, count);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Episode, EpisodeType, Tag, Work, WorkType};
    use crate::storage::database::{run_migrations, ConnectionPool};
    use crate::storage::repositories::{write_tag, write_work};

    #[test]
    fn test_stats_over_mixed_library() {
        let pool = ConnectionPool::open_in_memory().unwrap();
        {
            let conn = pool.get_connection();
            run_migrations(&conn).unwrap();

            let mut a = Work::new("A", WorkType::Anime);
            a.year = Some(2020);
            for n in 1..=4 {
                let mut ep = Episode::new(n, 1, EpisodeType::Episode);
                ep.watched = n <= 1;
                a.episodes.push(ep);
            }
            let mut b = Work::new("B", WorkType::Movie);
            b.status = WorkStatus::Completed;
            let c = Work::new("C", WorkType::Anime);

            for w in [&a, &b, &c] {
                write_work(&conn, w).unwrap();
            }
            write_tag(&conn, &Tag::new(1, "x")).unwrap();
        }

        let query = LibraryStatsQuery::new(pool.get_connection());
        let stats = query.get_stats().unwrap();
        assert_eq!(stats.total_works, 3);
        assert_eq!(stats.total_tags, 1);
        assert_eq!(stats.type_stats.get("anime"), Some(&2));
        assert_eq!(stats.status_stats.get("completed"), Some(&1));
        assert_eq!(stats.year_stats.get("2020"), Some(&1));
        assert_eq!(stats.year_stats.get(UNKNOWN_YEAR), Some(&2));
        assert_eq!(stats.total_episodes, 4);
        assert_eq!(stats.watched_episodes, 1);
        assert_eq!(stats.completion_rate, 25.0);
        assert_eq!(query.count_by_status(WorkStatus::Watching).unwrap(), 2);
    }

    #[test]
    fn test_empty_library() {
        let pool = ConnectionPool::open_in_memory().unwrap();
        run_migrations(&pool.get_connection()).unwrap();
        let stats = LibraryStatsQuery::new(pool.get_connection()).get_stats().unwrap();
        assert_eq!(stats.total_works, 0);
        assert_eq!(stats.completion_rate, 0.0);
        assert!(stats.year_stats.is_empty());
    }
}
