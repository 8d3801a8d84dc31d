//! Keyset pagination over players ranked by how many records they hold.
//!
//! Rows are totally ordered by `(record_count, player_id)`, both in the chosen
//! direction. A page is requested with the sort key of the last row of the
//! previous page instead of a row offset, so walking all pages visits every
//! player exactly once as long as the records do not change in between.

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn from_ascending(ascending: bool) -> Direction {
        if ascending {
            Direction::Ascending
        } else {
            Direction::Descending
        }
    }

    fn order(self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }

    fn comparison(self) -> &'static str {
        match self {
            Direction::Ascending => ">",
            Direction::Descending => "<",
        }
    }
}

/// Sort key of the last row seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankingCursor {
    pub last_count: i64,
    pub last_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<RankingCursor>,
    pub limit: u32,
    pub direction: Direction,
}

impl PageRequest {
    pub fn first(limit: u32, direction: Direction) -> PageRequest {
        PageRequest { after: None, limit, direction }
    }

    pub fn after(self, cursor: RankingCursor) -> PageRequest {
        PageRequest { after: Some(cursor), ..self }
    }

    /// Builds a request from loose parameters. The cursor values must be given
    /// together or not at all.
    pub fn from_parts(
        last_count: Option<i64>,
        last_id: Option<i64>,
        limit: u32,
        ascending: bool,
    ) -> Result<PageRequest> {
        let after = match (last_count, last_id) {
            (None, None) => None,
            (Some(last_count), Some(last_id)) => Some(RankingCursor { last_count, last_id }),
            _ => {
                return Err(Error::InvalidCursor(
                    "last count and last id must be given together".to_string(),
                ))
            }
        };
        Ok(PageRequest { after, limit, direction: Direction::from_ascending(ascending) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedPlayer {
    pub id: i64,
    pub name: String,
    pub record_count: i64,
}

impl RankedPlayer {
    pub fn cursor(&self) -> RankingCursor {
        RankingCursor { last_count: self.record_count, last_id: self.id }
    }
}

pub struct RankingPaginator<'a> {
    connection: &'a Connection,
}

impl<'a> RankingPaginator<'a> {
    pub fn new(store: &'a RecordStore) -> RankingPaginator<'a> {
        RankingPaginator { connection: store.connection() }
    }

    pub fn page(&self, request: &PageRequest) -> Result<Vec<RankedPlayer>> {
        page(self.connection, request)
    }

    /// Walks every page from the first one, each seeded with the last row of
    /// the page before.
    pub fn pages(&self, limit: u32, direction: Direction) -> RankingPages<'a> {
        RankingPages {
            connection: self.connection,
            request: PageRequest::first(limit, direction),
            done: false,
        }
    }
}

pub fn page(connection: &Connection, request: &PageRequest) -> Result<Vec<RankedPlayer>> {
    let order = request.direction.order();
    let cmp = request.direction.comparison();
    let rows = match request.after {
        None => {
            let mut statement = connection.prepare(&format!(
                "SELECT p.player_id, p.player_name, COUNT(r.map_id) AS record_count
                FROM players p
                LEFT JOIN records r ON r.player_id = p.player_id
                GROUP BY p.player_id
                ORDER BY record_count {order}, p.player_id {order}
                LIMIT ?1",
                order = order
            ))?;
            let rows = statement.query_map(params![request.limit], ranked_player)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        Some(cursor) => {
            let mut statement = connection.prepare(&format!(
                "SELECT p.player_id, p.player_name, COUNT(r.map_id) AS record_count
                FROM players p
                LEFT JOIN records r ON r.player_id = p.player_id
                GROUP BY p.player_id
                HAVING COUNT(r.map_id) {cmp} ?1
                    OR (COUNT(r.map_id) = ?1 AND p.player_id {cmp} ?2)
                ORDER BY record_count {order}, p.player_id {order}
                LIMIT ?3",
                cmp = cmp,
                order = order
            ))?;
            let rows = statement.query_map(
                params![cursor.last_count, cursor.last_id, request.limit],
                ranked_player,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

fn ranked_player(row: &rusqlite::Row) -> rusqlite::Result<RankedPlayer> {
    Ok(RankedPlayer {
        id: row.get(0)?,
        name: row.get(1)?,
        record_count: row.get(2)?,
    })
}

pub struct RankingPages<'a> {
    connection: &'a Connection,
    request: PageRequest,
    done: bool,
}

impl<'a> Iterator for RankingPages<'a> {
    type Item = Result<Vec<RankedPlayer>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rows = match page(self.connection, &self.request) {
            Ok(rows) => rows,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        match rows.last() {
            None => {
                self.done = true;
                return None;
            }
            Some(last) => self.request = self.request.after(last.cursor()),
        }
        if (rows.len() as u32) < self.request.limit {
            self.done = true;
        }
        Some(Ok(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlayerRef;

    fn store_with_counts(counts: &[(&str, usize)]) -> RecordStore {
        let mut store = RecordStore::open_in_memory().unwrap();
        for (name, count) in counts {
            let id = store.ensure_player(name).unwrap();
            for map in 0..*count {
                store.upsert_record(PlayerRef::ById(id), &format!("map-{}", map), 40_000).unwrap();
            }
        }
        store
    }

    fn names(rows: &[RankedPlayer]) -> Vec<(&str, i64)> {
        rows.iter().map(|r| (r.name.as_str(), r.record_count)).collect()
    }

    #[test]
    fn walks_three_players_in_pages_of_two() {
        let store = store_with_counts(&[("A", 0), ("B", 2), ("C", 5)]);
        let paginator = RankingPaginator::new(&store);

        let first = paginator.page(&PageRequest::first(2, Direction::Ascending)).unwrap();
        assert_eq!(names(&first), vec![("A", 0), ("B", 2)]);

        let b_id = store.player_id("B").unwrap().unwrap();
        let cursor = RankingCursor { last_count: 2, last_id: b_id };
        assert_eq!(first[1].cursor(), cursor);
        let second = paginator.page(&PageRequest::first(2, Direction::Ascending).after(cursor)).unwrap();
        assert_eq!(names(&second), vec![("C", 5)]);

        let third = paginator
            .page(&PageRequest::first(2, Direction::Ascending).after(second[0].cursor()))
            .unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn descending_puts_most_records_first() {
        let store = store_with_counts(&[("A", 0), ("B", 2), ("C", 5)]);
        let rows = RankingPaginator::new(&store).page(&PageRequest::first(10, Direction::Descending)).unwrap();
        assert_eq!(names(&rows), vec![("C", 5), ("B", 2), ("A", 0)]);
    }

    #[test]
    fn ties_are_broken_by_player_id() {
        // created in reverse alphabetical order, so ids do not follow names
        let store = store_with_counts(&[("z", 1), ("y", 1), ("x", 1), ("w", 3)]);
        let paginator = RankingPaginator::new(&store);

        let ascending = paginator.page(&PageRequest::first(10, Direction::Ascending)).unwrap();
        assert_eq!(names(&ascending), vec![("z", 1), ("y", 1), ("x", 1), ("w", 3)]);

        let descending = paginator.page(&PageRequest::first(10, Direction::Descending)).unwrap();
        assert_eq!(names(&descending), vec![("w", 3), ("x", 1), ("y", 1), ("z", 1)]);
    }

    #[test]
    fn pages_partition_the_ranking_for_any_limit() {
        let mut counts = Vec::new();
        let mut seed: u32 = 7;
        let player_names: Vec<String> = (0..23).map(|i| format!("player-{:02}", i)).collect();
        for name in &player_names {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            counts.push((name.as_str(), ((seed >> 16) % 4) as usize));
        }
        let store = store_with_counts(&counts);

        for &direction in &[Direction::Ascending, Direction::Descending] {
            let full = page(store.connection(), &PageRequest::first(1000, direction)).unwrap();
            assert_eq!(full.len(), player_names.len());
            let mut expected = full.clone();
            expected.sort_by_key(|r| (r.record_count, r.id));
            if direction == Direction::Descending {
                expected.reverse();
            }
            assert_eq!(full, expected);

            for limit in 1..=25 {
                let walked: Vec<RankedPlayer> = RankingPaginator::new(&store)
                    .pages(limit, direction)
                    .collect::<Result<Vec<_>>>()
                    .unwrap()
                    .into_iter()
                    .flatten()
                    .collect();
                assert_eq!(walked, full, "limit {} {:?}", limit, direction);
            }
        }
    }

    #[test]
    fn empty_store_has_no_pages() {
        let store = RecordStore::open_in_memory().unwrap();
        assert_eq!(RankingPaginator::new(&store).pages(5, Direction::Ascending).count(), 0);
    }

    #[test]
    fn ranked_players_serialize_with_their_cursor() {
        let player = RankedPlayer { id: 7, name: "acc-7".to_string(), record_count: 3 };
        assert_eq!(
            serde_json::to_value(&player).unwrap(),
            serde_json::json!({ "id": 7, "name": "acc-7", "record_count": 3 })
        );
        assert_eq!(
            serde_json::to_value(player.cursor()).unwrap(),
            serde_json::json!({ "last_count": 3, "last_id": 7 })
        );
    }

    #[test]
    fn cursor_parts_must_come_together() {
        assert!(PageRequest::from_parts(None, None, 50, true).unwrap().after.is_none());
        let request = PageRequest::from_parts(Some(3), Some(9), 50, false).unwrap();
        assert_eq!(request.after, Some(RankingCursor { last_count: 3, last_id: 9 }));
        assert_eq!(request.direction, Direction::Descending);
        assert!(matches!(
            PageRequest::from_parts(Some(3), None, 50, true),
            Err(Error::InvalidCursor(_))
        ));
    }
}
