//! Persistent store for players, maps and per-player best scores.
//!
//! Players and maps are create-if-absent, records are last-write-wins per
//! `(player, map)`. Each public mutator performs its write atomically: either
//! a single statement or a transaction around the statements it needs.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::db_create;
use crate::error::{Error, Result};

/// A player given either by its row id or by its unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerRef<'a> {
    ById(i64),
    ByName(&'a str),
}

impl<'a> From<&'a str> for PlayerRef<'a> {
    fn from(name: &'a str) -> Self {
        PlayerRef::ByName(name)
    }
}

impl From<i64> for PlayerRef<'_> {
    fn from(id: i64) -> Self {
        PlayerRef::ById(id)
    }
}

impl std::fmt::Display for PlayerRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PlayerRef::ById(id) => write!(f, "player #{}", id),
            PlayerRef::ByName(name) => write!(f, "player '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
}

/// Attributes recorded for a map the first time it is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapAttributes {
    pub name: String,
    pub author: String,
    /// `YYYY-MM-DD`
    pub release_date: String,
    /// `None` when the map has no author medal time.
    pub author_time: Option<i64>,
    pub gold_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Map {
    pub id: String,
    pub name: String,
    pub author: String,
    pub release_date: String,
    pub author_time: Option<i64>,
    pub gold_time: i64,
    pub author_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Result of writing a qualifying record through the counted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub player_id: i64,
    pub outcome: UpsertOutcome,
    /// The map's author count was incremented by this write.
    pub newly_counted: bool,
}

/// One line of a player's map overview: every known map, with the player's
/// score when they hold a record on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerMapRow {
    pub map_id: String,
    pub map_name: String,
    pub map_author: String,
    pub release_date: String,
    pub author_time: Option<i64>,
    pub author_count: i64,
    pub score: Option<i64>,
}

#[derive(Debug)]
pub struct RecordStore {
    connection: Connection,
}

impl RecordStore {
    pub fn open<P: AsRef<Path>>(db_file: P) -> Result<RecordStore> {
        RecordStore::from_connection(Connection::open(db_file)?)
    }

    pub fn open_in_memory() -> Result<RecordStore> {
        RecordStore::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<RecordStore> {
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        for statement in db_create::get_statements() {
            connection.execute_batch(statement)?;
        }
        Ok(RecordStore { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn close(self) -> Result<()> {
        self.connection.close().map_err(|(_, e)| Error::from(e))
    }

    /// Returns the id of the player called `name`, creating it on first use.
    pub fn ensure_player(&self, name: &str) -> Result<i64> {
        ensure_player(&self.connection, name)
    }

    pub fn player_id(&self, name: &str) -> Result<Option<i64>> {
        Ok(self
            .connection
            .query_row(
                "SELECT player_id FROM players WHERE player_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn player_name(&self, player_id: i64) -> Result<Option<String>> {
        Ok(self
            .connection
            .query_row(
                "SELECT player_name FROM players WHERE player_id = ?1",
                params![player_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Inserts or overwrites the score of `player` on `map_id`.
    ///
    /// Fails with [`Error::NotFound`] when the player does not exist; nothing is
    /// written in that case. Never touches the map's author count.
    pub fn upsert_record(&mut self, player: PlayerRef, map_id: &str, score: i64) -> Result<UpsertOutcome> {
        let transaction = self.connection.transaction()?;
        let player_id = resolve_player(&transaction, player)?
            .ok_or_else(|| Error::NotFound(player.to_string()))?;
        let (outcome, _) = write_record(&transaction, player_id, map_id, score, false)?;
        transaction.commit()?;
        Ok(outcome)
    }

    /// Writes a qualifying record and counts it towards the map's author count.
    ///
    /// The player is created if needed. The increment happens only the first
    /// time a `(player, map)` pair goes through this path, so repeated ingestion
    /// of the same leaderboard leaves the count unchanged.
    pub fn record_qualifying(&mut self, player_name: &str, map_id: &str, score: i64) -> Result<Tally> {
        let transaction = self.connection.transaction()?;
        let player_id = ensure_player(&transaction, player_name)?;
        let (outcome, was_counted) = write_record(&transaction, player_id, map_id, score, true)?;
        let newly_counted = !was_counted;
        if newly_counted {
            increment_author_count(&transaction, map_id)?;
        }
        transaction.commit()?;
        Ok(Tally { player_id, outcome, newly_counted })
    }

    /// `(map_id, score)` pairs ordered by map id; empty for an unknown player.
    pub fn records_for_player(&self, player: PlayerRef) -> Result<Vec<(String, i64)>> {
        let player_id = match resolve_player(&self.connection, player)? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };
        let mut statement = self.connection.prepare(
            "SELECT map_id, score
            FROM records
            WHERE player_id = ?1
            ORDER BY map_id ASC",
        )?;
        let rows = statement.query_map(params![player_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// `(player_name, score)` pairs for a map, best score first.
    pub fn records_for_map(&self, map_id: &str) -> Result<Vec<(String, i64)>> {
        let mut statement = self.connection.prepare(
            "SELECT p.player_name, r.score
            FROM records r
            JOIN players p ON p.player_id = r.player_id
            WHERE r.map_id = ?1
            ORDER BY r.score ASC, r.player_id ASC",
        )?;
        let rows = statement.query_map(params![map_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn record_count(&self, player: PlayerRef) -> Result<i64> {
        let player_id = match resolve_player(&self.connection, player)? {
            Some(id) => id,
            None => return Ok(0),
        };
        Ok(self.connection.query_row(
            "SELECT COUNT(*) FROM records WHERE player_id = ?1",
            params![player_id],
            |row| row.get(0),
        )?)
    }

    /// Creates the map if it is unknown. Attributes of an existing map are kept.
    pub fn ensure_map(&self, map_id: &str, attrs: &MapAttributes) -> Result<bool> {
        let inserted = self.connection.execute(
            "INSERT INTO maps (map_id, map_name, map_author, release_date, author_time, gold_time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(map_id) DO NOTHING",
            params![
                map_id,
                attrs.name,
                attrs.author,
                attrs.release_date,
                attrs.author_time,
                attrs.gold_time
            ],
        )?;
        if inserted > 0 {
            debug!(map_id, name = %attrs.name, "created map");
        }
        Ok(inserted > 0)
    }

    pub fn increment_author_count(&self, map_id: &str) -> Result<()> {
        increment_author_count(&self.connection, map_id)
    }

    pub fn map(&self, map_id: &str) -> Result<Option<Map>> {
        Ok(self
            .connection
            .query_row(
                "SELECT map_id, map_name, map_author, release_date, author_time, gold_time, author_count
                FROM maps
                WHERE map_id = ?1",
                params![map_id],
                |row| {
                    Ok(Map {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        author: row.get(2)?,
                        release_date: row.get(3)?,
                        author_time: row.get(4)?,
                        gold_time: row.get(5)?,
                        author_count: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn total_maps(&self) -> Result<i64> {
        Ok(self.connection.query_row("SELECT COUNT(*) FROM maps", params![], |row| row.get(0))?)
    }

    /// Players whose name contains `query`, ordered by name.
    pub fn search_players(&self, query: &str, limit: u32) -> Result<Vec<Player>> {
        let pattern = format!("%{}%", escape_like(query));
        let mut statement = self.connection.prepare(
            "SELECT player_id, player_name
            FROM players
            WHERE player_name LIKE ?1 ESCAPE '\\'
            ORDER BY player_name ASC
            LIMIT ?2",
        )?;
        let rows = statement.query_map(params![pattern, limit], |row| {
            Ok(Player { id: row.get(0)?, name: row.get(1)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every map, newest first, joined with the player's score where one exists.
    pub fn player_maps(&self, player_id: i64) -> Result<Vec<PlayerMapRow>> {
        let mut statement = self.connection.prepare(
            "SELECT m.map_id, m.map_name, m.map_author, m.release_date, m.author_time, m.author_count, r.score
            FROM maps m
            LEFT JOIN records r ON r.map_id = m.map_id AND r.player_id = ?1
            ORDER BY m.release_date DESC, m.map_id ASC",
        )?;
        let rows = statement.query_map(params![player_id], |row| {
            Ok(PlayerMapRow {
                map_id: row.get(0)?,
                map_name: row.get(1)?,
                map_author: row.get(2)?,
                release_date: row.get(3)?,
                author_time: row.get(4)?,
                author_count: row.get(5)?,
                score: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn ensure_player(connection: &Connection, name: &str) -> Result<i64> {
    connection.execute(
        "INSERT INTO players (player_name) VALUES (?1)
            ON CONFLICT(player_name) DO NOTHING",
        params![name],
    )?;
    Ok(connection.query_row(
        "SELECT player_id FROM players WHERE player_name = ?1",
        params![name],
        |row| row.get(0),
    )?)
}

fn resolve_player(connection: &Connection, player: PlayerRef) -> Result<Option<i64>> {
    let found = match player {
        PlayerRef::ById(id) => connection
            .query_row("SELECT player_id FROM players WHERE player_id = ?1", params![id], |row| row.get(0))
            .optional()?,
        PlayerRef::ByName(name) => connection
            .query_row("SELECT player_id FROM players WHERE player_name = ?1", params![name], |row| row.get(0))
            .optional()?,
    };
    Ok(found)
}

/// Upserts one record. Returns the outcome and whether the row had already
/// been counted before this write.
fn write_record(
    connection: &Connection,
    player_id: i64,
    map_id: &str,
    score: i64,
    counted: bool,
) -> Result<(UpsertOutcome, bool)> {
    let previous: Option<bool> = connection
        .query_row(
            "SELECT counted FROM records WHERE player_id = ?1 AND map_id = ?2",
            params![player_id, map_id],
            |row| row.get(0),
        )
        .optional()?;
    connection.execute(
        "INSERT INTO records (player_id, map_id, score, counted) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(player_id, map_id) DO UPDATE SET
                score = excluded.score,
                counted = MAX(counted, excluded.counted)",
        params![player_id, map_id, score, counted],
    )?;
    Ok(match previous {
        Some(was_counted) => (UpsertOutcome::Updated, was_counted),
        None => (UpsertOutcome::Inserted, false),
    })
}

fn increment_author_count(connection: &Connection, map_id: &str) -> Result<()> {
    let changed = connection.execute(
        "UPDATE maps SET author_count = author_count + 1 WHERE map_id = ?1",
        params![map_id],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("map '{}'", map_id)));
    }
    Ok(())
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if c == '%' || c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
