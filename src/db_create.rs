pub fn get_statements() -> Vec<&'static str> {
[
r#"
CREATE TABLE IF NOT EXISTS players (
	player_id INTEGER PRIMARY KEY AUTOINCREMENT,
	player_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS maps (
	map_id TEXT NOT NULL PRIMARY KEY,
	map_name TEXT NOT NULL,
	map_author TEXT NOT NULL,
	release_date TEXT NOT NULL,
	author_time INTEGER,
	gold_time INTEGER NOT NULL,
	author_count INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS records (
	player_id INTEGER NOT NULL,
	map_id TEXT NOT NULL,
	score INTEGER NOT NULL,
	counted INTEGER NOT NULL DEFAULT 0,
	PRIMARY KEY(player_id, map_id),
	FOREIGN KEY(player_id) REFERENCES players(player_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS index_records_player_id ON records(player_id);
CREATE INDEX IF NOT EXISTS index_records_map_score ON records(map_id, score);

CREATE INDEX IF NOT EXISTS index_maps_release_date ON maps(release_date);
"#,
].to_vec()
}
