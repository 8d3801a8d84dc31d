use std::collections::HashMap;

use clap::ArgMatches;
use serde_derive::Serialize;
use tracing::{info, warn};

use author_medal_tracker::auth::{Audience, EnvTokenProvider, TokenProvider};
use author_medal_tracker::config::{self, Config};
use author_medal_tracker::display::{format_optional_time, format_time};
use author_medal_tracker::nadeo::{LiveClient, NameResolver, OAuthClient};
use author_medal_tracker::store::Map;
use author_medal_tracker::{
    Direction, Error, MedalIngestionPipeline, PageRequest, PlayerRef, RankedPlayer, RankingCursor, RankingPaginator,
    RecordStore, Result,
};

#[derive(Serialize)]
struct RankingOutput<'a> {
    players: &'a [RankedPlayer],
    next: Option<RankingCursor>,
}

#[derive(Serialize)]
struct MapRecord {
    player: String,
    score: i64,
}

#[derive(Serialize)]
struct MapOutput {
    map: Option<Map>,
    records: Vec<MapRecord>,
}

struct App {
    config: Config,
    store: RecordStore,
    tokens: EnvTokenProvider,
}

impl App {
    fn new(config: Config) -> Result<App> {
        let store = RecordStore::open(&config.db_file)?;
        Ok(App {
            config,
            store,
            tokens: EnvTokenProvider::from_env(),
        })
    }

    async fn live_client(&self) -> Result<LiveClient> {
        let token = self.tokens.token(Audience::Live).await?;
        LiveClient::new(&self.config.live_url, token, self.config.request_timeout)
    }

    /// Display names when an OAuth token is configured, otherwise nothing.
    async fn display_names(&self, account_ids: Vec<String>) -> HashMap<String, String> {
        let token = match self.tokens.token(Audience::OAuth).await {
            Ok(token) => token,
            Err(_) => return HashMap::new(),
        };
        let resolved = match OAuthClient::new(&self.config.oauth_url, token, self.config.request_timeout) {
            Ok(client) => client.resolve_names(&account_ids).await,
            Err(e) => Err(e),
        };
        resolved.unwrap_or_else(|e| {
            warn!(error = %e, "could not resolve display names");
            HashMap::new()
        })
    }
}

async fn ingest_map(app: &mut App, matches: &ArgMatches) -> Result<()> {
    let map = required(matches, "map")?;
    let release_date = required(matches, "release-date")?;
    let mut scan = app.config.scan;
    scan.start_offset = matches.get_one::<u32>("start-offset").copied().unwrap_or(0);
    let live = app.live_client().await?;
    let pipeline = MedalIngestionPipeline::new(&live, &live, &app.config.group, scan);
    let report = match pipeline.ingest_map(&mut app.store, &map, &release_date).await {
        Ok(report) => report,
        Err(e) => {
            if let Error::Fetch { resume_offset, .. } = &e {
                println!("Entries before offset {0} are stored, continue with --start-offset {0}", resume_offset);
            }
            return Err(e);
        }
    };
    println!(
        "{}: {} author medals ({} new), {} counted{}",
        report.map_id,
        report.accepted,
        report.inserted,
        report.newly_counted,
        if report.truncated { ", truncated at the offset cap" } else { "" }
    );
    Ok(())
}

async fn ingest_totd(app: &mut App, matches: &ArgMatches) -> Result<()> {
    let months = matches.get_one::<u32>("months").copied().unwrap_or(1);
    let offset = matches.get_one::<u32>("offset").copied().unwrap_or(0);
    let live = app.live_client().await?;
    let pipeline = MedalIngestionPipeline::new(&live, &live, &app.config.group, app.config.scan);
    let reports = pipeline.ingest_totd(&mut app.store, months, offset).await?;
    for report in &reports {
        println!(
            "{}: {} author medals, {} counted{}",
            report.map_id,
            report.accepted,
            report.newly_counted,
            if report.truncated { " (truncated)" } else { "" }
        );
    }
    println!("Ingested {} maps", reports.len());
    Ok(())
}

async fn print_ranking(app: &App, rows: &[RankedPlayer], total_maps: i64) {
    let names = app.display_names(rows.iter().map(|r| r.name.clone()).collect()).await;
    for row in rows {
        println!(
            "#{:<8} {:<36} {:>5} author  {:>5} missing  ({})",
            row.id,
            names.get(&row.name).unwrap_or(&row.name),
            row.record_count,
            total_maps - row.record_count,
            row.name
        );
    }
}

async fn ranking(app: &App, matches: &ArgMatches) -> Result<()> {
    let limit = matches.get_one::<u32>("limit").copied().unwrap_or(50);
    let ascending = !matches.get_flag("descending");
    let json = matches.get_flag("json");
    let total_maps = app.store.total_maps()?;
    let paginator = RankingPaginator::new(&app.store);

    if matches.get_flag("all") {
        let mut players = Vec::new();
        for page in paginator.pages(limit, Direction::from_ascending(ascending)) {
            let page = page?;
            if json {
                players.extend(page);
            } else {
                print_ranking(app, &page, total_maps).await;
            }
        }
        if json {
            print_json(&RankingOutput { players: &players, next: None })?;
        }
        return Ok(());
    }

    let request = PageRequest::from_parts(
        matches.get_one::<i64>("after-count").copied(),
        matches.get_one::<i64>("after-id").copied(),
        limit,
        ascending,
    )?;
    let rows = paginator.page(&request)?;
    if json {
        return print_json(&RankingOutput { players: &rows, next: rows.last().map(RankedPlayer::cursor) });
    }
    print_ranking(app, &rows, total_maps).await;
    if let Some(last) = rows.last() {
        let cursor = last.cursor();
        println!("next page: --after-count {} --after-id {}", cursor.last_count, cursor.last_id);
    }
    Ok(())
}

async fn player(app: &App, matches: &ArgMatches) -> Result<()> {
    let name = required(matches, "name")?;
    let player_id = app
        .store
        .player_id(&name)?
        .ok_or_else(|| Error::NotFound(format!("player '{}'", name)))?;
    let maps = app.store.player_maps(player_id)?;
    let authors = maps.iter().map(|m| m.map_author.clone()).collect::<std::collections::HashSet<_>>();
    let names = app.display_names(authors.into_iter().collect()).await;

    println!("{} holds {} author medals", name, app.store.record_count(PlayerRef::ById(player_id))?);
    for map in &maps {
        let medal = match (map.score, map.author_time) {
            (Some(score), Some(author_time)) if score <= author_time => "AT",
            _ => "",
        };
        println!(
            "{}  {:<32} {:<20} {:>5} ATs  {:>10}  {:>10} {}",
            map.release_date,
            map.map_name,
            names.get(&map.map_author).unwrap_or(&map.map_author),
            map.author_count,
            format_optional_time(map.author_time),
            format_optional_time(map.score),
            medal
        );
    }
    Ok(())
}

fn map(app: &App, matches: &ArgMatches) -> Result<()> {
    let uid = required(matches, "uid")?;
    if matches.get_flag("json") {
        let records = app
            .store
            .records_for_map(&uid)?
            .into_iter()
            .map(|(player, score)| MapRecord { player, score })
            .collect();
        return print_json(&MapOutput { map: app.store.map(&uid)?, records });
    }
    match app.store.map(&uid)? {
        Some(map) => println!(
            "{} by {} ({}), author {} gold {}, {} author medals",
            map.name,
            map.author,
            map.release_date,
            format_optional_time(map.author_time),
            format_time(map.gold_time),
            map.author_count
        ),
        None => println!("{} is not stored", uid),
    }
    for (position, (player, score)) in app.store.records_for_map(&uid)?.iter().enumerate() {
        println!("{:>5}. {:<36} {}", position + 1, player, format_time(*score));
    }
    Ok(())
}

fn search(app: &App, matches: &ArgMatches) -> Result<()> {
    let query = required(matches, "query")?;
    let limit = matches.get_one::<u32>("limit").copied().unwrap_or(50);
    let players = app.store.search_players(&query, limit)?;
    if matches.get_flag("json") {
        return print_json(&players);
    }
    for player in players {
        println!("#{:<8} {}", player.id, player.name);
    }
    Ok(())
}

fn record(app: &mut App, matches: &ArgMatches) -> Result<()> {
    let player = required(matches, "player")?;
    let map = required(matches, "map")?;
    let score = matches
        .get_one::<i64>("score")
        .copied()
        .ok_or_else(|| Error::Config("missing score".to_string()))?;
    let outcome = app.store.upsert_record(PlayerRef::ByName(&player), &map, score)?;
    println!("{:?} {} on {}: {}", outcome, player, map, format_time(score));
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| Error::Config(format!("missing {}", id)))
}

async fn run_app(app: &mut App, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("ingest-map", sub)) => ingest_map(app, sub).await,
        Some(("ingest-totd", sub)) => ingest_totd(app, sub).await,
        Some(("ranking", sub)) => ranking(app, sub).await,
        Some(("player", sub)) => player(app, sub).await,
        Some(("map", sub)) => map(app, sub),
        Some(("search", sub)) => search(app, sub),
        Some(("record", sub)) => record(app, sub),
        _ => Err(Error::Config("unknown command".to_string())),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = config::cli().get_matches();

    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(e) => {
            println!("Failed to start because {}", e);
            std::process::exit(1);
        }
    };
    info!(db = %config.db_file.display(), "opening database");

    let mut app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            println!("Failed to start because {}", e);
            std::process::exit(1);
        }
    };

    let result = run_app(&mut app, &matches).await;
    if let Err(e) = result {
        println!("Failed because {}", e);
        std::process::exit(1);
    }

    if let Err(e) = app.store.close() {
        println!("Failed because {}", e);
        std::process::exit(1);
    }
}
