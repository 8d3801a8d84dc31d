//! Command line definition and the runtime configuration built from it.
//!
//! Credentials are not part of the command line; see [`crate::auth`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::error::{Error, Result};
use crate::nadeo::{LIVE_SERVICES_URL, OAUTH_API_URL};
use crate::scanner::{RetryPolicy, ScanOptions, DEFAULT_OFFSET_CAP, DEFAULT_PAGE_SIZE};

pub const DEFAULT_DB_FILE: &str = "medal_tracker.db";
pub const DEFAULT_GROUP: &str = "Personal_Best";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_file: PathBuf,
    pub live_url: String,
    pub oauth_url: String,
    pub group: String,
    pub scan: ScanOptions,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_file: PathBuf::from(DEFAULT_DB_FILE),
            live_url: LIVE_SERVICES_URL.to_string(),
            oauth_url: OAUTH_API_URL.to_string(),
            group: DEFAULT_GROUP.to_string(),
            scan: ScanOptions::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Config> {
        let defaults = Config::default();
        let string = |id: &str| matches.get_one::<String>(id).cloned();
        let number = |id: &str| matches.get_one::<u32>(id).copied();

        let page_size = number("page-size").unwrap_or(DEFAULT_PAGE_SIZE);
        let offset_cap = number("offset-cap").unwrap_or(DEFAULT_OFFSET_CAP);
        if page_size > offset_cap {
            return Err(Error::Config(format!(
                "page size {} is larger than the offset cap {}",
                page_size, offset_cap
            )));
        }

        Ok(Config {
            db_file: string("file-db").map(PathBuf::from).unwrap_or(defaults.db_file),
            live_url: string("live-url").unwrap_or(defaults.live_url),
            oauth_url: string("oauth-url").unwrap_or(defaults.oauth_url),
            group: string("group").unwrap_or(defaults.group),
            scan: ScanOptions {
                page_size,
                offset_cap,
                start_offset: 0,
                retry: RetryPolicy {
                    max_attempts: number("retries")
                        .map(|retries| retries.saturating_add(1))
                        .unwrap_or(defaults.scan.retry.max_attempts),
                    ..RetryPolicy::default()
                },
            },
            request_timeout: number("timeout")
                .map(|secs| Duration::from_secs(u64::from(secs)))
                .unwrap_or(defaults.request_timeout),
        })
    }
}

pub fn cli() -> Command {
    Command::new("Author Medal Tracker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Collects author medals from the track of the day leaderboards and ranks players by them")
        .subcommand_required(true)
        .arg(Arg::new("file-db")
            .long("file-db")
            .value_name("FILE")
            .help("Sets the sqlite db file to read and write")
            .global(true))
        .arg(Arg::new("live-url")
            .long("live-url")
            .value_name("URL")
            .help("Base url of the live services")
            .global(true))
        .arg(Arg::new("oauth-url")
            .long("oauth-url")
            .value_name("URL")
            .help("Base url of the public OAuth api used for display names")
            .global(true))
        .arg(Arg::new("group")
            .long("group")
            .value_name("GROUP")
            .help("Leaderboard group to scan")
            .global(true))
        .arg(Arg::new("page-size")
            .long("page-size")
            .value_name("N")
            .help("Leaderboard entries requested per page")
            .value_parser(value_parser!(u32).range(1..))
            .global(true))
        .arg(Arg::new("offset-cap")
            .long("offset-cap")
            .value_name("N")
            .help("Never request leaderboard entries past this offset")
            .value_parser(value_parser!(u32).range(1..))
            .global(true))
        .arg(Arg::new("retries")
            .long("retries")
            .value_name("N")
            .help("Retries for a failed leaderboard page [default: 2]")
            .value_parser(value_parser!(u32))
            .global(true))
        .arg(Arg::new("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .help("Timeout of a single http request")
            .value_parser(value_parser!(u32).range(1..))
            .global(true))
        .subcommand(Command::new("ingest-map")
            .about("Ingests the author medals of one map")
            .arg(Arg::new("map").long("map").value_name("UID").required(true))
            .arg(Arg::new("release-date").long("release-date").value_name("YYYY-MM-DD").required(true))
            .arg(Arg::new("start-offset")
                .long("start-offset")
                .value_name("N")
                .help("Leaderboard offset to start at, to continue an interrupted ingestion")
                .value_parser(value_parser!(u32))))
        .subcommand(Command::new("ingest-totd")
            .about("Ingests every track of the day map of a month window")
            .arg(Arg::new("months").long("months").value_name("N").default_value("1").value_parser(value_parser!(u32)))
            .arg(Arg::new("offset").long("offset").value_name("N").default_value("0").value_parser(value_parser!(u32))))
        .subcommand(Command::new("ranking")
            .about("Lists players by number of author medals")
            .arg(Arg::new("limit").long("limit").value_name("N").default_value("50").value_parser(value_parser!(u32)))
            .arg(Arg::new("descending").long("descending").action(ArgAction::SetTrue))
            .arg(Arg::new("after-count").long("after-count").value_name("COUNT").value_parser(value_parser!(i64)).requires("after-id"))
            .arg(Arg::new("after-id").long("after-id").value_name("ID").value_parser(value_parser!(i64)).requires("after-count"))
            .arg(Arg::new("all").long("all").help("Walk every page").action(ArgAction::SetTrue).conflicts_with("after-count"))
            .arg(json_flag()))
        .subcommand(Command::new("player")
            .about("Shows the map overview of a player")
            .arg(Arg::new("name").required(true)))
        .subcommand(Command::new("map")
            .about("Shows the stored leaderboard of a map")
            .arg(Arg::new("uid").required(true))
            .arg(json_flag()))
        .subcommand(Command::new("search")
            .about("Searches players by name")
            .arg(Arg::new("query").required(true))
            .arg(Arg::new("limit").long("limit").value_name("N").default_value("50").value_parser(value_parser!(u32)))
            .arg(json_flag()))
        .subcommand(Command::new("record")
            .about("Writes a score for an existing player")
            .arg(Arg::new("player").required(true))
            .arg(Arg::new("map").required(true))
            .arg(Arg::new("score").required(true).value_parser(value_parser!(i64))))
}

fn json_flag() -> Arg {
    Arg::new("json").long("json").help("Prints the result as JSON").action(ArgAction::SetTrue)
}
