use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ingest::{MapCatalog, MapInfo, TotdMap};
use crate::scanner::{LeaderboardSource, RawEntry};

pub const LIVE_SERVICES_URL: &str = "https://live-services.trackmania.nadeo.live";
pub const OAUTH_API_URL: &str = "https://api.trackmania.com";

/// The display-name endpoint accepts at most this many ids per request.
const DISPLAY_NAMES_PER_REQUEST: usize = 50;

#[derive(Deserialize, Debug)]
struct LiveMapInfo {
	uid: String,
	name: String,
	author: String,
	#[serde(rename = "authorTime")]
	author_time: Option<i64>,
	#[serde(rename = "goldTime", default)]
	gold_time: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
struct TopZone {
	#[serde(default)]
	top: Vec<RawEntry>,
}

#[derive(Deserialize, Debug, Default)]
struct TopResponse {
	#[serde(default)]
	tops: Vec<TopZone>,
}

#[derive(Deserialize, Debug)]
struct TotdDay {
	#[serde(rename = "monthDay")]
	month_day: u32,
	#[serde(rename = "mapUid", default)]
	map_uid: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TotdMonth {
	year: i32,
	month: u32,
	#[serde(default)]
	days: Vec<TotdDay>,
}

#[derive(Deserialize, Debug)]
struct TotdResponse {
	#[serde(rename = "monthList", default)]
	month_list: Vec<TotdMonth>,
}

fn entries_from_tops(response: TopResponse) -> Vec<RawEntry> {
	response.tops.into_iter().flat_map(|zone| zone.top).collect()
}

fn maps_from_months(response: TotdResponse) -> Vec<TotdMap> {
	let mut maps = Vec::new();
	for month in response.month_list {
		for day in month.days {
			match day.map_uid {
				Some(map_uid) if !map_uid.is_empty() => maps.push(TotdMap {
					map_uid,
					release_date: format!("{}-{:02}-{:02}", month.year, month.month, day.month_day),
				}),
				_ => {}
			}
		}
	}
	maps
}

impl From<LiveMapInfo> for MapInfo {
	fn from(live: LiveMapInfo) -> MapInfo {
		MapInfo {
			uid: live.uid,
			name: live.name,
			author: live.author,
			author_time: live.author_time,
			gold_time: live.gold_time.unwrap_or(0),
		}
	}
}

async fn get_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<Option<T>> {
	let response = request.send().await?;
	let status = response.status();
	if status == reqwest::StatusCode::NOT_FOUND {
		return Ok(None);
	}
	if !status.is_success() {
		return Err(Error::Status { status_code: status });
	}
	Ok(Some(response.json::<T>().await?))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
	Ok(reqwest::Client::builder()
		.timeout(timeout)
		.user_agent(concat!("author_medal_tracker/", env!("CARGO_PKG_VERSION")))
		.build()?)
}

/// Client for the live services: leaderboards, maps and track of the day.
pub struct LiveClient {
	client: reqwest::Client,
	base_url: String,
	token: String,
}

impl LiveClient {
	pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<LiveClient> {
		Ok(LiveClient {
			client: http_client(timeout)?,
			base_url: base_url.trim_end_matches('/').to_string(),
			token,
		})
	}

	fn get(&self, path: &str) -> reqwest::RequestBuilder {
		self.client
			.get(&format!("{}{}", self.base_url, path))
			.header("Authorization", format!("nadeo_v1 t={}", self.token))
	}
}

#[async_trait]
impl LeaderboardSource for LiveClient {
	async fn fetch_page(&self, group: &str, map_id: &str, length: u32, offset: u32) -> Result<Vec<RawEntry>> {
		debug!(group, map_id, length, offset, "fetching leaderboard page");
		let request = self
			.get(&format!("/api/token/leaderboard/group/{}/map/{}/top", group, map_id))
			.query(&[("length", length.to_string()), ("onlyWorld", "true".to_string()), ("offset", offset.to_string())]);
		let response: Option<TopResponse> = get_json(request).await?;
		Ok(entries_from_tops(response.unwrap_or_default()))
	}
}

#[async_trait]
impl MapCatalog for LiveClient {
	async fn map_info(&self, map_uid: &str) -> Result<Option<MapInfo>> {
		let response: Option<LiveMapInfo> = get_json(self.get(&format!("/api/token/map/{}", map_uid))).await?;
		Ok(response.map(MapInfo::from))
	}

	async fn totd_maps(&self, length: u32, offset: u32) -> Result<Vec<TotdMap>> {
		let request = self
			.get("/api/token/campaign/month")
			.query(&[("length", length), ("offset", offset)]);
		let response: Option<TotdResponse> = get_json(request).await?;
		Ok(response.map(maps_from_months).unwrap_or_default())
	}
}

/// Maps account ids to display names. Presentation only.
#[async_trait]
pub trait NameResolver: Send + Sync {
	async fn resolve_names(&self, account_ids: &[String]) -> Result<HashMap<String, String>>;
}

pub struct OAuthClient {
	client: reqwest::Client,
	base_url: String,
	token: String,
}

impl OAuthClient {
	pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<OAuthClient> {
		Ok(OAuthClient {
			client: http_client(timeout)?,
			base_url: base_url.trim_end_matches('/').to_string(),
			token,
		})
	}
}

#[async_trait]
impl NameResolver for OAuthClient {
	async fn resolve_names(&self, account_ids: &[String]) -> Result<HashMap<String, String>> {
		let mut names = HashMap::new();
		for chunk in account_ids.chunks(DISPLAY_NAMES_PER_REQUEST) {
			let query: Vec<(&str, &str)> = chunk.iter().map(|id| ("accountId[]", id.as_str())).collect();
			let request = self
				.client
				.get(&format!("{}/api/display-names", self.base_url))
				.bearer_auth(&self.token)
				.query(&query);
			let response: Option<HashMap<String, String>> = get_json(request).await?;
			names.extend(response.unwrap_or_default());
		}
		Ok(names)
	}
}
