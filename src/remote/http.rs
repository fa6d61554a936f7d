//! Riot API client over HTTPS (reqwest)
//!
//! Account and match endpoints live on the regional routing host
//! (`europe.api.riotgames.com`), league endpoints on the platform host
//! (`euw1.api.riotgames.com`). The regional host is derived from the platform
//! unless the config overrides it.

use crate::records::{Account, LeagueEntry, RawTimeline};
use crate::remote::{ClientFactory, MatchIdsQuery, RemoteDataClient, RemoteError, RemoteFuture};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_HEADER: &str = "X-Riot-Token";

/// Regional routing value for a platform
pub fn regional_route(platform: &str) -> &'static str {
    match platform.to_ascii_lowercase().as_str() {
        "na1" | "br1" | "la1" | "la2" => "americas",
        "kr" | "jp1" => "asia",
        "oc1" | "ph2" | "sg2" | "th2" | "tw2" | "vn2" => "sea",
        _ => "europe",
    }
}

/// Client bound to one API key
pub struct HttpRemoteClient {
    http: Client,
    api_key: String,
    platform_base: String,
    regional_base: String,
}

impl HttpRemoteClient {
    pub fn new(api_key: &str, platform: &str, region: Option<&str>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let region = region.unwrap_or_else(|| regional_route(platform));
        Ok(HttpRemoteClient {
            http,
            api_key: api_key.to_string(),
            platform_base: format!("https://{}.api.riotgames.com", platform.to_ascii_lowercase()),
            regional_base: format!("https://{}.api.riotgames.com", region),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .header(TOKEN_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(format!("failed to make request: {}", e)))?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::MalformedResponse(e.to_string())),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(url)),
            StatusCode::TOO_MANY_REQUESTS => Err(RemoteError::RateLimited {
                retry_after_secs: response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok()),
            }),
            status => Err(RemoteError::Transport(format!(
                "API request failed with status {}",
                status.as_u16()
            ))),
        }
    }
}

impl RemoteDataClient for HttpRemoteClient {
    fn account_by_riot_id<'a>(
        &'a self,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> RemoteFuture<'a, Account> {
        Box::pin(async move {
            let url = format!(
                "{}/riot/account/v1/accounts/by-riot-id/{}/{}",
                self.regional_base,
                encode_path_segment(game_name),
                encode_path_segment(tag_line)
            );
            self.get_json(url, &[]).await
        })
    }

    fn match_ids_page<'a>(
        &'a self,
        puuid: &'a str,
        query: &'a MatchIdsQuery,
    ) -> RemoteFuture<'a, Vec<String>> {
        Box::pin(async move {
            let url = format!(
                "{}/lol/match/v5/matches/by-puuid/{}/ids",
                self.regional_base, puuid
            );
            let mut params = vec![
                ("startTime", query.start_time.to_string()),
                ("start", query.start.to_string()),
                ("count", query.count.to_string()),
            ];
            if let Some(queue) = query.queue {
                params.push(("queue", queue.to_string()));
            }
            self.get_json(url, &params).await
        })
    }

    fn match_detail<'a>(&'a self, match_id: &'a str) -> RemoteFuture<'a, Value> {
        Box::pin(async move {
            let url = format!("{}/lol/match/v5/matches/{}", self.regional_base, match_id);
            self.get_json(url, &[]).await
        })
    }

    fn league_entries<'a>(&'a self, puuid: &'a str) -> RemoteFuture<'a, Vec<LeagueEntry>> {
        Box::pin(async move {
            let url = format!(
                "{}/lol/league/v4/entries/by-puuid/{}",
                self.platform_base, puuid
            );
            self.get_json(url, &[]).await
        })
    }

    fn match_timeline<'a>(&'a self, match_id: &'a str) -> RemoteFuture<'a, RawTimeline> {
        Box::pin(async move {
            let url = format!(
                "{}/lol/match/v5/matches/{}/timeline",
                self.regional_base, match_id
            );
            self.get_json(url, &[]).await
        })
    }
}

/// Percent-encode a Riot ID half for use as a path segment
fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Builds one `HttpRemoteClient` per API key
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    platform: String,
    region: Option<String>,
}

impl HttpClientFactory {
    pub fn new(platform: &str, region: Option<&str>) -> Self {
        HttpClientFactory {
            platform: platform.to_string(),
            region: region.map(str::to_string),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RemoteDataClient>, RemoteError> {
        let client = HttpRemoteClient::new(api_key, &self.platform, self.region.as_deref())?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_route() {
        assert_eq!(regional_route("euw1"), "europe");
        assert_eq!(regional_route("NA1"), "americas");
        assert_eq!(regional_route("kr"), "asia");
        assert_eq!(regional_route("sg2"), "sea");
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("Faker"), "Faker");
        assert_eq!(encode_path_segment("Hide on bush"), "Hide%20on%20bush");
        assert_eq!(encode_path_segment("é"), "%C3%A9");
    }

    #[test]
    fn test_client_hosts() {
        let client = HttpRemoteClient::new("key", "EUW1", None).unwrap();
        assert_eq!(client.platform_base, "https://euw1.api.riotgames.com");
        assert_eq!(client.regional_base, "https://europe.api.riotgames.com");

        let client = HttpRemoteClient::new("key", "euw1", Some("americas")).unwrap();
        assert_eq!(client.regional_base, "https://americas.api.riotgames.com");
    }
}
