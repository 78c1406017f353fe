use crate::enrichment::speed_limit::{LookupError, MaxSpeed, SpeedLimitLookup, parse_maxspeed};
use crate::location::Coordinate;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";
pub const SEARCH_RADIUS_M: u32 = 50;

/// Speed limits from OpenStreetMap `maxspeed` tags via an Overpass endpoint.
pub struct OverpassLookup {
    http: reqwest::Client,
    endpoint: String,
}

impl OverpassLookup {
    pub fn new(
        endpoint: String,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { http, endpoint })
    }
}

impl fmt::Debug for OverpassLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverpassLookup")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl SpeedLimitLookup for OverpassLookup {
    async fn lookup(&self, coordinate: Coordinate) -> Result<MaxSpeed, LookupError> {
        let query = build_query(coordinate);
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("data", query.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body: OverpassResponse = response.json().await?;
        extract_max_speed(&body)
    }
}

/// One highway way within the search radius that carries a `maxspeed` tag, tags only.
pub fn build_query(coordinate: Coordinate) -> String {
    format!(
        "[out:json][timeout:5];way(around:{},{:.6},{:.6})[highway][maxspeed];out tags 1;",
        SEARCH_RADIUS_M, coordinate.latitude, coordinate.longitude
    )
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn extract_max_speed(body: &OverpassResponse) -> Result<MaxSpeed, LookupError> {
    let raw = body
        .elements
        .iter()
        .find_map(|element| element.tags.get("maxspeed"))
        .ok_or(LookupError::NoTaggedRoad)?;
    parse_maxspeed(raw).ok_or_else(|| LookupError::Unparsable(raw.clone()))
}
