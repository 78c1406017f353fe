use crate::enrichment::geocode::{GeocodeError, Geocoder, Placemark};
use crate::location::Coordinate;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";

/// Reverse geocoding through a Nominatim `/reverse` endpoint.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    endpoint: String,
}

impl NominatimGeocoder {
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

impl fmt::Debug for NominatimGeocoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NominatimGeocoder")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, coordinate: Coordinate) -> Result<Placemark, GeocodeError> {
        let latitude = format!("{:.6}", coordinate.latitude);
        let longitude = format!("{:.6}", coordinate.longitude);
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("format", "jsonv2"),
                ("lat", latitude.as_str()),
                ("lon", longitude.as_str()),
                ("zoom", "18"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body: ReverseResponse = response.json().await?;
        placemark_from_response(body)
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country_code: Option<String>,
}

fn placemark_from_response(body: ReverseResponse) -> Result<Placemark, GeocodeError> {
    if body.error.is_some() {
        return Err(GeocodeError::NotFound);
    }
    let address = body.address.ok_or(GeocodeError::NotFound)?;
    Ok(Placemark {
        thoroughfare: address.road,
        locality: address.city.or(address.town).or(address.village),
        country_code: address.country_code.map(|code| code.to_ascii_uppercase()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ReverseResponse {
        serde_json::from_str(json).expect("valid nominatim json")
    }

    #[test]
    fn maps_road_city_and_upper_cases_country() -> Result<(), GeocodeError> {
        let body = parse(
            r#"{"place_id":1,"address":{"road":"Via Po","city":"Torino","country_code":"it"}}"#,
        );

        let placemark = placemark_from_response(body)?;

        assert_eq!(placemark.thoroughfare.as_deref(), Some("Via Po"));
        assert_eq!(placemark.locality.as_deref(), Some("Torino"));
        assert_eq!(placemark.country_code.as_deref(), Some("IT"));
        Ok(())
    }

    #[test]
    fn falls_back_to_town_then_village() -> Result<(), GeocodeError> {
        let town = placemark_from_response(parse(r#"{"address":{"town":"Bra"}}"#))?;
        let village = placemark_from_response(parse(r#"{"address":{"village":"Cherasco"}}"#))?;

        assert_eq!(town.locality.as_deref(), Some("Bra"));
        assert_eq!(village.locality.as_deref(), Some("Cherasco"));
        assert_eq!(village.thoroughfare, None);
        Ok(())
    }

    #[test]
    fn error_payload_is_not_found() {
        let body = parse(r#"{"error":"Unable to geocode"}"#);

        assert!(matches!(
            placemark_from_response(body),
            Err(GeocodeError::NotFound)
        ));
    }
}
