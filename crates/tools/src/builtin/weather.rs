use async_trait::async_trait;
use policy::CapabilityRequest;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::args::required_str;
use crate::{Tool, ToolContext, ToolError, host_of};

/// Current weather via Open-Meteo (no API key needed).
pub struct GetWeather;

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    admin1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f64,
    #[serde(default)]
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: f64,
    weather_code: u32,
}

#[async_trait]
impl Tool for GetWeather {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather (temperature, wind, conditions) for a city or location."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or place name, e.g. 'New York City' or 'Paris'"
                }
            },
            "required": ["location"]
        })
    }

    fn capabilities(&self, _args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        let endpoints = ctx.endpoints();
        let mut hosts: Vec<String> = [&endpoints.geocoding, &endpoints.forecast]
            .into_iter()
            .filter_map(|url| host_of(url))
            .collect();
        hosts.dedup();
        hosts.into_iter().map(CapabilityRequest::net_http).collect()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let location = required_str(&args, "location")?.trim();
        if location.is_empty() {
            return Err(ToolError::InvalidInput("location must not be empty".into()));
        }

        let place = geocode(ctx, location).await?;

        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}&current=temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code",
            ctx.endpoints().forecast.trim_end_matches('/'),
            place.latitude,
            place.longitude,
        );
        let response = ctx.http().get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "forecast service returned {}",
                response.status()
            )));
        }
        let forecast: ForecastResponse = response.json().await?;
        let current = forecast.current;

        let place_name = [Some(place.name), place.admin1, place.country]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");

        Ok(json!({
            "location": place_name,
            "latitude": place.latitude,
            "longitude": place.longitude,
            "temperature_c": current.temperature_2m,
            "relative_humidity": current.relative_humidity_2m,
            "wind_speed_kmh": current.wind_speed_10m,
            "conditions": describe_weather_code(current.weather_code),
        }))
    }
}

async fn geocode(ctx: &ToolContext, location: &str) -> Result<Place, ToolError> {
    let url = format!(
        "{}/v1/search?name={}&count=1&language=en&format=json",
        ctx.endpoints().geocoding.trim_end_matches('/'),
        urlencoding::encode(location),
    );
    let response = ctx.http().get(&url).send().await?;
    if !response.status().is_success() {
        return Err(ToolError::Execution(format!(
            "geocoding service returned {}",
            response.status()
        )));
    }
    let body: GeocodingResponse = response.json().await?;
    body.results
        .into_iter()
        .next()
        .ok_or_else(|| ToolError::Execution(format!("location not found: {location}")))
}

/// WMO weather interpretation codes.
fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51 | 53 | 55 => "drizzle",
        56 | 57 => "freezing drizzle",
        61 | 63 | 65 => "rain",
        66 | 67 => "freezing rain",
        71 | 73 | 75 => "snow",
        77 => "snow grains",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95 => "thunderstorm",
        96 | 99 => "thunderstorm with hail",
        _ => "unknown",
    }
}
