use async_trait::async_trait;
use policy::CapabilityRequest;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::args::required_f64;
use crate::{Tool, ToolContext, ToolError, host_of};

/// Reverse geocoding via Nominatim.
pub struct GetAddressFromCoordinates;

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Map<String, Value>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Tool for GetAddressFromCoordinates {
    fn name(&self) -> &str {
        "get_address_from_coordinates"
    }

    fn description(&self) -> &str {
        "Look up the street address of a latitude/longitude coordinate (reverse geocoding)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": {"type": "number", "description": "Latitude in degrees, -90 to 90"},
                "longitude": {"type": "number", "description": "Longitude in degrees, -180 to 180"}
            },
            "required": ["latitude", "longitude"]
        })
    }

    fn capabilities(&self, _args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        host_of(&ctx.endpoints().nominatim)
            .map(CapabilityRequest::net_http)
            .into_iter()
            .collect()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let lat = required_f64(&args, "latitude")?;
        let lon = required_f64(&args, "longitude")?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ToolError::InvalidInput(format!("latitude out of range: {lat}")));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(ToolError::InvalidInput(format!("longitude out of range: {lon}")));
        }

        let url = format!(
            "{}/reverse?format=jsonv2&lat={lat}&lon={lon}",
            ctx.endpoints().nominatim.trim_end_matches('/'),
        );
        let response = ctx.http().get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "geocoding service returned {}",
                response.status()
            )));
        }
        let body: ReverseResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(ToolError::Execution(error));
        }
        let address = body
            .display_name
            .ok_or_else(|| ToolError::Execution("no address found".into()))?;

        Ok(json!({
            "latitude": lat,
            "longitude": lon,
            "address": address,
            "components": body.address,
        }))
    }
}
