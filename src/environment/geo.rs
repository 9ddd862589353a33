use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::environment::{EgressInfo, EgressProbe};
use crate::error::{AutomationError, AutomationResult};
use crate::settings::GeoEndpoint;

/// Egress lookup against public geolocation services, tried in order.
#[derive(Clone)]
pub struct HttpGeoProbe {
    client: Client,
    endpoints: Vec<GeoEndpoint>,
}

impl HttpGeoProbe {
    pub fn new(endpoints: Vec<GeoEndpoint>, timeout: Duration) -> AutomationResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutomationError::Environment(format!("Failed to initialize HTTP client: {}", e)))?;
        Ok(Self { client, endpoints })
    }

    fn query(&self, endpoint: &GeoEndpoint) -> Result<Option<EgressInfo>, reqwest::Error> {
        let body: Value = self
            .client
            .get(&endpoint.url)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(parse_egress(&body, endpoint))
    }
}

impl EgressProbe for HttpGeoProbe {
    fn egress(&self) -> Option<EgressInfo> {
        for endpoint in &self.endpoints {
            match self.query(endpoint) {
                Ok(Some(info)) => {
                    tracing::debug!(url = %endpoint.url, ip = %info.ip, country = %info.country_code, "egress resolved");
                    return Some(info);
                }
                Ok(None) => tracing::debug!(url = %endpoint.url, "geolocation answer unusable"),
                Err(e) => tracing::debug!(url = %endpoint.url, error = %e, "geolocation request failed"),
            }
        }
        tracing::warn!("public IP lookup failed on every endpoint");
        None
    }
}

/// Pull ip and country out of one service's JSON answer.
///
/// Services that signal failure with `"status": "fail"` are rejected, as are
/// answers missing either key.
pub fn parse_egress(body: &Value, endpoint: &GeoEndpoint) -> Option<EgressInfo> {
    if body.get("status").and_then(Value::as_str) == Some("fail") {
        return None;
    }
    let ip = body.get(&endpoint.ip_key)?.as_str()?.trim();
    let country = body.get(&endpoint.country_key)?.as_str()?.trim();
    if ip.is_empty() || country.is_empty() {
        return None;
    }
    Some(EgressInfo {
        ip: ip.to_string(),
        country_code: country.to_uppercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoints() -> Vec<GeoEndpoint> {
        GeoEndpoint::defaults()
    }

    #[test]
    fn test_each_service_uses_its_own_keys() {
        let eps = endpoints();
        let ipinfo = json!({"ip": "203.0.113.7", "country": "sg", "city": "Singapore"});
        let ipapi = json!({"status": "success", "countryCode": "HU", "query": "198.51.100.2"});
        let freeip = json!({"ipAddress": "192.0.2.9", "countryCode": "DE"});

        assert_eq!(
            parse_egress(&ipinfo, &eps[0]),
            Some(EgressInfo { ip: "203.0.113.7".to_string(), country_code: "SG".to_string() })
        );
        assert_eq!(parse_egress(&ipapi, &eps[1]).unwrap().country_code, "HU");
        assert_eq!(parse_egress(&freeip, &eps[2]).unwrap().ip, "192.0.2.9");
    }

    #[test]
    fn test_failed_or_incomplete_answers_rejected() {
        let eps = endpoints();
        let failed = json!({"status": "fail", "message": "reserved range", "query": "10.0.0.1"});
        let missing_country = json!({"ip": "203.0.113.7"});
        let wrong_keys = json!({"ip": "203.0.113.7", "country": "SG"});

        assert_eq!(parse_egress(&failed, &eps[1]), None);
        assert_eq!(parse_egress(&missing_country, &eps[0]), None);
        assert_eq!(parse_egress(&wrong_keys, &eps[2]), None);
    }
}
