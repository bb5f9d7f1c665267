//! Boundary normalization for the upstream feed documents.
//!
//! The vehicle feed and the route table come from an uncontrolled
//! third-party source with no guaranteed schema: the feed arrives either as
//! `{ "entity": [...] }` or a bare array, ids show up as strings or numbers,
//! and field spellings drift between camelCase and snake_case across feed
//! revisions. All of that tolerance lives here; everything past this module
//! works on one canonical shape.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::{Position, RouteRecord, RouteTable, VehicleReport};

/// An identifier that may arrive as a JSON string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    /// Trimmed string form used for all join-key comparisons.
    pub fn normalized(&self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// A report timestamp in any of the encodings the feed has been seen to use.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(i64),
    Fractional(f64),
    Text(String),
}

impl RawTimestamp {
    /// Parse to UTC. Returns None for values that are present but garbage.
    fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Seconds(secs) => DateTime::from_timestamp(*secs, 0),
            RawTimestamp::Fractional(secs) => DateTime::from_timestamp(*secs as i64, 0),
            RawTimestamp::Text(s) => {
                let s = s.trim();
                if let Ok(secs) = s.parse::<i64>() {
                    return DateTime::from_timestamp(secs, 0);
                }
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }
}

/// Why an individual feed record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Record does not deserialize at all
    MalformedRecord,
    MissingVehicleId,
    /// Vehicle is temporarily off-grid; an expected condition, not an error
    MissingPosition,
    /// Timestamp present but unparseable
    InvalidTimestamp,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedRecord => "malformed_record",
            RejectReason::MissingVehicleId => "missing_vehicle_id",
            RejectReason::MissingPosition => "missing_position",
            RejectReason::InvalidTimestamp => "invalid_timestamp",
        }
    }
}

/// A per-record rejection. Rejections never abort the batch.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub vehicle_id: Option<String>,
    pub reason: RejectReason,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("vehicle feed document is neither an entity wrapper nor an array")]
    UnrecognizedFeedShape,
    #[error("route table document is neither a record list nor a display map")]
    UnrecognizedRouteTableShape,
}

/// Result of normalizing one vehicle feed document.
#[derive(Debug)]
pub struct NormalizedFeed {
    pub reports: Vec<VehicleReport>,
    pub rejections: Vec<Rejection>,
}

/// Result of normalizing one route table document.
#[derive(Debug)]
pub struct NormalizedRouteTable {
    pub table: RouteTable,
    /// Records dropped for having no usable route id
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVehicleFeed {
    Wrapped { entity: Vec<Value> },
    Bare(Vec<Value>),
}

#[derive(Debug, Clone, Deserialize)]
struct RawVehicleReport {
    #[serde(default, alias = "vehicleId", alias = "id")]
    vehicle_id: Option<RawId>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    position: Option<RawPosition>,
    #[serde(default, alias = "routeId")]
    route_id: Option<RawId>,
    #[serde(default, alias = "reportTimestamp", alias = "timestamp")]
    report_timestamp: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPosition {
    #[serde(default, alias = "lat")]
    latitude: Option<f64>,
    #[serde(default, alias = "lon", alias = "lng")]
    longitude: Option<f64>,
}

/// Normalize a raw vehicle feed document into canonical reports.
///
/// Accepts both upstream shapes. Each record is validated independently;
/// invalid records become [`Rejection`]s and the rest of the batch proceeds.
pub fn normalize_vehicle_feed(document: Value) -> Result<NormalizedFeed, NormalizeError> {
    let records = match serde_json::from_value::<RawVehicleFeed>(document) {
        Ok(RawVehicleFeed::Wrapped { entity }) => entity,
        Ok(RawVehicleFeed::Bare(records)) => records,
        Err(_) => return Err(NormalizeError::UnrecognizedFeedShape),
    };

    let mut reports = Vec::with_capacity(records.len());
    let mut rejections = Vec::new();

    for record in records {
        match serde_json::from_value::<RawVehicleReport>(record) {
            Ok(raw) => match validate_report(raw) {
                Ok(report) => reports.push(report),
                Err(rejection) => rejections.push(rejection),
            },
            Err(_) => rejections.push(Rejection {
                vehicle_id: None,
                reason: RejectReason::MalformedRecord,
            }),
        }
    }

    Ok(NormalizedFeed {
        reports,
        rejections,
    })
}

fn validate_report(raw: RawVehicleReport) -> Result<VehicleReport, Rejection> {
    let vehicle_id = raw
        .vehicle_id
        .as_ref()
        .map(RawId::normalized)
        .filter(|id| !id.is_empty())
        .ok_or(Rejection {
            vehicle_id: None,
            reason: RejectReason::MissingVehicleId,
        })?;

    let position = match raw.position {
        Some(RawPosition {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }) if latitude.is_finite() && longitude.is_finite() => Position {
            latitude,
            longitude,
        },
        _ => {
            return Err(Rejection {
                vehicle_id: Some(vehicle_id),
                reason: RejectReason::MissingPosition,
            })
        }
    };

    // absent is a routine feed gap; present-but-garbage rejects the record
    let report_timestamp = match raw.report_timestamp {
        Some(raw_ts) => match raw_ts.parse() {
            Some(ts) => Some(ts),
            None => {
                return Err(Rejection {
                    vehicle_id: Some(vehicle_id),
                    reason: RejectReason::InvalidTimestamp,
                })
            }
        },
        None => None,
    };

    let label = raw
        .label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    Ok(VehicleReport {
        vehicle_id,
        label,
        position,
        route_id: raw.route_id.as_ref().map(RawId::normalized),
        report_timestamp,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRouteTable {
    Wrapped { routes: Vec<Value> },
    Records(Vec<Value>),
    DisplayMap(HashMap<String, String>),
}

#[derive(Debug, Clone, Deserialize)]
struct RawRouteRecord {
    #[serde(default, alias = "routeId", alias = "id")]
    route_id: Option<RawId>,
    #[serde(default, alias = "route_short_name", alias = "shortName")]
    short_name: Option<String>,
    #[serde(default, alias = "route_long_name", alias = "longName")]
    long_name: Option<String>,
}

/// Normalize a raw route table document.
///
/// Accepts a `{ "routes": [...] }` wrapper, a bare record array, or a flat
/// map of route id to display name. The flat form carries the display
/// string in both resolved fields.
pub fn normalize_route_table(document: Value) -> Result<NormalizedRouteTable, NormalizeError> {
    let records = match serde_json::from_value::<RawRouteTable>(document) {
        Ok(RawRouteTable::Wrapped { routes }) => routes,
        Ok(RawRouteTable::Records(records)) => records,
        Ok(RawRouteTable::DisplayMap(map)) => {
            let records = map
                .into_iter()
                .filter(|(id, _)| !id.trim().is_empty())
                .map(|(id, display)| RouteRecord {
                    route_id: id.trim().to_string(),
                    short_name: display.clone(),
                    long_name: display,
                })
                .collect();
            return Ok(NormalizedRouteTable {
                table: RouteTable::from_records(records),
                skipped: 0,
            });
        }
        Err(_) => return Err(NormalizeError::UnrecognizedRouteTableShape),
    };

    let mut parsed = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for record in records {
        let raw = match serde_json::from_value::<RawRouteRecord>(record) {
            Ok(raw) => raw,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let route_id = match raw
            .route_id
            .as_ref()
            .map(RawId::normalized)
            .filter(|id| !id.is_empty())
        {
            Some(id) => id,
            None => {
                skipped += 1;
                continue;
            }
        };
        let short_name = raw
            .short_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| route_id.clone());
        let long_name = raw
            .long_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| short_name.clone());
        parsed.push(RouteRecord {
            route_id,
            short_name,
            long_name,
        });
    }

    Ok(NormalizedRouteTable {
        table: RouteTable::from_records(parsed),
        skipped,
    })
}
