use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::reconcile::{
    DisplayBucket, FleetEntry, FleetSnapshot, Position, Reconciler, RouteTable,
};

/// UI-ready view of one vehicle in the reconciled fleet snapshot
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VehicleView {
    /// Stable vehicle identifier
    pub vehicle_id: String,
    /// Fleet number shown in the UI
    pub display_label: String,
    /// Resolved route code (sentinel "??" when unresolvable)
    pub route_short_name: String,
    /// Resolved route name (sentinel when unresolvable)
    pub route_long_name: String,
    /// Latest reported position
    pub position: Position,
    /// Recent positions, oldest first, bounded by the trail cap
    pub trail: Vec<Position>,
    /// Whether the last report exceeds the staleness threshold
    pub is_stale: bool,
    /// Visual classification (pinned > stale > active)
    pub bucket: DisplayBucket,
    /// Out-of-service / work-order flag
    pub pinned: bool,
    /// Timestamp of the last report (ISO 8601)
    pub last_seen_at: String,
}

impl VehicleView {
    pub fn from_entry(
        entry: &FleetEntry,
        routes: &RouteTable,
        reconciler: &Reconciler,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let position = entry.position()?;
        let resolved = routes.resolve(entry.route_id.as_deref());
        Some(Self {
            vehicle_id: entry.vehicle_id.clone(),
            display_label: entry.display_label.clone(),
            route_short_name: resolved.short_name,
            route_long_name: resolved.long_name,
            position,
            trail: entry.trail.clone(),
            is_stale: reconciler.is_stale(entry, now),
            bucket: reconciler.classify(entry, now),
            pinned: entry.pinned,
            last_seen_at: entry.last_seen_at.to_rfc3339(),
        })
    }
}

/// Response containing the full reconciled fleet snapshot
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FleetListResponse {
    /// Map of vehicle_id to vehicle view
    pub vehicles: HashMap<String, VehicleView>,
    /// Total number of vehicles in the snapshot
    pub total_count: usize,
    /// Number of active vehicles
    pub active_count: usize,
    /// Number of stale (ghost) vehicles
    pub stale_count: usize,
    /// Number of pinned (out-of-service) vehicles
    pub pinned_count: usize,
    /// When the snapshot was last updated by a poll cycle
    pub snapshot_updated_at: Option<String>,
    /// Timestamp when this response was generated
    pub timestamp: String,
}

/// Assemble the full fleet view from the shared stores.
///
/// Shared between the REST handler and the WebSocket push path.
pub fn build_fleet_list(
    fleet: &FleetSnapshot,
    routes: &RouteTable,
    reconciler: &Reconciler,
    now: DateTime<Utc>,
) -> FleetListResponse {
    let mut vehicles = HashMap::new();
    let mut active_count = 0;
    let mut stale_count = 0;
    let mut pinned_count = 0;

    for entry in fleet.entries() {
        let Some(view) = VehicleView::from_entry(entry, routes, reconciler, now) else {
            continue;
        };
        match view.bucket {
            DisplayBucket::Active => active_count += 1,
            DisplayBucket::Stale => stale_count += 1,
            DisplayBucket::Pinned => pinned_count += 1,
        }
        vehicles.insert(entry.vehicle_id.clone(), view);
    }

    FleetListResponse {
        total_count: vehicles.len(),
        active_count,
        stale_count,
        pinned_count,
        snapshot_updated_at: fleet.updated_at.map(|t| t.to_rfc3339()),
        vehicles,
        timestamp: now.to_rfc3339(),
    }
}

/// A resolved route table entry
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteView {
    pub route_id: String,
    pub short_name: String,
    pub long_name: String,
}

/// Response containing the current route reference table
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteListResponse {
    pub routes: Vec<RouteView>,
    pub total_count: usize,
    /// Timestamp when this list was generated
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{RouteRecord, VehicleReport};
    use chrono::Duration;

    fn snapshot_with_one_vehicle(pinned: bool) -> (FleetSnapshot, Reconciler) {
        let reconciler = Reconciler::new(20, 300_000);
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let report = VehicleReport {
            vehicle_id: "7021".to_string(),
            label: None,
            position: Position {
                latitude: 33.7,
                longitude: -84.3,
            },
            route_id: Some("10".to_string()),
            report_timestamp: Some(now),
        };
        let mut snapshot = reconciler.ingest(&[report], &FleetSnapshot::default(), now);
        if pinned {
            snapshot.set_pinned("7021", true);
        }
        (snapshot, reconciler)
    }

    #[test]
    fn test_build_fleet_list_counts_and_resolution() {
        let (snapshot, reconciler) = snapshot_with_one_vehicle(false);
        let routes = RouteTable::from_records(vec![RouteRecord {
            route_id: "10".to_string(),
            short_name: "10".to_string(),
            long_name: "West End".to_string(),
        }]);

        let now = DateTime::from_timestamp(1_700_000_001, 0).unwrap();
        let response = build_fleet_list(&snapshot, &routes, &reconciler, now);
        assert_eq!(response.total_count, 1);
        assert_eq!(response.active_count, 1);
        assert_eq!(response.stale_count, 0);

        let view = &response.vehicles["7021"];
        assert_eq!(view.route_short_name, "10");
        assert_eq!(view.route_long_name, "West End");
        assert!(!view.is_stale);
        assert_eq!(view.bucket, DisplayBucket::Active);
    }

    #[test]
    fn test_build_fleet_list_sentinel_and_pinned_count() {
        let (snapshot, reconciler) = snapshot_with_one_vehicle(true);
        // empty table: correlation resolves to the sentinel, never an error
        let routes = RouteTable::default();

        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::hours(1);
        let response = build_fleet_list(&snapshot, &routes, &reconciler, now);
        assert_eq!(response.pinned_count, 1);
        assert_eq!(response.stale_count, 0);

        let view = &response.vehicles["7021"];
        assert_eq!(view.route_short_name, "??");
        assert_eq!(view.route_long_name, "Route Details Unavailable");
        // stale by age but classified pinned
        assert!(view.is_stale);
        assert_eq!(view.bucket, DisplayBucket::Pinned);
    }
}
