//! Live fleet reconciliation.
//!
//! Folds each poll of the upstream vehicle-position feed into a continuous
//! in-memory snapshot of the fleet. Vehicles that drop out of a poll are
//! retained in their last-known-good state so transient feed gaps do not
//! make markers flicker off the map; they age into [`DisplayBucket::Stale`]
//! instead. The reconciler performs no I/O and never fails on malformed
//! input - invalid records are rejected at the normalization boundary and
//! missing route correlations resolve to a sentinel.

pub mod normalize;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

pub use normalize::{
    normalize_route_table, normalize_vehicle_feed, NormalizeError, RejectReason, Rejection,
};

/// Sentinel short name for an unresolvable route correlation.
pub const ROUTE_SENTINEL_SHORT: &str = "??";
/// Sentinel long name for an unresolvable route correlation.
pub const ROUTE_SENTINEL_LONG: &str = "Route Details Unavailable";

/// A reported vehicle position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Canonical vehicle report produced by the normalization boundary.
///
/// One record per vehicle per poll; a report without a usable position never
/// reaches this type.
#[derive(Debug, Clone)]
pub struct VehicleReport {
    /// Stable identifier across polls for the same physical vehicle
    pub vehicle_id: String,
    /// Human-facing fleet number, may differ from the id
    pub label: Option<String>,
    pub position: Position,
    /// Route correlation key; absent for special/unassigned service
    pub route_id: Option<String>,
    /// Producer-supplied report time; absent when the feed omits it
    pub report_timestamp: Option<DateTime<Utc>>,
}

/// A route reference record from the static route table.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub route_id: String,
    /// Short display code (e.g., "191")
    pub short_name: String,
    /// Full descriptive route name
    pub long_name: String,
}

/// Display names resolved for a route correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResolvedRoute {
    pub short_name: String,
    pub long_name: String,
}

impl ResolvedRoute {
    /// The sentinel pair returned when a route cannot be resolved.
    pub fn unavailable() -> Self {
        Self {
            short_name: ROUTE_SENTINEL_SHORT.to_string(),
            long_name: ROUTE_SENTINEL_LONG.to_string(),
        }
    }
}

/// Route reference table keyed by normalized route id.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    records: HashMap<String, RouteRecord>,
}

impl RouteTable {
    pub fn from_records(records: Vec<RouteRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.route_id.clone(), r))
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &RouteRecord> {
        self.records.values()
    }

    /// Resolve display names for a route id.
    ///
    /// Pure lookup: a missing or unknown id resolves to the sentinel pair,
    /// never an error. Ids are compared as trimmed strings, matching the
    /// normalization applied when the table was built.
    pub fn resolve(&self, route_id: Option<&str>) -> ResolvedRoute {
        match route_id.and_then(|id| self.records.get(id.trim())) {
            Some(record) => ResolvedRoute {
                short_name: record.short_name.clone(),
                long_name: record.long_name.clone(),
            },
            None => ResolvedRoute::unavailable(),
        }
    }
}

/// Visual classification of a fleet entry.
///
/// Pinned takes precedence over staleness: an operationally-flagged vehicle
/// is never demoted to a generic ghost state, no matter how old its last
/// report is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBucket {
    Active,
    Stale,
    Pinned,
}

/// Per-vehicle state carried across polls.
#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub vehicle_id: String,
    /// Fleet number shown in the UI; falls back to the vehicle id
    pub display_label: String,
    pub route_id: Option<String>,
    /// Recent positions, oldest first, bounded by the reconciler's trail cap
    pub trail: Vec<Position>,
    pub last_seen_at: DateTime<Utc>,
    /// Out-of-service / work-order flag, set only via the pin transition
    pub pinned: bool,
}

impl FleetEntry {
    /// Latest reported position. The trail is never empty for an entry that
    /// was created from a valid report.
    pub fn position(&self) -> Option<Position> {
        self.trail.last().copied()
    }

    /// Whether the last report is older than the threshold (strict `>`).
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now.signed_duration_since(self.last_seen_at) > threshold
    }

    /// Classify for display. Pinned > stale > active.
    pub fn display_bucket(&self, now: DateTime<Utc>, threshold: Duration) -> DisplayBucket {
        if self.pinned {
            DisplayBucket::Pinned
        } else if self.is_stale(now, threshold) {
            DisplayBucket::Stale
        } else {
            DisplayBucket::Active
        }
    }
}

/// The reconciled fleet state after some number of polls.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    entries: HashMap<String, FleetEntry>,
    /// When the last successful ingest completed
    pub updated_at: Option<DateTime<Utc>>,
}

impl FleetSnapshot {
    pub fn get(&self, vehicle_id: &str) -> Option<&FleetEntry> {
        self.entries.get(vehicle_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &FleetEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Named state transition for the out-of-service flag.
    ///
    /// Returns false when the vehicle is unknown; the snapshot is unchanged
    /// in that case. This is the only mutation path into an entry outside of
    /// [`Reconciler::ingest`].
    pub fn set_pinned(&mut self, vehicle_id: &str, pinned: bool) -> bool {
        match self.entries.get_mut(vehicle_id) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }
}

/// Fleet snapshot reconciler.
///
/// Explicitly constructed with its tunables (no process-wide state); one
/// instance lives inside the sync manager for the life of the poller.
#[derive(Debug, Clone)]
pub struct Reconciler {
    trail_cap: usize,
    stale_threshold: Duration,
}

impl Reconciler {
    pub fn new(trail_cap: usize, stale_threshold_ms: i64) -> Self {
        Self {
            // an entry always keeps at least its latest position
            trail_cap: trail_cap.max(1),
            stale_threshold: Duration::milliseconds(stale_threshold_ms),
        }
    }

    /// Fold a normalized feed batch into the previous snapshot.
    ///
    /// Upserts by vehicle id: new vehicles get a fresh entry, known vehicles
    /// have their scalar fields overwritten and the new position appended to
    /// their trail (FIFO-capped). Entries absent from the batch are carried
    /// over untouched, so the result's key set is always a superset of the
    /// previous one. `previous` is not mutated; the poller swaps the returned
    /// snapshot in atomically.
    pub fn ingest(
        &self,
        reports: &[VehicleReport],
        previous: &FleetSnapshot,
        now: DateTime<Utc>,
    ) -> FleetSnapshot {
        let mut entries = previous.entries.clone();

        for report in reports {
            let last_seen_at = report.report_timestamp.unwrap_or(now);
            let display_label = report
                .label
                .clone()
                .unwrap_or_else(|| report.vehicle_id.clone());

            match entries.get_mut(&report.vehicle_id) {
                Some(entry) => {
                    entry.display_label = display_label;
                    entry.route_id = report.route_id.clone();
                    entry.last_seen_at = last_seen_at;
                    entry.trail.push(report.position);
                    if entry.trail.len() > self.trail_cap {
                        let excess = entry.trail.len() - self.trail_cap;
                        entry.trail.drain(..excess);
                    }
                    // pinned flag survives upserts
                }
                None => {
                    entries.insert(
                        report.vehicle_id.clone(),
                        FleetEntry {
                            vehicle_id: report.vehicle_id.clone(),
                            display_label,
                            route_id: report.route_id.clone(),
                            trail: vec![report.position],
                            last_seen_at,
                            pinned: false,
                        },
                    );
                }
            }
        }

        FleetSnapshot {
            entries,
            updated_at: Some(now),
        }
    }

    pub fn is_stale(&self, entry: &FleetEntry, now: DateTime<Utc>) -> bool {
        entry.is_stale(now, self.stale_threshold)
    }

    pub fn classify(&self, entry: &FleetEntry, now: DateTime<Utc>) -> DisplayBucket {
        entry.display_bucket(now, self.stale_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Helpers ---

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn pos(latitude: f64, longitude: f64) -> Position {
        Position {
            latitude,
            longitude,
        }
    }

    fn report(vehicle_id: &str, position: Position, route_id: Option<&str>) -> VehicleReport {
        VehicleReport {
            vehicle_id: vehicle_id.to_string(),
            label: None,
            position,
            route_id: route_id.map(|s| s.to_string()),
            report_timestamp: Some(t0()),
        }
    }

    fn test_table() -> RouteTable {
        RouteTable::from_records(vec![
            RouteRecord {
                route_id: "10".to_string(),
                short_name: "10".to_string(),
                long_name: "West End".to_string(),
            },
            RouteRecord {
                route_id: "191".to_string(),
                short_name: "191".to_string(),
                long_name: "Airport Connector".to_string(),
            },
        ])
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(20, 300_000)
    }

    // --- resolve tests ---

    #[test]
    fn test_resolve_known_route() {
        let table = test_table();
        let resolved = table.resolve(Some("10"));
        assert_eq!(resolved.short_name, "10");
        assert_eq!(resolved.long_name, "West End");
    }

    #[test]
    fn test_resolve_missing_and_unknown_return_sentinel() {
        let table = test_table();
        assert_eq!(table.resolve(None), ResolvedRoute::unavailable());
        assert_eq!(table.resolve(Some("999")), ResolvedRoute::unavailable());
        assert_eq!(table.resolve(Some("999")).short_name, "??");
        assert_eq!(
            table.resolve(None).long_name,
            "Route Details Unavailable"
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let table = test_table();
        let first = table.resolve(Some("191"));
        let second = table.resolve(Some("191"));
        assert_eq!(first, second);
        // lookups never mutate the table
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_trims_whitespace() {
        let table = test_table();
        assert_eq!(table.resolve(Some(" 10 ")).long_name, "West End");
    }

    // --- ingest tests ---

    #[test]
    fn test_first_report_creates_entry() {
        let rec = reconciler();
        let snapshot = rec.ingest(
            &[report("7021", pos(33.7, -84.3), Some("10"))],
            &FleetSnapshot::default(),
            t0(),
        );
        let entry = snapshot.get("7021").unwrap();
        assert_eq!(entry.display_label, "7021");
        assert_eq!(entry.route_id.as_deref(), Some("10"));
        assert_eq!(entry.trail, vec![pos(33.7, -84.3)]);
        assert_eq!(entry.last_seen_at, t0());
        assert!(!entry.pinned);
    }

    #[test]
    fn test_scenario_route_resolution_and_freshness() {
        // feed = [{id:"7021", position, routeId:"10", ts:T}], now = T+1s
        let rec = reconciler();
        let table = test_table();
        let snapshot = rec.ingest(
            &[report("7021", pos(33.7, -84.3), Some("10"))],
            &FleetSnapshot::default(),
            t0(),
        );
        let entry = snapshot.get("7021").unwrap();
        let resolved = table.resolve(entry.route_id.as_deref());
        assert_eq!(resolved.short_name, "10");
        assert_eq!(resolved.long_name, "West End");
        assert!(!rec.is_stale(entry, t0() + Duration::seconds(1)));
    }

    #[test]
    fn test_upsert_overwrites_scalars_and_appends_trail() {
        let rec = reconciler();
        let first = rec.ingest(
            &[report("7021", pos(33.7, -84.3), Some("10"))],
            &FleetSnapshot::default(),
            t0(),
        );

        // absent for two polls, then reappears with a new position and route
        let gap_a = rec.ingest(&[], &first, t0() + Duration::seconds(15));
        let gap_b = rec.ingest(&[], &gap_a, t0() + Duration::seconds(30));
        assert_eq!(gap_b.get("7021").unwrap().trail.len(), 1);

        let later = t0() + Duration::seconds(45);
        let mut update = report("7021", pos(33.8, -84.2), Some("191"));
        update.report_timestamp = Some(later);
        let second = rec.ingest(&[update], &gap_b, later);

        let entry = second.get("7021").unwrap();
        assert_eq!(entry.trail.len(), 2);
        assert_eq!(entry.trail, vec![pos(33.7, -84.3), pos(33.8, -84.2)]);
        assert_eq!(entry.route_id.as_deref(), Some("191"));
        assert_eq!(entry.last_seen_at, later);
    }

    #[test]
    fn test_upsert_monotonic_keys() {
        // a vehicle absent from the latest feed is retained
        let rec = reconciler();
        let first = rec.ingest(
            &[
                report("7021", pos(33.7, -84.3), Some("10")),
                report("7022", pos(33.6, -84.4), Some("191")),
            ],
            &FleetSnapshot::default(),
            t0(),
        );
        assert_eq!(first.len(), 2);

        let second = rec.ingest(
            &[report("7021", pos(33.71, -84.31), Some("10"))],
            &first,
            t0() + Duration::seconds(10),
        );
        assert_eq!(second.len(), 2);
        let carried = second.get("7022").unwrap();
        assert_eq!(carried.trail, vec![pos(33.6, -84.4)]);
        assert_eq!(carried.last_seen_at, t0());
    }

    #[test]
    fn test_ingest_does_not_mutate_previous() {
        let rec = reconciler();
        let previous = rec.ingest(
            &[report("7021", pos(33.7, -84.3), Some("10"))],
            &FleetSnapshot::default(),
            t0(),
        );
        let _next = rec.ingest(
            &[report("7021", pos(34.0, -84.0), None)],
            &previous,
            t0() + Duration::seconds(10),
        );
        // the earlier snapshot is unchanged
        let entry = previous.get("7021").unwrap();
        assert_eq!(entry.trail, vec![pos(33.7, -84.3)]);
        assert_eq!(entry.route_id.as_deref(), Some("10"));
        assert_eq!(previous.updated_at, Some(t0()));
    }

    #[test]
    fn test_trail_capped_fifo() {
        let rec = Reconciler::new(5, 300_000);
        let mut snapshot = FleetSnapshot::default();
        for i in 0..8i64 {
            let now = t0() + Duration::seconds(i);
            let mut r = report("7021", pos(33.0 + i as f64, -84.0), Some("10"));
            r.report_timestamp = Some(now);
            snapshot = rec.ingest(&[r], &snapshot, now);
        }
        let entry = snapshot.get("7021").unwrap();
        assert_eq!(entry.trail.len(), 5);
        // most recent cap positions, oldest first
        let expected: Vec<Position> = (3..8).map(|i| pos(33.0 + i as f64, -84.0)).collect();
        assert_eq!(entry.trail, expected);
        assert_eq!(entry.position(), Some(pos(40.0, -84.0)));
    }

    #[test]
    fn test_label_fallback_to_vehicle_id() {
        let rec = reconciler();
        let mut labeled = report("901", pos(33.7, -84.3), None);
        labeled.label = Some("Unit 7021".to_string());
        let snapshot = rec.ingest(
            &[labeled, report("902", pos(33.6, -84.4), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        assert_eq!(snapshot.get("901").unwrap().display_label, "Unit 7021");
        assert_eq!(snapshot.get("902").unwrap().display_label, "902");
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_poll_time() {
        let rec = reconciler();
        let mut r = report("7021", pos(33.7, -84.3), None);
        r.report_timestamp = None;
        let now = t0() + Duration::minutes(3);
        let snapshot = rec.ingest(&[r], &FleetSnapshot::default(), now);
        assert_eq!(snapshot.get("7021").unwrap().last_seen_at, now);
    }

    // --- staleness tests ---

    #[test]
    fn test_staleness_boundary() {
        let rec = reconciler();
        let snapshot = rec.ingest(
            &[report("7021", pos(33.7, -84.3), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        let entry = snapshot.get("7021").unwrap();

        // strict >: 299999 fresh, 300000 fresh, 300001 stale
        assert!(!rec.is_stale(entry, t0() + Duration::milliseconds(299_999)));
        assert!(!rec.is_stale(entry, t0() + Duration::milliseconds(300_000)));
        assert!(rec.is_stale(entry, t0() + Duration::milliseconds(300_001)));
    }

    #[test]
    fn test_staleness_threshold_configurable() {
        let rec = Reconciler::new(20, 1_000);
        let snapshot = rec.ingest(
            &[report("7021", pos(33.7, -84.3), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        let entry = snapshot.get("7021").unwrap();
        assert!(!rec.is_stale(entry, t0() + Duration::milliseconds(1_000)));
        assert!(rec.is_stale(entry, t0() + Duration::milliseconds(1_001)));
    }

    // --- classification tests ---

    #[test]
    fn test_classify_active_then_stale() {
        let rec = reconciler();
        let snapshot = rec.ingest(
            &[report("7021", pos(33.7, -84.3), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        let entry = snapshot.get("7021").unwrap();
        assert_eq!(rec.classify(entry, t0()), DisplayBucket::Active);
        assert_eq!(
            rec.classify(entry, t0() + Duration::minutes(10)),
            DisplayBucket::Stale
        );
    }

    #[test]
    fn test_pinned_takes_precedence_over_stale() {
        let rec = reconciler();
        let mut snapshot = rec.ingest(
            &[report("7021", pos(33.7, -84.3), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        assert!(snapshot.set_pinned("7021", true));

        // far past the stale threshold, still pinned
        let entry = snapshot.get("7021").unwrap();
        assert_eq!(
            rec.classify(entry, t0() + Duration::days(2)),
            DisplayBucket::Pinned
        );
    }

    #[test]
    fn test_stale_entry_returns_to_active_on_new_report() {
        let rec = reconciler();
        let first = rec.ingest(
            &[report("7021", pos(33.7, -84.3), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        let later = t0() + Duration::minutes(10);
        assert_eq!(
            rec.classify(first.get("7021").unwrap(), later),
            DisplayBucket::Stale
        );

        let mut fresh = report("7021", pos(33.8, -84.2), None);
        fresh.report_timestamp = Some(later);
        let second = rec.ingest(&[fresh], &first, later);
        assert_eq!(
            rec.classify(second.get("7021").unwrap(), later),
            DisplayBucket::Active
        );
    }

    // --- pin transition tests ---

    #[test]
    fn test_pinned_survives_upsert() {
        let rec = reconciler();
        let mut first = rec.ingest(
            &[report("7021", pos(33.7, -84.3), None)],
            &FleetSnapshot::default(),
            t0(),
        );
        assert!(first.set_pinned("7021", true));

        let second = rec.ingest(
            &[report("7021", pos(33.8, -84.2), Some("10"))],
            &first,
            t0() + Duration::seconds(10),
        );
        assert!(second.get("7021").unwrap().pinned);
    }

    #[test]
    fn test_set_pinned_unknown_vehicle() {
        let mut snapshot = FleetSnapshot::default();
        assert!(!snapshot.set_pinned("nope", true));
        assert!(snapshot.is_empty());
    }
}
