//! Serde-deserializable types matching the dashboard API responses.
//!
//! Fields are lenient (`#[serde(default)]`) because the backend fills some of
//! them with simulated data and omits others depending on the time range.

use serde::Deserialize;
use std::collections::BTreeMap;

// ============================================================================
// Endpoints
// ============================================================================

pub const DASHBOARD_STATS: &str = "/api/dashboard/stats";
pub const DASHBOARD_ALERTS: &str = "/api/dashboard/alerts";
pub const ANALYSIS_TRENDS: &str = "/api/analysis/trends";
pub const TRANSIT_REAL_TIME: &str = "/api/transit/real-time";
pub const ATTRACTIONS_ACTIVE: &str = "/api/attractions/active";

// ============================================================================
// Dashboard stats
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
  pub active_routes: u32,
  pub total_passengers: u64,
  pub busy_stations: u32,
  pub busy_attractions: u32,
  pub avg_delay: f64,
  pub efficiency_rate: f64,
  pub on_time_percentage: f64,
  /// Share per transit mode, keyed by mode (`lrt`, `mrt`, `brt`, `ktm`)
  pub transit_distribution: BTreeMap<String, f64>,
  pub timestamp: Option<String>,
}

// ============================================================================
// Dashboard alerts
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertFeed {
  pub alerts: Vec<Alert>,
  pub count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Alert {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub severity: String,
  pub title: String,
  pub message: String,
  pub location: String,
  pub estimated_duration: Option<String>,
}

// ============================================================================
// Trend analysis
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrendSeries {
  pub labels: Vec<String>,
  pub values: Vec<f64>,
  pub datasets: Vec<serde_json::Value>,
  pub distribution: Vec<f64>,
  pub statistics: TrendStatistics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrendStatistics {
  pub avg_passengers: f64,
  /// Highest value in the series
  pub peak_hours: f64,
  pub avg_delay: f64,
  pub efficiency: f64,
  pub trend_direction: Option<String>,
  pub growth_rate: Option<f64>,
}

// ============================================================================
// Transit
// ============================================================================

/// Real-time transit payload.
///
/// Older deployments return a bare list of stations, the current backend
/// wraps them together with routes and a summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransitFeed {
  Stations(Vec<TransitStation>),
  Snapshot(TransitSnapshot),
}

impl TransitFeed {
  pub fn stations(&self) -> &[TransitStation] {
    match self {
      TransitFeed::Stations(stations) => stations,
      TransitFeed::Snapshot(snapshot) => &snapshot.stations,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransitSnapshot {
  pub timestamp: Option<String>,
  pub stations: Vec<TransitStation>,
  pub routes: Vec<TransitRoute>,
  pub summary: Option<TransitSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransitStation {
  pub id: String,
  pub name: String,
  pub latitude: f64,
  pub longitude: f64,
  pub line: String,
  pub status: String,
  pub passenger_count: u64,
  pub next_arrival: Option<String>,
  pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransitRoute {
  pub id: String,
  pub name: String,
  pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransitSummary {
  pub total_stations: u32,
  pub operational_routes: u32,
  pub total_passengers: u64,
  pub average_delay: f64,
}

// ============================================================================
// Attractions
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActiveAttractions {
  pub malls: Vec<Attraction>,
  pub restaurants: Vec<Attraction>,
  pub entertainment: Vec<Attraction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Attraction {
  pub id: String,
  pub name: String,
  pub latitude: f64,
  pub longitude: f64,
  pub category: String,
  pub rating: f64,
  pub popularity_score: f64,
  pub current_occupancy: f64,
  pub estimated_wait_time: f64,
  pub address: String,
  pub last_updated: Option<String>,
}
