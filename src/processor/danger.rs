//! Danger scoring for (event, observer location) pairs.
//!
//! Score = round(base_severity * distance_factor), where the distance factor
//! falls linearly from 1.0 at the event to 0.0 at the falloff radius.

use crate::models::event::{Event, EventType};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Mean Earth radius used by the haversine distance, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Falloff radius used for server-side push dispatch.
pub const SERVER_FALLOFF_RADIUS_M: f64 = 500_000.0;

/// Falloff radius the mobile client uses to re-rank already fetched events.
pub const CLIENT_FALLOFF_RADIUS_M: f64 = 100_000.0;

/// Severity applied to event types missing from the table.
pub const DEFAULT_FALLBACK_SEVERITY: u8 = 50;

/// Fixed base severity per event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityTable {
    fallback: u8,
}

impl SeverityTable {
    pub fn with_fallback(fallback: u8) -> Self {
        Self {
            fallback: fallback.min(100),
        }
    }

    pub fn severity_of(kind: EventType) -> u8 {
        match kind {
            EventType::Wildfire => 100,
            EventType::Hurricane => 95,
            EventType::Tornado => 90,
            EventType::Volcano => 85,
            EventType::Earthquake => 80,
            EventType::Flood => 75,
            EventType::TropicalStorm => 70,
            EventType::Landslide => 70,
            EventType::Blizzard => 65,
        }
    }

    /// Base severity for a raw type key. Unknown keys get the fallback.
    pub fn base_severity(&self, event_type: &str) -> u8 {
        match EventType::parse(event_type) {
            Some(kind) => Self::severity_of(kind),
            None => {
                debug!(
                    "Unknown event type '{}', using fallback severity {}",
                    event_type, self.fallback
                );
                self.fallback
            }
        }
    }

    pub fn fallback(&self) -> u8 {
        self.fallback
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self::with_fallback(DEFAULT_FALLBACK_SEVERITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    pub falloff_radius_m: f64,
    pub fallback_severity: u8,
}

impl ScoringConfig {
    pub fn server() -> Self {
        Self {
            falloff_radius_m: SERVER_FALLOFF_RADIUS_M,
            fallback_severity: DEFAULT_FALLBACK_SEVERITY,
        }
    }

    pub fn client() -> Self {
        Self {
            falloff_radius_m: CLIENT_FALLOFF_RADIUS_M,
            fallback_severity: DEFAULT_FALLBACK_SEVERITY,
        }
    }
}

/// Colour band the map uses for a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DangerLevel {
    None,
    Low,
    Moderate,
    High,
    Extreme,
}

impl DangerLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0 => DangerLevel::None,
            1..=24 => DangerLevel::Low,
            25..=49 => DangerLevel::Moderate,
            50..=74 => DangerLevel::High,
            _ => DangerLevel::Extreme,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevel::None => "none",
            DangerLevel::Low => "low",
            DangerLevel::Moderate => "moderate",
            DangerLevel::High => "high",
            DangerLevel::Extreme => "extreme",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub score: u8,
    pub distance_m: f64,
}

impl Assessment {
    pub fn level(&self) -> DangerLevel {
        DangerLevel::from_score(self.score)
    }
}

/// Great-circle distance in meters between two points given in degrees.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` just outside [0, 1]; sqrt of a negative is NaN.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Copy)]
pub struct DangerScorer {
    table: SeverityTable,
    falloff_radius_m: f64,
}

impl DangerScorer {
    /// A radius that is not a finite positive distance would zero every
    /// score, so it is replaced by the server default.
    pub fn new(config: ScoringConfig) -> Self {
        let mut falloff_radius_m = config.falloff_radius_m;
        if !(falloff_radius_m.is_finite() && falloff_radius_m > 0.0) {
            warn!(
                "Falloff radius {} m is not usable, scoring with {} m",
                falloff_radius_m, SERVER_FALLOFF_RADIUS_M
            );
            falloff_radius_m = SERVER_FALLOFF_RADIUS_M;
        }
        Self {
            table: SeverityTable::with_fallback(config.fallback_severity),
            falloff_radius_m,
        }
    }

    pub fn server() -> Self {
        Self::new(ScoringConfig::server())
    }

    pub fn client() -> Self {
        Self::new(ScoringConfig::client())
    }

    pub fn falloff_radius_m(&self) -> f64 {
        self.falloff_radius_m
    }

    pub fn table(&self) -> &SeverityTable {
        &self.table
    }

    /// Linear falloff: 1.0 at the event, 0.0 at or beyond the radius.
    pub fn distance_factor(&self, distance_m: f64) -> f64 {
        if self.falloff_radius_m.is_nan() || self.falloff_radius_m <= 0.0 || distance_m.is_nan() {
            return 0.0;
        }
        (1.0 - (distance_m / self.falloff_radius_m).min(1.0)).max(0.0)
    }

    pub fn assess_raw(
        &self,
        event_type: &str,
        event_lat: f64,
        event_lon: f64,
        observer_lat: f64,
        observer_lon: f64,
    ) -> Assessment {
        let base = f64::from(self.table.base_severity(event_type));
        let distance_m = haversine_distance_m(event_lat, event_lon, observer_lat, observer_lon);
        let factor = self.distance_factor(distance_m);
        let score = (base * factor).round().clamp(0.0, 100.0) as u8;

        Assessment { score, distance_m }
    }

    pub fn assess(&self, event: &Event, observer_lat: f64, observer_lon: f64) -> Assessment {
        self.assess_raw(
            &event.event_type,
            event.latitude,
            event.longitude,
            observer_lat,
            observer_lon,
        )
    }

    /// Danger score in [0, 100].
    pub fn score(&self, event: &Event, observer_lat: f64, observer_lon: f64) -> u8 {
        self.assess(event, observer_lat, observer_lon).score
    }

    /// Orders events for display around an observer: highest score first,
    /// nearer first on ties.
    pub fn rank<'a>(
        &self,
        events: &'a [Event],
        observer_lat: f64,
        observer_lon: f64,
    ) -> Vec<(&'a Event, Assessment)> {
        let mut ranked: Vec<(&Event, Assessment)> = events
            .iter()
            .map(|event| (event, self.assess(event, observer_lat, observer_lon)))
            .collect();

        ranked.sort_by(|(_, a), (_, b)| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.distance_m.partial_cmp(&b.distance_m).unwrap_or(Ordering::Equal))
        });
        ranked
    }
}
