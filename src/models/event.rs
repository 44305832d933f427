use crate::processor::danger::SeverityTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A stored disaster event. Rows are replaced wholesale on every ingestion
/// cycle; only `comments` is ever appended to in place.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub comments: Json<Vec<EventComment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventComment {
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// An event fetched from the upstream feed, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_id: String,
    pub event_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Wildfire,
    Hurricane,
    Tornado,
    Volcano,
    Earthquake,
    Flood,
    TropicalStorm,
    Landslide,
    Blizzard,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::Wildfire,
        EventType::Hurricane,
        EventType::Tornado,
        EventType::Volcano,
        EventType::Earthquake,
        EventType::Flood,
        EventType::TropicalStorm,
        EventType::Landslide,
        EventType::Blizzard,
    ];

    /// Accepts feed codes (`EQ`, `TC`, ...) and long names, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace(|c: char| c == '_' || c == ' ', "-");
        let kind = match key.as_str() {
            "wf" | "wildfire" | "fire" => EventType::Wildfire,
            "hu" | "hurricane" => EventType::Hurricane,
            "to" | "tornado" => EventType::Tornado,
            "vo" | "volcano" => EventType::Volcano,
            "eq" | "earthquake" => EventType::Earthquake,
            "fl" | "flood" => EventType::Flood,
            "tc" | "tropical-storm" | "tropical-cyclone" => EventType::TropicalStorm,
            "ls" | "landslide" => EventType::Landslide,
            "bz" | "blizzard" => EventType::Blizzard,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(&self) -> &'static str {
        match self {
            EventType::Wildfire => "WF",
            EventType::Hurricane => "HU",
            EventType::Tornado => "TO",
            EventType::Volcano => "VO",
            EventType::Earthquake => "EQ",
            EventType::Flood => "FL",
            EventType::TropicalStorm => "TC",
            EventType::Landslide => "LS",
            EventType::Blizzard => "BZ",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventType::Wildfire => "Wildfire",
            EventType::Hurricane => "Hurricane",
            EventType::Tornado => "Tornado",
            EventType::Volcano => "Volcanic activity",
            EventType::Earthquake => "Earthquake",
            EventType::Flood => "Flood",
            EventType::TropicalStorm => "Tropical storm",
            EventType::Landslide => "Landslide",
            EventType::Blizzard => "Blizzard",
        }
    }
}

impl Event {
    pub fn kind(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }

    /// Base severity of this event's type, before any distance falloff.
    pub fn severity(&self, table: &SeverityTable) -> u8 {
        table.base_severity(&self.event_type)
    }

    /// Human readable name, falling back to the raw type key.
    pub fn display_name(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        match self.kind() {
            Some(kind) => kind.label().to_string(),
            None => format!("Disaster event ({})", self.event_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes_and_names() {
        assert_eq!(EventType::parse("EQ"), Some(EventType::Earthquake));
        assert_eq!(EventType::parse("eq"), Some(EventType::Earthquake));
        assert_eq!(EventType::parse("Tropical Storm"), Some(EventType::TropicalStorm));
        assert_eq!(EventType::parse("tropical_storm"), Some(EventType::TropicalStorm));
        assert_eq!(EventType::parse(" wildfire "), Some(EventType::Wildfire));
        assert_eq!(EventType::parse("DR"), None);
        for kind in EventType::ALL {
            assert_eq!(EventType::parse(kind.code()), Some(kind));
        }
        assert_eq!(EventType::parse(""), None);
    }

    #[test]
    fn test_display_name_prefers_title() {
        let mut event = Event {
            event_id: "EQ-1".to_string(),
            event_type: "EQ".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            title: Some("M 6.1 near Coast".to_string()),
            created_at: Utc::now(),
            comments: Json(Vec::new()),
        };
        assert_eq!(event.display_name(), "M 6.1 near Coast");

        event.title = None;
        assert_eq!(event.display_name(), "Earthquake");

        event.event_type = "DR".to_string();
        assert_eq!(event.display_name(), "Disaster event (DR)");
    }

    #[test]
    fn test_severity_and_json_shape() {
        let event = Event {
            event_id: "VO-7".to_string(),
            event_type: "VO".to_string(),
            latitude: 19.4,
            longitude: -155.3,
            title: None,
            created_at: Utc::now(),
            comments: Json(vec![EventComment {
                author_id: "u1".to_string(),
                body: "ash fall".to_string(),
                created_at: Utc::now(),
            }]),
        };
        let table = SeverityTable::default();
        assert_eq!(event.severity(&table), 85);

        let unknown = Event {
            event_type: "DR".to_string(),
            ..event.clone()
        };
        assert_eq!(unknown.severity(&SeverityTable::with_fallback(30)), 30);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_id"], "VO-7");
        assert_eq!(value["comments"][0]["body"], "ash fall");
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back.comments.0, event.comments.0);
    }
}
