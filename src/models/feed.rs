use crate::models::event::NewEvent;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// GeoJSON feature collection as served by the disaster event feed.
#[derive(Debug, Deserialize)]
pub struct FeedCollection {
    #[serde(default)]
    pub features: Vec<FeedFeature>,
}

#[derive(Debug, Deserialize)]
pub struct FeedFeature {
    pub geometry: Option<Geometry>,
    pub properties: FeedProperties,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    #[serde(default, deserialize_with = "parse_coordinates")]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FeedProperties {
    #[serde(rename = "eventtype")]
    pub event_type: Option<String>,
    #[serde(rename = "eventid", default, deserialize_with = "parse_id_option")]
    pub event_id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "fromdate")]
    pub from_date: Option<String>,
    #[serde(rename = "latitude", default, deserialize_with = "parse_f64_option")]
    pub latitude: Option<f64>,
    #[serde(rename = "longitude", default, deserialize_with = "parse_f64_option")]
    pub longitude: Option<f64>,
}

impl FeedFeature {
    /// Coordinates from the geometry (`[lon, lat]`), else from the properties.
    pub fn position(&self) -> Option<(f64, f64)> {
        if let Some(geometry) = &self.geometry {
            if let [lon, lat, ..] = geometry.coordinates.as_slice() {
                return Some((*lat, *lon));
            }
        }
        match (self.properties.latitude, self.properties.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Converts to a storable event. Features without a type, id or position
    /// are dropped.
    pub fn into_new_event(self, fetched_at: DateTime<Utc>) -> Option<NewEvent> {
        let Some((latitude, longitude)) = self.position() else {
            warn!(
                "Feed event {:?} has no coordinates, skipping",
                self.properties.event_id
            );
            return None;
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            warn!(
                "Feed event {:?} has out of range coordinates ({}, {}), skipping",
                self.properties.event_id, latitude, longitude
            );
            return None;
        }

        let props = self.properties;
        let event_type = props.event_type.map(|t| t.trim().to_uppercase())?;
        let source_id = props.event_id?;
        let created_at = props
            .from_date
            .as_deref()
            .and_then(parse_feed_datetime)
            .unwrap_or(fetched_at);

        Some(NewEvent {
            event_id: format!("{}-{}", event_type, source_id),
            event_type,
            latitude,
            longitude,
            title: props.name,
            created_at,
        })
    }
}

impl FeedCollection {
    pub fn into_new_events(self, fetched_at: DateTime<Utc>) -> Vec<NewEvent> {
        self.features
            .into_iter()
            .filter_map(|f| f.into_new_event(fetched_at))
            .collect()
    }
}

fn parse_feed_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|t| t.and_utc())
        .ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    String(String),
    Float(f64),
}

impl StringOrFloat {
    fn into_f64<E: serde::de::Error>(self) -> Result<Option<f64>, E> {
        match self {
            StringOrFloat::Float(f) => Ok(Some(f)),
            StringOrFloat::String(s) => {
                if s.trim().is_empty() {
                    Ok(None)
                } else {
                    s.trim().parse::<f64>().map(Some).map_err(E::custom)
                }
            }
        }
    }
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(v) => v.into_f64(),
        None => Ok(None),
    }
}

fn parse_coordinates<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<Vec<StringOrFloat>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    for item in v.unwrap_or_default() {
        match item.into_f64::<D::Error>()? {
            Some(f) => out.push(f),
            None => return Ok(Vec::new()),
        }
    }
    Ok(out)
}

fn parse_id_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(i64),
    }

    let v: Option<StringOrInt> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(StringOrInt::Int(i)) => Some(i.to_string()),
        Some(StringOrInt::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}
