use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trackable sub-unit of a work. `number` is scoped by season and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub number: u32,

    #[serde(default = "default_season")]
    pub season: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(rename = "type", default)]
    pub episode_type: EpisodeType,

    #[serde(default)]
    pub watched: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_watched: Option<DateTime<Utc>>,
}

fn default_season() -> u32 {
    1
}

impl Episode {
    pub fn new(number: u32, season: u32, episode_type: EpisodeType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            number,
            season,
            title: None,
            description: None,
            note: None,
            episode_type,
            watched: false,
            date_watched: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Flip the watched flag, stamping or clearing `date_watched`.
    pub fn set_watched(&mut self, watched: bool) {
        self.watched = watched;
        self.date_watched = if watched { Some(Utc::now()) } else { None };
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeType {
    #[default]
    Episode,
    Special,
    Ova,
    Movie,
    Chapter,
    Custom,
}

impl std::fmt::Display for EpisodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Episode => "episode",
            Self::Special => "special",
            Self::Ova => "ova",
            Self::Movie => "movie",
            Self::Chapter => "chapter",
            Self::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EpisodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "episode" => Ok(Self::Episode),
            "special" => Ok(Self::Special),
            "ova" => Ok(Self::Ova),
            "movie" => Ok(Self::Movie),
            "chapter" => Ok(Self::Chapter),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Invalid EpisodeType: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_watched_stamps_date() {
        let mut ep = Episode::new(1, 1, EpisodeType::Episode);
        ep.set_watched(true);
        assert!(ep.watched);
        assert!(ep.date_watched.is_some());

        ep.set_watched(false);
        assert!(!ep.watched);
        assert!(ep.date_watched.is_none());
    }

    #[test]
    fn test_episode_defaults_when_fields_missing() {
        let ep: Episode = serde_json::from_str(r#"{"id":"e1","number":3}"#).unwrap();
        assert_eq!(ep.season, 1);
        assert_eq!(ep.episode_type, EpisodeType::Episode);
        assert!(!ep.watched);
    }
}
