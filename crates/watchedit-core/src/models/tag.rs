use serde::{Deserialize, Serialize};

pub const DEFAULT_TAG_COLOR: &str = "#3b82f6";

/// A user-defined label applied to works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u32,
    pub name: String,

    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

impl Tag {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: default_color(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}
