use serde_json::Value;

use super::BackupDocument;
use crate::error::{Result, WatchedItError};

pub fn encode_json(doc: &BackupDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Decode a JSON backup. The top level must be an object carrying non-empty
/// `version` and `timestamp`; everything else is permissive.
pub fn decode_json(text: &str) -> Result<BackupDocument> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(WatchedItError::validation(
            "backup document must be a JSON object",
        ));
    };

    for field in ["version", "timestamp"] {
        let present = match object.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(WatchedItError::validation(format!(
                "backup document is missing `{field}`"
            )));
        }
    }

    let mut doc: BackupDocument = serde_json::from_value(value)?;
    doc.recompute_metadata();
    doc.warn_on_version_mismatch();
    Ok(doc)
}
