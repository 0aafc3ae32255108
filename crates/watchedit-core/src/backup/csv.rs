use std::collections::HashMap;
use std::str::FromStr;

use ::csv::{ReaderBuilder, StringRecord, WriterBuilder};

use super::{BackupDocument, BACKUP_VERSION};
use crate::error::{Result, WatchedItError};
use crate::models::{
    format_timestamp, parse_timestamp, Episode, EpisodeType, RecordSet, Tag, Work, DEFAULT_TAG_COLOR,
};

pub const CSV_BANNER: &str = "WatchedIt Backup Data";

/// One row per episode; a work without episodes gets one row with the
/// episode columns left empty.
pub const CSV_HEADER: [&str; 24] = [
    "Work ID",
    "Title",
    "Type",
    "Status",
    "Year",
    "Rating",
    "Review",
    "Note",
    "Source",
    "Reminder Enabled",
    "Reminder Frequency",
    "Date Added",
    "Date Updated",
    "Tag Names",
    "Tag Colors",
    "Episode ID",
    "Episode Number",
    "Season",
    "Episode Title",
    "Episode Description",
    "Episode Type",
    "Watched",
    "Date Watched",
    "Episode Note",
];

/// Rows shorter than this cannot describe a work and are skipped.
const WORK_COLUMNS: usize = 15;
const LIST_SEPARATOR: char = ';';

// ─── Encode ────────────────────────────────────────────────

pub fn encode_csv(doc: &BackupDocument) -> Result<String> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    writer.write_record([CSV_BANNER])?;
    writer.write_record(["Version", doc.version.as_str()])?;
    writer.write_record(["Timestamp", doc.timestamp.as_str()])?;
    writer.write_record([
        "Tags".to_string(),
        join_list(doc.tags.iter().map(|t| t.name.as_str())),
        join_list(doc.tags.iter().map(|t| t.color.as_str())),
    ])?;
    writer.write_record(CSV_HEADER)?;

    for work in &doc.works {
        let work_fields = work_columns(work);
        if work.episodes.is_empty() {
            let mut row = work_fields.clone();
            row.resize(CSV_HEADER.len(), String::new());
            writer.write_record(&row)?;
        }
        for episode in &work.episodes {
            let mut row = work_fields.clone();
            row.extend(episode_columns(episode));
            writer.write_record(&row)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| WatchedItError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| WatchedItError::validation(format!("CSV output is not UTF-8: {e}")))
}

fn work_columns(work: &Work) -> Vec<String> {
    vec![
        work.id.clone(),
        work.title.clone(),
        work.work_type.to_string(),
        work.status.to_string(),
        opt_to_string(work.year),
        opt_to_string(work.rating),
        work.review.clone().unwrap_or_default(),
        work.note.clone().unwrap_or_default(),
        work.source.clone().unwrap_or_default(),
        work.reminder_enabled.to_string(),
        opt_to_string(work.reminder_frequency),
        format_timestamp(&work.date_added),
        work.date_updated.as_ref().map(format_timestamp).unwrap_or_default(),
        join_list(work.tags.iter().map(|t| t.name.as_str())),
        join_list(work.tags.iter().map(|t| t.color.as_str())),
    ]
}

fn episode_columns(episode: &Episode) -> Vec<String> {
    vec![
        episode.id.clone(),
        episode.number.to_string(),
        episode.season.to_string(),
        episode.title.clone().unwrap_or_default(),
        episode.description.clone().unwrap_or_default(),
        episode.episode_type.to_string(),
        episode.watched.to_string(),
        episode.date_watched.as_ref().map(format_timestamp).unwrap_or_default(),
        episode.note.clone().unwrap_or_default(),
    ]
}

fn opt_to_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// `;`-join with `\` escaping, so names containing `;` survive.
fn join_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(|item| item.replace('\\', "\\\\").replace(LIST_SEPARATOR, "\\;"))
        .collect::<Vec<_>>()
        .join(";")
}

fn split_list(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = joined.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            LIST_SEPARATOR => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

// ─── Decode ────────────────────────────────────────────────

/// Assigns fresh tag ids in first-seen order, keyed by name. The library
/// tag list keeps the first colour seen for a name; each work keeps the
/// colour written on its own rows.
#[derive(Default)]
struct TagTable {
    tags: Vec<Tag>,
    by_name: HashMap<String, usize>,
}

impl TagTable {
    fn intern(&mut self, name: &str, color: Option<&str>) -> Tag {
        if let Some(&i) = self.by_name.get(name) {
            return self.tags[i].clone();
        }
        let color = color
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_TAG_COLOR);
        let tag = Tag::new(self.tags.len() as u32 + 1, name).with_color(color);
        self.by_name.insert(name.to_string(), self.tags.len());
        self.tags.push(tag.clone());
        tag
    }

    fn intern_lists(&mut self, names: &str, colors: &str) -> Vec<Tag> {
        let colors = split_list(colors);
        split_list(names)
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| {
                let color = colors.get(i).map(String::as_str).filter(|c| !c.is_empty());
                let mut tag = self.intern(name, color);
                if let Some(color) = color {
                    tag.color = color.to_string();
                }
                tag
            })
            .collect()
    }
}

/// Decode a CSV backup produced by [`encode_csv`].
pub fn decode_csv(text: &str) -> Result<BackupDocument> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let banner = records.next().transpose()?;
    if banner.as_ref().and_then(|r| r.get(0)).map(str::trim) != Some(CSV_BANNER) {
        return Err(WatchedItError::validation(format!(
            "not a WatchedIt CSV backup: missing `{CSV_BANNER}` banner"
        )));
    }

    let mut version = BACKUP_VERSION.to_string();
    let mut timestamp = None;
    let mut tag_table = TagTable::default();
    let mut found_header = false;

    for record in records.by_ref() {
        let record = record?;
        match record.get(0).unwrap_or("") {
            "Version" => version = field(&record, 1).to_string(),
            "Timestamp" => timestamp = Some(field(&record, 1).to_string()),
            "Tags" => {
                tag_table.intern_lists(field(&record, 1), field(&record, 2));
            }
            first if first == CSV_HEADER[0] => {
                found_header = true;
                break;
            }
            other => tracing::warn!(field = other, "ignoring unknown CSV preamble line"),
        }
    }
    if !found_header {
        return Err(WatchedItError::validation(
            "CSV backup is missing the column header row",
        ));
    }

    let mut works: Vec<Work> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() < WORK_COLUMNS || field(&record, 0).is_empty() {
            tracing::warn!(line, columns = record.len(), "skipping malformed CSV row");
            continue;
        }

        let work_id = field(&record, 0);
        let slot = match index.get(work_id) {
            Some(&i) => i,
            None => match parse_work(&record, &mut tag_table) {
                Ok(work) => {
                    index.insert(work.id.clone(), works.len());
                    works.push(work);
                    works.len() - 1
                }
                Err(e) => {
                    tracing::warn!(line, "skipping CSV row: {e}");
                    continue;
                }
            },
        };

        if field(&record, 15).is_empty() {
            continue;
        }
        match parse_episode(&record) {
            Ok(episode) => works[slot].episodes.push(episode),
            Err(e) => tracing::warn!(line, "skipping CSV episode: {e}"),
        }
    }

    let timestamp = timestamp.unwrap_or_else(|| format_timestamp(&chrono::Utc::now()));
    let doc = BackupDocument::with_header(version, timestamp, RecordSet::new(works, tag_table.tags));
    doc.warn_on_version_mismatch();
    Ok(doc)
}

fn field(record: &StringRecord, i: usize) -> &str {
    record.get(i).unwrap_or("")
}

fn optional(record: &StringRecord, i: usize) -> Option<String> {
    Some(field(record, i)).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_optional<T: FromStr>(record: &StringRecord, i: usize, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match field(record, i) {
        "" => Ok(None),
        raw => raw
            .parse()
            .map(Some)
            .map_err(|e| WatchedItError::validation(format!("bad {name} `{raw}`: {e}"))),
    }
}

fn parse_required<T: FromStr>(record: &StringRecord, i: usize, name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    parse_optional(record, i, name)?
        .ok_or_else(|| WatchedItError::validation(format!("missing {name}")))
}

fn parse_bool(record: &StringRecord, i: usize) -> bool {
    field(record, i).eq_ignore_ascii_case("true")
}

fn parse_time(
    record: &StringRecord,
    i: usize,
    name: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    match field(record, i) {
        "" => Ok(None),
        raw => parse_timestamp(raw)
            .map(Some)
            .map_err(|e| WatchedItError::validation(format!("bad {name} `{raw}`: {e}"))),
    }
}

fn parse_work(record: &StringRecord, tags: &mut TagTable) -> Result<Work> {
    let work = Work {
        id: field(record, 0).to_string(),
        title: field(record, 1).to_string(),
        work_type: parse_required(record, 2, "type")?,
        status: parse_required(record, 3, "status")?,
        year: parse_optional(record, 4, "year")?,
        rating: parse_optional(record, 5, "rating")?,
        review: optional(record, 6),
        note: optional(record, 7),
        source: optional(record, 8),
        reminder_enabled: parse_bool(record, 9),
        reminder_frequency: parse_optional(record, 10, "reminder frequency")?,
        episodes: Vec::new(),
        tags: tags.intern_lists(field(record, 13), field(record, 14)),
        date_added: parse_time(record, 11, "date added")?
            .ok_or_else(|| WatchedItError::validation("missing date added"))?,
        date_updated: parse_time(record, 12, "date updated")?,
    };
    Ok(work)
}

fn parse_episode(record: &StringRecord) -> Result<Episode> {
    Ok(Episode {
        id: field(record, 15).to_string(),
        number: parse_required(record, 16, "episode number")?,
        season: parse_optional(record, 17, "season")?.unwrap_or(1),
        title: optional(record, 18),
        description: optional(record, 19),
        episode_type: parse_optional::<EpisodeType>(record, 20, "episode type")?.unwrap_or_default(),
        watched: parse_bool(record, 21),
        date_watched: parse_time(record, 22, "date watched")?,
        note: optional(record, 23),
    })
}
