use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const MONTHS: u32 = 12;
pub const WEEKS: u32 = 4;

/// A task file as seen by one scan. Never cached.
#[derive(Debug, Clone)]
pub struct Item {
    pub title: String,
    pub file: String,
    pub deadline: String,
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub month: u32,
    pub week: u32,
}

/// Items of one year, grouped by month and week bucket.
#[derive(Debug, Clone)]
pub struct Board {
    pub year: i32,
    pub buckets: BTreeMap<BucketKey, Vec<Item>>,
    pub warnings: Vec<String>,
    pub scanned: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid date format (use YYYY-MM-DD): {0}")]
    InvalidDate(String),
    #[error("invalid program name: {0}")]
    InvalidProgram(String),
    #[error("file is outside the data directory: {0}")]
    OutsideDataDir(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("unrecognized task file name: {0}")]
    UnrecognizedName(String),
    #[error("file is already deprecated: {0}")]
    AlreadyDeprecated(String),
    #[error("target file already exists: {0}")]
    TargetExists(String),
    #[error("task file does not contain a JSON object: {0}")]
    NotAnObject(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BoardError {
    /// True when the request itself was at fault, as opposed to the disk.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, BoardError::Io { .. } | BoardError::Json { .. })
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BoardError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        BoardError::Json {
            context: context.into(),
            source,
        }
    }
}

impl Item {
    pub fn from_json(file: String, stem: &str, raw: Map<String, Value>) -> Option<Self> {
        let deadline = raw.get("deadline")?.as_str()?.to_string();
        let title = ["title", "name"]
            .iter()
            .filter_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(stem)
            .to_string();
        Some(Item {
            title,
            file,
            deadline,
            raw,
        })
    }

    pub fn status(&self) -> Option<&str> {
        self.raw.get("status").and_then(Value::as_str)
    }

    /// The `program` field, falling back to the subdirectory the file lives in.
    pub fn program(&self) -> Option<&str> {
        self.raw
            .get("program")
            .and_then(Value::as_str)
            .or_else(|| self.file.rsplit_once('/').map(|(dir, _)| dir))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        parse_deadline(&self.deadline)
    }
}

impl BucketKey {
    pub fn for_date(date: NaiveDate) -> Self {
        BucketKey {
            month: date.month(),
            week: week_of_day(date.day()),
        }
    }
}

impl Board {
    pub fn empty(year: i32) -> Self {
        Board {
            year,
            buckets: BTreeMap::new(),
            warnings: Vec::new(),
            scanned: 0,
        }
    }

    pub fn place(&mut self, key: BucketKey, item: Item) {
        self.buckets.entry(key).or_default().push(item);
    }

    pub fn items_in(&self, month: u32, week: u32) -> &[Item] {
        self.buckets
            .get(&BucketKey { month, week })
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn placed(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn sort(&mut self) {
        for items in self.buckets.values_mut() {
            items.sort_by(|a, b| {
                a.deadline
                    .cmp(&b.deadline)
                    .then_with(|| a.title.cmp(&b.title))
            });
        }
    }
}

/// Days 1-7, 8-14, 15-21 map to weeks 1-3; day 22 through month end is week 4.
pub fn week_of_day(day: u32) -> u32 {
    match day {
        0..=7 => 1,
        8..=14 => 2,
        15..=21 => 3,
        _ => 4,
    }
}

pub fn week_label(week: u32) -> &'static str {
    match week {
        1 => "1-7",
        2 => "8-14",
        3 => "15-21",
        _ => "22+",
    }
}

/// Lenient parse used when scanning: plain dates, date-times and RFC 3339.
pub fn parse_deadline(input: &str) -> Option<NaiveDate> {
    let raw = input.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|dt| dt.date())
}

/// Strict parse used for mutation input: exactly `YYYY-MM-DD` and a real date.
pub fn parse_strict_date(input: &str) -> Result<NaiveDate, BoardError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(BoardError::MissingField("deadline"));
    }
    if !strict_date_re().is_match(raw) {
        return Err(BoardError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| BoardError::InvalidDate(raw.to_string()))
}

fn strict_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Dash,
    Triple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    ImportMe,
    UpdateMe,
    Deprecated,
}

/// `<id><sep><date>[-suffix].json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFileName {
    pub id: String,
    pub separator: Separator,
    pub date: String,
    pub lifecycle: Option<Lifecycle>,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Separator::Dash => "-",
            Separator::Triple => "___",
        }
    }
}

impl Lifecycle {
    pub fn suffix(self) -> &'static str {
        match self {
            Lifecycle::ImportMe => "-importMe",
            Lifecycle::UpdateMe => "-updateMe",
            Lifecycle::Deprecated => "-depr",
        }
    }
}

impl TaskFileName {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = file_name_re().captures(name)?;
        let separator = match &caps["sep"] {
            "___" => Separator::Triple,
            _ => Separator::Dash,
        };
        let lifecycle = caps.name("suffix").map(|m| match m.as_str() {
            "-importMe" => Lifecycle::ImportMe,
            "-updateMe" => Lifecycle::UpdateMe,
            _ => Lifecycle::Deprecated,
        });
        Some(TaskFileName {
            id: caps["id"].to_string(),
            separator,
            date: caps["date"].to_string(),
            lifecycle,
        })
    }

    pub fn with(&self, date: &str, lifecycle: Option<Lifecycle>) -> Self {
        TaskFileName {
            id: self.id.clone(),
            separator: self.separator,
            date: date.to_string(),
            lifecycle,
        }
    }

    pub fn to_file_name(&self) -> String {
        format!(
            "{}{}{}{}.json",
            self.id,
            self.separator.as_str(),
            self.date,
            self.lifecycle.map(Lifecycle::suffix).unwrap_or("")
        )
    }
}

fn file_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<id>.+?)(?P<sep>___|-)(?P<date>\d{4}-\d{2}-\d{2})(?P<suffix>-importMe|-updateMe|-depr)?\.json$",
        )
        .expect("static regex")
    })
}

pub fn is_deprecated_file(name: &str) -> bool {
    name.ends_with("-depr.json")
}
