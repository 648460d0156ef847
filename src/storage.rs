use crate::model::{
    is_deprecated_file, parse_strict_date, Board, BoardError, BucketKey, Item, Lifecycle,
    Separator, TaskFileName,
};
use chrono::{Datelike, Local};
use serde_json::{json, Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identifier written into new items until an importer assigns a real one.
pub const PENDING_ID: &str = "pending";

/// The directory of task files every operation works against.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rescheduled {
    pub deprecated: String,
    pub updated: String,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataDir { root: root.into() }
    }

    /// Reads every task file and buckets those due in `year`.
    pub fn scan(&self, year: i32) -> Board {
        let mut board = Board::empty(year);
        let files = match self.task_files(&mut board.warnings) {
            Ok(files) => files,
            Err(err) => {
                warn!(dir = %self.root.display(), error = %err, "cannot read data directory");
                board.warnings.push(err.to_string());
                return board;
            }
        };
        for (path, rel) in files {
            match load_item(&path, &rel) {
                Ok(item) => {
                    board.scanned += 1;
                    let Some(date) = item.date() else {
                        board
                            .warnings
                            .push(format!("{rel}: unparseable deadline {:?}", item.deadline));
                        continue;
                    };
                    if date.year() == year {
                        board.place(BucketKey::for_date(date), item);
                    }
                }
                Err(msg) => board.warnings.push(msg),
            }
        }
        board.sort();
        for warning in &board.warnings {
            debug!(%warning, "skipped task file");
        }
        info!(
            year,
            scanned = board.scanned,
            placed = board.placed(),
            warnings = board.warnings.len(),
            "scanned data directory"
        );
        board
    }

    /// Moves an item to a new deadline: the source becomes a `-depr` copy and
    /// a fresh `-updateMe` file carries the new date. Not atomic.
    pub fn reschedule(&self, file: &str, deadline: &str) -> Result<Rescheduled, BoardError> {
        let file = file.trim();
        if file.is_empty() {
            return Err(BoardError::MissingField("file"));
        }
        let new_date = parse_strict_date(deadline)?.format("%Y-%m-%d").to_string();
        let root = self.canonical_root()?;
        let source = resolve_inside(&root, file)?;
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(TaskFileName::parse)
            .ok_or_else(|| BoardError::UnrecognizedName(file.to_string()))?;
        if name.lifecycle == Some(Lifecycle::Deprecated) {
            return Err(BoardError::AlreadyDeprecated(file.to_string()));
        }
        let mut payload = read_object(&source, file)?;

        let dir = source.parent().unwrap_or(root.as_path());
        let target = dir.join(
            name.with(&new_date, Some(Lifecycle::UpdateMe))
                .to_file_name(),
        );
        if target != source && target.exists() {
            return Err(BoardError::TargetExists(relative(&root, &target)));
        }
        let deprecated = dir.join(
            name.with(&name.date, Some(Lifecycle::Deprecated))
                .to_file_name(),
        );

        fs::rename(&source, &deprecated)
            .map_err(|e| BoardError::io(format!("renaming {file}"), e))?;
        let mut retired = payload.clone();
        retired.insert("status".into(), Value::String("deprecated".into()));
        write_object(&deprecated, &retired)?;

        payload.insert("deadline".into(), Value::String(new_date.clone()));
        write_object(&target, &payload)?;

        let outcome = Rescheduled {
            deprecated: relative(&root, &deprecated),
            updated: relative(&root, &target),
        };
        info!(
            from = file,
            deprecated = %outcome.deprecated,
            updated = %outcome.updated,
            deadline = %new_date,
            "rescheduled item"
        );
        Ok(outcome)
    }

    /// Writes a new item for `program`, named by the current timestamp.
    /// Returns the new file's path relative to the data directory.
    pub fn add_item(
        &self,
        program: &str,
        deadline: &str,
        name: &str,
    ) -> Result<String, BoardError> {
        let program = program.trim();
        if program.is_empty() {
            return Err(BoardError::MissingField("program"));
        }
        if deadline.trim().is_empty() {
            return Err(BoardError::MissingField("deadline"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(BoardError::MissingField("name"));
        }
        let date = parse_strict_date(deadline)?.format("%Y-%m-%d").to_string();
        validate_program(program)?;

        let dir = self.root.join(program);
        fs::create_dir_all(&dir)
            .map_err(|e| BoardError::io(format!("creating {:?}", dir), e))?;

        let now = Local::now();
        let file_name = TaskFileName {
            id: now.format("%Y%m%d%H%M%S%3f").to_string(),
            separator: Separator::Triple,
            date: date.clone(),
            lifecycle: Some(Lifecycle::ImportMe),
        }
        .to_file_name();
        let path = dir.join(&file_name);
        let payload = json!({
            "id": PENDING_ID,
            "name": name,
            "title": name,
            "program": program,
            "deadline": date,
            "status": "new",
            "created": now.to_rfc3339(),
        });

        let serialized = serde_json::to_string_pretty(&payload)
            .map_err(|e| BoardError::json("serializing new item", e))?;
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    BoardError::TargetExists(format!("{program}/{file_name}"))
                }
                _ => BoardError::io(format!("creating {:?}", path), e),
            })?;
        out.write_all(serialized.as_bytes())
            .and_then(|_| out.write_all(b"\n"))
            .map_err(|e| BoardError::io(format!("writing {:?}", path), e))?;

        let rel = format!("{program}/{file_name}");
        info!(file = %rel, program, deadline = %date, "added item");
        Ok(rel)
    }

    /// `*.json` at the top level and one directory down, sorted by path.
    /// Unreadable subdirectories and entries are reported in `warnings` and skipped.
    fn task_files(
        &self,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<(PathBuf, String)>, BoardError> {
        let mut files = Vec::new();
        for entry in sorted_entries(&self.root, warnings)? {
            let Some(name) = visible_name(&entry) else {
                continue;
            };
            if entry.is_dir() {
                let inner_entries = match sorted_entries(&entry, warnings) {
                    Ok(entries) => entries,
                    Err(err) => {
                        warnings.push(err.to_string());
                        continue;
                    }
                };
                for inner in inner_entries {
                    if let Some(inner_name) = visible_name(&inner) {
                        if is_task_file(&inner, &inner_name) {
                            files.push((inner, format!("{name}/{inner_name}")));
                        }
                    }
                }
            } else if is_task_file(&entry, &name) {
                files.push((entry, name));
            }
        }
        Ok(files)
    }

    fn canonical_root(&self) -> Result<PathBuf, BoardError> {
        fs::canonicalize(&self.root)
            .map_err(|e| BoardError::io(format!("resolving data directory {:?}", self.root), e))
    }
}

fn sorted_entries(dir: &Path, warnings: &mut Vec<String>) -> Result<Vec<PathBuf>, BoardError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| BoardError::io(format!("reading {:?}", dir), e))?
        .map(|entry| entry.map(|e| e.path()));
    Ok(sorted_paths(dir, entries, warnings))
}

fn sorted_paths(
    dir: &Path,
    entries: impl Iterator<Item = std::io::Result<PathBuf>>,
    warnings: &mut Vec<String>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(err) => warnings.push(format!("reading entry in {:?}: {err}", dir)),
        }
    }
    paths.sort();
    paths
}

fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    Some(name.to_string())
}

fn is_task_file(path: &Path, name: &str) -> bool {
    path.is_file() && name.ends_with(".json") && !is_deprecated_file(name)
}

fn load_item(path: &Path, rel: &str) -> Result<Item, String> {
    let data = fs::read_to_string(path).map_err(|e| format!("{rel}: unreadable ({e})"))?;
    let value: Value =
        serde_json::from_str(&data).map_err(|e| format!("{rel}: invalid JSON ({e})"))?;
    let Value::Object(raw) = value else {
        return Err(format!("{rel}: not a JSON object"));
    };
    let stem = rel
        .rsplit('/')
        .next()
        .and_then(|n| n.strip_suffix(".json"))
        .unwrap_or(rel)
        .to_string();
    Item::from_json(rel.to_string(), &stem, raw)
        .ok_or_else(|| format!("{rel}: missing deadline"))
}

fn resolve_inside(root: &Path, file: &str) -> Result<PathBuf, BoardError> {
    let resolved = match fs::canonicalize(root.join(file)) {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BoardError::FileNotFound(file.to_string()))
        }
        Err(e) => return Err(BoardError::io(format!("resolving {file}"), e)),
    };
    if !resolved.starts_with(root) || resolved == root {
        return Err(BoardError::OutsideDataDir(file.to_string()));
    }
    if !resolved.is_file() {
        return Err(BoardError::FileNotFound(file.to_string()));
    }
    Ok(resolved)
}

fn read_object(path: &Path, label: &str) -> Result<Map<String, Value>, BoardError> {
    let data =
        fs::read_to_string(path).map_err(|e| BoardError::io(format!("reading {label}"), e))?;
    let value: Value = serde_json::from_str(&data)
        .map_err(|e| BoardError::json(format!("parsing {label}"), e))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(BoardError::NotAnObject(label.to_string())),
    }
}

fn write_object(path: &Path, payload: &Map<String, Value>) -> Result<(), BoardError> {
    let mut serialized = serde_json::to_string_pretty(payload)
        .map_err(|e| BoardError::json(format!("serializing {:?}", path), e))?;
    serialized.push('\n');
    fs::write(path, serialized).map_err(|e| BoardError::io(format!("writing {:?}", path), e))
}

fn validate_program(program: &str) -> Result<(), BoardError> {
    let bad = program.starts_with('.')
        || program
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(BoardError::InvalidProgram(program.to_string()));
    }
    Ok(())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    fn read_json(dir: &Path, rel: &str) -> Map<String, Value> {
        let data = fs::read_to_string(dir.join(rel)).unwrap();
        serde_json::from_str(&data).unwrap()
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if path.is_dir() {
                for inner in fs::read_dir(&path).unwrap() {
                    let inner = inner.unwrap().file_name().to_string_lossy().to_string();
                    names.push(format!("{name}/{inner}"));
                }
            } else {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    #[test]
    fn scan_buckets_items_by_month_and_week() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a-2024-03-07.json", r#"{"deadline":"2024-03-07","title":"Seven"}"#);
        write(tmp.path(), "b-2024-03-08.json", r#"{"deadline":"2024-03-08","title":"Eight"}"#);
        write(tmp.path(), "ops/c-2024-03-31.json", r#"{"deadline":"2024-03-31","name":"Last"}"#);
        write(tmp.path(), "d-2025-01-01.json", r#"{"deadline":"2025-01-01"}"#);

        let board = DataDir::new(tmp.path()).scan(2024);
        assert!(board.warnings.is_empty(), "{:?}", board.warnings);
        assert_eq!(board.scanned, 4);
        assert_eq!(board.placed(), 3);
        assert_eq!(board.items_in(3, 1)[0].title, "Seven");
        assert_eq!(board.items_in(3, 2)[0].title, "Eight");
        let last = &board.items_in(3, 4)[0];
        assert_eq!(last.title, "Last");
        assert_eq!(last.file, "ops/c-2024-03-31.json");
        assert_eq!(last.program(), Some("ops"));
    }

    #[test]
    fn scan_records_warnings_for_bad_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "array.json", "[1, 2]");
        write(tmp.path(), "broken.json", "{ nope");
        write(tmp.path(), "nodate.json", r#"{"title":"x"}"#);
        write(tmp.path(), "baddate.json", r#"{"deadline":"soon"}"#);
        write(tmp.path(), "notes.txt", "ignored");
        write(tmp.path(), ".hidden.json", "ignored");
        write(tmp.path(), "x/y/deep.json", r#"{"deadline":"2024-01-01"}"#);

        let board = DataDir::new(tmp.path()).scan(2024);
        assert_eq!(board.placed(), 0);
        assert_eq!(board.warnings.len(), 4, "{:?}", board.warnings);
        assert!(board.warnings[0].starts_with("array.json"));
        assert!(board.warnings.iter().any(|w| w.contains("unparseable deadline")));
    }

    #[test]
    fn scan_of_missing_directory_warns() {
        let tmp = TempDir::new().unwrap();
        let board = DataDir::new(tmp.path().join("missing")).scan(2024);
        assert_eq!(board.placed(), 0);
        assert_eq!(board.warnings.len(), 1);
    }

    #[test]
    fn added_item_surfaces_in_the_right_bucket() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::new(tmp.path());
        let rel = data.add_item("Apollo", "2024-06-15", "Launch review").unwrap();
        assert!(rel.starts_with("Apollo/"));
        assert!(rel.ends_with("___2024-06-15-importMe.json"));

        let saved = read_json(tmp.path(), &rel);
        assert_eq!(saved["id"], PENDING_ID);
        assert_eq!(saved["program"], "Apollo");
        assert_eq!(saved["deadline"], "2024-06-15");

        let board = data.scan(2024);
        let items = board.items_in(6, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Launch review");
        assert_eq!(items[0].file, rel);
    }

    #[test]
    fn add_item_requires_every_field() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::new(tmp.path());
        assert!(matches!(
            data.add_item("", "2024-06-15", "x"),
            Err(BoardError::MissingField("program"))
        ));
        assert!(matches!(
            data.add_item("p", " ", "x"),
            Err(BoardError::MissingField("deadline"))
        ));
        assert!(matches!(
            data.add_item("p", "2024-06-15", ""),
            Err(BoardError::MissingField("name"))
        ));
        assert!(matches!(
            data.add_item("p", "15.06.2024", "x"),
            Err(BoardError::InvalidDate(_))
        ));
        assert!(matches!(
            data.add_item("../escape", "2024-06-15", "x"),
            Err(BoardError::InvalidProgram(_))
        ));
        assert!(listing(tmp.path()).is_empty());
    }

    #[test]
    fn reschedule_deprecates_source_and_writes_update() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ops/T7___2024-01-05-importMe.json",
            r#"{"id":"T7","deadline":"2024-01-05","title":"Audit","status":"open"}"#,
        );
        let data = DataDir::new(tmp.path());
        let outcome = data
            .reschedule("ops/T7___2024-01-05-importMe.json", "2024-02-20")
            .unwrap();
        assert_eq!(outcome.deprecated, "ops/T7___2024-01-05-depr.json");
        assert_eq!(outcome.updated, "ops/T7___2024-02-20-updateMe.json");
        assert_eq!(
            listing(tmp.path()),
            vec![
                "ops/T7___2024-01-05-depr.json".to_string(),
                "ops/T7___2024-02-20-updateMe.json".to_string(),
            ]
        );

        let retired = read_json(tmp.path(), &outcome.deprecated);
        assert_eq!(retired["status"], "deprecated");
        assert_eq!(retired["deadline"], "2024-01-05");
        let updated = read_json(tmp.path(), &outcome.updated);
        assert_eq!(updated["deadline"], "2024-02-20");
        assert_eq!(updated["status"], "open");
        assert_eq!(updated["title"], "Audit");

        let board = data.scan(2024);
        assert_eq!(board.placed(), 1);
        assert_eq!(board.items_in(2, 3)[0].title, "Audit");
    }

    #[test]
    fn reschedule_with_bad_date_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a-2024-01-05.json", r#"{"deadline":"2024-01-05"}"#);
        let data = DataDir::new(tmp.path());
        for bad in ["2024/02/01", "tomorrow", "2024-02-30", ""] {
            assert!(data.reschedule("a-2024-01-05.json", bad).is_err(), "{bad}");
        }
        assert_eq!(listing(tmp.path()), vec!["a-2024-01-05.json".to_string()]);
        assert_eq!(read_json(tmp.path(), "a-2024-01-05.json")["deadline"], "2024-01-05");
    }

    #[test]
    fn reschedule_rejects_paths_outside_the_data_dir() {
        let tmp = TempDir::new().unwrap();
        let data_root = tmp.path().join("data");
        write(&data_root, "a-2024-01-05.json", r#"{"deadline":"2024-01-05"}"#);
        write(tmp.path(), "b-2024-01-05.json", r#"{"deadline":"2024-01-05"}"#);
        let data = DataDir::new(&data_root);

        assert!(matches!(
            data.reschedule("../b-2024-01-05.json", "2024-02-01"),
            Err(BoardError::OutsideDataDir(_))
        ));
        assert!(matches!(
            data.reschedule("missing-2024-01-05.json", "2024-02-01"),
            Err(BoardError::FileNotFound(_))
        ));
        assert!(tmp.path().join("b-2024-01-05.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn reschedule_rejects_symlinks_leading_out_of_the_data_dir() {
        let tmp = TempDir::new().unwrap();
        let data_root = tmp.path().join("data");
        fs::create_dir_all(&data_root).unwrap();
        write(tmp.path(), "b-2024-01-05.json", r#"{"deadline":"2024-01-05"}"#);
        std::os::unix::fs::symlink(
            tmp.path().join("b-2024-01-05.json"),
            data_root.join("b-2024-01-05.json"),
        )
        .unwrap();
        let data = DataDir::new(&data_root);

        assert!(matches!(
            data.reschedule("b-2024-01-05.json", "2024-02-01"),
            Err(BoardError::OutsideDataDir(_))
        ));
        assert!(tmp.path().join("b-2024-01-05.json").exists());
        assert!(!data_root.join("b-2024-02-01-updateMe.json").exists());
        assert!(!data_root.join("b-2024-01-05-depr.json").exists());
    }

    #[test]
    fn unreadable_entries_become_warnings() {
        let dir = Path::new("tasks");
        let entries = vec![
            Ok(PathBuf::from("tasks/b.json")),
            Err(std::io::Error::new(ErrorKind::PermissionDenied, "denied")),
            Ok(PathBuf::from("tasks/a.json")),
        ];
        let mut warnings = Vec::new();
        let paths = sorted_paths(dir, entries.into_iter(), &mut warnings);
        assert_eq!(
            paths,
            vec![PathBuf::from("tasks/a.json"), PathBuf::from("tasks/b.json")]
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("denied"));
    }

    #[test]
    fn reschedule_rejects_unrecognized_and_deprecated_names() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "notes.json", r#"{"deadline":"2024-01-05"}"#);
        write(tmp.path(), "a-2024-01-05-depr.json", r#"{"deadline":"2024-01-05"}"#);
        write(tmp.path(), "list-2024-01-05.json", "[]");
        let data = DataDir::new(tmp.path());

        assert!(matches!(
            data.reschedule("notes.json", "2024-02-01"),
            Err(BoardError::UnrecognizedName(_))
        ));
        assert!(matches!(
            data.reschedule("a-2024-01-05-depr.json", "2024-02-01"),
            Err(BoardError::AlreadyDeprecated(_))
        ));
        assert!(matches!(
            data.reschedule("list-2024-01-05.json", "2024-02-01"),
            Err(BoardError::NotAnObject(_))
        ));
        assert_eq!(listing(tmp.path()).len(), 3);
    }

    #[test]
    fn reschedule_refuses_to_overwrite_another_item() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a-2024-01-05.json", r#"{"deadline":"2024-01-05"}"#);
        write(tmp.path(), "a-2024-02-01-updateMe.json", r#"{"deadline":"2024-02-01"}"#);
        let data = DataDir::new(tmp.path());
        assert!(matches!(
            data.reschedule("a-2024-01-05.json", "2024-02-01"),
            Err(BoardError::TargetExists(_))
        ));
        assert_eq!(listing(tmp.path()).len(), 2);
    }
}
