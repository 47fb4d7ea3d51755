//! CSV loading for users, sessions and session texts.
//!
//! Every entity goes through the same generic [`read_records`] routine: the
//! header is checked against the entity's required columns, then each row is
//! coerced through its field table. Malformed rows are counted and skipped;
//! only file-level problems abort the load.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sessions_core::coercion::{CoercedRow, CsvRecord};
use sessions_core::error::{LoaderError, Result};
use sessions_core::models::{Session, SessionText, User};
use sessions_core::time_utils::TimezoneHandler;
use tracing::{debug, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Successfully parsed rows of one file, in file order.
#[derive(Debug, Clone)]
pub struct LoadedFile<T> {
    pub records: Vec<T>,
    /// Rows rejected by the coercion layer.
    pub skipped: usize,
}

impl<T> Default for LoadedFile<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Open `path` and read every row as a `T`.
pub fn load_records<T: CsvRecord>(path: &Path, tz: &TimezoneHandler) -> Result<LoadedFile<T>> {
    let file = File::open(path).map_err(|source| LoaderError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    read_records(BufReader::new(file), path, tz)
}

/// Read every row of a CSV `source` as a `T`.
///
/// `origin` names the source in errors and log lines.
pub fn read_records<T: CsvRecord, R: Read>(
    source: R,
    origin: &Path,
    tz: &TimezoneHandler,
) -> Result<LoadedFile<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|source| csv_error(origin, source))?
        .clone();
    let columns = column_index(&headers);
    check_required_columns::<T>(&columns, origin)?;

    let mut loaded = LoadedFile::default();
    let mut rows_read = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(csv_error(origin, e));
            }
            Err(e) => {
                // Invalid UTF-8 and similar per-row decode failures.
                rows_read += 1;
                loaded.skipped += 1;
                debug!("Skipping undecodable row in {}: {}", origin.display(), e);
                continue;
            }
        };
        rows_read += 1;

        let lookup = |column: &str| columns.get(column).and_then(|&i| record.get(i));
        let row = match CoercedRow::coerce(T::FIELDS, lookup, tz) {
            Ok(row) => row,
            Err(defect) => {
                loaded.skipped += 1;
                debug!(
                    "Skipping {} row at line {} in {}: {}",
                    T::KIND,
                    record.position().map(|p| p.line()).unwrap_or(0),
                    origin.display(),
                    defect
                );
                continue;
            }
        };

        match T::from_row(&row) {
            Some(entity) => loaded.records.push(entity),
            None => loaded.skipped += 1,
        }
    }

    if loaded.skipped > 0 {
        warn!(
            "Skipped {} malformed {} row(s) in {}",
            loaded.skipped,
            T::KIND,
            origin.display()
        );
    }
    debug!(
        "File {}: {} read, {} skipped, {} parsed",
        origin.display(),
        rows_read,
        loaded.skipped,
        loaded.records.len(),
    );

    Ok(loaded)
}

/// Load users from a `user.csv`-shaped file.
pub fn load_users(path: &Path, tz: &TimezoneHandler) -> Result<LoadedFile<User>> {
    load_records(path, tz)
}

/// Load sessions from a `session.csv`-shaped file.
pub fn load_sessions(path: &Path, tz: &TimezoneHandler) -> Result<LoadedFile<Session>> {
    load_records(path, tz)
}

/// Load session texts from a `session_text.csv`-shaped file.
pub fn load_session_texts(path: &Path, tz: &TimezoneHandler) -> Result<LoadedFile<SessionText>> {
    load_records(path, tz)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Map header names to their column position. A repeated header name
/// resolves to its last occurrence.
fn column_index(headers: &csv::StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect()
}

fn check_required_columns<T: CsvRecord>(
    columns: &HashMap<String, usize>,
    origin: &Path,
) -> Result<()> {
    let missing: Vec<String> = T::required_columns()
        .into_iter()
        .filter(|c| !columns.contains_key(*c))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoaderError::MissingColumns {
            path: origin.to_path_buf(),
            columns: missing,
        })
    }
}

fn csv_error(origin: &Path, source: csv::Error) -> LoaderError {
    LoaderError::Csv {
        path: origin.to_path_buf(),
        source,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use uuid::Uuid;

    const U1: &str = "11111111-1111-4111-8111-111111111111";
    const U2: &str = "22222222-2222-4222-8222-222222222222";
    const S1: &str = "33333333-3333-4333-8333-333333333333";
    const T1: &str = "44444444-4444-4444-8444-444444444444";

    const USER_HEADER: &str = "id,uuid,nick_name,email,credits,created_at";
    const SESSION_HEADER: &str = "uuid,from_user_uuid,session_type,begin_at,end_at,duration,from_language,to_language,is_paid,is_translation_enabled,is_ai_call";
    const TEXT_HEADER: &str =
        "id,uuid,session_uuid,start_at,text,text_translated,speaker,is_input,type";

    fn write_csv(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    fn tz() -> TimezoneHandler {
        TimezoneHandler::default()
    }

    fn read_str<T: CsvRecord>(content: &str) -> Result<LoadedFile<T>> {
        read_records(content.as_bytes(), Path::new("inline.csv"), &tz())
    }

    // ── load_users ────────────────────────────────────────────────────────────

    #[test]
    fn test_load_users_basic() {
        let dir = TempDir::new().unwrap();
        let row1 = format!("1,{U1},ada,ada@example.com,10.5,2024-01-15 10:00:00");
        let row2 = format!("2,{U2},bob,,oops,");
        let path = write_csv(dir.path(), "user.csv", &[USER_HEADER, &row1, &row2]);

        let loaded = load_users(&path, &tz()).unwrap();
        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[0].nick_name, "ada");
        assert_eq!(loaded.records[0].credits, 10.5);
        assert!(loaded.records[0].registration_time.is_some());
        assert_eq!(loaded.records[1].email, "");
        assert_eq!(loaded.records[1].credits, 0.0);
        assert!(loaded.records[1].registration_time.is_none());
    }

    #[test]
    fn test_load_users_bad_uuid_row_skipped() {
        let content = format!(
            "{USER_HEADER}\n1,not-a-uuid,x,,,\n2,{U1},ada,,1,2024-01-01\n"
        );
        let loaded = read_str::<User>(&content).unwrap();
        assert_eq!(loaded.skipped, 1);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].uuid, Uuid::parse_str(U1).unwrap());
    }

    #[test]
    fn test_load_preserves_file_order() {
        let content = format!("{USER_HEADER}\n2,{U2},b,,,\n1,{U1},a,,,\n");
        let loaded = read_str::<User>(&content).unwrap();
        let nicks: Vec<&str> = loaded.records.iter().map(|u| u.nick_name.as_str()).collect();
        assert_eq!(nicks, vec!["b", "a"]);
    }

    #[test]
    fn test_extra_columns_ignored_and_headers_trimmed() {
        let content = format!(
            " uuid , nick_name,email,credits,created_at,favourite_colour\n{U1},ada,a@x,3,,blue\n"
        );
        let loaded = read_str::<User>(&content).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].nick_name, "ada");
    }

    #[test]
    fn test_short_row_reads_missing_cells_as_empty() {
        let content = format!("{USER_HEADER}\n1,{U1},ada\n");
        let loaded = read_str::<User>(&content).unwrap();
        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.records[0].email, "");
        assert!(loaded.records[0].registration_time.is_none());
    }

    #[test]
    fn test_quoted_text_with_commas_and_newlines() {
        let content = format!(
            "{TEXT_HEADER}\n1,{T1},{S1},2024-01-15T10:00:00Z,\"hello, world\nsecond line\",\"\",0,1,2\n"
        );
        let loaded = read_str::<SessionText>(&content).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].text, "hello, world\nsecond line");
        assert_eq!(loaded.records[0].is_input, 1);
        assert_eq!(loaded.records[0].message_type, 2);
    }

    // ── fatal file-level defects ──────────────────────────────────────────────

    #[test]
    fn test_missing_file_is_file_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load_sessions(&dir.path().join("session.csv"), &tz()).unwrap_err();
        match err {
            LoaderError::FileRead { path, .. } => assert!(path.ends_with("session.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_required_columns_lists_all() {
        let content = format!("uuid,begin_at\n{S1},2024-01-01\n");
        let err = read_str::<Session>(&content).unwrap_err();
        match err {
            LoaderError::MissingColumns { columns, .. } => {
                assert!(columns.contains(&"from_user_uuid".to_string()));
                assert!(columns.contains(&"is_ai_call".to_string()));
                assert!(!columns.contains(&"uuid".to_string()));
                assert_eq!(columns.len(), 9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file_is_missing_columns() {
        let err = read_str::<SessionText>("").unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumns { .. }));
    }

    #[test]
    fn test_header_only_file_loads_nothing() {
        let loaded = read_str::<Session>(&format!("{SESSION_HEADER}\n")).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.skipped, 0);
    }

    // ── sessions & texts ──────────────────────────────────────────────────────

    #[test]
    fn test_load_sessions_coerces_flags_and_duration() {
        let content = format!(
            "{SESSION_HEADER}\n{S1},{U1},2,2024-01-15T10:00:00Z,2024-01-15T10:05:00Z,300.5,en,ja,1,yes,false\n"
        );
        let loaded = read_str::<Session>(&content).unwrap();
        let session = &loaded.records[0];
        assert_eq!(session.session_type, 2);
        assert_eq!(session.duration, 300.5);
        assert_eq!(session.from_language, "en");
        assert_eq!(session.to_language, "ja");
        assert!(session.is_paid);
        assert!(session.is_translation_enabled);
        assert!(!session.is_ai_call);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn test_session_with_bad_foreign_key_skipped() {
        let content = format!("{SESSION_HEADER}\n{S1},???,0,,,,,,,,\n");
        let loaded = read_str::<Session>(&content).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.skipped, 1);
    }

    #[test]
    fn test_session_text_bad_id_defaults_to_zero() {
        let content = format!("{TEXT_HEADER}\nabc,{T1},{S1},,hi,,0,0,0\n");
        let loaded = read_str::<SessionText>(&content).unwrap();
        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.records[0].id, 0);
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut bytes = format!("{USER_HEADER}\n").into_bytes();
        bytes.extend_from_slice(b"1,");
        bytes.extend_from_slice(U2.as_bytes());
        bytes.extend_from_slice(b",\xff\xfe,,,\n");
        bytes.extend_from_slice(format!("2,{U1},ada,,,\n").as_bytes());

        let loaded =
            read_records::<User, _>(bytes.as_slice(), Path::new("bytes.csv"), &tz()).unwrap();
        assert_eq!(loaded.skipped, 1);
        assert_eq!(loaded.records.len(), 1);
    }
}
