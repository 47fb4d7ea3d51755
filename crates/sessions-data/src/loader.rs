//! Main load pipeline.
//!
//! Reads the three CSV files, applies the registration window, links the
//! hierarchy and returns a [`Dataset`] with its [`LoadReport`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sessions_core::coercion::CsvRecord;
use sessions_core::error::Result;
use sessions_core::models::{EntityKind, Session, SessionText, User};
use sessions_core::settings::DEFAULT_REGISTRATION_DAYS;
use sessions_core::time_utils::{registration_cutoff, TimezoneHandler};
use tracing::info;

use crate::dataset::{Dataset, FileReport, LoadReport};
use crate::linker::{filter_registered, link};
use crate::reader::{load_records, LoadedFile};

// ── LoaderOptions ─────────────────────────────────────────────────────────────

/// Everything that shapes a load besides the data directory.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Users registered more than this many days before the reference time
    /// are dropped.
    pub registration_days: u32,
    /// Zone used for timestamps written without an offset. Defaults to the
    /// system zone.
    pub timezone: TimezoneHandler,
    pub user_file: String,
    pub session_file: String,
    pub session_text_file: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            registration_days: DEFAULT_REGISTRATION_DAYS,
            timezone: TimezoneHandler::system(),
            user_file: EntityKind::User.default_file_name().to_string(),
            session_file: EntityKind::Session.default_file_name().to_string(),
            session_text_file: EntityKind::SessionText.default_file_name().to_string(),
        }
    }
}

// ── DataLoader ────────────────────────────────────────────────────────────────

/// Loads and links users, sessions and session texts from one directory.
///
/// ```no_run
/// use sessions_data::loader::DataLoader;
///
/// let dataset = DataLoader::new("raw_data/").load_all()?;
/// for user in dataset.users() {
///     println!("User: {}", user.nick_name);
///     for session in &user.sessions {
///         println!("  Session: {}", session.uuid);
///         for msg in &session.messages {
///             println!("    {}: {}", msg.speaker, msg.text);
///         }
///     }
/// }
/// # Ok::<(), sessions_core::LoaderError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DataLoader {
    data_dir: PathBuf,
    options: LoaderOptions,
}

impl DataLoader {
    /// A loader over `data_dir` with default options.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_options(data_dir, LoaderOptions::default())
    }

    pub fn with_options(data_dir: impl Into<PathBuf>, options: LoaderOptions) -> Self {
        Self {
            data_dir: data_dir.into(),
            options,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Full path of the CSV file holding `kind`.
    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        let name = match kind {
            EntityKind::User => &self.options.user_file,
            EntityKind::Session => &self.options.session_file,
            EntityKind::SessionText => &self.options.session_text_file,
        };
        self.data_dir.join(name)
    }

    /// Parse the user file without filtering or linking.
    pub fn load_users(&self) -> Result<LoadedFile<User>> {
        self.load_kind()
    }

    /// Parse the session file without linking.
    pub fn load_sessions(&self) -> Result<LoadedFile<Session>> {
        self.load_kind()
    }

    /// Parse the session text file without linking.
    pub fn load_session_texts(&self) -> Result<LoadedFile<SessionText>> {
        self.load_kind()
    }

    /// Run the full pipeline with the registration window ending now.
    pub fn load_all(&self) -> Result<Dataset> {
        self.load_all_at(Utc::now())
    }

    /// Run the full pipeline with the registration window ending at `now`.
    ///
    /// 1. Parse the three files (any file-level defect aborts the load).
    /// 2. Keep users registered within `registration_days` of `now`.
    /// 3. Link sessions under users and texts under sessions, dropping
    ///    orphans, and sort both child levels.
    pub fn load_all_at(&self, now: DateTime<Utc>) -> Result<Dataset> {
        // ── Step 1: Parse ─────────────────────────────────────────────────────
        let load_start = Instant::now();
        let users = self.load_users()?;
        let sessions = self.load_sessions()?;
        let texts = self.load_session_texts()?;
        let load_time = load_start.elapsed().as_secs_f64();

        let files = vec![
            self.file_report(EntityKind::User, &users),
            self.file_report(EntityKind::Session, &sessions),
            self.file_report(EntityKind::SessionText, &texts),
        ];

        // ── Step 2: Registration window ───────────────────────────────────────
        let link_start = Instant::now();
        let cutoff = registration_cutoff(now, self.options.registration_days);
        let (retained, users_outside_window) = filter_registered(users.records, cutoff);

        // ── Step 3: Link ──────────────────────────────────────────────────────
        let linked = link(retained, sessions.records, texts.records);
        let link_time = link_start.elapsed().as_secs_f64();

        let mut dataset = linked.dataset;
        dataset.report = LoadReport {
            files,
            reference_time: Some(now),
            registration_days: self.options.registration_days,
            users_outside_window,
            orphaned_sessions: linked.orphaned_sessions,
            orphaned_texts: linked.orphaned_texts,
            load_time_seconds: load_time,
            link_time_seconds: link_time,
        };

        let stats = dataset.stats();
        info!(
            "Loaded {} users, {} sessions, {} session texts from {} ({} users outside the {}-day window)",
            stats.users,
            stats.sessions,
            stats.session_texts,
            self.data_dir.display(),
            users_outside_window,
            self.options.registration_days,
        );

        Ok(dataset)
    }

    fn load_kind<T: CsvRecord>(&self) -> Result<LoadedFile<T>> {
        load_records(&self.path_for(T::KIND), &self.options.timezone)
    }

    fn file_report<T>(&self, kind: EntityKind, loaded: &LoadedFile<T>) -> FileReport {
        FileReport {
            kind,
            path: self.path_for(kind),
            parsed: loaded.records.len(),
            skipped: loaded.skipped,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sessions_core::error::LoaderError;
    use sessions_core::models::LoadStats;
    use sessions_core::time_utils::resolve_timezone;
    use std::io::Write;
    use tempfile::TempDir;
    use uuid::Uuid;

    const U1: &str = "11111111-1111-4111-8111-111111111111";
    const U2: &str = "22222222-2222-4222-8222-222222222222";
    const U_UNKNOWN: &str = "99999999-9999-4999-8999-999999999999";
    const S1: &str = "33333333-3333-4333-8333-333333333333";
    const S2: &str = "55555555-5555-4555-8555-555555555555";
    const T1: &str = "44444444-4444-4444-8444-444444444444";
    const T2: &str = "66666666-6666-4666-8666-666666666666";

    const USER_HEADER: &str = "uuid,nick_name,email,credits,created_at";
    const SESSION_HEADER: &str = "uuid,from_user_uuid,session_type,begin_at,end_at,duration,from_language,to_language,is_paid,is_translation_enabled,is_ai_call";
    const TEXT_HEADER: &str =
        "id,uuid,session_uuid,start_at,text,text_translated,speaker,is_input,type";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn stamp(dt: DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn write_csv(dir: &Path, name: &str, lines: &[String]) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    fn write_fixture(dir: &Path, users: &[String], sessions: &[String], texts: &[String]) {
        let with_header = |header: &str, rows: &[String]| {
            std::iter::once(header.to_string())
                .chain(rows.iter().cloned())
                .collect::<Vec<_>>()
        };
        write_csv(dir, "user.csv", &with_header(USER_HEADER, users));
        write_csv(dir, "session.csv", &with_header(SESSION_HEADER, sessions));
        write_csv(dir, "session_text.csv", &with_header(TEXT_HEADER, texts));
    }

    fn user_row(uuid: &str, nick: &str, created_at: &str) -> String {
        format!("{uuid},{nick},{nick}@example.com,5,{created_at}")
    }

    fn session_row(uuid: &str, owner: &str, begin_at: &str) -> String {
        format!("{uuid},{owner},1,{begin_at},,60,en,ja,1,0,no")
    }

    fn text_row(id: u32, uuid: &str, session: &str, start_at: &str) -> String {
        format!("{id},{uuid},{session},{start_at},hello,konnichiwa,0,1,0")
    }

    fn utc_options() -> LoaderOptions {
        LoaderOptions {
            timezone: TimezoneHandler::new(resolve_timezone("UTC").unwrap()),
            ..Default::default()
        }
    }

    fn utc_loader(dir: &Path) -> DataLoader {
        DataLoader::with_options(dir, utc_options())
    }

    fn uuid(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[test]
    fn test_load_all_single_chain() {
        let dir = TempDir::new().unwrap();
        let today = stamp(now() - Duration::hours(1));
        write_fixture(
            dir.path(),
            &[user_row(U1, "ada", &today)],
            &[session_row(S1, U1, "2024-06-01 09:00:00")],
            &[text_row(1, T1, S1, "2024-06-01 09:00:05")],
        );

        let dataset = utc_loader(dir.path()).load_all_at(now()).unwrap();
        assert_eq!(
            dataset.stats(),
            LoadStats {
                users: 1,
                sessions: 1,
                session_texts: 1,
                users_with_sessions: 1,
                sessions_with_messages: 1,
            }
        );
        assert_eq!(
            dataset.users()[0].sessions[0].messages[0].uuid,
            uuid(T1)
        );
    }

    #[test]
    fn test_load_all_with_real_clock() {
        let dir = TempDir::new().unwrap();
        let today = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        write_fixture(dir.path(), &[user_row(U1, "ada", &today)], &[], &[]);

        let dataset = utc_loader(dir.path()).load_all().unwrap();
        assert_eq!(dataset.stats().users, 1);
        assert!(dataset.users()[0].sessions.is_empty());
    }

    #[test]
    fn test_unknown_owner_session_dropped() {
        let dir = TempDir::new().unwrap();
        let today = stamp(now());
        write_fixture(
            dir.path(),
            &[user_row(U1, "ada", &today)],
            &[session_row(S1, U_UNKNOWN, "2024-06-01 09:00:00")],
            &[],
        );

        let dataset = utc_loader(dir.path()).load_all_at(now()).unwrap();
        assert_eq!(dataset.stats().sessions, 0);
        assert_eq!(dataset.sessions().count(), 0);
        assert_eq!(dataset.report().orphaned_sessions, 1);
        // Parse succeeded; the row was not skipped.
        assert_eq!(dataset.report().skipped(EntityKind::Session), 0);
    }

    #[test]
    fn test_registration_window_filters_users_and_their_sessions() {
        let dir = TempDir::new().unwrap();
        let recent = stamp(now() - Duration::days(10));
        let old = stamp(now() - Duration::days(46));
        write_fixture(
            dir.path(),
            &[
                user_row(U1, "recent", &recent),
                user_row(U2, "old", &old),
                user_row("aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa", "undated", "someday"),
            ],
            &[
                session_row(S1, U1, "2024-05-30 10:00:00"),
                session_row(S2, U2, "2024-05-30 11:00:00"),
            ],
            &[
                text_row(1, T1, S1, ""),
                text_row(2, T2, S2, ""),
            ],
        );

        let dataset = utc_loader(dir.path()).load_all_at(now()).unwrap();
        let nicks: Vec<&str> = dataset.users().iter().map(|u| u.nick_name.as_str()).collect();
        assert_eq!(nicks, vec!["recent"]);
        assert_eq!(dataset.stats().sessions, 1);
        assert_eq!(dataset.stats().session_texts, 1);
        assert!(dataset.session_by_uuid(&uuid(S2)).is_none());

        let report = dataset.report();
        assert_eq!(report.users_outside_window, 2);
        assert_eq!(report.orphaned_sessions, 1);
        assert_eq!(report.orphaned_texts, 1);
        assert_eq!(report.reference_time, Some(now()));
        assert_eq!(report.registration_days, 45);
    }

    #[test]
    fn test_custom_registration_days() {
        let dir = TempDir::new().unwrap();
        let old = stamp(now() - Duration::days(46));
        write_fixture(dir.path(), &[user_row(U1, "old", &old)], &[], &[]);

        let options = LoaderOptions {
            registration_days: 60,
            ..utc_options()
        };
        let dataset = DataLoader::with_options(dir.path(), options)
            .load_all_at(now())
            .unwrap();
        assert_eq!(dataset.stats().users, 1);
    }

    #[test]
    fn test_default_options_use_system_zone() {
        let options = LoaderOptions::default();
        assert_eq!(
            options.timezone.default_tz(),
            TimezoneHandler::system().default_tz()
        );
        assert_eq!(options.registration_days, 45);
        assert_eq!(options.user_file, "user.csv");
    }

    #[test]
    fn test_huge_registration_window_keeps_every_dated_user() {
        let dir = TempDir::new().unwrap();
        write_fixture(
            dir.path(),
            &[
                user_row(U1, "ancient", "1970-01-01 00:00:00"),
                user_row(U2, "undated", ""),
            ],
            &[],
            &[],
        );

        let options = LoaderOptions {
            registration_days: 200_000_000,
            ..utc_options()
        };
        let dataset = DataLoader::with_options(dir.path(), options)
            .load_all_at(now())
            .unwrap();
        let nicks: Vec<&str> = dataset.users().iter().map(|u| u.nick_name.as_str()).collect();
        assert_eq!(nicks, vec!["ancient"]);
        assert_eq!(dataset.report().users_outside_window, 1);
    }

    #[test]
    fn test_bad_uuid_row_counts_as_skipped() {
        let dir = TempDir::new().unwrap();
        let today = stamp(now());
        write_fixture(
            dir.path(),
            &[user_row(U1, "ada", &today), user_row("bogus", "bad", &today)],
            &[],
            &[],
        );

        let dataset = utc_loader(dir.path()).load_all_at(now()).unwrap();
        assert_eq!(dataset.stats().users, 1);
        assert_eq!(dataset.report().skipped(EntityKind::User), 1);
        assert_eq!(dataset.report().total_skipped(), 1);
    }

    #[test]
    fn test_sorted_children() {
        let dir = TempDir::new().unwrap();
        let today = stamp(now());
        write_fixture(
            dir.path(),
            &[user_row(U1, "ada", &today)],
            &[
                session_row(S1, U1, ""),
                session_row(S2, U1, "2024-05-01 08:00:00"),
            ],
            &[
                text_row(1, T1, S2, "2024-05-01 08:05:00"),
                text_row(2, T2, S2, "2024-05-01 08:01:00"),
            ],
        );

        let dataset = utc_loader(dir.path()).load_all_at(now()).unwrap();
        let user = &dataset.users()[0];
        assert_eq!(user.session_uuids(), vec![uuid(S2), uuid(S1)]);
        let ids: Vec<i64> = user.sessions[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let today = stamp(now());
        write_fixture(
            dir.path(),
            &[user_row(U1, "ada", &today), user_row(U2, "bob", &today)],
            &[
                session_row(S1, U2, "2024-05-02 08:00:00"),
                session_row(S2, U2, "2024-05-01 08:00:00"),
            ],
            &[text_row(1, T1, S1, ""), text_row(2, T2, S2, "")],
        );

        let loader = utc_loader(dir.path());
        let first = loader.load_all_at(now()).unwrap();
        let second = loader.load_all_at(now()).unwrap();
        assert_eq!(first.stats(), second.stats());
        assert_eq!(first.users(), second.users());
        let a: Vec<&Session> = first.sessions().collect();
        let b: Vec<&Session> = second.sessions().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_aborts_load() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "user.csv", &[USER_HEADER.to_string()]);
        write_csv(dir.path(), "session.csv", &[SESSION_HEADER.to_string()]);

        let err = utc_loader(dir.path()).load_all_at(now()).unwrap_err();
        match err {
            LoaderError::FileRead { path, .. } => assert!(path.ends_with("session_text.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_header_aborts_load() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path(), &[], &[], &[]);
        write_csv(dir.path(), "user.csv", &["uuid,nick_name".to_string()]);

        let err = utc_loader(dir.path()).load_all_at(now()).unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumns { .. }));
    }

    #[test]
    fn test_custom_file_names() {
        let dir = TempDir::new().unwrap();
        let today = stamp(now());
        write_fixture(dir.path(), &[user_row(U1, "ada", &today)], &[], &[]);
        std::fs::rename(dir.path().join("user.csv"), dir.path().join("members.csv")).unwrap();

        let options = LoaderOptions {
            user_file: "members.csv".to_string(),
            ..utc_options()
        };
        let loader = DataLoader::with_options(dir.path(), options);
        assert_eq!(loader.path_for(EntityKind::User), dir.path().join("members.csv"));
        assert_eq!(loader.load_all_at(now()).unwrap().stats().users, 1);
    }

    #[test]
    fn test_naive_timestamps_use_configured_zone() {
        let dir = TempDir::new().unwrap();
        // 2024-06-01 20:00 in Tokyo is 11:00 UTC.
        write_fixture(
            dir.path(),
            &[user_row(U1, "ada", "2024-06-01 20:00:00")],
            &[],
            &[],
        );
        let options = LoaderOptions {
            registration_days: 0,
            timezone: TimezoneHandler::new(resolve_timezone("Asia/Tokyo").unwrap()),
            ..utc_options()
        };
        let dataset = DataLoader::with_options(dir.path(), options)
            .load_all_at(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
            .unwrap();
        assert_eq!(dataset.stats().users, 1);
        assert_eq!(
            dataset.users()[0].registration_time,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
        );
    }
}
