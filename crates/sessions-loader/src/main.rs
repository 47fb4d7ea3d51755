mod bootstrap;

use anyhow::{Context, Result};
use sessions_core::formatting::{format_count, format_number, format_timestamp, preview_text};
use sessions_core::settings::Settings;
use sessions_core::time_utils::{resolve_timezone, TimezoneHandler};
use sessions_data::export::{export_json_file, ExportSelection};
use sessions_data::{DataLoader, Dataset, LoaderOptions};

fn main() -> Result<()> {
    let settings = Settings::load()?;

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("sessions-loader v{} starting", env!("CARGO_PKG_VERSION"));

    let data_dir = match settings.data_dir.clone() {
        Some(dir) => dir,
        None => {
            let cwd = std::env::current_dir().context("cannot read the working directory")?;
            bootstrap::discover_data_dir(&cwd, &settings.user_file)
                .context("no data directory given and none found (pass --data-dir)")?
        }
    };

    let timezone = TimezoneHandler::new(resolve_timezone(&settings.timezone)?);
    tracing::info!(
        "Data: {}, window: {} days, timezone: {}",
        data_dir.display(),
        settings.registration_days,
        timezone.default_tz()
    );

    let options = LoaderOptions {
        registration_days: settings.registration_days,
        timezone,
        user_file: settings.user_file.clone(),
        session_file: settings.session_file.clone(),
        session_text_file: settings.session_text_file.clone(),
    };
    let dataset = DataLoader::with_options(data_dir.clone(), options)
        .load_all()
        .with_context(|| format!("failed to load data from {}", data_dir.display()))?;

    let report = dataset.report();
    tracing::info!(
        "Parsed in {}s, linked in {}s",
        format_number(report.load_time_seconds, 3),
        format_number(report.link_time_seconds, 3)
    );

    print_summary(&dataset);
    print_samples(&dataset, settings.sample, &timezone);

    if let Some(path) = settings.export.as_deref() {
        let selection = ExportSelection::from_names(&settings.include)?;
        export_json_file(&dataset, selection, path)?;
        println!("\nExported {} to {}", settings.include.join(", "), path.display());
    }

    Ok(())
}

fn print_summary(dataset: &Dataset) {
    println!("=== Data Statistics ===");
    for (name, value) in dataset.stats().entries() {
        println!("{:<24}{:>10}", format!("{name}:"), format_count(value));
    }

    let report = dataset.report();
    println!("\n=== Diagnostics ===");
    for file in &report.files {
        println!(
            "{:<24}{:>10} parsed, {} skipped",
            format!("{}:", file.kind),
            format_count(file.parsed),
            format_count(file.skipped)
        );
    }
    println!(
        "{:<24}{:>10}",
        "outside window:",
        format_count(report.users_outside_window)
    );
    println!(
        "{:<24}{:>10}",
        "orphaned sessions:",
        format_count(report.orphaned_sessions)
    );
    println!(
        "{:<24}{:>10}",
        "orphaned texts:",
        format_count(report.orphaned_texts)
    );
}

fn print_samples(dataset: &Dataset, limit: usize, tz: &TimezoneHandler) {
    if limit == 0 {
        return;
    }
    let samples: Vec<_> = dataset
        .users()
        .iter()
        .filter(|u| u.has_sessions())
        .take(limit)
        .collect();
    if samples.is_empty() {
        return;
    }

    println!("\n=== Sample Users ===");
    for user in samples {
        println!("\n{} ({})", user.nick_name, user.uuid);
        println!("  email:      {}", user.email);
        println!("  credits:    {}", format_number(user.credits, 2));
        println!("  registered: {}", format_timestamp(user.registration_time, tz));
        println!("  sessions:   {}", user.sessions.len());
        if let Some(first) = user.sessions.first() {
            println!(
                "  first session {} has {} messages",
                first.uuid,
                first.messages.len()
            );
            if let Some(msg) = first.messages.first() {
                println!("    > {}", preview_text(&msg.text, 60));
            }
        }
    }
}
