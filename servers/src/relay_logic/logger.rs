use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Console plus one log file per run, named after the relay instance. Older
/// files of the same instance are removed first; other instances' logs sharing
/// the directory are left alone.
pub fn setup_logging(log_dir: &Path, log_level: &str, instance_id: &str) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir, instance_id)?;

    let log_path = log_dir.join(log_file_name(instance_id, chrono::Local::now()));
    let instance = instance_id.to_string();

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                instance,
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(log_path)?)
        .apply()?;

    Ok(())
}

fn log_file_name(instance_id: &str, at: chrono::DateTime<chrono::Local>) -> String {
    format!("{}_{}.log", instance_id, at.format("%Y-%m-%d_%H-%M-%S"))
}

fn is_instance_log(path: &Path, instance_id: &str) -> bool {
    let prefix = format!("{}_", instance_id);
    path.extension().is_some_and(|ext| ext == "log")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&prefix))
}

/// Deletes every log of `instance_id` except the most recently modified one.
fn cleanup_old_logs(log_dir: &Path, instance_id: &str) -> Result<()> {
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|path| is_instance_log(path, instance_id))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    entries.sort_by_key(|(modified, _)| std::cmp::Reverse(*modified));
    for (_, path) in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
