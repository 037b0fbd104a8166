use crate::domain::settings::LogSettings;
use crate::infrastructure::bluetooth::transport::FRAME_TRACE_TARGET;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub struct LoggingGuard {
    // Dropping the guard stops the file writer thread
    _guards: Vec<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level; frame dumps are added on top
fn build_filter(settings: &LogSettings) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if !settings.frame_trace {
        return filter;
    }
    match Directive::from_str(&format!("{}=trace", FRAME_TRACE_TARGET)) {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn rotation(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();

    // stdout carries the replayed frames, so the console layer writes to stderr
    let console_layer = settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
            .with_thread_ids(settings.show_thread_ids)
            .with_target(settings.show_target)
            .with_ansi(settings.ansi_colors)
    });

    let file_layer = if settings.file_logging_enabled {
        let appender = RollingFileAppender::new(
            rotation(&settings.rotation),
            &settings.log_dir,
            &settings.file_name_prefix,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(settings.show_file_line)
                .with_line_number(settings.show_file_line)
                .with_thread_ids(settings.show_thread_ids)
                .with_target(settings.show_target),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Logging initialized (level: {}, file: {}, frame trace: {})",
        settings.level,
        settings.file_logging_enabled,
        settings.frame_trace
    );

    Ok(LoggingGuard { _guards: guards })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("Hourly"), Rotation::HOURLY);
        assert_eq!(rotation("never"), Rotation::NEVER);
        assert_eq!(rotation("weekly"), Rotation::DAILY);
    }

    #[test]
    fn test_frame_trace_directive() {
        std::env::remove_var("RUST_LOG");
        let mut settings = LogSettings {
            level: "warn".to_string(),
            ..LogSettings::default()
        };
        assert!(!build_filter(&settings).to_string().contains("h4=trace"));

        settings.frame_trace = true;
        let filter = build_filter(&settings).to_string();
        assert!(filter.contains("warn"));
        assert!(filter.contains("h4=trace"));
    }
}
