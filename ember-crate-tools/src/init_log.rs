use std::io::Write;

/// 单条日志的格式：
///
/// ```text
/// [2024/01/01 12:00:00] WARN: message
///      In ember_render::frame::frame_organizer At frame_organizer.rs:120
/// ```
pub fn format_record(buf: &mut env_logger::fmt::Formatter, record: &log::Record) -> std::io::Result<()> {
    let info_style = buf
        .default_level_style(log::Level::Info)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
    let warn_style = buf
        .default_level_style(log::Level::Warn)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
    let error_style = buf
        .default_level_style(log::Level::Error)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

    let level_style = match record.level() {
        log::Level::Info => info_style,
        log::Level::Warn => warn_style,
        log::Level::Error => error_style,
        _ => buf.default_level_style(record.level()),
    };
    let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

    let line = record.line().unwrap_or(!0);
    let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
    let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
    let level = record.level();
    let module = record.module_path().unwrap_or("");

    writeln!(
        buf,
        "{level_style}[{time}] {level}: {}{level_style:#}\n\t {grey_style}In {module} At {file}:{line}{grey_style:#}",
        record.args()
    )
}

/// 构造带有统一格式的 builder
///
/// 默认等级为 `level`，如果设置了 `RUST_LOG` 环境变量，则以环境变量为准
pub fn log_builder(level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.format(format_record).filter(None, level).parse_default_env();
    builder
}

/// 初始化全局 logger，重复初始化时返回错误
pub fn try_init_log(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log_builder(level).try_init()
}

pub fn init_log() {
    if let Err(e) = try_init_log(log::LevelFilter::Info) {
        eprintln!("logger already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_log_twice() {
        // 第一次可能成功，也可能已经被其他测试设置
        let _ = try_init_log(log::LevelFilter::Warn);
        assert!(try_init_log(log::LevelFilter::Warn).is_err());

        log::warn!("logger is alive");
    }

    #[test]
    fn test_builder_respects_level() {
        let logger = log_builder(log::LevelFilter::Warn).build();
        let info = log::Metadata::builder().level(log::Level::Info).target("ember").build();
        let warn = log::Metadata::builder().level(log::Level::Warn).target("ember").build();

        // RUST_LOG 可能会覆盖等级，只在未设置时断言
        if std::env::var("RUST_LOG").is_err() {
            assert!(!log::Log::enabled(&logger, &info));
            assert!(log::Log::enabled(&logger, &warn));
        }
    }
}
