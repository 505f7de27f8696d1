use std::io::Write;

use anstyle::{AnsiColor, Color, RgbColor, Style};

/// 只保留路径中的文件名，兼容 `/` 和 `\` 两种分隔符
fn short_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn level_color(level: log::Level) -> Option<Color> {
    match level {
        log::Level::Error => Some(Color::Ansi(AnsiColor::Red)),
        log::Level::Warn => Some(Color::Ansi(AnsiColor::Yellow)),
        log::Level::Info => Some(Color::Ansi(AnsiColor::Green)),
        log::Level::Debug => Some(Color::Ansi(AnsiColor::Cyan)),
        log::Level::Trace => None,
    }
}

/// 默认 Info 级别，可以通过 `RUST_LOG` 覆盖
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let level_style = buf.default_level_style(record.level()).fg_color(level_color(record.level()));
            let grey_style = Style::new().fg_color(Some(Color::Rgb(RgbColor(110, 110, 110))));

            let file = short_file_name(record.file().unwrap_or(""));
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env();

    // 测试里可能重复初始化，忽略即可
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_file_name() {
        assert_eq!(short_file_name("src/foundation/device.rs"), "device.rs");
        assert_eq!(short_file_name("src\\foundation\\device.rs"), "device.rs");
        assert_eq!(short_file_name("lib.rs"), "lib.rs");
        assert_eq!(short_file_name(""), "");
    }

    #[test]
    fn test_init_log_twice() {
        init_log();
        init_log();
        log::info!("log initialized");
    }
}
