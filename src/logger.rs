use chrono::Local;
use env_logger::Builder;
use log::Level;
use std::io::Write;
use std::thread;

/// Coloured, timestamped log lines. Defaults to `info`; `RUST_LOG` overrides.
pub fn init_logger() {
    Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let time = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let level_color = match record.level() {
                Level::Error => "\x1b[31m\x1b[1m", // red
                Level::Warn => "\x1b[33m\x1b[1m",  // yellow
                Level::Info => "\x1b[32m\x1b[1m",  // green
                Level::Debug => "\x1b[36m\x1b[1m", // cyan
                Level::Trace => "\x1b[90m\x1b[1m", // grey
            };
            // Background workers are told apart by thread name.
            let current = thread::current();
            let thread_name = current.name().unwrap_or("-");
            writeln!(
                buf,
                "{} {}{:<5}\x1b[0m [{}] [{}:{}] {}",
                time,
                level_color,
                record.level(),
                thread_name,
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args(),
            )
        })
        .init();
}
