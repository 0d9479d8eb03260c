//! `log` backend writing to an RTT up channel.

use core::fmt::Write;

use rtt_target::UpChannel;

use crate::sync::Shared;

static LOG_CHANNEL: Shared<UpChannel> = Shared::new();

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        LOG_CHANNEL.with(|channel| {
            let _ = writeln!(
                channel,
                "[{:5} {}] {}",
                record.level(),
                record.target(),
                record.args()
            );
        });
    }

    fn flush(&self) {}
}

pub fn init(channel: UpChannel, level: log::LevelFilter) {
    LOG_CHANNEL.install(channel);
    // Don't call `unwrap` to reduce the code size
    let _ = log::set_logger(&Logger);
    log::set_max_level(level);
}
