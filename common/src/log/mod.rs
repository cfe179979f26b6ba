use std::io;
use std::path::Path;
use std::sync::Once;

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// 全局订阅器只装一次, 重复初始化是空操作
static INIT: Once = Once::new();

/// 客户端日志初始化。debug 为 DEBUG 级别, 否则 INFO, 输出到 stdout
pub fn init(debug: bool) {
    init_with(debug, None::<&Path>);
}

/// 附带滚动文件输出的初始化。文件按天切分, 同时保留 stdout
pub fn init_with<P: AsRef<Path>>(debug: bool, log_dir: Option<P>) {
    let level = if debug { Level::DEBUG } else { Level::INFO };

    INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_thread_names(true)
            .compact();

        match log_dir {
            Some(dir) => {
                let file = rolling::daily(dir.as_ref(), "client.log");
                let _ = builder.with_writer(file.and(io::stdout)).try_init();
            }
            None => {
                let _ = builder.try_init();
            }
        }
    });
}

#[cfg(test)]
mod test {
    use tracing::{debug, error, info, warn};

    use crate::log::init;

    #[test]
    fn test_init_is_idempotent() {
        init(true);
        init(false);

        debug!("log init test: {:?}", "debug");
        info!("log init test: {:?}", "info");
        warn!("log init test: {:?}", "warn");
        error!("log init test: {:?}", "error");
    }
}
