use colored::Colorize;

use nestogy::config::args::{filter_config_args, resolve_config_path};
use nestogy::config::{get_config, init_config_from};
use nestogy::runtime::modes::{self, Mode};
use nestogy::system::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    dotenvy::dotenv().ok();

    // 配置必须在模式检测和日志初始化之前加载
    let config_path = resolve_config_path(&args);
    init_config_from(config_path.as_deref());
    let config = get_config();

    match modes::detect_mode(&filter_config_args(&args)) {
        #[cfg(feature = "server")]
        Mode::Server => {
            let _guard = init_logging(&config.logging);
            modes::run_server().await
        }
        #[cfg(feature = "cli")]
        Mode::Cli => {
            // CLI 只输出 warn 以上日志，避免干扰命令输出
            let mut logging = config.logging.clone();
            logging.level = "warn".to_string();
            logging.file = None;
            let guard = init_logging(&logging);

            let result = modes::run_cli(args).await;
            drop(guard);
            if let Err(e) = result {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
            Ok(())
        }
        Mode::Unknown => {
            eprintln!(
                "{}",
                "No execution mode available: build with the 'server' or 'cli' feature".red()
            );
            std::process::exit(1);
        }
    }
}
