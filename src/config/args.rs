//! 配置文件路径解析
//!
//! 模式检测发生在 clap 解析之前，因此 `-c/--config` 需要在这里单独处理。

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "NESTOGY_CONFIG";

/// 从命令行参数中提取配置文件路径
///
/// 支持 `-c path`、`--config path`、`-c=path`、`--config=path`。
///
/// # Examples
/// ```
/// use nestogy::config::args::parse_config_path;
/// let args = vec!["nestogy".to_string(), "-c".to_string(), "prod.toml".to_string()];
/// assert_eq!(parse_config_path(&args), Some("prod.toml".to_string()));
/// ```
pub fn parse_config_path(args: &[String]) -> Option<String> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "-c" || arg == "--config" {
            return iter.next().cloned();
        }
        if let Some(path) = arg
            .strip_prefix("-c=")
            .or_else(|| arg.strip_prefix("--config="))
        {
            return Some(path.to_string());
        }
    }
    None
}

/// 命令行优先，其次是 `NESTOGY_CONFIG`
pub fn resolve_config_path(args: &[String]) -> Option<String> {
    parse_config_path(args).or_else(|| {
        std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|path| !path.is_empty())
    })
}

/// 移除配置相关参数，避免干扰模式检测
///
/// # Examples
/// ```
/// use nestogy::config::args::filter_config_args;
/// let args = vec!["nestogy".to_string(), "-c".to_string(), "prod.toml".to_string(), "migrate".to_string()];
/// assert_eq!(filter_config_args(&args), vec!["nestogy".to_string(), "migrate".to_string()]);
/// ```
pub fn filter_config_args(args: &[String]) -> Vec<String> {
    let mut filtered = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-c" || arg == "--config" {
            iter.next();
            continue;
        }
        if arg.starts_with("-c=") || arg.starts_with("--config=") {
            continue;
        }
        filtered.push(arg.clone());
    }
    filtered
}
