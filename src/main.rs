pub mod models {
    pub mod nest;
}

pub mod change;
pub mod client;
pub mod config;
pub mod host;
pub mod leader;
pub mod normalize;
pub mod render;
pub mod timer;
pub mod utils;
pub mod widget;

use crate::client::NestClient;
use crate::config::{Config, DashboardConfig};
use crate::host::{Dashboard, spawn_presence_reader};
use log::{error, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (dashboard={}, api_server={}, output_dir={}, http_timeout={}s)",
        cfg.dashboard_config.display(),
        cfg.api_server,
        cfg.output_dir.display(),
        cfg.http_timeout.as_secs()
    );

    // 2) Load the dashboard layout
    let dashboard_cfg = DashboardConfig::load(&cfg.dashboard_config)?;
    if dashboard_cfg.modules.is_empty() {
        return Err(format!("{} declares no modules", cfg.dashboard_config.display()));
    }
    info!(
        "Dashboard has {} module(s), units={:?}",
        dashboard_cfg.modules.len(),
        dashboard_cfg.units
    );

    // 3) Init Nest client
    let client = NestClient::new(&cfg.api_server, cfg.http_timeout);

    // 4) Build widgets and run until there is nothing left to do
    let mut dashboard = Dashboard::from_config(&dashboard_cfg, client, Some(cfg.output_dir.clone()))?;
    let presence = spawn_presence_reader();
    info!("Writing fragments to {}", cfg.output_dir.display());
    dashboard.run(presence)
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let env_file = parse_env_file_arg(std::env::args_os().skip(1))?;

    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    load_env_file(&default_path)?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn parse_env_file_arg(args: impl IntoIterator<Item = OsString>) -> Result<Option<PathBuf>, String> {
    let mut args = args.into_iter();
    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        let arg = arg.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let value = if arg == "--env-file" {
            let path = args.next().ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
            path.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?
        } else if let Some(v) = arg.strip_prefix("--env-file=") {
            v.to_string()
        } else if arg == "--" {
            break;
        } else {
            return Err(format!("unrecognised argument: {}", arg));
        };

        if value.is_empty() {
            return Err("`--env-file` requires a path argument".to_string());
        }
        if env_file.replace(PathBuf::from(value)).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }

    Ok(env_file)
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in contents.lines().enumerate() {
        let assignment = parse_env_assignment(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        if let Some((key, value)) = assignment {
            // the process environment wins over the file
            if std::env::var_os(&key).is_none() {
                // Updating process-level environment variables is unsafe on some targets.
                unsafe {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let body = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw_value) = body.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    Ok(Some((key.to_string(), parse_env_value(raw_value.trim())?)))
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let Some(quote) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        let unquoted = raw.split('#').next().unwrap_or_default();
        return Ok(unquoted.trim_end().to_string());
    };

    let mut value = String::new();
    let mut chars = raw[1..].chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quote == '"' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => {
                let rest = chars.as_str().trim();
                if rest.is_empty() || rest.starts_with('#') {
                    return Ok(value);
                }
                return Err("unexpected characters after closing quote".to_string());
            }
            c => value.push(c),
        }
    }

    Err("unterminated quoted value".to_string())
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "nest-status {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
