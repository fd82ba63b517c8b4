// main.rs
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api_helper::{ApiHelperBuilder, ApiHelperConfig, CONFIG_FILE, ErrorResponse, MemoryStore};

/// 按 API 请求的要求整形 JSON 数据文件
#[derive(Parser, Debug)]
#[command(name = "api-helper", version, about)]
struct Cli {
    /// 配置文件
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// 将默认配置写入 `--config` 后退出
    #[arg(long)]
    init_config: bool,

    /// 包含 `schema` 和 `data` 的 JSON 数据文件
    #[arg(long, required_unless_present = "init_config")]
    data: Option<PathBuf>,

    /// 要查询的模型
    #[arg(long, required_unless_present = "init_config")]
    model: Option<String>,

    /// 请求参数，JSON 对象
    #[arg(long, default_value = "{}")]
    params: String,

    /// 获取单条记录而不是列表
    #[arg(long)]
    id: Option<String>,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.init_config {
        ApiHelperConfig::generate_default_config(&cli.config)
            .with_context(|| format!("writing {}", cli.config.display()))?;
        info!(path = %cli.config.display(), "default configuration written");
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(data), Some(model)) = (cli.data, cli.model) else {
        bail!("--data and --model are required");
    };

    let config = Arc::new(ApiHelperConfig::load(&cli.config));
    let store = MemoryStore::from_path(&data).with_context(|| format!("loading {}", data.display()))?;
    let params: Value = serde_json::from_str(&cli.params).context("--params must be a JSON object")?;

    let helper = ApiHelperBuilder::new().with_config(config).with_model(model).build()?;

    let result = match cli.id.as_deref() {
        // 数字 id 保持为数字，其余作为字符串键
        Some(id) => {
            let id = serde_json::from_str::<Value>(id).unwrap_or_else(|_| Value::String(id.to_string()));
            helper.show(&store, &id, &params)
        }
        None => helper.index(&store, &params),
    };

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(error = %err, "request failed");
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&err))?);
            Ok(ExitCode::FAILURE)
        }
    }
}
