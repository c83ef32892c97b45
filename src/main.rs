use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use cheat_script::host::{ChatSink, FilePicker};
use cheat_script::{Config, FileProbe, Interpreter};

#[derive(Parser)]
#[command(name = "cheat-script")]
#[command(about = "Standalone runner for the cheat-script interpreter")]
#[command(version)]
struct Cli {
    /// Script file to execute (looked up relative to the first search path
    /// if not found as a literal path).
    script_file: String,

    /// Arguments passed to the script as its `$args[...]` parameter vector.
    args: Vec<String>,

    /// Path to `cheat_config.json`; a default is used if omitted or absent.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Additional search path for named-script lookup (repeatable).
    #[arg(long = "search-path")]
    search_paths: Vec<String>,
}

/// A real-filesystem-backed [`FileProbe`] for standalone CLI use.
struct StdFileProbe;

#[async_trait]
impl FileProbe for StdFileProbe {
    async fn read_to_string(&self, path: &str) -> anyhow::Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn list_cheat_files(&self, search_path: &str) -> anyhow::Result<Vec<String>> {
        let pattern = format!("{}/*.cheat", search_path.trim_end_matches('/'));
        let mut out = Vec::new();
        for entry in glob::glob(&pattern)? {
            if let Ok(path) = entry {
                if let Some(s) = path.to_str() {
                    out.push(s.to_string());
                }
            }
        }
        Ok(out)
    }

    async fn mtime(&self, path: &str) -> anyhow::Result<Option<i64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let modified = meta.modified()?;
                let secs = modified
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                Ok(Some(secs))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_to_string(&self, path: &str, contents: &str) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(path, contents).await?)
    }
}

/// Prints forwarded chat lines and developer messages straight to the
/// console; a real host would route `send_msg` into the game's own chat
/// pipe instead.
struct ConsoleChatSink;

#[async_trait]
impl ChatSink for ConsoleChatSink {
    async fn send_msg(&self, text: &str) {
        println!("{text}");
    }

    async fn print_msg(&self, rich_text: &str) {
        eprintln!("{rich_text}");
    }
}

struct NoFilePicker;

#[async_trait]
impl FilePicker for NoFilePicker {}

async fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Config::from_json(&text).unwrap_or_else(|err| {
            eprintln!("Warning: failed to parse {}: {err}, using defaults", path.display());
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).await;
    config.additional_search_paths.extend(cli.search_paths);

    let probe: Arc<dyn FileProbe> = Arc::new(StdFileProbe);
    let mut interpreter = Interpreter::new(config, probe, Vec::new(), Vec::new());
    interpreter.reload_cache().await;

    let chat = ConsoleChatSink;
    let picker = NoFilePicker;

    let name = cli
        .script_file
        .strip_suffix(".cheat")
        .unwrap_or(&cli.script_file)
        .to_string();
    let script_name = format!("{name}.cheat");
    interpreter
        .process_file(&script_name, cli.args, &chat, &picker, None)
        .await;
}
