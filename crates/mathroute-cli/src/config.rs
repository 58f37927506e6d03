//! Configuration and path resolution for the CLI.
//!
//! Handles finding embedding model files and the conversation database:
//! - Development: workspace `assets/models` directory
//! - Distribution: relative to executable
//! - Custom: environment variables or `--data-dir`

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Model file names (sentence-transformers/all-MiniLM-L6-v2 export)
const MODEL_FILENAME: &str = "model.safetensors";
const CONFIG_FILENAME: &str = "config.json";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

const DATABASE_FILENAME: &str = "conversations.redb";

const MODEL_DIR_ENV: &str = "MATHROUTE_MODEL_DIR";
const DATA_DIR_ENV: &str = "MATHROUTE_DATA_DIR";

/// Raw contents of the three embedding model files.
pub struct ModelFiles {
    pub weights: Vec<u8>,
    pub config: Vec<u8>,
    pub tokenizer: Vec<u8>,
}

/// Finds the directory containing the MiniLM weights, config and tokenizer.
///
/// Search order:
/// 1. `$MATHROUTE_MODEL_DIR` environment variable
/// 2. Workspace `assets/models/` directory (development)
/// 3. Executable-relative `../assets/models/` or `assets/models/`
pub fn find_model_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        let path = PathBuf::from(dir);
        if path.join(MODEL_FILENAME).exists() {
            return Ok(path);
        }
    }

    // CARGO_MANIFEST_DIR points to crates/mathroute-cli
    let workspace_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.join("assets/models"));

    if let Some(ref path) = workspace_path {
        if path.join(MODEL_FILENAME).exists() {
            return Ok(path.clone());
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            for candidate in [exe_dir.join("../assets/models"), exe_dir.join("assets/models")] {
                if candidate.join(MODEL_FILENAME).exists() {
                    return Ok(candidate);
                }
            }
        }
    }

    Err(anyhow!(
        "Embedding model files not found.\n\
         Download {}, {} and {} for sentence-transformers/all-MiniLM-L6-v2.\n\
         Searched locations:\n\
         - ${} environment variable\n\
         - {}\n\
         - Relative to executable",
        MODEL_FILENAME,
        CONFIG_FILENAME,
        TOKENIZER_FILENAME,
        MODEL_DIR_ENV,
        workspace_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<workspace>/assets/models".to_string())
    ))
}

/// Loads all model files from the resolved model directory.
pub fn load_model_files() -> Result<ModelFiles> {
    load_model_files_from(&find_model_dir()?)
}

/// Loads all model files from `dir`.
pub fn load_model_files_from(dir: &Path) -> Result<ModelFiles> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    };
    Ok(ModelFiles {
        weights: read(MODEL_FILENAME)?,
        config: read(CONFIG_FILENAME)?,
        tokenizer: read(TOKENIZER_FILENAME)?,
    })
}

/// Returns the data directory holding the conversation database.
///
/// `--data-dir` wins over `$MATHROUTE_DATA_DIR`, which wins over the platform
/// location:
/// - macOS: `~/Library/Application Support/dev.mathroute.Mathroute/`
/// - Linux: `~/.local/share/mathroute/`
/// - Windows: `%APPDATA%\mathroute\Mathroute\data\`
pub fn get_data_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    ProjectDirs::from("dev", "mathroute", "Mathroute")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Returns the path to the database file, creating its directory.
pub fn database_path(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let data_dir = get_data_dir(custom_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join(DATABASE_FILENAME))
}
