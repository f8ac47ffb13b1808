//! The language-model side of the service, reduced to its seams.
//!
//! The server only needs something that turns a pair of chat
//! messages into an assistant message; that is the [`Generator`]
//! trait. The shipped implementation is a placeholder that answers
//! with a canned line, optionally holding the memory-mapped tensors
//! of a model directory it was loaded from.

use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::inference::safetensors::Safetensors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// The two messages the completion endpoint feeds the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub system_message: Message,
    pub user_message: Message,
}

/// Invoked concurrently from distinct worker threads.
pub trait Generator: Send + Sync {
    fn generate(&self, req: &Request) -> Message;
}

#[derive(Default)]
pub struct StubGenerator {
    tensors: Option<Safetensors>,
}

impl StubGenerator {
    pub fn tensors(&self) -> Option<&Safetensors> {
        self.tensors.as_ref()
    }
}

impl Generator for StubGenerator {
    fn generate(&self, _req: &Request) -> Message {
        Message {
            role: "assistant".to_string(),
            content: "hey this is parley, how are u".to_string(),
        }
    }
}

/// Scans a model directory and memory-maps any safetensors file in
/// it. Inference itself stays stubbed out.
pub fn load_from_directory(dir: &Path) -> io::Result<Box<dyn Generator>> {
    let mut tensors = None;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        debug!("scanning: {}", path.display());
        if path.extension().is_some_and(|ext| ext == "safetensors") {
            tensors = Some(Safetensors::load_file(&path)?);
        }
    }
    Ok(Box::new(StubGenerator { tensors }))
}

const USER_RELATIVE_SNAPSHOT_DIR: &str =
    ".cache/huggingface/hub/models--meta-llama--Llama-3.2-1B-Instruct/snapshots";

/// The first snapshot directory under the HuggingFace cache.
pub fn find_default_model_dir() -> io::Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| io::Error::other("env var HOME is unset"))?;
    let snapshots_dir = PathBuf::from(home).join(USER_RELATIVE_SNAPSHOT_DIR);
    let first = std::fs::read_dir(&snapshots_dir)
        .map_err(|e| {
            io::Error::other(format!(
                "can't access model dir at {}: {e}",
                snapshots_dir.display()
            ))
        })?
        .next()
        .ok_or_else(|| {
            io::Error::other(format!("no snapshots found in {}", snapshots_dir.display()))
        })??;
    Ok(first.path())
}
