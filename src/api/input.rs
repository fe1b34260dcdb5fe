use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Operator-visible choice of which feed plays the live role. Takes effect
/// at the next process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Camera,
    Drone,
}

#[derive(Serialize, Deserialize)]
struct PersistedInput {
    source: InputSource,
}

/// Loads and persists the input selection as a small JSON file. Writes go
/// through a temp file and rename so a crash never leaves a torn file.
pub struct InputSourceManager {
    path: PathBuf,
    current: RwLock<InputSource>,
}

impl InputSourceManager {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let current = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PersistedInput>(&contents) {
                Ok(persisted) => persisted.source,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid input source file, using camera");
                    InputSource::Camera
                }
            },
            Err(_) => InputSource::Camera,
        };
        tracing::info!(?current, "input source selection loaded");
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn current(&self) -> InputSource {
        *self.current.read().unwrap()
    }

    pub fn set(&self, source: InputSource) -> std::io::Result<()> {
        let contents = serde_json::to_string(&PersistedInput { source })
            .map_err(std::io::Error::other)?;
        let mut tmp = self.path.clone();
        tmp.set_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        *self.current.write().unwrap() = source;
        tracing::info!(?source, "input source selection persisted");
        Ok(())
    }
}
