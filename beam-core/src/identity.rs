//! Local device identity.
//!
//! The device id MUST survive restarts so peers can recognise this
//! machine across sessions. It is kept in a tiny `key=value` file; all
//! other state is ephemeral.

use std::io;
use std::path::Path;

use uuid::Uuid;

/// Identity advertised over discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    /// Stable UUID string, persisted across runs.
    pub device_id: String,
    /// Human label shown in peer lists.
    pub name: String,
    /// Platform tag ("mac", "android", ...).
    pub platform: String,
}

/// Platform tag for the running OS.
pub fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "mac",
        "android" => "android",
        other => other,
    }
}

impl DeviceIdentity {
    /// Load the persisted device id from `path`, generating and
    /// persisting a fresh UUID on first run.
    pub fn load_or_create(path: &Path, name: &str) -> io::Result<Self> {
        let device_id = match read_device_id(path)? {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(path, format!("device_id={id}\n"))?;
                id
            }
        };

        Ok(Self {
            device_id,
            name: name.to_string(),
            platform: platform_tag().to_string(),
        })
    }

    /// An identity that is not persisted anywhere (tests, throwaway
    /// sessions).
    pub fn ephemeral(name: &str) -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            platform: platform_tag().to_string(),
        }
    }
}

fn read_device_id(path: &Path) -> io::Result<Option<String>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    for line in contents.lines() {
        if let Some(id) = line.strip_prefix("device_id=") {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(Some(id.to_string()));
            }
        }
    }
    Ok(None)
}

// ── Tests ────────────────────────────────────────────────────────
