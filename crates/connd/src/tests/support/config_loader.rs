//! Configuration loaders for the success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use connd_config::{Config, RuntimePaths, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader that places the runtime directory and resolver socket under a
/// temporary directory.
pub struct TestConfigLoader {
    root: TempDir,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("temporary runtime directory"),
        }
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.root.path().join(name))
            .expect("temporary path is valid UTF-8")
    }

    pub fn config(&self) -> Config {
        Config {
            resolver_socket: SocketEndpoint::unix(self.path("mdnsd.sock")),
            runtime_dir: Some(self.path("run")),
            ..Config::default()
        }
    }

    pub fn paths(&self) -> RuntimePaths {
        RuntimePaths::from_config(&self.config()).expect("runtime paths")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config())
    }
}

/// Loader that fails by passing an unsupported resolver socket.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("connd"),
            OsString::from("--resolver-socket"),
            OsString::from("udp://127.0.0.1:5353"),
        ])
    }
}
