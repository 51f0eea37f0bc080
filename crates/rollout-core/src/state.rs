//! Artifact hand-off between nodes.
//!
//! Nodes never share memory: a build writes its tag and version here and the push and
//! deploy nodes read them back, possibly in a later invocation. State lives in the user's
//! state directory under a per-project key, not in the project tree.
//!
//! Layout: `<store_root>/<project_key>/<scope>/<entry>` with one text file per key.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ExecutionError;

/// The (service, profile) pair an artifact belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub service: String,
    pub profile: String,
}

impl ArtifactRef {
    pub fn new(service: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            profile: profile.into(),
        }
    }
}

/// Whether `name` can stand as one directory level of a state path.
///
/// Service, profile and namespace names are used as path segments unhashed.
pub fn is_plain_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    BuiltTag(ArtifactRef),
    BuiltVersion(ArtifactRef),
    BuiltRepository(ArtifactRef),
    PushedTag(ArtifactRef),
    PushedRepository(ArtifactRef),
    /// Version of the most recent build or push of a service, whichever profile made it
    LatestVersion {
        service: String,
    },
    /// Repository that [`StateKey::LatestVersion`] can be pulled from
    LatestRepository {
        service: String,
    },
    DeployedAttributes {
        service: String,
        namespace: String,
        profile: String,
    },
    LoginToken {
        registry: String,
    },
}

impl StateKey {
    fn relative_path(&self) -> PathBuf {
        let artifact = |artifact: &ArtifactRef, entry: &str| {
            PathBuf::from("artifacts")
                .join(&artifact.profile)
                .join(&artifact.service)
                .join(entry)
        };
        match self {
            StateKey::BuiltTag(a) => artifact(a, "built_tag"),
            StateKey::BuiltVersion(a) => artifact(a, "built_version"),
            StateKey::BuiltRepository(a) => artifact(a, "built_repository"),
            StateKey::PushedTag(a) => artifact(a, "pushed_tag"),
            StateKey::PushedRepository(a) => artifact(a, "pushed_repository"),
            StateKey::LatestVersion { service } => {
                PathBuf::from("latest").join(service).join("version")
            }
            StateKey::LatestRepository { service } => {
                PathBuf::from("latest").join(service).join("repository")
            }
            StateKey::DeployedAttributes {
                service,
                namespace,
                profile,
            } => PathBuf::from("deployed")
                .join(profile)
                .join(service)
                .join(namespace),
            // registry hosts contain ':' and '/'
            StateKey::LoginToken { registry } => PathBuf::from("login")
                .join(blake3::hash(registry.as_bytes()).to_hex().as_str()),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::BuiltTag(a) => write!(f, "built tag of {}/{}", a.profile, a.service),
            StateKey::BuiltVersion(a) => write!(f, "built version of {}/{}", a.profile, a.service),
            StateKey::BuiltRepository(a) => {
                write!(f, "built repository of {}/{}", a.profile, a.service)
            }
            StateKey::PushedTag(a) => write!(f, "pushed tag of {}/{}", a.profile, a.service),
            StateKey::PushedRepository(a) => {
                write!(f, "pushed repository of {}/{}", a.profile, a.service)
            }
            StateKey::LatestVersion { service } => write!(f, "latest built version of {service}"),
            StateKey::LatestRepository { service } => {
                write!(f, "latest repository of {service}")
            }
            StateKey::DeployedAttributes {
                service,
                namespace,
                profile,
            } => write!(f, "deployed attributes of {profile}/{service} in {namespace}"),
            StateKey::LoginToken { registry } => write!(f, "login token for {registry}"),
        }
    }
}

/// File-backed key to text store.
#[derive(Debug, Clone)]
pub struct ArtifactStateStore {
    dir: PathBuf,
}

impl ArtifactStateStore {
    /// Default store root.
    ///
    /// - Unix: `$XDG_STATE_HOME/rollout/state` or `~/.local/state/rollout/state`
    /// - Elsewhere: the local data directory
    pub fn default_root() -> anyhow::Result<PathBuf> {
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?;
        Ok(base.join("rollout").join("state"))
    }

    /// Stable key for a project root.
    ///
    /// Moving the project directory yields a new key and therefore fresh state.
    pub fn project_key(project_root: &Path) -> String {
        let path = fs::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
        blake3::hash(path.to_string_lossy().as_bytes())
            .to_hex()
            .to_string()
    }

    /// Store for `project_root` under `store_root`.
    pub fn open(store_root: &Path, project_root: &Path) -> Self {
        Self::at(store_root.join(Self::project_key(project_root)))
    }

    /// Store rooted directly at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, key: &StateKey) -> PathBuf {
        self.dir.join(key.relative_path())
    }

    pub fn read(&self, key: &StateKey) -> Result<Option<String>, ExecutionError> {
        let path = self.path_of(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ExecutionError::io(
                format!("Failed to read state file {}", path.display()),
                err,
            )),
        }
    }

    /// Like [`read`](Self::read), but a missing entry is [`ExecutionError::MissingArtifact`].
    pub fn require(&self, key: &StateKey) -> Result<String, ExecutionError> {
        self.read(key)?.ok_or_else(|| ExecutionError::MissingArtifact {
            key: key.to_string(),
        })
    }

    /// Write atomically (tmp + rename).
    pub fn write(&self, key: &StateKey, value: &str) -> Result<(), ExecutionError> {
        let path = self.path_of(key);
        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).map_err(|err| {
            ExecutionError::io(
                format!("Failed to create state directory {}", parent.display()),
                err,
            )
        })?;

        let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
        fs::write(&tmp_path, value).map_err(|err| {
            ExecutionError::io(
                format!("Failed to write state file {}", tmp_path.display()),
                err,
            )
        })?;
        fs::rename(&tmp_path, &path).map_err(|err| {
            ExecutionError::io(
                format!("Failed to replace state file {}", path.display()),
                err,
            )
        })
    }
}
