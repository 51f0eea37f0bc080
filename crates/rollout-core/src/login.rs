//! Registry login.
//!
//! A successful login records its timestamp in the state store; later runs skip the
//! login while that record is inside the validity window.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::ExecutionError;
use crate::process::{CommandSpec, ProcessRunner};
use crate::profile::{LoginMethod, ValidatedLogin};
use crate::state::{ArtifactStateStore, StateKey};

/// Registry credentials expire after 12 hours; stay one hour below that.
pub const DEFAULT_LOGIN_VALIDITY_HOURS: i64 = 11;
/// Upper bound for a configured validity window (one year).
pub const MAX_LOGIN_VALIDITY_HOURS: i64 = 24 * 365;

/// Decides whether a recorded login can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginCache {
    validity: Duration,
}

impl Default for LoginCache {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_LOGIN_VALIDITY_HOURS))
    }
}

impl LoginCache {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub fn is_fresh(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // an expiry past the representable range never elapses
        cached_at
            .checked_add_signed(self.validity)
            .is_none_or(|expiry| expiry > now)
    }

    /// Whether the login recorded for `registry` is still fresh.
    pub fn is_cached(
        &self,
        store: &ArtifactStateStore,
        registry: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ExecutionError> {
        let key = StateKey::LoginToken {
            registry: registry.to_string(),
        };
        let Some(recorded) = store.read(&key)? else {
            return Ok(false);
        };
        match DateTime::parse_from_rfc3339(recorded.trim()) {
            Ok(cached_at) => Ok(self.is_fresh(cached_at.with_timezone(&Utc), now)),
            Err(err) => {
                debug!(registry, error = %err, "ignoring unreadable login record");
                Ok(false)
            }
        }
    }

    pub fn record(
        &self,
        store: &ArtifactStateStore,
        registry: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        let key = StateKey::LoginToken {
            registry: registry.to_string(),
        };
        store.write(&key, &at.to_rfc3339())
    }
}

fn require_present(value: &str, method: LoginMethod, field: &str) -> Result<(), ExecutionError> {
    if value.trim().is_empty() {
        return Err(ExecutionError::InvalidLogin(format!(
            "{method} login requires a {field}"
        )));
    }
    Ok(())
}

/// Perform the docker login described by `login`.
///
/// Passwords are passed on stdin, never on the command line.
pub fn login(runner: &dyn ProcessRunner, login: &ValidatedLogin) -> Result<(), ExecutionError> {
    let method = login.login_method;
    match method {
        LoginMethod::Classic => {
            require_present(&login.registry_root, method, "registry host")?;
            require_present(&login.username, method, "username")?;
            require_present(&login.password, method, "password")?;
            runner.run(&docker_login(
                Some(&login.registry_root),
                &login.username,
                &login.password,
            ))?;
        }
        LoginMethod::Dockerhub => {
            require_present(&login.username, method, "username")?;
            require_present(&login.password, method, "password")?;
            runner.run(&docker_login(None, &login.username, &login.password))?;
        }
        LoginMethod::Aws => {
            require_present(&login.registry_root, method, "registry host")?;
            let mut token_command = CommandSpec::new("aws").args(["ecr", "get-login-password"]);
            if let Some(profile) = &login.aws_profile {
                token_command = token_command.env("AWS_PROFILE", profile);
            }
            let token = runner.run(&token_command)?.stdout.trim().to_string();
            runner.run(&docker_login(Some(&login.registry_root), "AWS", &token))?;
        }
    }
    info!(registry = %login.registry_root, %method, "logged in");
    Ok(())
}

fn docker_login(host: Option<&str>, username: &str, password: &str) -> CommandSpec {
    let mut command = CommandSpec::new("docker").arg("login");
    if let Some(host) = host {
        command = command.arg(host);
    }
    command
        .args(["--username", username, "--password-stdin"])
        .stdin(password)
}
