use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    #[default]
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotAuthenticated,

    #[error("user '{0}' is not an administrator")]
    NotAdmin(String),

    #[error("token must not be empty")]
    EmptyToken,

    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredSession {
    token: Option<String>,
    user: Option<User>,
}

/// Authentication state, read once at startup and passed explicitly to whoever needs it.
#[derive(Debug)]
pub struct SessionContext {
    session: StoredSession,
    file_path: Option<PathBuf>,
}

impl SessionContext {
    /// Session that lives only in memory.
    pub fn ephemeral() -> Self {
        Self {
            session: StoredSession::default(),
            file_path: None,
        }
    }

    /// Read the persisted session. A missing or unreadable file means logged out.
    pub fn hydrate(file_path: &Path) -> Self {
        let session = match fs::read_to_string(file_path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                error!("Ignoring corrupt session file {file_path:?}: {e}");
                StoredSession::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoredSession::default(),
            Err(e) => {
                error!("Failed to read session file {file_path:?}: {e}");
                StoredSession::default()
            }
        };
        debug!(
            "Session hydrated (authenticated: {})",
            session.token.is_some()
        );
        Self {
            session,
            file_path: Some(file_path.to_path_buf()),
        }
    }

    pub fn login(&mut self, token: &str, user: User) -> Result<(), SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }
        info!("Logged in as {} ({:?})", user.username, user.role);
        self.session = StoredSession {
            token: Some(token.to_string()),
            user: Some(user),
        };
        self.persist()
    }

    /// Forget the token and user, on disk as well.
    pub fn invalidate(&mut self) -> Result<(), SessionError> {
        self.session = StoredSession::default();
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.token.is_some()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.user.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated()
            && self
                .current_user()
                .is_some_and(|user| user.role == Role::Admin)
    }

    pub fn require_admin(&self) -> Result<&User, SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        match self.current_user() {
            Some(user) if user.role == Role::Admin => Ok(user),
            Some(user) => Err(SessionError::NotAdmin(user.username.clone())),
            None => Err(SessionError::NotAuthenticated),
        }
    }

    fn persist(&self) -> Result<(), SessionError> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let io_err = |source| SessionError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(&self.session)?;
        fs::write(path, content).map_err(io_err)
    }
}
