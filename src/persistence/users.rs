//! The users table: account records persisted as YAML, fronted by an LRU
//! cache keyed by lowercase username. Passwords are stored as lowercase hex
//! SHA-1 digests.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::telemetry::logging;

const USERS_FILE: &str = "users.yaml";
const NAME_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u32,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserFile {
    users: Vec<UserRecord>,
}

struct UserStoreInner {
    users: Vec<UserRecord>,
    by_name: LruCache<String, u32>,
    next_id: u32,
}

pub struct UserStore {
    path: PathBuf,
    inner: Mutex<UserStoreInner>,
}

impl UserStore {
    /// Opens the store under `data_dir`. A missing file is an empty store,
    /// not an error.
    pub fn load(data_dir: &Path) -> Result<Self, String> {
        let path = data_dir.join(USERS_FILE);
        let users = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let file: UserFile = serde_yaml::from_str(&raw)
                    .map_err(|err| format!("parse {} failed: {}", path.display(), err))?;
                file.users
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(format!("read {} failed: {}", path.display(), err)),
        };
        let next_id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let capacity =
            NonZeroUsize::new(NAME_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            path,
            inner: Mutex::new(UserStoreInner {
                users,
                by_name: LruCache::new(capacity),
                next_id,
            }),
        })
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.users.len()).unwrap_or(0)
    }

    pub fn get_by_name(&self, username: &str) -> Option<UserRecord> {
        let key = username.to_ascii_lowercase();
        let mut inner = self.inner.lock().ok()?;
        if let Some(&id) = inner.by_name.get(&key) {
            return inner.users.iter().find(|u| u.id == id).cloned();
        }
        let found = inner
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned();
        if let Some(user) = &found {
            inner.by_name.put(key, user.id);
        }
        found
    }

    pub fn get_by_id(&self, id: u32) -> Option<UserRecord> {
        let inner = self.inner.lock().ok()?;
        inner.users.iter().find(|u| u.id == id).cloned()
    }

    /// Creates a record with the next free id. Returns `None` when the
    /// name is already taken (case-insensitively). Persistence failures
    /// are logged but do not lose the in-memory record.
    pub fn store_user(&self, username: &str, password: &str) -> Option<UserRecord> {
        let mut inner = self.inner.lock().ok()?;
        if inner
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(username))
        {
            return None;
        }
        let record = UserRecord {
            id: inner.next_id,
            username: username.to_string(),
            password_hash: Self::hash_password(password),
        };
        inner.next_id += 1;
        inner.users.push(record.clone());
        inner.by_name.put(username.to_ascii_lowercase(), record.id);
        if let Err(err) = self.save(&inner.users) {
            logging::log_error(&format!("user save failed: {}", err));
        }
        Some(record)
    }

    fn save(&self, users: &[UserRecord]) -> Result<(), String> {
        let file = UserFile {
            users: users.to_vec(),
        };
        let raw = serde_yaml::to_string(&file)
            .map_err(|err| format!("serialize users failed: {}", err))?;
        std::fs::write(&self.path, raw)
            .map_err(|err| format!("write {} failed: {}", self.path.display(), err))
    }

    pub fn hash_password(password: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    pub fn verify_password(stored_hash: &str, password: &str) -> bool {
        Self::hash_password(password) == stored_hash
    }
}
