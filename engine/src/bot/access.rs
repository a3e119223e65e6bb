//! Who may talk to the bot
//!
//! The allow list is the union of `telegram.allowed_users` and the ids in
//! `telegram.users_file`. The file is re-read on every check so operators
//! can edit it while the server runs. An empty union allows everyone.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AccessList {
    allowed_users: HashSet<i64>,
    users_file: Option<PathBuf>,
}

impl AccessList {
    pub fn new(allowed_users: impl IntoIterator<Item = i64>, users_file: Option<PathBuf>) -> Self {
        Self {
            allowed_users: allowed_users.into_iter().collect(),
            users_file,
        }
    }

    /// Check whether `user_id` may use the bot
    ///
    /// A configured but unreadable users file denies everyone not listed in
    /// `allowed_users`.
    pub async fn is_allowed(&self, user_id: i64) -> bool {
        if self.allowed_users.contains(&user_id) {
            return true;
        }

        let Some(path) = &self.users_file else {
            return self.allowed_users.is_empty();
        };

        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let listed = parse_users(&contents);
                if listed.is_empty() && self.allowed_users.is_empty() {
                    return true;
                }
                listed.contains(&user_id)
            }
            Err(e) => {
                warn!("Cannot read users file {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// One id per line; blank lines and `#` comments are skipped
fn parse_users(contents: &str) -> HashSet<i64> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring invalid user id in users file: {:?}", line);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_allow_list_allows_everyone() {
        let access = AccessList::default();
        assert!(access.is_allowed(1).await);
    }

    #[tokio::test]
    async fn test_configured_users() {
        let access = AccessList::new([111, 222], None);
        assert!(access.is_allowed(111).await);
        assert!(!access.is_allowed(333).await);
    }

    #[tokio::test]
    async fn test_users_file_is_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "111\n").unwrap();

        let access = AccessList::new([], Some(path.clone()));
        assert!(access.is_allowed(111).await);
        assert!(!access.is_allowed(222).await);

        std::fs::write(&path, "111\n# friends\n222\n\n").unwrap();
        assert!(access.is_allowed(222).await);
    }

    #[tokio::test]
    async fn test_union_of_config_and_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "222\n").unwrap();

        let access = AccessList::new([111], Some(path));
        assert!(access.is_allowed(111).await);
        assert!(access.is_allowed(222).await);
        assert!(!access.is_allowed(333).await);
    }

    #[tokio::test]
    async fn test_missing_users_file_denies() {
        let dir = TempDir::new().unwrap();
        let access = AccessList::new([], Some(dir.path().join("missing.txt")));
        assert!(!access.is_allowed(111).await);
    }

    #[test]
    fn test_parse_users_skips_garbage() {
        let users = parse_users("1\n  2  \nabc\n#3\n");
        assert_eq!(users, HashSet::from([1, 2]));
    }
}
