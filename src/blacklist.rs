//! Blacklist file: an optional path whose first non-empty line is a user
//! identifier to exclude. File-not-found is not an error, matching the
//! reference server's `read_blacklist`.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

pub fn read_blacklist(path: Option<&Path>) -> HashSet<String> {
    let mut set = HashSet::new();
    let Some(path) = path else {
        return set;
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(user) = contents.lines().find(|l| !l.trim().is_empty()) {
                set.insert(user.trim().to_string());
            }
            info!("read {n} blacklist entries", n = set.len());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("blacklist read failed: {e}");
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let set = read_blacklist(Some(Path::new("/nonexistent/path/for/test")));
        assert!(set.is_empty());
    }

    #[test]
    fn no_path_is_empty() {
        let set = read_blacklist(None);
        assert!(set.is_empty());
    }

    #[test]
    fn first_nonempty_line_is_used() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("mlat_blacklist_test_{}", std::process::id()));
        std::fs::write(&path, "\n  \nuser123\nuser456\n").unwrap();
        let set = read_blacklist(Some(&path));
        assert_eq!(set.len(), 1);
        assert!(set.contains("user123"));
        std::fs::remove_file(&path).ok();
    }
}
