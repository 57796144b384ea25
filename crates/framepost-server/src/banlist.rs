//! Ban list persistence.
//!
//! The ban list lives in a flat text file: one username per line, UTF-8,
//! LF-terminated. It is loaded once at startup and rewritten in full on every
//! mutation; the driver owns the in-memory set and hands the runtime a
//! complete snapshot to persist, so the file is always a consistent picture.

use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    path::Path,
};

/// Load the ban list. An absent file yields an empty set.
///
/// Empty lines are skipped so a hand-edited file with trailing newlines
/// loads cleanly.
pub fn load(path: &Path) -> io::Result<HashSet<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::info!("No banlist file at {}, starting with an empty list", path.display());
            return Ok(HashSet::new());
        },
        Err(err) => return Err(err),
    };

    let banned: HashSet<String> =
        contents.lines().filter(|line| !line.is_empty()).map(str::to_string).collect();

    tracing::info!("Banlist loaded: {} banned user(s)", banned.len());
    Ok(banned)
}

/// Rewrite the ban list file from a snapshot.
///
/// The snapshot is written sorted so the file is stable across runs.
pub fn save(path: &Path, users: &[String]) -> io::Result<()> {
    let mut sorted: Vec<&String> = users.iter().collect();
    sorted.sort();

    let mut out = String::new();
    for username in sorted {
        out.push_str(username);
        out.push('\n');
    }

    let mut file = fs::File::create(path)?;
    file.write_all(out.as_bytes())?;

    tracing::debug!("Banlist saved: {} user(s)", users.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_absent_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banlist");

        let banned = load(&path).unwrap();
        assert!(banned.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banlist");

        save(&path, &["mallory".to_string(), "bob".to_string()]).unwrap();

        let banned = load(&path).unwrap();
        assert_eq!(banned.len(), 2);
        assert!(banned.contains("bob"));
        assert!(banned.contains("mallory"));
    }

    #[test]
    fn save_writes_one_name_per_line_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banlist");

        save(&path, &["mallory".to_string(), "bob".to_string()]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "bob\nmallory\n");
    }

    #[test]
    fn load_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banlist");

        fs::write(&path, "bob\n\nmallory\n\n").unwrap();

        let banned = load(&path).unwrap();
        assert_eq!(banned.len(), 2);
    }
}
