//! `server.properties` reading and merging.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    path::Path,
};

use tokio::fs;

pub const DEFAULT_MAX_PLAYERS: u32 = 20;

/// `key=value` pairs of a properties file; blank lines and `#` comments are skipped.
pub fn parse_str(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

pub async fn parse(path: &Path) -> io::Result<HashMap<String, String>> {
    let content = fs::read_to_string(path).await?;
    Ok(parse_str(&content))
}

/// Applies `updates` to `existing`, keeping comments and line order.
/// Keys not already present are appended in sorted order.
pub fn merge(existing: &str, updates: &BTreeMap<String, String>) -> String {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for line in existing.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            lines.push(line.to_string());
            continue;
        }
        match trimmed.split_once('=') {
            Some((key, _)) => {
                let key = key.trim();
                seen.insert(key.to_string());
                match updates.get(key) {
                    Some(value) => lines.push(format!("{key}={value}")),
                    None => lines.push(line.to_string()),
                }
            }
            None => lines.push(line.to_string()),
        }
    }

    for (key, value) in updates {
        if !seen.contains(key) {
            lines.push(format!("{key}={value}"));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Merges `updates` into the file at `path`, creating it if needed.
pub async fn save(path: &Path, updates: &BTreeMap<String, String>) -> io::Result<()> {
    let existing = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };
    fs::write(path, merge(&existing, updates)).await
}

/// `max-players`, or the vanilla default when absent or unparseable.
pub async fn max_players(path: &Path) -> io::Result<u32> {
    let props = parse(path).await?;
    Ok(props
        .get("max-players")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_PLAYERS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_trims() {
        let props = parse_str("#Minecraft server properties\n\n server-port = 25570\nmotd=A=B\nbroken line\n");
        assert_eq!(props.get("server-port").map(String::as_str), Some("25570"));
        assert_eq!(props.get("motd").map(String::as_str), Some("A=B"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn merge_updates_in_place_and_appends_new_keys() {
        let existing = "#comment\nserver-port=25565\nmotd=hi\n";
        let updates = BTreeMap::from([
            ("server-port".to_string(), "25570".to_string()),
            ("max-players".to_string(), "5".to_string()),
        ]);
        assert_eq!(
            merge(existing, &updates),
            "#comment\nserver-port=25570\nmotd=hi\nmax-players=5\n"
        );
    }

    #[tokio::test]
    async fn max_players_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");

        assert!(max_players(&path).await.is_err());

        fs::write(&path, "max-players=abc\n").await.unwrap();
        assert_eq!(max_players(&path).await.unwrap(), DEFAULT_MAX_PLAYERS);

        save(&path, &BTreeMap::from([("max-players".to_string(), "8".to_string())]))
            .await
            .unwrap();
        assert_eq!(max_players(&path).await.unwrap(), 8);
    }
}
