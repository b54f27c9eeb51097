//! Release assets and the built-in game catalog.
//!
//! Every installable game is a single binary attached to a tagged release,
//! fetched from `<host>/<owner>/<repo>/releases/download/<tag>/<file>`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::DownloadTarget;

pub const DEFAULT_RELEASE_HOST: &str = "https://github.com";

/// Coordinates of one binary attached to a tagged release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub file_name: String,
}

impl ReleaseAsset {
    /// Parse an `owner/repo` slug into an asset on the default host.
    pub fn from_slug(slug: &str, tag: &str, file_name: &str) -> Option<Self> {
        let (owner, repo) = slug.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(ReleaseAsset {
            host: DEFAULT_RELEASE_HOST.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
            file_name: file_name.to_string(),
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}/releases/download/{}/{}",
            self.host.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.tag,
            self.file_name
        )
    }

    /// Target that installs this asset into `install_dir`.
    pub fn target(&self, install_dir: &Path) -> DownloadTarget {
        DownloadTarget::new(self.url(), install_dir, self.file_name.clone())
    }
}

/// A game the launcher knows how to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    pub title: String,
    /// Release tag, e.g. "v2.0"
    pub version: String,
    /// Advertised size, display only
    pub size_label: String,
    pub asset: ReleaseAsset,
}

impl GameEntry {
    fn new(title: &str, version: &str, size_label: &str, file_name: &str, slug: &str) -> Option<Self> {
        Some(GameEntry {
            title: title.to_string(),
            version: version.to_string(),
            size_label: size_label.to_string(),
            asset: ReleaseAsset::from_slug(slug, version, file_name)?,
        })
    }

    pub fn is_installed(&self, install_dir: &Path) -> bool {
        install_dir.join(&self.asset.file_name).is_file()
    }

    pub fn target(&self, install_dir: &Path) -> DownloadTarget {
        self.asset.target(install_dir)
    }
}

/// Games shipped with the launcher.
pub fn builtin_catalog() -> Vec<GameEntry> {
    [
        GameEntry::new(
            "Target Game",
            "v2.0",
            "45 MB",
            "target_game.exe",
            "gu2121gg/Projeto-Xemuloter",
        ),
        GameEntry::new(
            "PS2 Emulator",
            "v1.5",
            "15 MB",
            "ps2_emulator.exe",
            "gu2121gg/Projeto-Xemuloter",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Look up a game by title or file name, ignoring case.
pub fn find_game<'a>(catalog: &'a [GameEntry], name: &str) -> Result<&'a GameEntry, ConfigError> {
    let wanted = name.trim().to_lowercase();
    catalog
        .iter()
        .find(|g| g.title.to_lowercase() == wanted || g.asset.file_name.to_lowercase() == wanted)
        .ok_or_else(|| ConfigError::UnknownGame(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_url_layout() {
        let asset = ReleaseAsset::from_slug("gu2121gg/Projeto-Xemuloter", "v2.0", "target_game.exe")
            .expect("valid slug");
        assert_eq!(
            asset.url(),
            "https://github.com/gu2121gg/Projeto-Xemuloter/releases/download/v2.0/target_game.exe"
        );
    }

    #[test]
    fn test_release_url_trims_host_slash() {
        let mut asset = ReleaseAsset::from_slug("o/r", "t", "f.bin").expect("valid slug");
        asset.host = "http://127.0.0.1:8080/".to_string();
        assert_eq!(asset.url(), "http://127.0.0.1:8080/o/r/releases/download/t/f.bin");
    }

    #[test]
    fn test_from_slug_rejects_malformed() {
        assert!(ReleaseAsset::from_slug("no-slash", "v1", "f").is_none());
        assert!(ReleaseAsset::from_slug("/repo", "v1", "f").is_none());
        assert!(ReleaseAsset::from_slug("a/b/c", "v1", "f").is_none());
    }

    #[test]
    fn test_builtin_catalog_entries() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].title, "Target Game");
        assert_eq!(catalog[1].asset.tag, "v1.5");
    }

    #[test]
    fn test_find_game_by_title_or_file() {
        let catalog = builtin_catalog();
        let by_title = find_game(&catalog, "target game").expect("title lookup");
        let by_file = find_game(&catalog, "PS2_EMULATOR.exe").expect("file lookup");
        assert_eq!(by_title.asset.file_name, "target_game.exe");
        assert_eq!(by_file.title, "PS2 Emulator");
        assert!(matches!(find_game(&catalog, "tetris"), Err(ConfigError::UnknownGame(_))));
    }

    #[test]
    fn test_is_installed_and_target() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let catalog = builtin_catalog();
        let game = &catalog[0];

        assert!(!game.is_installed(temp_dir.path()));
        std::fs::write(temp_dir.path().join("target_game.exe"), b"MZ").expect("write");
        assert!(game.is_installed(temp_dir.path()));

        let target = game.target(temp_dir.path());
        assert_eq!(target.destination_path, temp_dir.path().join("target_game.exe"));
        assert_eq!(target.remote_url, game.asset.url());
    }
}
