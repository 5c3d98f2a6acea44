//! YAML configuration with `mpd` and `library` sections. Read once at
//! startup; the two deprecated duplicates in the `mpd` section are honored
//! with a warning.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use color_eyre::eyre::Context;
use serde::Deserialize;
use tracing::warn;

use crate::system::Speaker;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub mpd: MpdSection,
    #[serde(default)]
    pub library: LibrarySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpdSection {
    /// TCP listen port; zero or negative disables the server.
    #[serde(default = "default_port")]
    pub port: i32,
    /// HTTP artwork port; 0 disables.
    #[serde(default)]
    pub http_port: u16,
    /// Advertise the pseudo HTTP stream as an extra output.
    #[serde(default)]
    pub enable_httpd_plugin: bool,
    /// Speakers reported by the outputs commands, in enumeration order.
    #[serde(default)]
    pub speakers: Vec<SpeakerConfig>,
    // deprecated, belongs in the library section
    #[serde(default)]
    pub allow_modifying_stored_playlists: Option<bool>,
    #[serde(default)]
    pub default_playlist_directory: Option<Utf8PathBuf>,
}

impl Default for MpdSection {
    fn default() -> Self {
        MpdSection {
            port: default_port(),
            http_port: 0,
            enable_httpd_plugin: false,
            speakers: Vec::new(),
            allow_modifying_stored_playlists: None,
            default_playlist_directory: None,
        }
    }
}

fn default_port() -> i32 {
    6600
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibrarySection {
    pub music_directory: Option<Utf8PathBuf>,
    /// Empty or absent disables authentication.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub allow_modifying_stored_playlists: bool,
    #[serde(default)]
    pub default_playlist_directory: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeakerConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_speaker_type")]
    pub output_type: String,
}

fn default_speaker_type() -> String {
    "ALSA default".to_string()
}

impl Config {
    pub fn load(path: &Utf8Path) -> Result<Config> {
        let content =
            std::fs::read_to_string(path).wrap_err("Could not read config file")?;
        let mut config: Config =
            serde_yaml::from_str(&content).wrap_err("Could not parse config file")?;
        config.apply_deprecations();
        Ok(config)
    }

    fn apply_deprecations(&mut self) {
        if let Some(allow) = self.mpd.allow_modifying_stored_playlists.take() {
            warn!(
                "found deprecated option 'allow_modifying_stored_playlists' in section 'mpd', \
                 please move it to section 'library'"
            );
            self.library.allow_modifying_stored_playlists = allow;
        }
        if let Some(dir) = self.mpd.default_playlist_directory.take() {
            warn!(
                "found deprecated option 'default_playlist_directory' in section 'mpd', \
                 please move it to section 'library'"
            );
            self.library.default_playlist_directory = Some(dir);
        }
    }

    /// A password only counts when non-empty.
    pub fn password(&self) -> Option<&str> {
        self.library.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn playlist_dir(&self, music_dir: &Utf8Path) -> Utf8PathBuf {
        self.library
            .default_playlist_directory
            .clone()
            .unwrap_or_else(|| music_dir.join("playlists"))
    }

    pub fn speakers(&self) -> Vec<Speaker> {
        self.mpd
            .speakers
            .iter()
            .map(|s| Speaker {
                name: s.name.clone(),
                output_type: s.output_type.clone(),
                selected: true,
                volume: 100,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deprecated_mpd_options_move_to_library() {
        let mut config: Config = serde_yaml::from_str(
            "mpd:\n  port: 6600\n  allow_modifying_stored_playlists: true\n",
        )
        .unwrap();
        config.apply_deprecations();
        assert!(config.library.allow_modifying_stored_playlists);
        assert!(config.mpd.allow_modifying_stored_playlists.is_none());
    }

    #[test]
    fn empty_password_disables_auth() {
        let config: Config =
            serde_yaml::from_str("library:\n  password: \"\"\n").unwrap();
        assert_eq!(config.password(), None);

        let config: Config =
            serde_yaml::from_str("library:\n  password: \"secret\"\n").unwrap();
        assert_eq!(config.password(), Some("secret"));
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.mpd.port, 6600);
        assert_eq!(config.mpd.http_port, 0);
        assert!(!config.library.allow_modifying_stored_playlists);
    }
}
