//! Stored playlists are plain files in the playlist directory, one wire
//! path (`file:/srv/music/song.mp3`) per line, named exactly by playlist
//! name. Their virtual paths live under `/file:<playlist dir>`, which is
//! how a bare name argument gets resolved.

use std::fs;

use camino::Utf8PathBuf;
use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use itertools::Itertools;

use crate::mpd_protocol::{Events, PlaylistHead, prepend_slash, strip_slash};
use crate::system::System;

impl System {
    /// Virtual-path prefix bare playlist names resolve under.
    pub fn playlist_virtual_dir(&self) -> String {
        format!("/file:{}", self.playlist_dir)
    }

    /// A playlist argument is a virtual path when it contains `:/`, else a
    /// name under the default playlist directory.
    pub fn resolve_playlist_arg(&self, arg: &str) -> String {
        if arg.contains(":/") {
            prepend_slash(arg)
        } else {
            format!("{}/{arg}", self.playlist_virtual_dir())
        }
    }

    /// Disk path behind a playlist virtual path; `None` for paths outside
    /// the `/file:` scheme.
    pub fn playlist_disk_path(&self, virtual_path: &str) -> Option<Utf8PathBuf> {
        virtual_path.strip_prefix("/file:").map(Utf8PathBuf::from)
    }

    pub fn playlists(&self) -> Result<Vec<PlaylistHead>> {
        let entries = match fs::read_dir(&self.playlist_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).wrap_err("Could not read playlist dir"),
        };

        entries
            .map(|entry| entry.wrap_err("Could not read entry in playlist dir"))
            .filter_ok(|entry| entry.path().is_file())
            .map(|entry| {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| jiff::Timestamp::try_from(t).ok())
                    .unwrap_or(jiff::Timestamp::UNIX_EPOCH);
                Ok(PlaylistHead {
                    playlist: strip_slash(&format!(
                        "{}/{name}",
                        self.playlist_virtual_dir()
                    )),
                    last_modified: modified,
                    added: -1,
                })
            })
            .try_collect()
    }

    /// The stored lines of a playlist, or `None` when it does not exist.
    pub fn playlist_entries(&self, virtual_path: &str) -> Option<Vec<String>> {
        let path = self.playlist_disk_path(virtual_path)?;
        let content = fs::read_to_string(path).ok()?;
        Some(
            content
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn playlist_exists(&self, virtual_path: &str) -> bool {
        self.playlist_disk_path(virtual_path)
            .is_some_and(|p| p.is_file())
    }

    /// Appends one item, creating the playlist if needed.
    pub fn playlist_item_add(&mut self, virtual_path: &str, item_virtual_path: &str) -> Result<()> {
        let path = self
            .playlist_disk_path(virtual_path)
            .ok_or_else(|| eyre!("not a file-backed playlist: {virtual_path}"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err("Could not create playlist dir")?;
        }
        let mut entries = self.playlist_entries(virtual_path).unwrap_or_default();
        entries.push(strip_slash(item_virtual_path));
        fs::write(&path, entries.join("\n") + "\n").wrap_err("Could not write playlist")?;
        self.notify(Events::STORED_PLAYLIST);
        Ok(())
    }

    pub fn playlist_remove(&mut self, virtual_path: &str) -> Result<()> {
        let path = self
            .playlist_disk_path(virtual_path)
            .ok_or_else(|| eyre!("not a file-backed playlist: {virtual_path}"))?;
        fs::remove_file(path).wrap_err("Could not remove playlist")?;
        self.notify(Events::STORED_PLAYLIST);
        Ok(())
    }

    /// Writes the whole queue as a new playlist.
    pub fn queue_save(&mut self, virtual_path: &str) -> Result<()> {
        let path = self
            .playlist_disk_path(virtual_path)
            .ok_or_else(|| eyre!("not a file-backed playlist: {virtual_path}"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err("Could not create playlist dir")?;
        }
        let rows = self.queue_query(&Default::default())?;
        let content = rows
            .iter()
            .map(|row| strip_slash(&row.virtual_path))
            .join("\n");
        fs::write(&path, content + "\n").wrap_err("Could not save queue")?;
        self.notify(Events::STORED_PLAYLIST);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use crate::mpd_protocol::filter::QueryParams;
    use crate::system::tests::{insert_file, test_system};
    use crate::system::System;

    fn system_with_playlist_dir() -> (System, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut system = test_system();
        system.playlist_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (system, dir)
    }

    #[test]
    fn bare_names_resolve_under_the_playlist_dir() {
        let (system, _dir) = system_with_playlist_dir();
        assert_eq!(
            system.resolve_playlist_arg("roadtrip"),
            format!("/file:{}/roadtrip", system.playlist_dir)
        );
        // anything with a scheme separator is taken as a virtual path
        assert_eq!(
            system.resolve_playlist_arg("file:/elsewhere/list"),
            "/file:/elsewhere/list"
        );
    }

    #[test]
    fn save_then_read_round_trips_the_queue() {
        let (mut system, _dir) = system_with_playlist_dir();
        insert_file(&system, "/file:/m/a.mp3", "A", "X", "One");
        insert_file(&system, "/file:/m/b.mp3", "B", "X", "Two");
        system
            .queue_add_by_query(
                &QueryParams {
                    order: Some("f.virtual_path".to_string()),
                    ..QueryParams::default()
                },
                None,
            )
            .unwrap();

        let vp = system.resolve_playlist_arg("roadtrip");
        system.queue_save(&vp).unwrap();

        assert!(system.playlist_exists(&vp));
        assert_eq!(
            system.playlist_entries(&vp).unwrap(),
            vec!["file:/m/a.mp3", "file:/m/b.mp3"]
        );

        let heads = system.playlists().unwrap();
        assert_eq!(heads.len(), 1);
        assert!(heads[0].playlist.ends_with("/roadtrip"));
    }

    #[test]
    fn item_add_creates_and_appends() {
        let (mut system, _dir) = system_with_playlist_dir();
        let vp = system.resolve_playlist_arg("mix");
        system.playlist_item_add(&vp, "/file:/m/a.mp3").unwrap();
        system.playlist_item_add(&vp, "/file:/m/b.mp3").unwrap();
        assert_eq!(
            system.playlist_entries(&vp).unwrap(),
            vec!["file:/m/a.mp3", "file:/m/b.mp3"]
        );
    }

    #[test]
    fn remove_deletes_the_file() {
        let (mut system, _dir) = system_with_playlist_dir();
        let vp = system.resolve_playlist_arg("gone");
        system.playlist_item_add(&vp, "/file:/m/a.mp3").unwrap();
        system.playlist_remove(&vp).unwrap();
        assert!(!system.playlist_exists(&vp));
        assert!(system.playlist_remove(&vp).is_err());
    }
}
