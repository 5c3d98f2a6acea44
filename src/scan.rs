//! Library scanning: walk the music directory, read tags with lofty, and
//! sync the `files` and `directories` tables. A generation counter marks
//! rows seen by the current scan so stale ones can be dropped afterwards.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use color_eyre::eyre::Context;
use jiff::Timestamp;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::read_from_path;
use lofty::tag::{Accessor, ItemKey};
use tracing::{debug, info, warn};

use crate::mpd_protocol::Events;
use crate::system::System;

#[derive(Debug)]
pub struct ScannedFile {
    pub path: Utf8PathBuf,
    pub virtual_path: String,
    pub title: String,
    pub title_sort: String,
    pub artist: String,
    pub artist_sort: String,
    pub album: String,
    pub album_sort: String,
    pub album_artist: String,
    pub album_artist_sort: String,
    pub composer: String,
    pub composer_sort: String,
    pub conductor: String,
    pub grouping: String,
    pub comment: String,
    pub genre: String,
    pub track: u32,
    pub disc: u32,
    pub year: u32,
    pub song_length_ms: u64,
    pub time_modified: i64,
}

/// Walks the music directory and reads every taggable file. Pure
/// filesystem work, safe to run on a blocking task without the system lock.
pub fn collect(music_dir: &Utf8Path) -> Vec<ScannedFile> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(music_dir).follow_links(true) {
        let Ok(entry) = entry else { continue };
        let Ok(metadata) = entry.metadata() else { continue };
        if metadata.is_dir() {
            continue;
        }
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            warn!("skipping non-UTF-8 path: {}", entry.path().display());
            continue;
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| Timestamp::try_from(t).ok())
            .map(|t| t.as_second())
            .unwrap_or(0);
        match scan_file(path, mtime) {
            Some(file) => files.push(file),
            None => debug!("not a song: {path}"),
        }
    }
    files
}

fn scan_file(path: &Utf8Path, time_modified: i64) -> Option<ScannedFile> {
    let tagged = read_from_path(path).ok()?;
    let tag = tagged.primary_tag()?;

    let item = |key: ItemKey| tag.get_string(&key).unwrap_or_default().to_string();

    let title = tag
        .title()
        .map(|t| t.to_string())
        .unwrap_or_else(|| path.file_stem().unwrap_or_default().to_string());
    let artist = tag.artist().map(|t| t.to_string()).unwrap_or_default();
    let album = tag.album().map(|t| t.to_string()).unwrap_or_default();
    let album_artist = non_empty(item(ItemKey::AlbumArtist)).unwrap_or_else(|| artist.clone());

    let title_sort = non_empty(item(ItemKey::TrackTitleSortOrder)).unwrap_or_else(|| title.clone());
    let artist_sort =
        non_empty(item(ItemKey::TrackArtistSortOrder)).unwrap_or_else(|| artist.clone());
    let album_sort = non_empty(item(ItemKey::AlbumTitleSortOrder)).unwrap_or_else(|| album.clone());
    let album_artist_sort =
        non_empty(item(ItemKey::AlbumArtistSortOrder)).unwrap_or_else(|| album_artist.clone());
    let composer = item(ItemKey::Composer);

    Some(ScannedFile {
        virtual_path: format!("/file:{path}"),
        path: path.to_path_buf(),
        title,
        title_sort,
        artist,
        artist_sort,
        album,
        album_sort,
        album_artist,
        album_artist_sort,
        composer_sort: composer.clone(),
        composer,
        conductor: item(ItemKey::Conductor),
        grouping: item(ItemKey::ContentGroup),
        comment: item(ItemKey::Comment),
        genre: tag.genre().map(|t| t.to_string()).unwrap_or_default(),
        track: tag.track().unwrap_or(0),
        disc: tag.disk().unwrap_or(0),
        year: tag.year().unwrap_or(0),
        song_length_ms: tagged.properties().duration().as_millis() as u64,
        time_modified,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Persistent ids: listing artists/albums groups over these instead of the
/// name columns.
fn persistent_id(parts: &[&str]) -> i64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish() as i64
}

impl System {
    /// Synchronous scan used at startup and by the `scan` subcommand.
    pub fn rescan_now(&mut self) -> Result<()> {
        let files = collect(&self.music_dir);
        self.apply_scan(files)
    }

    /// Writes scan results into the database, prunes files that vanished
    /// and fires the database events.
    pub fn apply_scan(&mut self, files: Vec<ScannedFile>) -> Result<()> {
        let generation = self.admin_get("scan_generation").unwrap_or(0) + 1;
        let now = Timestamp::now().as_second();
        let total = files.len();

        for file in files {
            let directory_id = self.ensure_directory_for(&file.virtual_path)?;
            self.db
                .execute(
                    "INSERT INTO files (path, virtual_path, directory_id, title, title_sort,
                                        artist, artist_sort, album, album_sort, album_artist,
                                        album_artist_sort, composer, composer_sort, conductor,
                                        grouping, comment, genre, track, disc, year,
                                        date_released, song_length, time_modified, time_added,
                                        songartistid, songalbumid, generation)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19, ?20, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
                     ON CONFLICT (virtual_path) DO UPDATE SET
                        path = excluded.path,
                        directory_id = excluded.directory_id,
                        title = excluded.title,
                        title_sort = excluded.title_sort,
                        artist = excluded.artist,
                        artist_sort = excluded.artist_sort,
                        album = excluded.album,
                        album_sort = excluded.album_sort,
                        album_artist = excluded.album_artist,
                        album_artist_sort = excluded.album_artist_sort,
                        composer = excluded.composer,
                        composer_sort = excluded.composer_sort,
                        conductor = excluded.conductor,
                        grouping = excluded.grouping,
                        comment = excluded.comment,
                        genre = excluded.genre,
                        track = excluded.track,
                        disc = excluded.disc,
                        year = excluded.year,
                        date_released = excluded.date_released,
                        song_length = excluded.song_length,
                        time_modified = excluded.time_modified,
                        songartistid = excluded.songartistid,
                        songalbumid = excluded.songalbumid,
                        generation = excluded.generation",
                    rusqlite::params![
                        file.path.as_str(),
                        file.virtual_path,
                        directory_id,
                        file.title,
                        file.title_sort,
                        file.artist,
                        file.artist_sort,
                        file.album,
                        file.album_sort,
                        file.album_artist,
                        file.album_artist_sort,
                        file.composer,
                        file.composer_sort,
                        file.conductor,
                        file.grouping,
                        file.comment,
                        file.genre,
                        file.track,
                        file.disc,
                        file.year,
                        file.song_length_ms as i64,
                        file.time_modified,
                        now,
                        persistent_id(&[file.album_artist.as_str()]),
                        persistent_id(&[file.album_artist.as_str(), file.album.as_str()]),
                        generation,
                    ],
                )
                .wrap_err("Could not upsert scanned file")?;
        }

        let removed = self
            .db
            .execute("DELETE FROM files WHERE generation < ?1", [generation])
            .wrap_err("Could not prune stale files")?;
        self.admin_set("scan_generation", generation);
        self.admin_set("db_update", now);
        self.scanning = false;

        info!("scan complete: {total} songs, {removed} removed");
        self.notify(Events::DATABASE | Events::UPDATE);
        Ok(())
    }

    /// Directory rows for the ancestry of one file's virtual path, creating
    /// what is missing. Returns the id of the innermost directory.
    fn ensure_directory_for(&mut self, virtual_path: &str) -> Result<i64> {
        let parent = match virtual_path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &virtual_path[..idx],
        };
        self.ensure_directory(parent)
    }

    fn ensure_directory(&mut self, virtual_path: &str) -> Result<i64> {
        if let Some(id) = self.directory_id_by_virtual_path(virtual_path) {
            return Ok(id);
        }
        let parent_id = if virtual_path == "/" {
            0
        } else {
            let parent = match virtual_path.rfind('/') {
                // "/file:..." and bare "/file:" both hang off the root
                Some(0) | None => "/",
                Some(idx) => &virtual_path[..idx],
            };
            self.ensure_directory(parent)?
        };
        self.db
            .execute(
                "INSERT INTO directories (parent_id, virtual_path) VALUES (?1, ?2)",
                (parent_id, virtual_path),
            )
            .wrap_err("Could not create directory row")?;
        Ok(self.db.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use crate::system::tests::test_system;

    use super::*;

    fn scanned(virtual_path: &str, artist: &str, album: &str, title: &str) -> ScannedFile {
        ScannedFile {
            path: Utf8PathBuf::from(virtual_path.trim_start_matches("/file:")),
            virtual_path: virtual_path.to_string(),
            title: title.to_string(),
            title_sort: title.to_string(),
            artist: artist.to_string(),
            artist_sort: artist.to_string(),
            album: album.to_string(),
            album_sort: album.to_string(),
            album_artist: artist.to_string(),
            album_artist_sort: artist.to_string(),
            composer: String::new(),
            composer_sort: String::new(),
            conductor: String::new(),
            grouping: String::new(),
            comment: String::new(),
            genre: "Rock".to_string(),
            track: 1,
            disc: 1,
            year: 2001,
            song_length_ms: 60_000,
            time_modified: 1_700_000_000,
        }
    }

    #[test]
    fn apply_scan_builds_directories() {
        let mut system = test_system();
        system
            .apply_scan(vec![scanned("/file:/srv/music/Abba/one.mp3", "Abba", "X", "One")])
            .unwrap();

        assert!(system.directory_id_by_virtual_path("/").is_some());
        assert!(system.directory_id_by_virtual_path("/file:").is_some());
        assert!(system.directory_id_by_virtual_path("/file:/srv").is_some());
        let dir = system
            .directory_id_by_virtual_path("/file:/srv/music/Abba")
            .unwrap();
        assert_eq!(system.files_in_directory(dir).unwrap().len(), 1);
    }

    #[test]
    fn rescans_prune_vanished_files() {
        let mut system = test_system();
        system
            .apply_scan(vec![
                scanned("/file:/m/a.mp3", "A", "X", "One"),
                scanned("/file:/m/b.mp3", "B", "X", "Two"),
            ])
            .unwrap();
        assert_eq!(system.stats_counts().unwrap().2, 2);

        system
            .apply_scan(vec![scanned("/file:/m/a.mp3", "A", "X", "One")])
            .unwrap();
        assert_eq!(system.stats_counts().unwrap().2, 1);
        assert!(system.media_by_virtual_path("/file:/m/b.mp3").is_none());
    }

    #[test]
    fn rescans_update_in_place() {
        let mut system = test_system();
        system
            .apply_scan(vec![scanned("/file:/m/a.mp3", "A", "X", "Old")])
            .unwrap();
        let first = system.media_by_virtual_path("/file:/m/a.mp3").unwrap();

        system
            .apply_scan(vec![scanned("/file:/m/a.mp3", "A", "X", "New")])
            .unwrap();
        let second = system.media_by_virtual_path("/file:/m/a.mp3").unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.title, "New");
    }
}
