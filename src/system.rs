//! The embedded music system: SQLite library, play queue, player state,
//! speakers and the event bus the idle machinery hangs off.
//!
//! Everything lives behind one `Arc<Mutex<System>>`; command handlers run
//! with the lock held and are expected to return promptly. The only
//! long-running work (rescanning) happens on its own task and reports back
//! through the event bus.

use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::mpd_protocol::filter::QueryParams;
use crate::mpd_protocol::{Events, PlaybackState, RepeatMode};

mod queue;

pub use queue::QueueRow;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    path              TEXT NOT NULL,
    virtual_path      TEXT NOT NULL UNIQUE,
    directory_id      INTEGER NOT NULL DEFAULT 0,
    title             TEXT NOT NULL DEFAULT '',
    title_sort        TEXT NOT NULL DEFAULT '',
    artist            TEXT NOT NULL DEFAULT '',
    artist_sort       TEXT NOT NULL DEFAULT '',
    album             TEXT NOT NULL DEFAULT '',
    album_sort        TEXT NOT NULL DEFAULT '',
    album_artist      TEXT NOT NULL DEFAULT '',
    album_artist_sort TEXT NOT NULL DEFAULT '',
    composer          TEXT NOT NULL DEFAULT '',
    composer_sort     TEXT NOT NULL DEFAULT '',
    conductor         TEXT NOT NULL DEFAULT '',
    grouping          TEXT NOT NULL DEFAULT '',
    comment           TEXT NOT NULL DEFAULT '',
    genre             TEXT NOT NULL DEFAULT '',
    track             INTEGER NOT NULL DEFAULT 0,
    disc              INTEGER NOT NULL DEFAULT 0,
    year              INTEGER NOT NULL DEFAULT 0,
    date_released     INTEGER NOT NULL DEFAULT 0,
    song_length       INTEGER NOT NULL DEFAULT 0,
    time_modified     INTEGER NOT NULL DEFAULT 0,
    time_added        INTEGER NOT NULL DEFAULT 0,
    rating            INTEGER NOT NULL DEFAULT 0,
    songartistid      INTEGER NOT NULL DEFAULT 0,
    songalbumid       INTEGER NOT NULL DEFAULT 0,
    generation        INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS directories (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id    INTEGER NOT NULL DEFAULT 0,
    virtual_path TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS queue (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id           INTEGER NOT NULL DEFAULT 0,
    pos               INTEGER NOT NULL,
    queue_version     INTEGER NOT NULL DEFAULT 0,
    virtual_path      TEXT NOT NULL,
    title             TEXT NOT NULL DEFAULT '',
    artist            TEXT NOT NULL DEFAULT '',
    artist_sort       TEXT NOT NULL DEFAULT '',
    album             TEXT NOT NULL DEFAULT '',
    album_artist      TEXT NOT NULL DEFAULT '',
    album_artist_sort TEXT NOT NULL DEFAULT '',
    genre             TEXT NOT NULL DEFAULT '',
    track             INTEGER NOT NULL DEFAULT 0,
    disc              INTEGER NOT NULL DEFAULT 0,
    year              INTEGER NOT NULL DEFAULT 0,
    song_length       INTEGER NOT NULL DEFAULT 0,
    time_modified     INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS admin (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

/// One library row, fetched whole so the tag registry can pick values out of
/// it without re-querying.
#[derive(Debug, Clone)]
pub struct MediaRow {
    pub id: i64,
    pub path: String,
    pub virtual_path: String,
    pub directory_id: i64,
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
    pub date_released: u32,
    pub song_length: u64,
    pub time_modified: i64,
    pub time_added: i64,
    pub rating: u32,
}

impl MediaRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(MediaRow {
            id: row.get("id")?,
            path: row.get("path")?,
            virtual_path: row.get("virtual_path")?,
            directory_id: row.get("directory_id")?,
            title: row.get("title")?,
            title_sort: row.get("title_sort")?,
            artist: row.get("artist")?,
            artist_sort: row.get("artist_sort")?,
            album: row.get("album")?,
            album_sort: row.get("album_sort")?,
            album_artist: row.get("album_artist")?,
            album_artist_sort: row.get("album_artist_sort")?,
            composer: row.get("composer")?,
            composer_sort: row.get("composer_sort")?,
            conductor: row.get("conductor")?,
            grouping: row.get("grouping")?,
            comment: row.get("comment")?,
            genre: row.get("genre")?,
            track: row.get("track")?,
            disc: row.get("disc")?,
            year: row.get("year")?,
            date_released: row.get("date_released")?,
            song_length: row.get::<_, i64>("song_length")? as u64,
            time_modified: row.get("time_modified")?,
            time_added: row.get("time_added")?,
            rating: row.get("rating")?,
        })
    }
}

/// Playback state. No audio is rendered here; this tracks what the protocol
/// has to report and fires the matching events.
#[derive(Debug)]
pub struct Player {
    pub state: PlaybackState,
    /// Queue item id of the current song, if any.
    pub item_id: Option<u32>,
    pub volume: i64,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub consume: bool,
    elapsed: Duration,
    playing_since: Option<Instant>,
}

impl Default for Player {
    fn default() -> Self {
        Player {
            state: PlaybackState::Stop,
            item_id: None,
            volume: 50,
            repeat: RepeatMode::Off,
            shuffle: false,
            consume: false,
            elapsed: Duration::ZERO,
            playing_since: None,
        }
    }
}

impl Player {
    pub fn elapsed(&self) -> Duration {
        match self.playing_since {
            Some(since) => self.elapsed + since.elapsed(),
            None => self.elapsed,
        }
    }

    fn freeze_elapsed(&mut self) {
        if let Some(since) = self.playing_since.take() {
            self.elapsed += since.elapsed();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Speaker {
    pub name: String,
    pub output_type: String,
    pub selected: bool,
    pub volume: i64,
}

pub struct System {
    pub db: Connection,
    pub player: Player,
    pub speakers: Vec<Speaker>,
    pub music_dir: Utf8PathBuf,
    pub playlist_dir: Utf8PathBuf,
    pub scanning: bool,
    started: Instant,
    events: broadcast::Sender<Events>,
    rescan_tx: mpsc::UnboundedSender<()>,
    rescan_rx: Option<mpsc::UnboundedReceiver<()>>,
}

impl System {
    /// Opens (or creates) the database and prepares the system. `db_path` of
    /// `None` keeps the database in memory, which the tests use.
    pub fn new(
        db_path: Option<&Utf8Path>,
        music_dir: Utf8PathBuf,
        playlist_dir: Utf8PathBuf,
        speakers: Vec<Speaker>,
    ) -> Result<Self> {
        let db = match db_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).wrap_err("Could not create database dir")?;
                }
                Connection::open(path).wrap_err("Could not open database")?
            }
            None => Connection::open_in_memory().wrap_err("Could not open in-memory database")?,
        };
        db.execute_batch(SCHEMA).wrap_err("Could not apply schema")?;

        // filters use REGEXP, which sqlite leaves to the application
        db.create_scalar_function(
            "regexp",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let pattern: String = ctx.get(0)?;
                let value: String = ctx.get(1)?;
                match regex::Regex::new(&pattern) {
                    Ok(re) => Ok(re.is_match(&value)),
                    Err(e) => {
                        warn!("bad regex in filter: {e}");
                        Ok(false)
                    }
                }
            },
        )
        .wrap_err("Could not register the regexp function")?;

        let (events, _) = broadcast::channel(64);
        let (rescan_tx, rescan_rx) = mpsc::unbounded_channel();

        Ok(System {
            db,
            player: Player::default(),
            speakers,
            music_dir,
            playlist_dir,
            scanning: false,
            started: Instant::now(),
            events,
            rescan_tx,
            rescan_rx: Some(rescan_rx),
        })
    }

    // ---- event bus -------------------------------------------------------

    /// Fans an event mask out to every connected client. Receivers that
    /// lagged behind treat the gap as "everything changed".
    pub fn notify(&self, events: Events) {
        debug!(?events, "notify");
        // send only fails with no receivers, which is fine
        let _ = self.events.send(events);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Events> {
        self.events.subscribe()
    }

    // ---- admin key/value -------------------------------------------------

    pub fn admin_get(&self, key: &str) -> Option<i64> {
        self.db
            .query_row("SELECT value FROM admin WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .ok()
    }

    pub fn admin_set(&self, key: &str, value: i64) {
        if let Err(e) = self.db.execute(
            "INSERT INTO admin (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            (key, value),
        ) {
            warn!("failed to store admin value {key}: {e}");
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    // ---- rescans ---------------------------------------------------------

    /// Queues a rescan on the scanner task; returns immediately.
    pub fn request_rescan(&mut self) {
        self.scanning = true;
        let _ = self.rescan_tx.send(());
    }

    /// The receiving end for the scanner task. Can only be taken once.
    pub fn take_rescan_rx(&mut self) -> Option<mpsc::UnboundedReceiver<()>> {
        self.rescan_rx.take()
    }

    // ---- library queries -------------------------------------------------

    /// Runs a library query assembled from an emitted filter/sort/group
    /// spec.
    pub fn query_files(&self, qp: &QueryParams) -> Result<Vec<MediaRow>> {
        let sql = build_select("SELECT f.* FROM files f", qp);
        debug!(%sql, "query_files");
        let mut stmt = self.db.prepare(&sql).wrap_err("Could not start query")?;
        let rows = stmt
            .query_map([], MediaRow::from_row)
            .wrap_err("Could not run query")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .wrap_err("Error fetching query results")?;
        Ok(rows)
    }

    /// `songs:` and `playtime:` aggregation for count/stats.
    pub fn filecount(&self, qp: &QueryParams) -> Result<(u32, u64)> {
        let mut sql =
            "SELECT COUNT(*), IFNULL(SUM(f.song_length), 0) FROM files f".to_string();
        if let Some(filter) = &qp.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        self.db
            .query_row(&sql, [], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })
            .wrap_err("Could not start query")
    }

    pub fn media_by_virtual_path(&self, virtual_path: &str) -> Option<MediaRow> {
        self.db
            .query_row(
                "SELECT f.* FROM files f WHERE f.virtual_path = ?1",
                [virtual_path],
                MediaRow::from_row,
            )
            .ok()
    }

    pub fn media_by_id(&self, id: i64) -> Option<MediaRow> {
        self.db
            .query_row(
                "SELECT f.* FROM files f WHERE f.id = ?1",
                [id],
                MediaRow::from_row,
            )
            .ok()
    }

    pub fn file_id_by_virtual_path(&self, virtual_path: &str) -> Option<i64> {
        self.db
            .query_row(
                "SELECT f.id FROM files f WHERE f.virtual_path = ?1",
                [virtual_path],
                |row| row.get(0),
            )
            .ok()
    }

    /// Loose lookup for artwork requests: first item whose virtual path
    /// contains the given fragment.
    pub fn file_id_by_virtual_path_match(&self, fragment: &str) -> Option<i64> {
        self.db
            .query_row(
                "SELECT f.id FROM files f WHERE f.virtual_path LIKE ?1 ORDER BY f.id LIMIT 1",
                [format!("%{fragment}%")],
                |row| row.get(0),
            )
            .ok()
    }

    /// Persists a rating (0-100) for a file.
    pub fn rating_save(&mut self, file_id: i64, rating: u32) -> Result<()> {
        self.db
            .execute("UPDATE files SET rating = ?2 WHERE id = ?1", (file_id, rating))
            .wrap_err("Could not save rating")?;
        self.notify(Events::RATING);
        Ok(())
    }

    pub fn stats_counts(&self) -> Result<(u32, u32, u32, u64)> {
        self.db
            .query_row(
                "SELECT COUNT(DISTINCT songartistid), COUNT(DISTINCT songalbumid),
                        COUNT(*), IFNULL(SUM(song_length), 0)
                 FROM files",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get::<_, i64>(3)? as u64,
                    ))
                },
            )
            .wrap_err("Could not count library")
    }

    // ---- directories -----------------------------------------------------

    pub fn directory_id_by_virtual_path(&self, virtual_path: &str) -> Option<i64> {
        self.db
            .query_row(
                "SELECT id FROM directories WHERE virtual_path = ?1",
                [virtual_path],
                |row| row.get(0),
            )
            .ok()
    }

    pub fn subdirectories(&self, parent_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare(
                "SELECT virtual_path FROM directories
                 WHERE parent_id = ?1 ORDER BY virtual_path",
            )
            .wrap_err("Could not enumerate directories")?;
        let dirs = stmt
            .query_map([parent_id], |row| row.get(0))
            .wrap_err("Could not enumerate directories")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .wrap_err("Error fetching directories")?;
        Ok(dirs)
    }

    pub fn files_in_directory(&self, directory_id: i64) -> Result<Vec<MediaRow>> {
        let qp = QueryParams {
            filter: Some(format!("(f.directory_id = {directory_id})")),
            order: Some("f.album_artist_sort, f.album_artist".to_string()),
            ..QueryParams::default()
        };
        self.query_files(&qp)
    }

    // ---- player ----------------------------------------------------------

    /// Queue position of the current song; 0 when stopped or empty, which
    /// is what relative position arguments resolve against.
    pub fn current_queue_pos(&self) -> u32 {
        if self.player.state == PlaybackState::Stop {
            return 0;
        }
        self.player
            .item_id
            .and_then(|id| self.queue_fetch_byid(id))
            .map(|row| row.pos)
            .unwrap_or(0)
    }

    /// The queue item the player is on: the current one when playing or
    /// paused, else the head of the queue.
    pub fn playing_item(&self) -> Option<QueueRow> {
        if self.player.state == PlaybackState::Stop {
            self.queue_fetch_bypos(0)
        } else {
            self.player.item_id.and_then(|id| self.queue_fetch_byid(id))
        }
    }

    pub fn playback_start(&mut self) -> Result<(), crate::mpd_protocol::CommandError> {
        use crate::mpd_protocol::CommandError;

        if self.player.item_id.is_none() {
            let head = self
                .queue_fetch_bypos(0)
                .ok_or_else(|| CommandError::unknown("Failed to start playback"))?;
            self.player.item_id = Some(head.id);
            self.player.elapsed = Duration::ZERO;
        }
        if self.player.state != PlaybackState::Play {
            self.player.state = PlaybackState::Play;
            self.player.playing_since = Some(Instant::now());
            self.notify(Events::PLAYER);
        }
        Ok(())
    }

    pub fn playback_start_byitem(&mut self, item_id: u32) {
        self.player.item_id = Some(item_id);
        self.player.elapsed = Duration::ZERO;
        self.player.playing_since = Some(Instant::now());
        self.player.state = PlaybackState::Play;
        self.notify(Events::PLAYER);
    }

    pub fn playback_stop(&mut self) {
        self.player.freeze_elapsed();
        self.player.elapsed = Duration::ZERO;
        self.player.item_id = None;
        if self.player.state != PlaybackState::Stop {
            self.player.state = PlaybackState::Stop;
            self.notify(Events::PLAYER);
        }
    }

    pub fn playback_pause(&mut self) {
        if self.player.state == PlaybackState::Play {
            self.player.freeze_elapsed();
            self.player.state = PlaybackState::Pause;
            self.notify(Events::PLAYER);
        }
    }

    /// Moves to the neighbouring queue item. Wraps around when repeat is on.
    pub fn playback_step(&mut self, forward: bool) -> Result<(), crate::mpd_protocol::CommandError> {
        use crate::mpd_protocol::CommandError;

        let count = self.queue_count();
        if count == 0 {
            return Err(CommandError::unknown("Failed to skip song"));
        }
        let pos = self.current_queue_pos();
        let next = if forward {
            if pos + 1 < count {
                pos + 1
            } else if self.player.repeat != RepeatMode::Off {
                0
            } else {
                return Err(CommandError::unknown("Failed to skip to next song"));
            }
        } else if pos > 0 {
            pos - 1
        } else if self.player.repeat != RepeatMode::Off {
            count - 1
        } else {
            0
        };
        let item = self
            .queue_fetch_bypos(next)
            .ok_or_else(|| CommandError::unknown("Failed to skip song"))?;
        self.player.item_id = Some(item.id);
        self.player.elapsed = Duration::ZERO;
        if self.player.state == PlaybackState::Play {
            self.player.playing_since = Some(Instant::now());
        }
        self.notify(Events::PLAYER);
        Ok(())
    }

    pub fn playback_seek(&mut self, target_ms: u64) {
        self.player.elapsed = Duration::from_millis(target_ms);
        if self.player.state == PlaybackState::Play {
            self.player.playing_since = Some(Instant::now());
        }
        self.notify(Events::PLAYER);
    }

    pub fn volume_set(&mut self, volume: i64) {
        self.player.volume = volume.clamp(0, 100);
        self.notify(Events::VOLUME);
    }

    pub fn shuffle_set(&mut self, shuffle: bool) {
        self.player.shuffle = shuffle;
        self.notify(Events::OPTIONS);
    }

    pub fn repeat_set(&mut self, repeat: RepeatMode) {
        self.player.repeat = repeat;
        self.notify(Events::OPTIONS);
    }

    pub fn consume_set(&mut self, consume: bool) {
        self.player.consume = consume;
        self.notify(Events::OPTIONS);
    }

    // ---- speakers --------------------------------------------------------

    pub fn speaker_set_selected(&mut self, shortid: usize, selected: bool) -> bool {
        match self.speakers.get_mut(shortid) {
            Some(speaker) => {
                if speaker.selected != selected {
                    speaker.selected = selected;
                    self.notify(Events::SPEAKER);
                }
                true
            }
            None => false,
        }
    }

    pub fn speaker_set_volume(&mut self, shortid: usize, volume: i64) -> bool {
        match self.speakers.get_mut(shortid) {
            Some(speaker) => {
                speaker.volume = volume.clamp(0, 100);
                self.notify(Events::VOLUME);
                true
            }
            None => false,
        }
    }
}

/// Splices an emitted query spec into a SELECT statement. The filter string
/// was escaped at emission.
fn build_select(base: &str, qp: &QueryParams) -> String {
    let mut sql = base.to_string();
    if let Some(filter) = &qp.filter {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    if let Some(group) = &qp.group {
        sql.push_str(" GROUP BY ");
        sql.push_str(group);
    }
    if let Some(order) = &qp.order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(limit) = qp.limit {
        sql.push_str(&format!(" LIMIT {limit} OFFSET {}", qp.offset));
    }
    sql
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_system() -> System {
        System::new(
            None,
            Utf8PathBuf::from("/tmp/music"),
            Utf8PathBuf::from("/tmp/playlists"),
            vec![Speaker {
                name: "Computer".to_string(),
                output_type: "ALSA default".to_string(),
                selected: true,
                volume: 100,
            }],
        )
        .unwrap()
    }

    pub(crate) fn insert_file(system: &System, virtual_path: &str, artist: &str, album: &str, title: &str) -> i64 {
        system
            .db
            .execute(
                "INSERT INTO files (path, virtual_path, title, title_sort, artist, artist_sort,
                                    album, album_sort, album_artist, album_artist_sort, genre,
                                    track, disc, year, song_length, time_modified, songartistid, songalbumid)
                 VALUES (?1, ?2, ?3, ?3, ?4, ?4, ?5, ?5, ?4, ?4, 'Rock', 1, 1, 2000, 180000, 1700000000, ?6, ?7)",
                (
                    virtual_path.trim_start_matches("/file:"),
                    virtual_path,
                    title,
                    artist,
                    album,
                    artist.len() as i64,
                    (artist.len() + album.len()) as i64,
                ),
            )
            .unwrap();
        system.db.last_insert_rowid()
    }

    #[test]
    fn query_files_applies_filter_and_order() {
        let system = test_system();
        insert_file(&system, "/file:/srv/m/b.mp3", "Zed", "Last", "B");
        insert_file(&system, "/file:/srv/m/a.mp3", "Abba", "First", "A");

        let qp = QueryParams {
            filter: Some("(f.album_artist = 'Abba')".to_string()),
            ..QueryParams::default()
        };
        let rows = system.query_files(&qp).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "A");

        let qp = QueryParams {
            order: Some("f.album_artist_sort, f.album_artist".to_string()),
            ..QueryParams::default()
        };
        let rows = system.query_files(&qp).unwrap();
        assert_eq!(rows[0].artist, "Abba");
        assert_eq!(rows[1].artist, "Zed");
    }

    #[test]
    fn regexp_filter_matches() {
        let system = test_system();
        insert_file(&system, "/file:/srv/m/a.mp3", "Bach", "X", "A");
        insert_file(&system, "/file:/srv/m/b.mp3", "Brahms", "Y", "B");

        let qp = QueryParams {
            filter: Some("(f.album_artist REGEXP '^Ba.*h$')".to_string()),
            ..QueryParams::default()
        };
        let rows = system.query_files(&qp).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].artist, "Bach");
    }

    #[test]
    fn virtual_path_match_is_loose() {
        let system = test_system();
        let id = insert_file(&system, "/file:/srv/m/foo/bar.mp3", "A", "B", "C");
        assert_eq!(system.file_id_by_virtual_path_match("foo/bar.mp3"), Some(id));
        assert_eq!(system.file_id_by_virtual_path_match("foo"), Some(id));
        assert_eq!(system.file_id_by_virtual_path_match("nope"), None);
    }

    #[test]
    fn filecount_sums_lengths() {
        let system = test_system();
        insert_file(&system, "/file:/srv/m/a.mp3", "A", "B", "C");
        insert_file(&system, "/file:/srv/m/b.mp3", "A", "B", "D");
        let (count, length) = system.filecount(&QueryParams::default()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(length, 360000);
    }
}
