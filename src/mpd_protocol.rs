//! Types for the MPD wire protocol: error codes, idle event classes,
//! positions/ranges and the response shapes the handlers serialize.

pub mod args;
pub mod filter;
pub mod response_format;
pub mod tags;

use std::time::Duration;

use serde::Serialize;
use strum::Display;

use crate::system::{MediaRow, QueueRow};

/// Protocol version sent in the greeting, not the server version.
pub const VERSION: &str = "0.24.0";

/// Largest argv a single command line can produce. Tokens past the cap are
/// dropped.
pub const COMMAND_ARGV_MAX: usize = 37;

/// Default and minimum chunk size for binary responses, from MPD's
/// MAX_BINARY_SIZE and ClientCommands.cxx.
pub const BINARY_SIZE_DEFAULT: usize = 8192;
pub const BINARY_SIZE_MIN: usize = 64;

/// Ratings are stored 0-100 internally but exposed 0-10 over the sticker
/// commands.
pub const RATING_FACTOR: u32 = 10;
pub const RATING_MAX: u32 = 100;

/// MPD error codes (ack.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    NotList = 1,
    Arg = 2,
    Password = 3,
    Permission = 4,
    Unknown = 5,

    NoExist = 50,
    PlaylistMax = 51,
    System = 52,
    PlaylistLoad = 53,
    UpdateAlready = 54,
    PlayerSync = 55,
    Exist = 56,
}

/// A failed command: the ACK code plus the message that goes after the
/// `{command}` part of the ACK line.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    pub ack: Ack,
    pub message: String,
}

impl CommandError {
    pub fn new(ack: Ack, message: impl Into<String>) -> Self {
        Self {
            ack,
            message: message.into(),
        }
    }

    pub fn arg(message: impl Into<String>) -> Self {
        Self::new(Ack::Arg, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Ack::Unknown, message)
    }

    pub fn no_exist(message: impl Into<String>) -> Self {
        Self::new(Ack::NoExist, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(Ack::Permission, message)
    }

    pub fn not_an_integer(arg: &str) -> Self {
        Self::arg(format!("Argument doesn't convert to integer: '{arg}'"))
    }
}

/// Parses an integer argument, mapping failure to the stock ACK_ERROR_ARG
/// message.
pub fn parse_int<T: std::str::FromStr>(arg: &str) -> Result<T, CommandError> {
    arg.parse().map_err(|_| CommandError::not_an_integer(arg))
}

/// Set of idle event classes. Each flag maps one-to-one to an MPD `changed:`
/// subsystem name; see [`Events::subsystems`] for the canonical order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Events(u16);

impl Events {
    pub const NONE: Events = Events(0);
    pub const DATABASE: Events = Events(1 << 0);
    pub const UPDATE: Events = Events(1 << 1);
    pub const QUEUE: Events = Events(1 << 2);
    pub const PLAYER: Events = Events(1 << 3);
    pub const VOLUME: Events = Events(1 << 4);
    pub const SPEAKER: Events = Events(1 << 5);
    pub const OPTIONS: Events = Events(1 << 6);
    pub const STORED_PLAYLIST: Events = Events(1 << 7);
    pub const RATING: Events = Events(1 << 8);
    pub const ALL: Events = Events(0x1ff);

    /// Flag/name pairs in the order drains emit `changed:` lines.
    const SUBSYSTEMS: [(Events, &'static str); 9] = [
        (Events::DATABASE, "database"),
        (Events::UPDATE, "update"),
        (Events::QUEUE, "playlist"),
        (Events::PLAYER, "player"),
        (Events::VOLUME, "mixer"),
        (Events::SPEAKER, "output"),
        (Events::OPTIONS, "options"),
        (Events::STORED_PLAYLIST, "stored_playlist"),
        (Events::RATING, "sticker"),
    ];

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersects(self, other: Events) -> bool {
        self.0 & other.0 != 0
    }

    /// Subsystem names of all set flags, in canonical order.
    pub fn subsystems(self) -> impl Iterator<Item = &'static str> {
        Self::SUBSYSTEMS
            .into_iter()
            .filter(move |(flag, _)| self.intersects(*flag))
            .map(|(_, name)| name)
    }

    /// The flag for an `idle` argument, or `None` for subsystems we never
    /// raise.
    pub fn from_subsystem(name: &str) -> Option<Events> {
        Self::SUBSYSTEMS
            .into_iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| flag)
    }
}

impl std::ops::BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

/// Queue position argument. Since MPD 0.23 a leading `+` or `-` makes the
/// number relative to the currently playing song; `+0` means right after it,
/// `-0` right before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Absolute(i64),
    After(i64),
    Before(i64),
}

impl Position {
    pub fn parse(arg: &str) -> Result<Self, CommandError> {
        if let Some(rest) = arg.strip_prefix('+') {
            Ok(Position::After(parse_int(rest)?))
        } else if let Some(rest) = arg.strip_prefix('-') {
            Ok(Position::Before(parse_int(rest)?))
        } else {
            Ok(Position::Absolute(parse_int(arg)?))
        }
    }

    /// Resolves against the current song's queue position (0 when stopped or
    /// the queue is empty).
    pub fn resolve(self, current_pos: u32) -> i64 {
        let current = i64::from(current_pos);
        match self {
            Position::Absolute(pos) => pos,
            Position::After(offset) => current + offset + 1,
            Position::Before(offset) => current - offset,
        }
    }
}

/// Parses a `START:END` range (END exclusive). A bare integer N is the
/// single-item range N:N+1.
pub fn parse_range(arg: &str) -> Result<(i64, i64), CommandError> {
    let bad = || CommandError::arg(format!("Argument doesn't convert to integer or range: '{arg}'"));
    match arg.split_once(':') {
        Some((start, end)) => {
            let start = start.parse().map_err(|_| bad())?;
            let end = end.parse().map_err(|_| bad())?;
            Ok((start, end))
        }
        None => {
            let start: i64 = arg.parse().map_err(|_| bad())?;
            Ok((start, start + 1))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlaybackState {
    Play,
    Pause,
    #[default]
    Stop,
}

/// Repeat is one mode, not two independent flags: `status` reports
/// `repeat: 1` for anything but `Off` and `single: 1` exactly for `Song`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    Song,
}

/// `status` response. Field order is emission order; `None` fields are
/// omitted entirely, which is how the stopped player drops the
/// time/elapsed/bitrate block.
#[derive(Debug, Serialize)]
pub struct Status {
    pub volume: i64,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    /// Queue version number.
    pub playlist: u32,
    pub playlistlength: u32,
    #[serde(serialize_with = "response_format::decibels")]
    pub mixrampdb: f32,
    pub state: PlaybackState,
    pub song: Option<u32>,
    pub songid: Option<u32>,
    #[serde(serialize_with = "response_format::option_seconds_pair")]
    pub time: Option<(u64, u64)>,
    #[serde(serialize_with = "response_format::option_duration_millis_precise")]
    pub elapsed: Option<Duration>,
    pub bitrate: Option<u32>,
    pub audio: Option<String>,
    pub updating_db: Option<u32>,
    pub nextsong: Option<u32>,
    pub nextsongid: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub artists: u32,
    pub albums: u32,
    pub songs: u32,
    #[serde(serialize_with = "response_format::duration_seconds")]
    pub uptime: Duration,
    #[serde(serialize_with = "response_format::duration_seconds")]
    pub db_playtime: Duration,
    #[serde(serialize_with = "response_format::unix_time")]
    pub db_update: jiff::Timestamp,
    #[serde(serialize_with = "response_format::duration_seconds")]
    pub playtime: Duration,
}

/// One queue item, as emitted by `playlistinfo`, `plchanges`, `currentsong`
/// and friends.
#[derive(Debug, Serialize)]
pub struct QueueEntry {
    pub file: String,
    #[serde(rename = "Last-Modified")]
    pub last_modified: jiff::Timestamp,
    /// Length in whole seconds.
    #[serde(rename = "Time")]
    pub time: u64,
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "AlbumArtist")]
    pub album_artist: String,
    #[serde(rename = "ArtistSort")]
    pub artist_sort: String,
    #[serde(rename = "AlbumArtistSort")]
    pub album_artist_sort: String,
    #[serde(rename = "Album")]
    pub album: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Track")]
    pub track: u32,
    #[serde(rename = "Date")]
    pub date: u32,
    #[serde(rename = "Genre")]
    pub genre: String,
    #[serde(rename = "Disc")]
    pub disc: u32,
    #[serde(rename = "Pos")]
    pub pos: u32,
    #[serde(rename = "Id")]
    pub id: u32,
}

impl From<&QueueRow> for QueueEntry {
    fn from(row: &QueueRow) -> Self {
        QueueEntry {
            file: strip_slash(&row.virtual_path),
            last_modified: jiff::Timestamp::from_second(row.time_modified)
                .unwrap_or(jiff::Timestamp::UNIX_EPOCH),
            time: row.song_length / 1000,
            artist: row.artist.clone(),
            album_artist: row.album_artist.clone(),
            artist_sort: row.artist_sort.clone(),
            album_artist_sort: row.album_artist_sort.clone(),
            album: row.album.clone(),
            title: row.title.clone(),
            track: row.track,
            date: row.year,
            genre: row.genre.clone(),
            disc: row.disc,
            pos: row.pos,
            id: row.id,
        }
    }
}

/// One library item, as emitted by `find`, `search`, `listplaylistinfo` and
/// the browse commands.
#[derive(Debug, Serialize)]
pub struct MediaItem {
    pub file: String,
    #[serde(rename = "Last-Modified")]
    pub last_modified: jiff::Timestamp,
    #[serde(rename = "Time")]
    pub time: u64,
    #[serde(serialize_with = "response_format::duration_millis_precise")]
    pub duration: Duration,
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "AlbumArtist")]
    pub album_artist: String,
    #[serde(rename = "ArtistSort")]
    pub artist_sort: String,
    #[serde(rename = "AlbumArtistSort")]
    pub album_artist_sort: String,
    #[serde(rename = "Album")]
    pub album: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Track")]
    pub track: u32,
    #[serde(rename = "Date")]
    pub date: u32,
    #[serde(rename = "Genre")]
    pub genre: String,
    #[serde(rename = "Disc")]
    pub disc: u32,
}

impl From<&MediaRow> for MediaItem {
    fn from(row: &MediaRow) -> Self {
        MediaItem {
            file: strip_slash(&row.virtual_path),
            last_modified: jiff::Timestamp::from_second(row.time_modified)
                .unwrap_or(jiff::Timestamp::UNIX_EPOCH),
            time: row.song_length / 1000,
            duration: Duration::from_millis(row.song_length),
            artist: row.artist.clone(),
            album_artist: row.album_artist.clone(),
            artist_sort: row.artist_sort.clone(),
            album_artist_sort: row.album_artist_sort.clone(),
            album: row.album.clone(),
            title: row.title.clone(),
            track: row.track,
            date: row.year,
            genre: row.genre.clone(),
            disc: row.disc,
        }
    }
}

/// Entry of the `listplaylists` response. `added` is unknown for playlist
/// files, which MPD 0.24 spells as -1.
#[derive(Debug, Serialize)]
pub struct PlaylistHead {
    pub playlist: String,
    #[serde(rename = "Last-Modified")]
    pub last_modified: jiff::Timestamp,
    pub added: i32,
}

/// Entry of the `outputs` response.
#[derive(Debug, Serialize)]
pub struct OutputEntry {
    pub outputid: u32,
    pub outputname: String,
    pub plugin: String,
    pub outputenabled: bool,
}

/// Virtual paths are stored with a leading `/`; the wire never shows it.
pub fn strip_slash(virtual_path: &str) -> String {
    virtual_path
        .strip_prefix('/')
        .unwrap_or(virtual_path)
        .to_owned()
}

/// The inverse: arguments from the wire get their leading `/` back.
pub fn prepend_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}
