use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::mpd_protocol::response_format;
use crate::mpd_protocol::{PlaybackState, PlaylistHead, QueueEntry, Status};

fn stopped_status() -> Status {
    Status {
        volume: 50,
        repeat: false,
        random: false,
        single: false,
        consume: false,
        playlist: 2,
        playlistlength: 0,
        mixrampdb: 0.0,
        state: PlaybackState::Stop,
        song: None,
        songid: None,
        time: None,
        elapsed: None,
        bitrate: None,
        audio: None,
        updating_db: None,
        nextsong: None,
        nextsongid: None,
    }
}

#[test]
fn serialize_stopped_status() {
    assert_eq!(
        response_format::to_string(&stopped_status()).unwrap(),
        "volume: 50
repeat: 0
random: 0
single: 0
consume: 0
playlist: 2
playlistlength: 0
mixrampdb: 0.000000
state: stop
"
    );
}

#[test]
fn serialize_playing_status() {
    let status = Status {
        repeat: true,
        random: true,
        playlistlength: 34,
        state: PlaybackState::Play,
        song: Some(0),
        songid: Some(1),
        time: Some((28, 306)),
        elapsed: Some(Duration::from_millis(28_178)),
        bitrate: Some(128),
        audio: Some("44100:16:2".to_string()),
        nextsong: Some(1),
        nextsongid: Some(2),
        ..stopped_status()
    };
    assert_eq!(
        response_format::to_string(&status).unwrap(),
        "volume: 50
repeat: 1
random: 1
single: 0
consume: 0
playlist: 2
playlistlength: 34
mixrampdb: 0.000000
state: play
song: 0
songid: 1
time: 28:306
elapsed: 28.178
bitrate: 128
audio: 44100:16:2
nextsong: 1
nextsongid: 2
"
    );
}

#[test]
fn serialize_queue_entries() {
    let entries = vec![
        QueueEntry {
            file: "file:/srv/music/Lukas Graham/7 Years.mp3".to_string(),
            last_modified: "2025-06-15T22:08:17Z".parse().unwrap(),
            time: 237,
            artist: "Lukas Graham".to_string(),
            album_artist: "Various Artists".to_string(),
            artist_sort: "Graham, Lukas".to_string(),
            album_artist_sort: "Various Artists".to_string(),
            album: "do you ever think about dying".to_string(),
            title: "7 Years".to_string(),
            track: 15,
            date: 2023,
            genre: "Pop".to_string(),
            disc: 1,
            pos: 0,
            id: 294,
        },
        QueueEntry {
            file: "file:/srv/music/Taylor Swift/1989/01 Welcome To New York.mp3".to_string(),
            last_modified: "2025-06-15T22:06:26Z".parse().unwrap(),
            time: 212,
            artist: "Taylor Swift".to_string(),
            album_artist: "Taylor Swift".to_string(),
            artist_sort: "Swift, Taylor".to_string(),
            album_artist_sort: "Swift, Taylor".to_string(),
            album: "1989 (Deluxe)".to_string(),
            title: "Welcome To New York".to_string(),
            track: 19,
            date: 2014,
            genre: "Country & Folk".to_string(),
            disc: 1,
            pos: 1,
            id: 295,
        },
    ];
    assert_eq!(
        response_format::to_string(&entries).unwrap(),
        "file: file:/srv/music/Lukas Graham/7 Years.mp3
Last-Modified: 2025-06-15T22:08:17Z
Time: 237
Artist: Lukas Graham
AlbumArtist: Various Artists
ArtistSort: Graham, Lukas
AlbumArtistSort: Various Artists
Album: do you ever think about dying
Title: 7 Years
Track: 15
Date: 2023
Genre: Pop
Disc: 1
Pos: 0
Id: 294
file: file:/srv/music/Taylor Swift/1989/01 Welcome To New York.mp3
Last-Modified: 2025-06-15T22:06:26Z
Time: 212
Artist: Taylor Swift
AlbumArtist: Taylor Swift
ArtistSort: Swift, Taylor
AlbumArtistSort: Swift, Taylor
Album: 1989 (Deluxe)
Title: Welcome To New York
Track: 19
Date: 2014
Genre: Country & Folk
Disc: 1
Pos: 1
Id: 295
"
    );
}

#[test]
fn serialize_playlist_heads() {
    let heads = vec![PlaylistHead {
        playlist: "file:/srv/playlists/roadtrip".to_string(),
        last_modified: "2025-06-15T22:08:17Z".parse().unwrap(),
        added: -1,
    }];
    assert_eq!(
        response_format::to_string(&heads).unwrap(),
        "playlist: file:/srv/playlists/roadtrip
Last-Modified: 2025-06-15T22:08:17Z
added: -1
"
    );
}

#[test]
fn serialize_preformatted_lines() {
    let lines = vec!["command: status".to_string(), "command: stats".to_string()];
    assert_eq!(
        response_format::to_string(&lines).unwrap(),
        "command: status\ncommand: stats\n"
    );
}
