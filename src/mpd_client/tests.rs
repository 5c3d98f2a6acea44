use camino::Utf8PathBuf;
use pretty_assertions::assert_eq;

use crate::config::Config;
use crate::mpd_client::{ClientCtx, process_unit};
use crate::mpd_protocol::Events;
use crate::system::System;
use crate::system::tests::{insert_file, test_system};

fn run(system: &mut System, client: &mut ClientCtx, config: &Config, input: &str) -> String {
    let lines: Vec<String> = input.lines().map(str::to_owned).collect();
    let outcome = process_unit(&lines, client, system, config);
    String::from_utf8_lossy(&outcome.out).into_owned()
}

fn fixture() -> (System, ClientCtx, Config) {
    (test_system(), ClientCtx::new(true), Config::default())
}

#[test]
fn status_while_stopped_with_empty_queue() {
    let (mut system, mut client, config) = fixture();
    assert_eq!(
        run(&mut system, &mut client, &config, "status"),
        "volume: 50
repeat: 0
random: 0
single: 0
consume: 0
playlist: 0
playlistlength: 0
mixrampdb: 0.000000
state: stop
OK
"
    );
}

#[test]
fn every_successful_command_gets_exactly_one_ok() {
    let (mut system, mut client, config) = fixture();
    for input in ["ping", "currentsong", "commands", "tagtypes"] {
        let out = run(&mut system, &mut client, &config, input);
        assert!(out.ends_with("OK\n"), "{input}: {out}");
        assert_eq!(out.matches("OK\n").count(), 1, "{input}: {out}");
    }
}

#[test]
fn unknown_command_is_acked() {
    let (mut system, mut client, config) = fixture();
    assert_eq!(
        run(&mut system, &mut client, &config, "frobnicate"),
        "ACK [5@0] {frobnicate} Unsupported command 'frobnicate'\n"
    );
}

#[test]
fn missing_arguments_are_acked() {
    let (mut system, mut client, config) = fixture();
    let out = run(&mut system, &mut client, &config, "consume");
    assert!(out.starts_with("ACK [2@0] {consume}"), "{out}");
}

#[test]
fn tokenizer_errors_are_acked() {
    let (mut system, mut client, config) = fixture();
    assert_eq!(
        run(&mut system, &mut client, &config, "add \"unterminated"),
        "ACK [2@0] {unknown} Error parsing arguments\n"
    );
}

#[test]
fn command_list_ok_separates_every_command() {
    let (mut system, mut client, config) = fixture();
    let out = run(
        &mut system,
        &mut client,
        &config,
        "command_list_ok_begin\nstatus\ncurrentsong\ncommand_list_end",
    );
    // status body, list_OK, empty currentsong, list_OK, terminating OK
    assert_eq!(out.matches("list_OK\n").count(), 2);
    assert!(out.starts_with("volume:"));
    assert!(out.ends_with("list_OK\nlist_OK\nOK\n"), "{out}");
}

#[test]
fn command_list_without_ok_mode_has_single_terminator() {
    let (mut system, mut client, config) = fixture();
    let out = run(
        &mut system,
        &mut client,
        &config,
        "command_list_begin\nping\nping\ncommand_list_end",
    );
    assert_eq!(out, "OK\n");
}

#[test]
fn failing_list_member_aborts_with_its_index() {
    let (mut system, mut client, config) = fixture();
    let out = run(
        &mut system,
        &mut client,
        &config,
        "command_list_ok_begin\nping\nfrobnicate\nping\ncommand_list_end",
    );
    assert_eq!(
        out,
        "list_OK\nACK [5@1] {frobnicate} Unsupported command 'frobnicate'\n"
    );
}

#[test]
fn unauthenticated_clients_may_only_send_password() {
    let mut system = test_system();
    let mut config = Config::default();
    config.library.password = Some("secret".to_string());
    let mut client = ClientCtx::new(false);

    let out = run(&mut system, &mut client, &config, "status");
    assert!(out.starts_with("ACK [4@0] {status} Not authenticated"), "{out}");

    let out = run(&mut system, &mut client, &config, "password wrong");
    assert!(out.starts_with("ACK [3@0] {password}"), "{out}");
    assert!(!client.authenticated);

    let out = run(&mut system, &mut client, &config, "password secret");
    assert_eq!(out, "OK\n");
    assert!(client.authenticated);

    let out = run(&mut system, &mut client, &config, "ping");
    assert_eq!(out, "OK\n");
}

#[test]
fn binarylimit_rejects_small_values() {
    let (mut system, mut client, config) = fixture();
    let out = run(&mut system, &mut client, &config, "binarylimit 63");
    assert!(out.starts_with("ACK [2@0] {binarylimit} Value too small"), "{out}");

    assert_eq!(run(&mut system, &mut client, &config, "binarylimit 64"), "OK\n");
    assert_eq!(client.binary_limit, 64);
}

#[test]
fn find_with_expression_filter() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/bach.flac", "Bach", "Cantatas", "BWV 1");
    insert_file(&mut system, "/file:/m/abba.mp3", "Abba", "Arrival", "SOS");

    let out = run(
        &mut system,
        &mut client,
        &config,
        r#"find "((Artist == \"Bach\") AND (Date >= 1700))""#,
    );
    assert_eq!(out.matches("file: ").count(), 1);
    assert!(out.contains("file: file:/m/bach.flac"), "{out}");
    assert!(out.contains("Album: Cantatas"), "{out}");
    assert!(out.ends_with("OK\n"));
}

#[test]
fn legacy_search_matches_substrings() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/bach.flac", "Bach", "Cantatas", "BWV 1");
    insert_file(&mut system, "/file:/m/abba.mp3", "Abba", "Arrival", "SOS");

    let out = run(&mut system, &mut client, &config, "search artist ach");
    assert_eq!(out.matches("file: ").count(), 1);
    assert!(out.contains("file: file:/m/bach.flac"), "{out}");
}

#[test]
fn list_album_groups_by_album_artist() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/a1.mp3", "Abba", "Arrival", "One");
    insert_file(&mut system, "/file:/m/a2.mp3", "Abba", "Arrival", "Two");
    insert_file(&mut system, "/file:/m/r1.mp3", "Beatles", "Revolver", "Three");

    let out = run(
        &mut system,
        &mut client,
        &config,
        "list Album group AlbumArtist",
    );
    assert_eq!(
        out,
        "Album: Arrival\nAlbumArtist: Abba\nAlbum: Revolver\nAlbumArtist: Beatles\nOK\n"
    );
}

#[test]
fn add_and_playlistinfo_round_trip() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/a.mp3", "Abba", "Arrival", "One");

    assert_eq!(run(&mut system, &mut client, &config, "add file:/m/a.mp3"), "OK\n");
    let out = run(&mut system, &mut client, &config, "playlistinfo");
    assert!(out.contains("file: file:/m/a.mp3"), "{out}");
    assert!(out.contains("Pos: 0"), "{out}");
}

#[test]
fn unknown_paths_become_ad_hoc_queue_items() {
    let (mut system, mut client, config) = fixture();
    let out = run(
        &mut system,
        &mut client,
        &config,
        "addid http://radio.example/stream",
    );
    assert!(out.starts_with("Id: "), "{out}");
    assert_eq!(system.queue_count(), 1);
}

#[test]
fn clear_then_plchanges_reports_empty_queue() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/a.mp3", "Abba", "Arrival", "One");
    run(&mut system, &mut client, &config, "add file:/m/a.mp3");
    assert!(run(&mut system, &mut client, &config, "plchanges 0").contains("file: "));

    assert_eq!(run(&mut system, &mut client, &config, "clear"), "OK\n");
    assert_eq!(run(&mut system, &mut client, &config, "plchanges 0"), "OK\n");
}

#[test]
fn plchangesposid_reports_positions_and_ids() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/a.mp3", "Abba", "Arrival", "One");
    run(&mut system, &mut client, &config, "add file:/m/a.mp3");
    let out = run(&mut system, &mut client, &config, "plchangesposid 0");
    assert!(out.starts_with("cpos: 0\nId: "), "{out}");
}

#[test]
fn save_and_load_restore_queue_order() {
    let dir = tempfile::tempdir().unwrap();
    let (mut system, mut client, mut config) = fixture();
    system.playlist_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    config.library.allow_modifying_stored_playlists = true;

    insert_file(&mut system, "/file:/m/b.mp3", "Zed", "Two", "B");
    insert_file(&mut system, "/file:/m/a.mp3", "Abba", "One", "A");
    run(&mut system, &mut client, &config, "add file:/m/b.mp3");
    run(&mut system, &mut client, &config, "add file:/m/a.mp3");

    assert_eq!(run(&mut system, &mut client, &config, "save mix"), "OK\n");
    assert_eq!(run(&mut system, &mut client, &config, "clear"), "OK\n");
    assert_eq!(run(&mut system, &mut client, &config, "load mix"), "OK\n");

    let out = run(&mut system, &mut client, &config, "playlistinfo");
    let first = out.find("file: file:/m/b.mp3").unwrap();
    let second = out.find("file: file:/m/a.mp3").unwrap();
    assert!(first < second, "{out}");

    // creating over an existing playlist is refused
    let out = run(&mut system, &mut client, &config, "save mix");
    assert!(out.starts_with("ACK [2@0] {save}"), "{out}");
}

#[test]
fn stored_playlist_mutations_are_gated() {
    let (mut system, mut client, config) = fixture();
    let out = run(&mut system, &mut client, &config, "save mix");
    assert!(out.starts_with("ACK [4@0] {save}"), "{out}");
    let out = run(&mut system, &mut client, &config, "rm mix");
    assert!(out.starts_with("ACK [4@0] {rm}"), "{out}");
}

#[test]
fn update_rejects_scoped_rescans() {
    let (mut system, mut client, config) = fixture();
    let out = run(&mut system, &mut client, &config, "update some/dir");
    assert!(out.starts_with("ACK [2@0] {update}"), "{out}");

    let out = run(&mut system, &mut client, &config, "update");
    assert_eq!(out, "updating_db: 1\nOK\n");
    assert!(system.scanning);
}

#[test]
fn idle_with_pending_subscribed_event_fires_immediately() {
    let (mut system, mut client, config) = fixture();
    client.pending_events = Events::VOLUME;
    let lines = vec!["idle player mixer".to_string()];
    let outcome = process_unit(&lines, &mut client, &mut system, &config);
    assert_eq!(
        String::from_utf8_lossy(&outcome.out),
        "changed: mixer\nOK\n"
    );
    assert!(!outcome.parked);
    assert!(client.pending_events.is_empty());
}

#[test]
fn idle_without_matching_events_parks_silently() {
    let (mut system, mut client, config) = fixture();
    client.pending_events = Events::DATABASE;
    let lines = vec!["idle player mixer".to_string()];
    let outcome = process_unit(&lines, &mut client, &mut system, &config);
    assert!(outcome.out.is_empty());
    assert!(outcome.parked);
    // the unrelated event stays pending for the next drain
    assert_eq!(client.pending_events, Events::DATABASE);
}

#[test]
fn coalesced_events_drain_once_in_canonical_order() {
    let (mut system, mut client, config) = fixture();
    client.pending_events = Events::RATING | Events::DATABASE | Events::QUEUE;
    let lines = vec!["idle".to_string()];
    let outcome = process_unit(&lines, &mut client, &mut system, &config);
    assert_eq!(
        String::from_utf8_lossy(&outcome.out),
        "changed: database\nchanged: playlist\nchanged: sticker\nOK\n"
    );
}

#[test]
fn noidle_without_pending_events_is_a_bare_ok() {
    let (mut system, mut client, config) = fixture();
    assert_eq!(run(&mut system, &mut client, &config, "noidle"), "OK\n");

    client.pending_events = Events::PLAYER;
    assert_eq!(
        run(&mut system, &mut client, &config, "noidle"),
        "changed: player\nOK\n"
    );
}

#[test]
fn close_terminates_without_terminator() {
    let (mut system, mut client, config) = fixture();
    let lines = vec!["close".to_string()];
    let outcome = process_unit(&lines, &mut client, &mut system, &config);
    assert!(outcome.close);
    assert!(outcome.out.is_empty());
}

#[test]
fn outputs_enumerate_speakers_and_the_httpd_plugin() {
    let (mut system, mut client, mut config) = fixture();
    config.mpd.enable_httpd_plugin = true;
    let out = run(&mut system, &mut client, &config, "outputs");
    assert_eq!(
        out,
        "outputid: 0
outputname: Computer
plugin: alsa_default
outputenabled: 1
outputid: 1
outputname: MP3 stream
plugin: httpd
outputenabled: 1
OK
"
    );

    assert_eq!(run(&mut system, &mut client, &config, "disableoutput 0"), "OK\n");
    assert!(!system.speakers[0].selected);
    assert_eq!(run(&mut system, &mut client, &config, "toggleoutput 0"), "OK\n");
    assert!(system.speakers[0].selected);
}

#[test]
fn sticker_round_trip_scales_by_ten() {
    let (mut system, mut client, config) = fixture();
    insert_file(&mut system, "/file:/m/a.mp3", "Abba", "Arrival", "One");

    assert_eq!(
        run(&mut system, &mut client, &config, "sticker set song file:/m/a.mp3 rating 6"),
        "OK\n"
    );
    assert_eq!(
        system.media_by_virtual_path("/file:/m/a.mp3").unwrap().rating,
        60
    );
    assert_eq!(
        run(&mut system, &mut client, &config, "sticker get song file:/m/a.mp3 rating"),
        "sticker: rating=6\nOK\n"
    );

    let out = run(&mut system, &mut client, &config, "sticker set song file:/m/a.mp3 rating 11");
    assert!(out.starts_with("ACK [2@0] {sticker}"), "{out}");

    let out = run(&mut system, &mut client, &config, "sticker get song file:/m/a.mp3 love");
    assert!(out.starts_with("ACK [50@0] {sticker} no such sticker"), "{out}");
}

fn binary_chunks(response: &[u8]) -> (usize, Vec<u8>) {
    let text = String::from_utf8_lossy(response);
    let size_line = text.lines().find(|l| l.starts_with("size: ")).unwrap();
    let size: usize = size_line["size: ".len()..].parse().unwrap();

    let marker = b"binary: ";
    let start = response
        .windows(marker.len())
        .position(|w| w == marker)
        .unwrap();
    let len_end = start + response[start..].iter().position(|&b| b == b'\n').unwrap();
    let chunk_len: usize = std::str::from_utf8(&response[start + marker.len()..len_end])
        .unwrap()
        .parse()
        .unwrap();
    let data_start = len_end + 1;
    (size, response[data_start..data_start + chunk_len].to_vec())
}

#[test]
fn albumart_chunks_respect_the_binary_limit() {
    let dir = tempfile::tempdir().unwrap();
    let album = dir.path().join("album");
    std::fs::create_dir_all(&album).unwrap();
    let blob: Vec<u8> = (0..150u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(album.join("cover.jpg"), &blob).unwrap();

    let (mut system, mut client, config) = fixture();
    let song = Utf8PathBuf::from_path_buf(album.join("song.mp3")).unwrap();
    insert_file(&mut system, &format!("/file:{song}"), "Abba", "Arrival", "One");

    run(&mut system, &mut client, &config, "binarylimit 64");

    let mut fetched = Vec::new();
    let mut offset = 0;
    loop {
        let lines = vec![format!("albumart \"file:{song}\" {offset}")];
        let outcome = process_unit(&lines, &mut client, &mut system, &config);
        let text = String::from_utf8_lossy(&outcome.out);
        assert!(text.starts_with("type: image/jpeg\n"), "{text}");

        let (size, chunk) = binary_chunks(&outcome.out);
        assert_eq!(size, blob.len());
        assert!(chunk.len() <= 64);
        offset += chunk.len();
        fetched.extend(chunk);
        if offset >= size {
            break;
        }
    }
    assert_eq!(fetched, blob);
}

#[test]
fn lsinfo_reports_missing_directories() {
    let (mut system, mut client, config) = fixture();
    let out = run(&mut system, &mut client, &config, "lsinfo nowhere");
    assert!(out.starts_with("ACK [50@0] {lsinfo}"), "{out}");
}

#[test]
fn decoders_advertise_ffmpeg_only() {
    let (mut system, mut client, config) = fixture();
    let out = run(&mut system, &mut client, &config, "decoders");
    assert!(out.starts_with("plugin: ffmpeg\n"));
    assert_eq!(out.matches("plugin: ").count(), 1);
    assert!(out.contains("suffix: flac\n"));
    assert!(out.contains("mime_type: audio/x-mpd-ffmpeg\n"));
}
