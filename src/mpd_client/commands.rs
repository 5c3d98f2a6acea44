//! The command table and its handlers. Each handler validates its
//! arguments, calls into the system and appends its response lines; the
//! connection engine owns the `OK`/`ACK` terminators.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::mpd_client::ClientCtx;
use crate::mpd_protocol::filter::{CommandParams, Params, QueryParams, sql_escape};
use crate::mpd_protocol::tags::{TagKind, TAGTYPES, find_tagtype};
use crate::mpd_protocol::{
    Ack, BINARY_SIZE_MIN, CommandError, MediaItem, OutputEntry, PlaybackState, Position,
    QueueEntry, RATING_FACTOR, RATING_MAX, RepeatMode, Stats, Status, parse_int, parse_range,
    prepend_slash, response_format, strip_slash,
};
use crate::system::System;

const SORT_NAME: &str = "f.title_sort, f.title";
const SORT_ARTIST: &str = "f.album_artist_sort, f.album_artist";
const SORT_VPATH: &str = "f.virtual_path";

/// Suffix and mime type catalogs of mpd's ffmpeg decoder plugin
/// (FfmpegDecoderPlugin.cxx). We decode everything through ffmpeg and some
/// clients (ncmpcpp) rely on a response for the decoders command, so this is
/// what they get.
const FFMPEG_SUFFIXES: &[&str] = &[
    "16sv", "3g2", "3gp", "4xm", "8svx", "aa3", "aac", "ac3", "afc", "aif", "aifc", "aiff", "al",
    "alaw", "amr", "anim", "apc", "ape", "asf", "atrac", "au", "aud", "avi", "avm2", "avs", "bap",
    "bfi", "c93", "cak", "cin", "cmv", "cpk", "daud", "dct", "divx", "dts", "dv", "dvd", "dxa",
    "eac3", "film", "flac", "flc", "fli", "fll", "flx", "flv", "g726", "gsm", "gxf", "iss", "m1v",
    "m2v", "m2t", "m2ts", "m4a", "m4b", "m4v", "mad", "mj2", "mjpeg", "mjpg", "mka", "mkv", "mlp",
    "mm", "mmf", "mov", "mp+", "mp1", "mp2", "mp3", "mp4", "mpc", "mpeg", "mpg", "mpga", "mpp",
    "mpu", "mve", "mvi", "mxf", "nc", "nsv", "nut", "nuv", "oga", "ogm", "ogv", "ogx", "oma",
    "ogg", "omg", "psp", "pva", "qcp", "qt", "r3d", "ra", "ram", "rl2", "rm", "rmvb", "roq",
    "rpl", "rvc", "shn", "smk", "snd", "sol", "son", "spx", "str", "swf", "tgi", "tgq", "tgv",
    "thp", "ts", "tsp", "tta", "xa", "xvid", "uv", "uv2", "vb", "vid", "vob", "voc", "vp6", "vmd",
    "wav", "webm", "wma", "wmv", "wsaud", "wsvga", "wv", "wve",
];
const FFMPEG_MIME_TYPES: &[&str] = &[
    "application/flv", "application/m4a", "application/mp4", "application/octet-stream",
    "application/ogg", "application/x-ms-wmz", "application/x-ms-wmd", "application/x-ogg",
    "application/x-shockwave-flash", "application/x-shorten", "audio/8svx", "audio/16sv",
    "audio/aac", "audio/ac3", "audio/aiff", "audio/amr", "audio/basic", "audio/flac", "audio/m4a",
    "audio/mp4", "audio/mpeg", "audio/musepack", "audio/ogg", "audio/qcelp", "audio/vorbis",
    "audio/vorbis+ogg", "audio/x-8svx", "audio/x-16sv", "audio/x-aac", "audio/x-ac3",
    "audio/x-aiff", "audio/x-alaw", "audio/x-au", "audio/x-dca", "audio/x-eac3", "audio/x-flac",
    "audio/x-gsm", "audio/x-mace", "audio/x-matroska", "audio/x-monkeys-audio", "audio/x-mpeg",
    "audio/x-ms-wma", "audio/x-ms-wax", "audio/x-musepack", "audio/x-ogg", "audio/x-vorbis",
    "audio/x-vorbis+ogg", "audio/x-pn-realaudio", "audio/x-pn-multirate-realaudio",
    "audio/x-speex", "audio/x-tta", "audio/x-voc", "audio/x-wav", "audio/x-wma", "audio/x-wv",
    "video/anim", "video/quicktime", "video/msvideo", "video/ogg", "video/theora", "video/webm",
    "video/x-dv", "video/x-flv", "video/x-matroska", "video/x-mjpeg", "video/x-mpeg",
    "video/x-ms-asf", "video/x-msvideo", "video/x-ms-wmv", "video/x-ms-wvx", "video/x-ms-wm",
    "video/x-ms-wmx", "video/x-nut", "video/x-pva", "video/x-theora", "video/x-vid",
    "video/x-wmv", "video/x-xvid",
    // all streams decoded by the ffmpeg input plugin
    "audio/x-mpd-ffmpeg",
];

pub struct HandlerCtx<'a> {
    pub out: &'a mut Vec<u8>,
    pub client: &'a mut ClientCtx,
    pub system: &'a mut System,
    pub config: &'a Config,
}

impl HandlerCtx<'_> {
    fn push<T: Serialize>(&mut self, value: &T) -> Result<(), CommandError> {
        let text = response_format::to_string(value)
            .map_err(|e| CommandError::unknown(e.to_string()))?;
        self.out.extend_from_slice(text.as_bytes());
        Ok(())
    }
}

type Handler = fn(&mut HandlerCtx, &[String]) -> Result<(), CommandError>;

pub struct Command {
    pub name: &'static str,
    pub handler: Handler,
    /// Minimum argc including the command name; 0 means no minimum.
    pub min_argc: usize,
}

pub static COMMANDS: &[Command] = &[
    // Commands for querying status
    Command { name: "clearerror",         handler: cmd_ignore,            min_argc: 0 },
    Command { name: "currentsong",        handler: cmd_currentsong,       min_argc: 0 },
    Command { name: "idle",               handler: cmd_ignore,            min_argc: 0 }, // engine
    Command { name: "noidle",             handler: cmd_ignore,            min_argc: 0 }, // engine
    Command { name: "status",             handler: cmd_status,            min_argc: 0 },
    Command { name: "stats",              handler: cmd_stats,             min_argc: 0 },
    // Playback options
    Command { name: "consume",            handler: cmd_consume,           min_argc: 2 },
    Command { name: "crossfade",          handler: cmd_ignore,            min_argc: 0 },
    Command { name: "mixrampdb",          handler: cmd_ignore,            min_argc: 0 },
    Command { name: "mixrampdelay",       handler: cmd_ignore,            min_argc: 0 },
    Command { name: "random",             handler: cmd_random,            min_argc: 2 },
    Command { name: "repeat",             handler: cmd_repeat,            min_argc: 2 },
    Command { name: "setvol",             handler: cmd_setvol,            min_argc: 2 },
    Command { name: "single",             handler: cmd_single,            min_argc: 2 },
    Command { name: "replay_gain_mode",   handler: cmd_ignore,            min_argc: 0 },
    Command { name: "replay_gain_status", handler: cmd_replay_gain_status, min_argc: 0 },
    Command { name: "volume",             handler: cmd_volume,            min_argc: 2 },
    // Controlling playback
    Command { name: "next",               handler: cmd_next,              min_argc: 0 },
    Command { name: "pause",              handler: cmd_pause,             min_argc: 0 },
    Command { name: "play",               handler: cmd_play,              min_argc: 0 },
    Command { name: "playid",             handler: cmd_playid,            min_argc: 0 },
    Command { name: "previous",           handler: cmd_previous,          min_argc: 0 },
    Command { name: "seek",               handler: cmd_seek,              min_argc: 3 },
    Command { name: "seekid",             handler: cmd_seekid,            min_argc: 3 },
    Command { name: "seekcur",            handler: cmd_seekcur,           min_argc: 2 },
    Command { name: "stop",               handler: cmd_stop,              min_argc: 0 },
    // The current playlist
    Command { name: "add",                handler: cmd_add,               min_argc: 2 },
    Command { name: "addid",              handler: cmd_addid,             min_argc: 2 },
    Command { name: "clear",              handler: cmd_clear,             min_argc: 0 },
    Command { name: "delete",             handler: cmd_delete,            min_argc: 0 },
    Command { name: "deleteid",           handler: cmd_deleteid,          min_argc: 2 },
    Command { name: "move",               handler: cmd_move,              min_argc: 3 },
    Command { name: "moveid",             handler: cmd_moveid,            min_argc: 3 },
    // the use of "playlist" is deprecated in the protocol
    Command { name: "playlist",           handler: cmd_playlistinfo,      min_argc: 0 },
    Command { name: "playlistfind",       handler: cmd_playlistfind,      min_argc: 0 },
    Command { name: "playlistid",         handler: cmd_playlistid,        min_argc: 0 },
    Command { name: "playlistinfo",       handler: cmd_playlistinfo,      min_argc: 0 },
    Command { name: "playlistsearch",     handler: cmd_playlistsearch,    min_argc: 0 },
    Command { name: "plchanges",          handler: cmd_plchanges,         min_argc: 2 },
    Command { name: "plchangesposid",     handler: cmd_plchangesposid,    min_argc: 2 },
    // Stored playlists
    Command { name: "listplaylist",       handler: cmd_listplaylist,      min_argc: 2 },
    Command { name: "listplaylistinfo",   handler: cmd_listplaylistinfo,  min_argc: 2 },
    Command { name: "listplaylists",      handler: cmd_listplaylists,     min_argc: 0 },
    Command { name: "load",               handler: cmd_load,              min_argc: 2 },
    Command { name: "playlistadd",        handler: cmd_playlistadd,       min_argc: 3 },
    Command { name: "rm",                 handler: cmd_rm,                min_argc: 2 },
    Command { name: "save",               handler: cmd_save,              min_argc: 2 },
    // The music database
    Command { name: "albumart",           handler: cmd_albumart,          min_argc: 2 },
    Command { name: "count",              handler: cmd_count,             min_argc: 2 },
    Command { name: "find",               handler: cmd_find,              min_argc: 2 },
    Command { name: "findadd",            handler: cmd_findadd,           min_argc: 2 },
    Command { name: "list",               handler: cmd_list,              min_argc: 2 },
    Command { name: "listall",            handler: cmd_listall,           min_argc: 0 },
    Command { name: "listallinfo",        handler: cmd_listallinfo,       min_argc: 0 },
    Command { name: "listfiles",          handler: cmd_lsinfo,            min_argc: 0 },
    Command { name: "lsinfo",             handler: cmd_lsinfo,            min_argc: 0 },
    Command { name: "readpicture",        handler: cmd_albumart,          min_argc: 2 },
    Command { name: "search",             handler: cmd_search,            min_argc: 2 },
    Command { name: "searchadd",          handler: cmd_searchadd,         min_argc: 2 },
    Command { name: "update",             handler: cmd_update,            min_argc: 0 },
    // Stickers
    Command { name: "sticker",            handler: cmd_sticker,           min_argc: 4 },
    // Connection settings
    Command { name: "close",              handler: cmd_ignore,            min_argc: 0 }, // engine
    Command { name: "password",           handler: cmd_password,          min_argc: 0 },
    Command { name: "ping",               handler: cmd_ignore,            min_argc: 0 },
    Command { name: "binarylimit",        handler: cmd_binarylimit,       min_argc: 2 },
    // Audio output devices
    Command { name: "disableoutput",      handler: cmd_disableoutput,     min_argc: 2 },
    Command { name: "enableoutput",       handler: cmd_enableoutput,      min_argc: 2 },
    Command { name: "toggleoutput",       handler: cmd_toggleoutput,      min_argc: 2 },
    Command { name: "outputs",            handler: cmd_outputs,           min_argc: 0 },
    // Reflection
    Command { name: "commands",           handler: cmd_commands,          min_argc: 0 },
    Command { name: "notcommands",        handler: cmd_ignore,            min_argc: 0 },
    Command { name: "tagtypes",           handler: cmd_tagtypes,          min_argc: 0 },
    Command { name: "urlhandlers",        handler: cmd_urlhandlers,       min_argc: 0 },
    Command { name: "decoders",           handler: cmd_decoders,          min_argc: 0 },
    // Client to client
    Command { name: "subscribe",          handler: cmd_ignore,            min_argc: 0 },
    Command { name: "unsubscribe",        handler: cmd_ignore,            min_argc: 0 },
    Command { name: "channels",           handler: cmd_channels,          min_argc: 0 },
    Command { name: "readmessages",       handler: cmd_ignore,            min_argc: 0 },
    Command { name: "sendmessage",        handler: cmd_sendmessage,       min_argc: 3 },
    // Not in upstream MPD
    Command { name: "outputvolume",       handler: cmd_outputvolume,      min_argc: 3 },
];

/// Exact, case-sensitive lookup; linear search over the table.
pub fn find_command(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Accepted-but-unsupported commands end up here.
fn cmd_ignore(_ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    debug!("ignoring command {}", args[0]);
    Ok(())
}

// ---- querying status -----------------------------------------------------

fn cmd_currentsong(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    match ctx.system.playing_item() {
        Some(row) => ctx.push(&QueueEntry::from(&row)),
        None => Ok(()),
    }
}

fn cmd_status(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    let player = &ctx.system.player;
    let stopped = player.state == PlaybackState::Stop;
    let item = ctx.system.playing_item();

    let (time, elapsed, bitrate, audio) = if stopped {
        (None, None, None, None)
    } else {
        let length = item.as_ref().map(|i| i.song_length / 1000).unwrap_or(0);
        (
            Some((ctx.system.player.elapsed().as_secs(), length)),
            Some(ctx.system.player.elapsed()),
            Some(128),
            Some("44100:16:2".to_string()),
        )
    };

    let next = item
        .as_ref()
        .and_then(|i| ctx.system.queue_fetch_next(i.id));

    let status = Status {
        volume: ctx.system.player.volume,
        repeat: ctx.system.player.repeat != RepeatMode::Off,
        random: ctx.system.player.shuffle,
        single: ctx.system.player.repeat == RepeatMode::Song,
        consume: ctx.system.player.consume,
        playlist: ctx.system.queue_version(),
        playlistlength: ctx.system.queue_count(),
        mixrampdb: 0.0,
        state: ctx.system.player.state,
        song: item.as_ref().map(|i| i.pos),
        songid: item.as_ref().map(|i| i.id),
        time,
        elapsed,
        bitrate,
        audio,
        updating_db: ctx.system.scanning.then_some(1),
        nextsong: next.as_ref().map(|i| i.pos),
        nextsongid: next.as_ref().map(|i| i.id),
    };
    ctx.push(&status)
}

fn cmd_stats(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    let (artists, albums, songs, length_ms) = ctx
        .system
        .stats_counts()
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    let db_update = ctx.system.admin_get("db_update").unwrap_or(0);
    let stats = Stats {
        artists,
        albums,
        songs,
        uptime: ctx.system.uptime(),
        db_playtime: Duration::from_millis(length_ms),
        db_update: jiff::Timestamp::from_second(db_update).unwrap_or(jiff::Timestamp::UNIX_EPOCH),
        playtime: Duration::ZERO,
    };
    ctx.push(&stats)
}

// ---- playback options ----------------------------------------------------

fn cmd_consume(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let enable: i32 = parse_int(&args[1])?;
    ctx.system.consume_set(enable != 0);
    Ok(())
}

fn cmd_random(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let enable: i32 = parse_int(&args[1])?;
    ctx.system.shuffle_set(enable != 0);
    Ok(())
}

fn cmd_repeat(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let enable: i32 = parse_int(&args[1])?;
    ctx.system.repeat_set(if enable == 0 {
        RepeatMode::Off
    } else {
        RepeatMode::All
    });
    Ok(())
}

fn cmd_setvol(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let volume: i64 = parse_int(&args[1])?;
    ctx.system.volume_set(volume);
    Ok(())
}

/// Single only exists in combination with repeat:
///   1 turns the mode into repeat-song, 0 falls back to repeat-all (or off
///   when repeat was off). "oneshot" is accepted but ignored.
fn cmd_single(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let enable: i32 = match args[1].parse() {
        Ok(v) => v,
        Err(_) if args[1] == "oneshot" => return Ok(()),
        Err(_) => return Err(CommandError::not_an_integer(&args[1])),
    };
    let repeat = ctx.system.player.repeat;
    ctx.system.repeat_set(match (enable, repeat) {
        (0, RepeatMode::Off) => RepeatMode::Off,
        (0, _) => RepeatMode::All,
        _ => RepeatMode::Song,
    });
    Ok(())
}

fn cmd_replay_gain_status(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.out.extend_from_slice(b"replay_gain_mode: off\n");
    Ok(())
}

/// Relative volume change; deprecated in the protocol but still sent.
fn cmd_volume(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let delta: i64 = parse_int(&args[1])?;
    let volume = ctx.system.player.volume + delta;
    ctx.system.volume_set(volume);
    Ok(())
}

// ---- controlling playback ------------------------------------------------

fn cmd_next(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.system.playback_step(true)?;
    ctx.system.playback_start()
}

fn cmd_previous(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.system.playback_step(false)?;
    ctx.system.playback_start()
}

fn cmd_pause(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let pause: i32 = match args.get(1) {
        Some(arg) => match arg.parse() {
            Ok(v @ (0 | 1)) => v,
            _ => {
                return Err(CommandError::arg(format!(
                    "Argument doesn't convert to integer or has unsupported value: '{arg}'"
                )));
            }
        },
        None => -1,
    };

    // ignore pause when stopped or when the requested state already holds
    match ctx.system.player.state {
        PlaybackState::Pause if pause <= 0 => ctx.system.playback_start()?,
        PlaybackState::Play if pause != 0 => ctx.system.playback_pause(),
        _ => {}
    }
    Ok(())
}

fn cmd_play(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let songpos: i32 = match args.get(1) {
        Some(arg) => parse_int(arg)?,
        None => -1,
    };

    if ctx.system.player.state == PlaybackState::Play {
        if songpos < 0 {
            debug!("ignoring play, player is already playing");
            return Ok(());
        }
        // restart at the requested position
        ctx.system.playback_stop();
    }

    if songpos > 0 {
        let item = ctx
            .system
            .queue_fetch_bypos(songpos as u32)
            .ok_or_else(|| CommandError::unknown("Failed to start playback"))?;
        ctx.system.playback_start_byitem(item.id);
        Ok(())
    } else {
        ctx.system.playback_start()
    }
}

fn cmd_playid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let id: u32 = match args.get(1) {
        Some(arg) => parse_int(arg)?,
        None => 0,
    };

    if ctx.system.player.state == PlaybackState::Play {
        ctx.system.playback_stop();
    }

    if id > 0 {
        if ctx.system.queue_fetch_byid(id).is_none() {
            return Err(CommandError::unknown("Failed to start playback"));
        }
        ctx.system.playback_start_byitem(id);
        Ok(())
    } else {
        ctx.system.playback_start()
    }
}

fn seconds_to_ms(arg: &str) -> Result<u64, CommandError> {
    let seconds: f64 = arg
        .parse()
        .map_err(|_| CommandError::not_an_integer(arg))?;
    Ok((seconds.max(0.0) * 1000.0) as u64)
}

fn cmd_seek(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let _songpos: u32 = parse_int(&args[1])?;
    // seeking songs other than the current one is not supported
    ctx.system.playback_seek(seconds_to_ms(&args[2])?);
    ctx.system.playback_start()
}

fn cmd_seekid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let id: u32 = parse_int(&args[1])?;
    if ctx.system.player.item_id != Some(id) {
        return Err(CommandError::unknown(
            "Given song is not the current playing one, seeking is not supported",
        ));
    }
    ctx.system.playback_seek(seconds_to_ms(&args[2])?);
    ctx.system.playback_start()
}

fn cmd_seekcur(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    ctx.system.playback_seek(seconds_to_ms(&args[1])?);
    ctx.system.playback_start()
}

fn cmd_stop(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.system.playback_stop();
    Ok(())
}

// ---- the current playlist ------------------------------------------------

fn optional_position(
    ctx: &HandlerCtx,
    args: &[String],
    index: usize,
) -> Result<Option<i64>, CommandError> {
    match args.get(index) {
        Some(arg) => {
            let pos = Position::parse(arg)
                .map_err(|_| CommandError::arg(format!("Could not parse POSITION '{arg}'")))?;
            Ok(Some(pos.resolve(ctx.system.current_queue_pos())))
        }
        None => Ok(None),
    }
}

/// Adds library items below a path to the queue. Paths not in the library
/// at all fall through to an ad-hoc queue item (stream URLs).
fn queue_add(
    ctx: &mut HandlerCtx,
    path: &str,
    exact: bool,
    position: Option<i64>,
) -> Result<Option<u32>, CommandError> {
    let pattern = if exact {
        format!("(f.virtual_path LIKE '/{}')", sql_escape(path))
    } else {
        format!("(f.virtual_path LIKE '/{}%')", sql_escape(path))
    };
    let qp = QueryParams {
        filter: Some(pattern),
        order: Some(SORT_ARTIST.to_string()),
        ..QueryParams::default()
    };
    ctx.system
        .queue_add_by_query(&qp, position)
        .map_err(|_| CommandError::unknown(format!("Failed to add song '{path}' to playlist")))
}

fn cmd_add(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let position = optional_position(ctx, args, 2)?;
    if queue_add(ctx, &args[1], false, position)?.is_none() {
        // not in the library, try as a plain queue item
        ctx.system
            .queue_add_path(&prepend_slash(&args[1]), position)
            .map_err(|_| {
                CommandError::unknown(format!(
                    "Failed to add song '{}' to playlist (unknown path)",
                    args[1]
                ))
            })?;
    }
    Ok(())
}

fn cmd_addid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let position = optional_position(ctx, args, 2)?;
    let id = match queue_add(ctx, &args[1], true, position)? {
        Some(id) => id,
        None => ctx
            .system
            .queue_add_path(&prepend_slash(&args[1]), position)
            .map_err(|_| {
                CommandError::unknown(format!(
                    "Failed to add song '{}' to playlist (unknown path)",
                    args[1]
                ))
            })?,
    };
    let _ = writeln!(ctx.out, "Id: {id}");
    Ok(())
}

fn cmd_clear(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.system.playback_stop();
    ctx.system
        .queue_clear()
        .map_err(|_| CommandError::unknown("Failed to clear queue"))
}

fn cmd_delete(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let Some(arg) = args.get(1) else {
        // no argument clears the whole queue
        return ctx
            .system
            .queue_clear()
            .map_err(|_| CommandError::unknown("Failed to clear queue"));
    };
    let (start, end) = parse_range(arg)?;
    let count = end - start;
    ctx.system.queue_delete_bypos(start, count).map_err(|_| {
        CommandError::unknown(format!(
            "Failed to remove {count} songs starting at position {start}"
        ))
    })
}

fn cmd_deleteid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let id: u32 = parse_int(&args[1])?;
    ctx.system
        .queue_delete_byid(id)
        .map_err(|_| CommandError::unknown(format!("Failed to remove song with id '{id}'")))
}

fn cmd_move(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let (start, end) = parse_range(&args[1])?;
    let to = Position::parse(&args[2])?.resolve(ctx.system.current_queue_pos());

    if start <= to && end >= to {
        return Err(CommandError::arg(format!(
            "Range overlaps with destination: {start}-{end} -> {to}"
        )));
    }

    // one item at a time so positions stay consistent
    for _ in 0..(end - start) {
        ctx.system
            .queue_move_bypos(start as u32, to as u32)
            .map_err(|_| {
                CommandError::unknown(format!("Failed to move song at position {start} to {to}"))
            })?;
    }
    Ok(())
}

fn cmd_moveid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let id: u32 = parse_int(&args[1])?;
    let to = Position::parse(&args[2])?.resolve(ctx.system.current_queue_pos());
    ctx.system.queue_move_byid(id, to as u32).map_err(|_| {
        CommandError::unknown(format!("Failed to move song with id '{id}' to index '{to}'"))
    })
}

fn push_queue_rows(ctx: &mut HandlerCtx, qp: &QueryParams) -> Result<(), CommandError> {
    let rows = ctx
        .system
        .queue_query(qp)
        .map_err(|_| CommandError::unknown("Failed to start queue enum"))?;
    let entries: Vec<QueueEntry> = rows.iter().map(QueueEntry::from).collect();
    ctx.push(&entries)
}

/// Lists the queue, always in the not-shuffled order.
fn cmd_playlistinfo(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let mut qp = QueryParams::default();
    if let Some(arg) = args.get(1) {
        let (start, end) = parse_range(arg)?;
        if start < 0 {
            debug!("playlistinfo called with pos < 0, returning the whole queue");
        } else {
            qp.filter = Some(format!("(pos >= {start} AND pos < {end})"));
        }
    }
    push_queue_rows(ctx, &qp)
}

fn cmd_playlistid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let mut qp = QueryParams::default();
    if let Some(arg) = args.get(1) {
        let id: u32 = parse_int(arg)?;
        if id > 0 {
            qp.filter = Some(format!("(id = {id})"));
        }
    }
    push_queue_rows(ctx, &qp)
}

fn playlist_filter(ctx: &mut HandlerCtx, args: &[String], exact: bool) -> Result<CommandParams, CommandError> {
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return Err(CommandError::arg(format!(
            "Missing argument(s) for command '{}'",
            args[0]
        )));
    }
    let allow = Params::FILTER | Params::SORT | Params::WINDOW;
    let mut params = if exact {
        CommandParams::exact(allow)
    } else {
        CommandParams::new(allow)
    };
    params.parse_args(&args[1..], ctx.system.current_queue_pos());
    Ok(params)
}

fn cmd_playlistfind(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let params = playlist_filter(ctx, args, true)?;
    push_queue_rows(ctx, &params.qp)
}

fn cmd_playlistsearch(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let params = playlist_filter(ctx, args, false)?;
    push_queue_rows(ctx, &params.qp)
}

fn plchanges_filter(args: &[String]) -> Result<QueryParams, CommandError> {
    let version: u32 = parse_int(&args[1])?;

    let mut range = None;
    if let Some(arg) = args.get(2) {
        let (start, end) = parse_range(arg)?;
        if start < 0 {
            debug!("plchanges called with pos < 0, returning the whole queue");
        } else {
            range = Some((start, end));
        }
    }

    let filter = match range {
        Some((start, end)) if end > 0 => {
            format!("(queue_version > {version} AND pos >= {start} AND pos < {end})")
        }
        _ => format!("(queue_version > {version})"),
    };
    Ok(QueryParams {
        filter: Some(filter),
        ..QueryParams::default()
    })
}

fn cmd_plchanges(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let qp = plchanges_filter(args)?;
    push_queue_rows(ctx, &qp)
}

fn cmd_plchangesposid(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let qp = plchanges_filter(args)?;
    let rows = ctx
        .system
        .queue_query(&qp)
        .map_err(|_| CommandError::unknown("Failed to start queue enum"))?;
    for row in rows {
        let _ = writeln!(ctx.out, "cpos: {}\nId: {}", row.pos, row.id);
    }
    Ok(())
}

// ---- stored playlists ----------------------------------------------------

fn playlist_window(entries: Vec<String>, args: &[String]) -> Vec<String> {
    let Some(arg) = args.get(2) else {
        return entries;
    };
    match parse_range(arg) {
        Ok((start, end)) if start >= 0 && end >= start => entries
            .into_iter()
            .skip(start as usize)
            .take((end - start) as usize)
            .collect(),
        _ => entries,
    }
}

fn cmd_listplaylist(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let virtual_path = ctx.system.resolve_playlist_arg(&args[1]);
    let entries = ctx
        .system
        .playlist_entries(&virtual_path)
        .ok_or_else(|| CommandError::arg(format!("Playlist not found for path '{}'", args[1])))?;
    for entry in playlist_window(entries, args) {
        let _ = writeln!(ctx.out, "file: {entry}");
    }
    Ok(())
}

fn cmd_listplaylistinfo(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let virtual_path = ctx.system.resolve_playlist_arg(&args[1]);
    let entries = ctx.system.playlist_entries(&virtual_path).ok_or_else(|| {
        CommandError::no_exist(format!("Playlist not found for path '{}'", args[1]))
    })?;
    for entry in playlist_window(entries, args) {
        if let Some(row) = ctx.system.media_by_virtual_path(&prepend_slash(&entry)) {
            ctx.push(&MediaItem::from(&row))?;
        }
    }
    Ok(())
}

fn cmd_listplaylists(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    let heads = ctx
        .system
        .playlists()
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    ctx.push(&heads)
}

fn cmd_load(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let virtual_path = ctx.system.resolve_playlist_arg(&args[1]);
    let entries = ctx
        .system
        .playlist_entries(&virtual_path)
        .ok_or_else(|| CommandError::arg(format!("Playlist not found for path '{}'", args[1])))?;

    // argv[2] would be a range of songs to load; not supported
    let position = optional_position(ctx, args, 3)?;

    let rows: Vec<_> = entries
        .iter()
        .filter_map(|entry| ctx.system.media_by_virtual_path(&prepend_slash(entry)))
        .collect();
    if rows.is_empty() {
        return Ok(());
    }
    ctx.system
        .queue_add_media_rows(&rows, position)
        .map_err(|_| {
            CommandError::unknown(format!("Failed to add song '{}' to playlist", args[1]))
        })?;
    Ok(())
}

fn require_playlist_modifications(ctx: &HandlerCtx) -> Result<(), CommandError> {
    if ctx.config.library.allow_modifying_stored_playlists {
        Ok(())
    } else {
        Err(CommandError::permission(
            "Modifying stored playlists is not enabled",
        ))
    }
}

fn cmd_playlistadd(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    require_playlist_modifications(ctx)?;
    if args.len() >= 4 {
        return Err(CommandError::new(
            Ack::System,
            "Positional updates to playlists not supported",
        ));
    }
    let playlist = ctx.system.resolve_playlist_arg(&args[1]);
    let item = prepend_slash(&args[2]);
    ctx.system
        .playlist_item_add(&playlist, &item)
        .map_err(|_| CommandError::arg(format!("Error adding item to file '{}'", args[1])))
}

fn cmd_rm(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    require_playlist_modifications(ctx)?;
    let playlist = ctx.system.resolve_playlist_arg(&args[1]);
    ctx.system
        .playlist_remove(&playlist)
        .map_err(|_| CommandError::arg(format!("Error removing playlist '{}'", args[1])))
}

fn cmd_save(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    require_playlist_modifications(ctx)?;

    #[derive(PartialEq)]
    enum SaveMode {
        Create,
        Append,
        Replace,
    }
    let mode = match args.get(2).map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("append") => SaveMode::Append,
        Some("replace") => SaveMode::Replace,
        _ => SaveMode::Create,
    };

    let virtual_path = ctx.system.resolve_playlist_arg(&args[1]);
    let exists = ctx.system.playlist_exists(&virtual_path);
    if exists && mode == SaveMode::Create {
        return Err(CommandError::arg(format!(
            "Playlist already exists by that name: {virtual_path}"
        )));
    }
    if !exists && mode != SaveMode::Create {
        return Err(CommandError::arg(format!(
            "No such playlist by that name: {virtual_path}"
        )));
    }

    let failed = |_| CommandError::arg(format!("Error saving queue to file '{}'", args[1]));
    match mode {
        SaveMode::Append => {
            let rows = ctx
                .system
                .queue_query(&QueryParams::default())
                .map_err(failed)?;
            for row in rows {
                let item = row.virtual_path.clone();
                ctx.system
                    .playlist_item_add(&virtual_path, &item)
                    .map_err(failed)?;
            }
            Ok(())
        }
        SaveMode::Replace => {
            ctx.system.playlist_remove(&virtual_path).map_err(failed)?;
            ctx.system.queue_save(&virtual_path).map_err(failed)
        }
        SaveMode::Create => ctx.system.queue_save(&virtual_path).map_err(failed),
    }
}

// ---- the music database --------------------------------------------------

/// Writes the `size:`/`binary:` framing around one chunk of a blob,
/// respecting the client's binarylimit. The client iterates by repeating
/// the command with growing offsets.
fn write_binary_response(ctx: &mut HandlerCtx, data: &[u8], offset: usize) -> bool {
    let total = data.len();
    if total == 0 || total < offset {
        return false;
    }
    let chunk = (total - offset).min(ctx.client.binary_limit);
    let _ = write!(ctx.out, "size: {total}\nbinary: {chunk}\n");
    ctx.out.extend_from_slice(&data[offset..offset + chunk]);
    ctx.out.push(b'\n');
    true
}

fn cmd_albumart(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let item_id = ctx
        .system
        .file_id_by_virtual_path_match(&args[1])
        .ok_or_else(|| CommandError::arg("Item not found"))?;

    let offset: usize = match args.get(2) {
        Some(arg) => arg
            .parse()
            .map_err(|_| CommandError::arg("Illegal offset argument"))?,
        None => 0,
    };

    let (data, format) = ctx
        .system
        .artwork_for_item(item_id)
        .ok_or_else(|| CommandError::arg("Item was not found"))?;
    if data.is_empty() {
        return Err(CommandError::arg("Item contains no data"));
    }

    let _ = writeln!(ctx.out, "type: {}", format.mime());
    write_binary_response(ctx, &data, offset);
    Ok(())
}

fn cmd_count(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let mut params = CommandParams::exact(Params::FILTER | Params::GROUP);
    params.parse_args(&args[1..], ctx.system.current_queue_pos());
    let (songs, length_ms) = ctx
        .system
        .filecount(&params.qp)
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    let _ = writeln!(ctx.out, "songs: {songs}\nplaytime: {}", length_ms / 1000);
    Ok(())
}

fn find_or_search(ctx: &mut HandlerCtx, args: &[String], exact: bool) -> Result<(), CommandError> {
    let allow = Params::FILTER | Params::SORT | Params::WINDOW;
    let mut params = if exact {
        CommandParams::exact(allow)
    } else {
        CommandParams::new(allow)
    };
    params.qp.order = Some(SORT_NAME.to_string());
    params.parse_args(&args[1..], ctx.system.current_queue_pos());

    let rows = ctx
        .system
        .query_files(&params.qp)
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    let items: Vec<MediaItem> = rows.iter().map(MediaItem::from).collect();
    ctx.push(&items)
}

fn cmd_find(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    find_or_search(ctx, args, true)
}

fn cmd_search(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    find_or_search(ctx, args, false)
}

fn find_or_search_add(
    ctx: &mut HandlerCtx,
    args: &[String],
    exact: bool,
) -> Result<(), CommandError> {
    let allow = Params::FILTER | Params::SORT | Params::WINDOW | Params::POSITION;
    let mut params = if exact {
        CommandParams::exact(allow)
    } else {
        CommandParams::new(allow)
    };
    params.qp.order = Some(SORT_ARTIST.to_string());
    params.parse_args(&args[1..], ctx.system.current_queue_pos());

    let position = params.position;
    ctx.system
        .queue_add_by_query(&params.qp, position)
        .map_err(|_| CommandError::unknown("Failed to add songs to playlist"))?;
    Ok(())
}

fn cmd_findadd(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return Err(CommandError::arg("Missing argument(s) for command 'findadd'"));
    }
    find_or_search_add(ctx, args, true)
}

fn cmd_searchadd(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    find_or_search_add(ctx, args, false)
}

/// Some clients crash on newlines in tag values; they get spaces instead.
fn sanitize_value(value: &str) -> String {
    value.replace('\n', " ")
}

fn cmd_list(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    // the odd three-token form is only valid for albums of an artist
    if args.len() % 2 != 0 && !(args.len() == 3 && args[1].eq_ignore_ascii_case("album")) {
        return Err(CommandError::arg("Missing argument(s) for command 'list'"));
    }

    let Some(tagtype) = find_tagtype(&args[1]) else {
        debug!("unsupported type argument for list: {}", args[1]);
        return Ok(());
    };
    if tagtype.kind == TagKind::Special {
        debug!("unsupported type argument for list: {}", args[1]);
        return Ok(());
    }

    let mut params = CommandParams::new(Params::FILTER | Params::GROUP);
    params.qp.order = Some(tagtype.sort_field.to_string());
    params.qp.group = Some(tagtype.group_field.to_string());
    params.add_group_filter = tagtype.group_in_list;
    params.parse_args(&args[2..], ctx.system.current_queue_pos());

    let rows = ctx
        .system
        .query_files(&params.qp)
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    for row in rows {
        let value = tagtype.media_field.value(&row);
        if value.is_empty() {
            continue;
        }
        let _ = writeln!(ctx.out, "{}: {}", tagtype.tag, sanitize_value(&value));
        for group in &params.groups {
            let value = group.media_field.value(&row);
            if value.is_empty() {
                continue;
            }
            let _ = writeln!(ctx.out, "{}: {}", group.tag, sanitize_value(&value));
        }
    }
    Ok(())
}

// ---- browsing ------------------------------------------------------------

fn browse_parent(args: &[String]) -> String {
    match args.get(1).map(String::as_str) {
        None | Some("") | Some("/") => "/".to_string(),
        Some(arg) => prepend_slash(arg.trim_end_matches('/')),
    }
}

/// Emits the contents of one directory: playlists, subdirectories, files.
/// `listall` recurses, `listinfo` adds metadata.
fn add_directory(
    ctx: &mut HandlerCtx,
    virtual_path: &str,
    directory_id: i64,
    listall: bool,
    listinfo: bool,
) -> Result<(), CommandError> {
    if virtual_path == ctx.system.playlist_virtual_dir() {
        let heads = ctx
            .system
            .playlists()
            .map_err(|_| CommandError::unknown("Could not start query"))?;
        for head in heads {
            if listinfo {
                let _ = writeln!(
                    ctx.out,
                    "playlist: {}\nLast-Modified: {}",
                    head.playlist, head.last_modified
                );
            } else {
                let _ = writeln!(ctx.out, "playlist: {}", head.playlist);
            }
        }
    }

    let subdirs = ctx
        .system
        .subdirectories(directory_id)
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    for subdir in subdirs {
        if listinfo {
            let _ = writeln!(
                ctx.out,
                "directory: {}\nLast-Modified: {}",
                strip_slash(&subdir),
                "2015-12-01 00:00"
            );
        } else {
            let _ = writeln!(ctx.out, "directory: {}", strip_slash(&subdir));
        }
        if listall {
            let subdir_id = ctx
                .system
                .directory_id_by_virtual_path(&subdir)
                .unwrap_or(0);
            add_directory(ctx, &subdir, subdir_id, listall, listinfo)?;
        }
    }

    let files = ctx
        .system
        .files_in_directory(directory_id)
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    for file in files {
        if listinfo {
            ctx.push(&MediaItem::from(&file))?;
        } else {
            let _ = writeln!(ctx.out, "file: {}", strip_slash(&file.virtual_path));
        }
    }
    Ok(())
}

fn browse(ctx: &mut HandlerCtx, args: &[String], listall: bool, listinfo: bool) -> Result<(), CommandError> {
    let parent = browse_parent(args);
    let directory_id = ctx
        .system
        .directory_id_by_virtual_path(&parent)
        .ok_or_else(|| {
            CommandError::no_exist(format!(
                "Directory info not found for virtual-path '{parent}'"
            ))
        })?;
    add_directory(ctx, &parent, directory_id, listall, listinfo)?;

    // the deprecated root listing also includes stored playlists; ncmpcpp
    // and ympd still use it
    if !listall && parent == "/" {
        cmd_listplaylists(ctx, args)?;
    }
    Ok(())
}

fn cmd_listall(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    browse(ctx, args, true, false)
}

fn cmd_listallinfo(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    browse(ctx, args, true, true)
}

fn cmd_lsinfo(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    browse(ctx, args, false, true)
}

fn cmd_update(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    if args.get(1).is_some_and(|a| !a.is_empty()) {
        return Err(CommandError::arg(
            "Update for specific uri not supported for command 'update'",
        ));
    }
    ctx.system.request_rescan();
    ctx.out.extend_from_slice(b"updating_db: 1\n");
    Ok(())
}

// ---- stickers ------------------------------------------------------------

/// Only the `rating` sticker exists; it is stored as rating * 10 to match
/// the internal 0-100 scale.
fn require_rating_sticker(args: &[String]) -> Result<(), CommandError> {
    if args[4] != "rating" {
        return Err(CommandError::no_exist("no such sticker"));
    }
    Ok(())
}

fn sticker_get(ctx: &mut HandlerCtx, args: &[String], virtual_path: &str) -> Result<(), CommandError> {
    require_rating_sticker(args)?;
    let row = ctx
        .system
        .media_by_virtual_path(virtual_path)
        .ok_or_else(|| CommandError::arg("unknown sticker domain"))?;
    if row.rating > 0 {
        let _ = writeln!(ctx.out, "sticker: rating={}", row.rating / RATING_FACTOR);
    }
    Ok(())
}

fn sticker_set(ctx: &mut HandlerCtx, args: &[String], virtual_path: &str) -> Result<(), CommandError> {
    require_rating_sticker(args)?;
    let rating: u32 = args[5]
        .parse()
        .map_err(|_| CommandError::arg(format!("rating '{}' doesn't convert to integer", args[5])))?;
    let rating = rating * RATING_FACTOR;
    if rating > RATING_MAX {
        return Err(CommandError::arg(format!(
            "rating '{}' is greater than maximum value allowed",
            args[5]
        )));
    }
    let id = ctx
        .system
        .file_id_by_virtual_path(virtual_path)
        .ok_or_else(|| CommandError::arg(format!("Invalid path '{virtual_path}'")))?;
    ctx.system
        .rating_save(id, rating)
        .map_err(|_| CommandError::unknown("Failed to save rating"))
}

fn sticker_delete(ctx: &mut HandlerCtx, args: &[String], virtual_path: &str) -> Result<(), CommandError> {
    require_rating_sticker(args)?;
    let id = ctx
        .system
        .file_id_by_virtual_path(virtual_path)
        .ok_or_else(|| CommandError::arg(format!("Invalid path '{virtual_path}'")))?;
    ctx.system
        .rating_save(id, 0)
        .map_err(|_| CommandError::unknown("Failed to save rating"))
}

/// Returns only the rating even though the protocol wants all stickers on
/// the item; there are no others.
fn sticker_list(ctx: &mut HandlerCtx, _args: &[String], virtual_path: &str) -> Result<(), CommandError> {
    let row = ctx
        .system
        .media_by_virtual_path(virtual_path)
        .ok_or_else(|| CommandError::arg("unknown sticker domain"))?;
    if row.rating > 0 {
        let _ = writeln!(ctx.out, "sticker: rating={}", row.rating / RATING_FACTOR);
    }
    Ok(())
}

fn sticker_find(ctx: &mut HandlerCtx, args: &[String], virtual_path: &str) -> Result<(), CommandError> {
    require_rating_sticker(args)?;
    if args.len() == 6 {
        return Err(CommandError::arg("not enough arguments for 'sticker find'"));
    }

    let (operator, rating) = if args.len() > 6 {
        let operator = match args[5].as_str() {
            op @ ("=" | ">" | "<") => op,
            op => {
                return Err(CommandError::arg(format!(
                    "invalid operator '{op}' given to 'sticker find'"
                )));
            }
        };
        let rating: u32 = args[6].parse().map_err(|_| {
            CommandError::arg(format!("rating '{}' doesn't convert to integer", args[6]))
        })?;
        (operator, rating * RATING_FACTOR)
    } else {
        (">", 0)
    };

    let qp = QueryParams {
        filter: Some(format!(
            "(f.virtual_path LIKE '{}%' AND f.rating > 0 AND f.rating {operator} {rating})",
            sql_escape(virtual_path)
        )),
        order: Some(SORT_VPATH.to_string()),
        ..QueryParams::default()
    };
    let rows = ctx
        .system
        .query_files(&qp)
        .map_err(|_| CommandError::unknown("Could not start query"))?;
    for row in rows {
        let _ = writeln!(
            ctx.out,
            "file: {}\nsticker: rating={}",
            strip_slash(&row.virtual_path),
            row.rating / RATING_FACTOR
        );
    }
    Ok(())
}

struct StickerCommand {
    name: &'static str,
    handler: fn(&mut HandlerCtx, &[String], &str) -> Result<(), CommandError>,
    min_argc: usize,
}

static STICKER_COMMANDS: &[StickerCommand] = &[
    StickerCommand { name: "get",    handler: sticker_get,    min_argc: 5 },
    StickerCommand { name: "set",    handler: sticker_set,    min_argc: 6 },
    StickerCommand { name: "delete", handler: sticker_delete, min_argc: 5 },
    StickerCommand { name: "list",   handler: sticker_list,   min_argc: 4 },
    StickerCommand { name: "find",   handler: sticker_find,   min_argc: 5 },
];

fn cmd_sticker(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    if args[2] != "song" {
        return Err(CommandError::arg("unknown sticker domain"));
    }
    let sub = STICKER_COMMANDS
        .iter()
        .find(|c| c.name == args[1])
        .ok_or_else(|| CommandError::arg("bad request"))?;
    if args.len() < sub.min_argc {
        return Err(CommandError::arg("not enough arguments"));
    }
    let virtual_path = prepend_slash(&args[3]);
    (sub.handler)(ctx, args, &virtual_path)
}

// ---- connection settings -------------------------------------------------

fn cmd_password(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let supplied = args.get(1).map(String::as_str).unwrap_or("");
    match ctx.config.password() {
        None => Ok(()),
        Some(required) if supplied == required => Ok(()),
        Some(_) => Err(CommandError::new(
            Ack::Password,
            "Wrong password. Authentication failed.",
        )),
    }
}

fn cmd_binarylimit(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let size: usize = parse_int(&args[1])?;
    if size < BINARY_SIZE_MIN {
        return Err(CommandError::arg("Value too small"));
    }
    ctx.client.binary_limit = size;
    Ok(())
}

// ---- audio outputs -------------------------------------------------------

/// MPD spells the output plugin lowercase as a single word.
fn plugin_name(output_type: &str) -> String {
    output_type
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            ' ' => '_',
            c => c,
        })
        .collect()
}

fn cmd_outputs(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    // ids may change between runs; get/set commands count through the same
    // enumeration instead of using them as handles
    let mut entries: Vec<OutputEntry> = ctx
        .system
        .speakers
        .iter()
        .enumerate()
        .map(|(shortid, speaker)| OutputEntry {
            outputid: shortid as u32,
            outputname: speaker.name.clone(),
            plugin: plugin_name(&speaker.output_type),
            outputenabled: speaker.selected,
        })
        .collect();

    // the streaming output is not a speaker, append it as a pseudo element
    if ctx.config.mpd.enable_httpd_plugin {
        entries.push(OutputEntry {
            outputid: entries.len() as u32,
            outputname: "MP3 stream".to_string(),
            plugin: "httpd".to_string(),
            outputenabled: true,
        });
    }
    ctx.push(&entries)
}

fn cmd_enableoutput(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let shortid: usize = parse_int(&args[1])?;
    ctx.system.speaker_set_selected(shortid, true);
    Ok(())
}

fn cmd_disableoutput(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let shortid: usize = parse_int(&args[1])?;
    ctx.system.speaker_set_selected(shortid, false);
    Ok(())
}

fn cmd_toggleoutput(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let shortid: usize = parse_int(&args[1])?;
    let selected = ctx
        .system
        .speakers
        .get(shortid)
        .map(|speaker| speaker.selected);
    if let Some(selected) = selected {
        ctx.system.speaker_set_selected(shortid, !selected);
    }
    Ok(())
}

fn outputvolume_set(ctx: &mut HandlerCtx, shortid: usize, volume: i64) -> Result<(), CommandError> {
    if ctx.system.speaker_set_volume(shortid, volume) {
        Ok(())
    } else {
        Err(CommandError::unknown(format!(
            "No speaker found for short id: {shortid}"
        )))
    }
}

fn cmd_outputvolume(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let shortid: usize = parse_int(&args[1])?;
    let volume: i64 = parse_int(&args[2])?;
    outputvolume_set(ctx, shortid, volume)
}

// ---- reflection ----------------------------------------------------------

fn cmd_commands(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    let commands: Vec<String> = COMMANDS
        .iter()
        .map(|c| format!("command: {}", c.name))
        .collect();
    ctx.push(&commands)
}

fn cmd_tagtypes(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    for tagtype in TAGTYPES {
        if tagtype.kind != TagKind::Special {
            let _ = writeln!(ctx.out, "tagtype: {}", tagtype.tag);
        }
    }
    Ok(())
}

fn cmd_urlhandlers(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.out.extend_from_slice(b"handler: http://\n");
    Ok(())
}

fn cmd_decoders(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    ctx.out.extend_from_slice(b"plugin: ffmpeg\n");
    for suffix in FFMPEG_SUFFIXES {
        let _ = writeln!(ctx.out, "suffix: {suffix}");
    }
    for mime in FFMPEG_MIME_TYPES {
        let _ = writeln!(ctx.out, "mime_type: {mime}");
    }
    Ok(())
}

// ---- client to client ----------------------------------------------------

const CHANNELS: &[&str] = &["outputvolume", "pairing", "verification"];

fn cmd_channels(ctx: &mut HandlerCtx, _args: &[String]) -> Result<(), CommandError> {
    for channel in CHANNELS {
        let _ = writeln!(ctx.out, "channel: {channel}");
    }
    Ok(())
}

fn cmd_sendmessage(ctx: &mut HandlerCtx, args: &[String]) -> Result<(), CommandError> {
    let message = &args[2];
    match args[1].as_str() {
        // "<shortid>:<volume>"
        "outputvolume" => {
            let Some((shortid, volume)) = message.rsplit_once(':') else {
                tracing::error!(
                    "failed to parse output id and volume from message '{message}' \
                     (expected format: \"output-id:volume\")"
                );
                return Ok(());
            };
            match (shortid.parse(), volume.parse()) {
                (Ok(shortid), Ok(volume)) => {
                    if let Err(e) = outputvolume_set(ctx, shortid, volume) {
                        tracing::error!("failed to set output volume from message: {e}");
                    }
                }
                _ => tracing::error!("failed to parse output id or volume from message '{message}'"),
            }
            Ok(())
        }
        "pairing" => {
            tracing::info!("pairing request over mpd channel: {message}");
            Ok(())
        }
        "verification" => {
            tracing::info!("device verification over mpd channel: {message}");
            Ok(())
        }
        channel => {
            // just ignore the message
            tracing::error!("unsupported channel '{channel}'");
            Ok(())
        }
    }
}
