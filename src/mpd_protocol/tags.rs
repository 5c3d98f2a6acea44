//! The tag registry: every protocol tag name we understand, with the
//! database columns and sort/group expressions behind it. This table is the
//! only place new tags get added.

use crate::system::MediaRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Int,
    String,
    /// No column of its own; interpreted by the filter parser (`file`,
    /// `base`, `any`, `modified-since`).
    Special,
}

/// Which column of a fetched media row carries this tag's value. The list
/// command reads values through this instead of re-querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaField {
    Title,
    Artist,
    ArtistSort,
    Album,
    AlbumArtist,
    AlbumArtistSort,
    Composer,
    ComposerSort,
    Conductor,
    Grouping,
    Comment,
    Genre,
    Track,
    Disc,
    Year,
    DateReleased,
    None,
}

impl MediaField {
    /// String rendering of the field for `list` output. Empty string means
    /// "no value", which callers skip.
    pub fn value(self, row: &MediaRow) -> String {
        match self {
            MediaField::Title => row.title.clone(),
            MediaField::Artist => row.artist.clone(),
            MediaField::ArtistSort => row.artist_sort.clone(),
            MediaField::Album => row.album.clone(),
            MediaField::AlbumArtist => row.album_artist.clone(),
            MediaField::AlbumArtistSort => row.album_artist_sort.clone(),
            MediaField::Composer => row.composer.clone(),
            MediaField::ComposerSort => row.composer_sort.clone(),
            MediaField::Conductor => row.conductor.clone(),
            MediaField::Grouping => row.grouping.clone(),
            MediaField::Comment => row.comment.clone(),
            MediaField::Genre => row.genre.clone(),
            MediaField::Track => row.track.to_string(),
            MediaField::Disc => row.disc.to_string(),
            MediaField::Year => row.year.to_string(),
            MediaField::DateReleased => row.date_released.to_string(),
            MediaField::None => String::new(),
        }
    }
}

#[derive(Debug)]
pub struct TagType {
    pub tag: &'static str,
    pub field: &'static str,
    pub sort_field: &'static str,
    pub group_field: &'static str,
    pub kind: TagKind,
    pub media_field: MediaField,
    /// Whether `group` adds this tag to the group-by clause in the list
    /// command. Grouping by album already groups by the album persistent id,
    /// so adding e.g. the artist column again would only slow the query down
    /// without changing the result.
    pub group_in_list: bool,
}

/// https://mpd.readthedocs.io/en/latest/protocol.html#tags
///
/// Artist is deliberately mapped to the album-artist column: that lets
/// queries group over the artist-persistent-id index.
pub static TAGTYPES: &[TagType] = &[
    TagType { tag: "Artist",          field: "f.album_artist",      sort_field: "f.album_artist_sort, f.album_artist", group_field: "f.songartistid",  kind: TagKind::String,  media_field: MediaField::AlbumArtist,     group_in_list: false },
    TagType { tag: "ArtistSort",      field: "f.album_artist_sort", sort_field: "f.album_artist_sort, f.album_artist", group_field: "f.songartistid",  kind: TagKind::String,  media_field: MediaField::AlbumArtistSort, group_in_list: false },
    TagType { tag: "Album",           field: "f.album",             sort_field: "f.album_sort, f.album",               group_field: "f.songalbumid",   kind: TagKind::String,  media_field: MediaField::Album,           group_in_list: false },
    TagType { tag: "AlbumSort",       field: "f.album_sort",        sort_field: "f.album_sort, f.album",               group_field: "f.songalbumid",   kind: TagKind::String,  media_field: MediaField::Album,           group_in_list: false },
    TagType { tag: "AlbumArtist",     field: "f.album_artist",      sort_field: "f.album_artist_sort, f.album_artist", group_field: "f.songartistid",  kind: TagKind::String,  media_field: MediaField::AlbumArtist,     group_in_list: false },
    TagType { tag: "AlbumArtistSort", field: "f.album_artist_sort", sort_field: "f.album_artist_sort, f.album_artist", group_field: "f.songartistid",  kind: TagKind::String,  media_field: MediaField::AlbumArtistSort, group_in_list: false },
    TagType { tag: "Title",           field: "f.title",             sort_field: "f.title",                             group_field: "f.title_sort",    kind: TagKind::String,  media_field: MediaField::Title,           group_in_list: true },
    TagType { tag: "TitleSort",       field: "f.title_sort",        sort_field: "f.title",                             group_field: "f.title_sort",    kind: TagKind::String,  media_field: MediaField::Title,           group_in_list: true },
    TagType { tag: "Track",           field: "f.track",             sort_field: "f.track",                             group_field: "f.track",         kind: TagKind::Int,     media_field: MediaField::Track,           group_in_list: true },
    // Name is an alias of Title
    TagType { tag: "Name",            field: "f.title",             sort_field: "f.title_sort",                        group_field: "f.title",         kind: TagKind::String,  media_field: MediaField::Title,           group_in_list: true },
    TagType { tag: "Genre",           field: "f.genre",             sort_field: "f.genre",                             group_field: "f.genre",         kind: TagKind::String,  media_field: MediaField::Genre,           group_in_list: true },
    TagType { tag: "Date",            field: "f.year",              sort_field: "f.year",                              group_field: "f.year",          kind: TagKind::Int,     media_field: MediaField::Year,            group_in_list: true },
    TagType { tag: "OriginalDate",    field: "f.date_released",     sort_field: "f.date_released",                     group_field: "f.date_released", kind: TagKind::Int,     media_field: MediaField::DateReleased,    group_in_list: true },
    TagType { tag: "Composer",        field: "f.composer",          sort_field: "f.composer_sort",                     group_field: "f.composer",      kind: TagKind::String,  media_field: MediaField::Composer,        group_in_list: true },
    TagType { tag: "ComposerSort",    field: "f.composer_sort",     sort_field: "f.composer_sort",                     group_field: "f.composer_sort", kind: TagKind::String,  media_field: MediaField::ComposerSort,    group_in_list: true },
    TagType { tag: "Conductor",       field: "f.conductor",         sort_field: "f.conductor",                         group_field: "f.conductor",     kind: TagKind::String,  media_field: MediaField::Conductor,       group_in_list: true },
    TagType { tag: "Grouping",        field: "f.grouping",          sort_field: "f.grouping",                          group_field: "f.grouping",      kind: TagKind::String,  media_field: MediaField::Grouping,        group_in_list: true },
    TagType { tag: "Comment",         field: "f.comment",           sort_field: "f.comment",                           group_field: "f.comment",       kind: TagKind::String,  media_field: MediaField::Comment,         group_in_list: true },
    TagType { tag: "Disc",            field: "f.disc",              sort_field: "f.disc",                              group_field: "f.disc",          kind: TagKind::Int,     media_field: MediaField::Disc,            group_in_list: true },
    // pseudo tags, interpreted by the filter parser
    TagType { tag: "file",            field: "",                    sort_field: "",                                    group_field: "",                kind: TagKind::Special, media_field: MediaField::None,            group_in_list: true },
    TagType { tag: "base",            field: "",                    sort_field: "",                                    group_field: "",                kind: TagKind::Special, media_field: MediaField::None,            group_in_list: true },
    TagType { tag: "any",             field: "",                    sort_field: "",                                    group_field: "",                kind: TagKind::Special, media_field: MediaField::None,            group_in_list: true },
    TagType { tag: "modified-since",  field: "",                    sort_field: "",                                    group_field: "",                kind: TagKind::Special, media_field: MediaField::None,            group_in_list: true },
];

/// Case-insensitive lookup. Linear search is fine at this size.
pub fn find_tagtype(tag: &str) -> Option<&'static TagType> {
    TAGTYPES.iter().find(|t| t.tag.eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_tagtype("ALBUMARTIST").unwrap().tag, "AlbumArtist");
        assert_eq!(find_tagtype("artist").unwrap().field, "f.album_artist");
        assert!(find_tagtype("Mood").is_none());
    }

    #[test]
    fn name_aliases_title() {
        assert_eq!(find_tagtype("Name").unwrap().field, "f.title");
    }

    #[test]
    fn special_tags_have_no_field() {
        for tag in ["file", "base", "any", "modified-since"] {
            let t = find_tagtype(tag).unwrap();
            assert_eq!(t.kind, TagKind::Special);
            assert!(t.field.is_empty());
        }
    }
}
