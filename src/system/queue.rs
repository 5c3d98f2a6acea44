//! The play queue, kept as a denormalized table in the same database. The
//! table is aliased `f` in queries so the filter parser's predicates work on
//! it unchanged. Every mutation bumps the queue version and stamps the rows
//! it touched, which is what `plchanges` filters on. Item ids are rowids
//! from an AUTOINCREMENT column, so they survive reorders and never get
//! reused.

use color_eyre::Result;
use color_eyre::eyre::Context;
use tracing::debug;

use crate::mpd_protocol::Events;
use crate::mpd_protocol::filter::QueryParams;
use crate::system::{MediaRow, System};

#[derive(Debug, Clone)]
pub struct QueueRow {
    pub id: u32,
    pub file_id: i64,
    pub pos: u32,
    pub queue_version: u32,
    pub virtual_path: String,
    pub title: String,
    pub artist: String,
    pub artist_sort: String,
    pub album: String,
    pub album_artist: String,
    pub album_artist_sort: String,
    pub genre: String,
    pub track: u32,
    pub disc: u32,
    pub year: u32,
    pub song_length: u64,
    pub time_modified: i64,
}

impl QueueRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(QueueRow {
            id: row.get("id")?,
            file_id: row.get("file_id")?,
            pos: row.get("pos")?,
            queue_version: row.get("queue_version")?,
            virtual_path: row.get("virtual_path")?,
            title: row.get("title")?,
            artist: row.get("artist")?,
            artist_sort: row.get("artist_sort")?,
            album: row.get("album")?,
            album_artist: row.get("album_artist")?,
            album_artist_sort: row.get("album_artist_sort")?,
            genre: row.get("genre")?,
            track: row.get("track")?,
            disc: row.get("disc")?,
            year: row.get("year")?,
            song_length: row.get::<_, i64>("song_length")? as u64,
            time_modified: row.get("time_modified")?,
        })
    }
}

impl System {
    pub fn queue_version(&self) -> u32 {
        self.admin_get("queue_version").unwrap_or(0) as u32
    }

    fn bump_queue_version(&self) -> u32 {
        let version = self.queue_version() + 1;
        self.admin_set("queue_version", i64::from(version));
        version
    }

    pub fn queue_count(&self) -> u32 {
        self.db
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))
            .unwrap_or(0)
    }

    /// Enumerates the queue, always in non-shuffle order. The optional
    /// filter is a predicate over the aliased queue columns (`pos`, `id`,
    /// `queue_version`, tag columns).
    pub fn queue_query(&self, qp: &QueryParams) -> Result<Vec<QueueRow>> {
        let mut sql = "SELECT f.* FROM queue f".to_string();
        if let Some(filter) = &qp.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        sql.push_str(" ORDER BY f.pos");
        if let Some(limit) = qp.limit {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {}", qp.offset));
        }
        debug!(%sql, "queue_query");
        let mut stmt = self.db.prepare(&sql).wrap_err("Could not start queue enum")?;
        let rows = stmt
            .query_map([], QueueRow::from_row)
            .wrap_err("Could not run queue enum")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .wrap_err("Error fetching queue items")?;
        Ok(rows)
    }

    pub fn queue_fetch_bypos(&self, pos: u32) -> Option<QueueRow> {
        self.db
            .query_row("SELECT f.* FROM queue f WHERE f.pos = ?1", [pos], QueueRow::from_row)
            .ok()
    }

    pub fn queue_fetch_byid(&self, id: u32) -> Option<QueueRow> {
        self.db
            .query_row("SELECT f.* FROM queue f WHERE f.id = ?1", [id], QueueRow::from_row)
            .ok()
    }

    pub fn queue_fetch_next(&self, id: u32) -> Option<QueueRow> {
        let current = self.queue_fetch_byid(id)?;
        self.queue_fetch_bypos(current.pos + 1)
    }

    /// Adds every library item matching the query, keeping the query's sort
    /// order. Returns the item id of the last inserted item, or `None` when
    /// nothing matched.
    pub fn queue_add_by_query(
        &mut self,
        qp: &QueryParams,
        position: Option<i64>,
    ) -> Result<Option<u32>> {
        let rows = self.query_files(qp)?;
        if rows.is_empty() {
            return Ok(None);
        }
        self.queue_add_media_rows(&rows, position).map(Some)
    }

    /// Inserts already-fetched library rows, preserving their order.
    pub fn queue_add_media_rows(&mut self, rows: &[MediaRow], position: Option<i64>) -> Result<u32> {
        let count = i64::from(self.queue_count());
        let at = position.filter(|&p| p >= 0 && p < count).unwrap_or(count);
        let version = self.bump_queue_version();

        self.db
            .execute(
                "UPDATE queue SET pos = pos + ?1, queue_version = ?2 WHERE pos >= ?3",
                (rows.len() as i64, version, at),
            )
            .wrap_err("Could not shift queue positions")?;

        let mut last_id = 0;
        for (offset, row) in rows.iter().enumerate() {
            self.db
                .execute(
                    "INSERT INTO queue (file_id, pos, queue_version, virtual_path, title,
                                        artist, artist_sort, album, album_artist,
                                        album_artist_sort, genre, track, disc, year,
                                        song_length, time_modified)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    (
                        row.id,
                        at + offset as i64,
                        version,
                        &row.virtual_path,
                        &row.title,
                        &row.artist,
                        &row.artist_sort,
                        &row.album,
                        &row.album_artist,
                        &row.album_artist_sort,
                        &row.genre,
                        row.track,
                        row.disc,
                        row.year,
                        row.song_length as i64,
                        row.time_modified,
                    ),
                )
                .wrap_err("Could not append to queue")?;
            last_id = self.db.last_insert_rowid() as u32;
        }

        self.notify(Events::QUEUE);
        Ok(last_id)
    }

    /// Ad-hoc queue item for a path that is not in the library (a stream
    /// URL, typically).
    pub fn queue_add_path(&mut self, virtual_path: &str, position: Option<i64>) -> Result<u32> {
        let count = i64::from(self.queue_count());
        let at = position.filter(|&p| p >= 0 && p < count).unwrap_or(count);
        let version = self.bump_queue_version();

        self.db
            .execute(
                "UPDATE queue SET pos = pos + 1, queue_version = ?1 WHERE pos >= ?2",
                (version, at),
            )
            .wrap_err("Could not shift queue positions")?;

        let title = virtual_path.rsplit('/').next().unwrap_or(virtual_path);
        self.db
            .execute(
                "INSERT INTO queue (file_id, pos, queue_version, virtual_path, title)
                 VALUES (0, ?1, ?2, ?3, ?4)",
                (at, version, virtual_path, title),
            )
            .wrap_err("Could not append to queue")?;

        self.notify(Events::QUEUE);
        Ok(self.db.last_insert_rowid() as u32)
    }

    pub fn queue_clear(&mut self) -> Result<()> {
        self.db
            .execute("DELETE FROM queue", [])
            .wrap_err("Could not clear queue")?;
        self.bump_queue_version();
        self.player.item_id = None;
        self.notify(Events::QUEUE);
        Ok(())
    }

    /// Removes `count` items starting at `start`. Rows behind the hole move
    /// up and get stamped with the new version.
    pub fn queue_delete_bypos(&mut self, start: i64, count: i64) -> Result<()> {
        let version = self.bump_queue_version();
        let removed = self
            .db
            .execute(
                "DELETE FROM queue WHERE pos >= ?1 AND pos < ?2",
                (start, start + count),
            )
            .wrap_err("Could not remove queue items")?;
        self.db
            .execute(
                "UPDATE queue SET pos = pos - ?1, queue_version = ?2 WHERE pos >= ?3",
                (removed as i64, version, start + count),
            )
            .wrap_err("Could not renumber queue")?;
        self.notify(Events::QUEUE);
        Ok(())
    }

    pub fn queue_delete_byid(&mut self, id: u32) -> Result<()> {
        let Some(row) = self.queue_fetch_byid(id) else {
            color_eyre::eyre::bail!("no queue item with id {id}");
        };
        self.queue_delete_bypos(i64::from(row.pos), 1)
    }

    /// Moves the item at `from` to `to`, shifting everything in between.
    pub fn queue_move_bypos(&mut self, from: u32, to: u32) -> Result<()> {
        let Some(row) = self.queue_fetch_bypos(from) else {
            color_eyre::eyre::bail!("no queue item at position {from}");
        };
        if from == to {
            return Ok(());
        }
        let version = self.bump_queue_version();
        if from < to {
            self.db
                .execute(
                    "UPDATE queue SET pos = pos - 1, queue_version = ?1
                     WHERE pos > ?2 AND pos <= ?3",
                    (version, from, to),
                )
                .wrap_err("Could not shift queue positions")?;
        } else {
            self.db
                .execute(
                    "UPDATE queue SET pos = pos + 1, queue_version = ?1
                     WHERE pos >= ?3 AND pos < ?2",
                    (version, from, to),
                )
                .wrap_err("Could not shift queue positions")?;
        }
        self.db
            .execute(
                "UPDATE queue SET pos = ?1, queue_version = ?2 WHERE id = ?3",
                (to, version, row.id),
            )
            .wrap_err("Could not move queue item")?;
        self.notify(Events::QUEUE);
        Ok(())
    }

    pub fn queue_move_byid(&mut self, id: u32, to: u32) -> Result<()> {
        let Some(row) = self.queue_fetch_byid(id) else {
            color_eyre::eyre::bail!("no queue item with id {id}");
        };
        self.queue_move_bypos(row.pos, to)
    }
}

#[cfg(test)]
mod tests {
    use crate::mpd_protocol::filter::QueryParams;
    use crate::system::tests::{insert_file, test_system};

    #[test]
    fn add_by_query_appends_in_order() {
        let mut system = test_system();
        insert_file(&system, "/file:/m/a.mp3", "Abba", "Arrival", "One");
        insert_file(&system, "/file:/m/b.mp3", "Abba", "Arrival", "Two");

        let qp = QueryParams {
            order: Some("f.virtual_path".to_string()),
            ..QueryParams::default()
        };
        let last = system.queue_add_by_query(&qp, None).unwrap();
        assert!(last.is_some());
        assert_eq!(system.queue_count(), 2);

        let rows = system.queue_query(&QueryParams::default()).unwrap();
        assert_eq!(rows[0].pos, 0);
        assert_eq!(rows[0].title, "One");
        assert_eq!(rows[1].pos, 1);
        assert_eq!(rows[1].title, "Two");
    }

    #[test]
    fn insert_at_position_shifts_the_rest() {
        let mut system = test_system();
        insert_file(&system, "/file:/m/a.mp3", "A", "X", "One");
        insert_file(&system, "/file:/m/b.mp3", "B", "X", "Two");
        insert_file(&system, "/file:/m/c.mp3", "C", "X", "Three");

        let all = QueryParams::default();
        let one = |artist: &str| QueryParams {
            filter: Some(format!("(f.artist = '{artist}')")),
            ..QueryParams::default()
        };
        system.queue_add_by_query(&one("A"), None).unwrap();
        system.queue_add_by_query(&one("B"), None).unwrap();
        system.queue_add_by_query(&one("C"), Some(1)).unwrap();

        let titles: Vec<_> = system
            .queue_query(&all)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["One", "Three", "Two"]);
    }

    #[test]
    fn item_ids_survive_reorders_and_deletes() {
        let mut system = test_system();
        for (path, title) in [("a", "One"), ("b", "Two"), ("c", "Three")] {
            insert_file(&system, &format!("/file:/m/{path}.mp3"), "A", "X", title);
        }
        system.queue_add_by_query(&QueryParams {
            order: Some("f.virtual_path".to_string()),
            ..QueryParams::default()
        }, None).unwrap();

        let two = system.queue_fetch_bypos(1).unwrap();
        system.queue_move_bypos(1, 0).unwrap();
        assert_eq!(system.queue_fetch_byid(two.id).unwrap().pos, 0);

        system.queue_delete_bypos(1, 1).unwrap();
        assert_eq!(system.queue_count(), 2);
        assert_eq!(system.queue_fetch_byid(two.id).unwrap().pos, 0);
        // the id of the deleted row is gone for good
        assert_eq!(system.queue_count(), 2);
    }

    #[test]
    fn versions_track_changes() {
        let mut system = test_system();
        insert_file(&system, "/file:/m/a.mp3", "A", "X", "One");
        insert_file(&system, "/file:/m/b.mp3", "B", "X", "Two");

        let before = system.queue_version();
        system.queue_add_by_query(&QueryParams::default(), None).unwrap();
        let after_add = system.queue_version();
        assert!(after_add > before);

        // plchanges-style query only sees rows stamped since `before`
        let qp = QueryParams {
            filter: Some(format!("(queue_version > {before})")),
            ..QueryParams::default()
        };
        assert_eq!(system.queue_query(&qp).unwrap().len(), 2);

        let qp = QueryParams {
            filter: Some(format!("(queue_version > {after_add})")),
            ..QueryParams::default()
        };
        assert!(system.queue_query(&qp).unwrap().is_empty());
    }

    #[test]
    fn clear_empties_and_bumps() {
        let mut system = test_system();
        insert_file(&system, "/file:/m/a.mp3", "A", "X", "One");
        system.queue_add_by_query(&QueryParams::default(), None).unwrap();
        let v = system.queue_version();
        system.queue_clear().unwrap();
        assert_eq!(system.queue_count(), 0);
        assert!(system.queue_version() > v);
    }

    #[test]
    fn fetch_next_follows_positions() {
        let mut system = test_system();
        for (path, title) in [("a", "One"), ("b", "Two")] {
            insert_file(&system, &format!("/file:/m/{path}.mp3"), "A", "X", title);
        }
        system.queue_add_by_query(&QueryParams {
            order: Some("f.virtual_path".to_string()),
            ..QueryParams::default()
        }, None).unwrap();

        let head = system.queue_fetch_bypos(0).unwrap();
        let next = system.queue_fetch_next(head.id).unwrap();
        assert_eq!(next.title, "Two");
        assert!(system.queue_fetch_next(next.id).is_none());
    }
}
