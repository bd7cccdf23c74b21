use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read one frame and its size on disk. `Ok(None)` on a clean end, a
/// truncated tail, or a bad checksum.
fn decode_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    let size = 8 + payload.len() as u64;
    Ok(bincode::deserialize::<Event>(&payload).ok().map(|e| (e, size)))
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only write-ahead log of booking events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// `len` covers the payload only. A torn last entry is dropped on replay
/// and cut off by `recover`.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    committed_len: u64,
    appends_since_compact: u64,
    /// Buffered since the last successful `flush_sync`.
    uncommitted_appends: u64,
    /// Set while a rollback is outstanding; appends retry it first.
    needs_rollback: bool,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_append(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            committed_len,
            appends_since_compact: 0,
            uncommitted_appends: 0,
            needs_rollback: false,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without syncing. Pair with `flush_sync` per batch.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.needs_rollback {
            self.rollback()?;
        }
        encode_event(&mut self.writer, event)?;
        self.uncommitted_appends += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.appends_since_compact += self.uncommitted_appends;
        self.uncommitted_appends = 0;
        Ok(())
    }

    /// Forget everything since the last successful `flush_sync`: drop the
    /// buffered bytes unwritten and cut any partially written frames off
    /// the file.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.needs_rollback = true;
        let file = open_append(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back the buffer instead of flushing it on drop.
        let (stale_file, _discarded) = stale.into_parts();
        drop(stale_file);
        self.uncommitted_appends = 0;
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.needs_rollback = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the compacted log to a sibling temp file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.with_extension("wal.tmp"))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        let file = open_append(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.uncommitted_appends = 0;
        self.needs_rollback = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// All valid events in file order. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(Self::scan(path)?.0)
    }

    /// Replay, then cut the file back to its last valid frame so later
    /// appends are not stranded behind a torn or corrupt tail.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let (events, valid_len) = Self::scan(path)?;
        let file = match OpenOptions::new().write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(events),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len > valid_len {
            tracing::warn!(
                path = %path.display(),
                discarded = len - valid_len,
                "truncating damaged log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(events)
    }

    /// Events plus the byte length they occupy.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0;
        while let Some((event, size)) = decode_frame(&mut reader)? {
            events.push(event);
            valid_len += size;
        }
        Ok((events, valid_len))
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("campus_booking_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn resource_event() -> Event {
        Event::ResourceCreated {
            id: Ulid::new(),
            name: "Lab".into(),
            kind: ResourceKind::Lab,
            capacity: 30,
        }
    }

    fn booking_event(resource_id: ResourceId) -> Event {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        Event::BookingRequested {
            booking: Booking {
                id: Ulid::new(),
                user_id: Ulid::new(),
                resource_id,
                title: "ML workshop".into(),
                purpose: "hands-on session".into(),
                date,
                range: TimeRange::new(
                    NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                ),
                status: BookingStatus::Pending,
                created_at: date.and_hms_opt(8, 0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let created = resource_event();
        let requested = booking_event(created.resource_id());
        let events = vec![created, requested];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 2);
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("never_written.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn truncated_tail_is_discarded() {
        let path = tmp_path("truncated.wal");
        let first = resource_event();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&booking_event(first.resource_id())).unwrap();
        }
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn corrupt_checksum_stops_replay() {
        let path = tmp_path("corrupt.wal");
        let first = resource_event();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&resource_event()).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn recover_cuts_torn_tail_before_new_appends() {
        let path = tmp_path("recover_torn.wal");
        let first = resource_event();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&resource_event()).unwrap();
        }
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 3).unwrap();

        assert_eq!(Wal::recover(&path).unwrap(), vec![first.clone()]);
        let after = booking_event(first.resource_id());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&after).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, after]);
    }

    #[test]
    fn recover_missing_file_is_empty() {
        let path = tmp_path("recover_missing.wal");
        assert!(Wal::recover(&path).unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn rollback_discards_unflushed_events() {
        let path = tmp_path("rollback_buffered.wal");
        let kept = resource_event();
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();

        wal.append_buffered(&resource_event()).unwrap();
        wal.rollback().unwrap();
        assert_eq!(wal.appends_since_compact(), 1);

        let after = booking_event(kept.resource_id());
        wal.append(&after).unwrap();
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, after]);
    }

    #[test]
    fn rollback_cuts_partially_written_frame() {
        let path = tmp_path("rollback_partial.wal");
        let kept = resource_event();
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();

        // Bytes that reached the file from a flush that then failed.
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(&[0x2a, 0, 0, 0, 1, 2]).unwrap();
        }
        wal.rollback().unwrap();

        let after = booking_event(kept.resource_id());
        wal.append(&after).unwrap();
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, after]);
    }

    #[test]
    fn outstanding_rollback_runs_before_next_append() {
        let path = tmp_path("rollback_retry.wal");
        let kept = resource_event();
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();

        wal.append_buffered(&resource_event()).unwrap();
        // As left by a rollback whose reopen failed.
        wal.needs_rollback = true;

        let after = booking_event(kept.resource_id());
        wal.append(&after).unwrap();
        assert!(!wal.needs_rollback);
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, after]);
    }

    #[test]
    fn compact_replaces_contents() {
        let path = tmp_path("compact.wal");
        let keep = resource_event();
        let mut wal = Wal::open(&path).unwrap();
        for _ in 0..5 {
            wal.append(&resource_event()).unwrap();
        }
        wal.compact(std::slice::from_ref(&keep)).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let after = booking_event(keep.resource_id());
        wal.append(&after).unwrap();
        assert_eq!(Wal::replay(&path).unwrap(), vec![keep, after]);
    }
}
