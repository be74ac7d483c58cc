// 📁 File Store - the plain-file layout
//
//   <dir>/menu_hash_lunch.txt    one fingerprint per meal type
//   <dir>/menu_hash_dinner.txt
//   <dir>/message_ids.txt        "message_id,meal_type" per line, append order

use super::{AppendLog, KeyValueStore, StoreError};
use crate::channel::MessageId;
use crate::ledger::LedgerEntry;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const LEDGER_FILE: &str = "message_ids.txt";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(FileStore { dir: dir.to_path_buf() })
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("menu_hash_{}.txt", key))
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    fn writer<W: Write>(inner: W) -> csv::Writer<W> {
        csv::WriterBuilder::new().has_headers(false).from_writer(inner)
    }
}

/// Write to a sibling temp file, then rename over the target
fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.value_path(key)) {
            Ok(text) => {
                let text = text.trim();
                Ok(if text.is_empty() { None } else { Some(text.to_string()) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        replace_file(&self.value_path(key), value.as_bytes())?;
        Ok(())
    }
}

impl AppendLog for FileStore {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ledger_path())?;

        let mut writer = Self::writer(file);
        writer.write_record([entry.message_id.as_str(), entry.meal_type.as_key()])?;
        writer.flush()?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let file = match fs::File::open(self.ledger_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        // Unreadable lines are skipped so retire/purge keep working; the next
        // compaction rewrites the file without them
        let mut entries = Vec::new();
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable ledger line");
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let (Some(id), Some(meal)) = (record.get(0), record.get(1)) else {
                if !record.get(0).unwrap_or("").is_empty() {
                    warn!(line, fields = record.len(), "Skipping malformed ledger line");
                }
                continue;
            };
            if id.is_empty() {
                continue;
            }
            match meal.parse() {
                Ok(meal) => entries.push(LedgerEntry::new(MessageId::new(id), meal)),
                Err(e) => warn!(line, message_id = id, error = %e, "Skipping ledger line with unknown meal"),
            }
        }

        Ok(entries)
    }

    fn overwrite_all(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        let mut writer = Self::writer(Vec::new());
        for entry in entries {
            writer.write_record([entry.message_id.as_str(), entry.meal_type.as_key()])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;

        replace_file(&self.ledger_path(), &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MealType;

    #[test]
    fn test_missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get("lunch").unwrap(), None);
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_fingerprint_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();

        store.set("dinner", "deadbeef").unwrap();

        assert_eq!(store.get("dinner").unwrap().as_deref(), Some("deadbeef"));
        assert!(dir.path().join("menu_hash_dinner.txt").exists());
        assert_eq!(store.get("lunch").unwrap(), None);
    }

    #[test]
    fn test_ledger_append_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        let a = LedgerEntry::new(MessageId::from(11), MealType::Lunch);
        let b = LedgerEntry::new(MessageId::from(12), MealType::Dinner);

        store.append(&a).unwrap();
        store.append(&b).unwrap();
        assert_eq!(store.read_all().unwrap(), vec![a.clone(), b.clone()]);

        let on_disk = fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        assert_eq!(on_disk, "11,lunch\n12,dinner\n");

        store.overwrite_all(&[b.clone()]).unwrap();
        assert_eq!(store.read_all().unwrap(), vec![b]);

        store.overwrite_all(&[]).unwrap();
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_reads_label_style_ledger() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LEDGER_FILE), "501,Almoço\n502,Jantar\n").unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let entries = store.read_all().unwrap();

        assert_eq!(entries[0].meal_type, MealType::Lunch);
        assert_eq!(entries[1].meal_type, MealType::Dinner);
    }

    #[test]
    fn test_corrupt_ledger_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(LEDGER_FILE),
            "501,brunch\n502,lunch\ngarbage\n503,dinner,extra\n504,Jantar\n",
        )
        .unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();

        let entries = store.read_all().unwrap();

        assert_eq!(
            entries,
            vec![
                LedgerEntry::new(MessageId::from(502), MealType::Lunch),
                LedgerEntry::new(MessageId::from(503), MealType::Dinner),
                LedgerEntry::new(MessageId::from(504), MealType::Dinner),
            ]
        );

        // Compaction leaves only readable lines behind
        store.overwrite_all(&entries).unwrap();
        let on_disk = fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        assert_eq!(on_disk, "502,lunch\n503,dinner\n504,dinner\n");

        println!("✅ Corrupt ledger recovery test PASSED");
    }
}
