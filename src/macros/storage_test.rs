use std::{error::Error, fs};

use packed_struct::PackedStruct;
use tempfile::TempDir;

use crate::{
    drivers::procon2::hid_report::{RawFrame, REPORT_SIZE},
    macros::storage::{
        read_header, sanitize_name, validate_trace, MacroError, MacroFrame, MacroStore,
        PackedMacroHeader, CATALOG_FILE, FRAME_SIZE, HEADER_SIZE, MAGIC_V1,
    },
};

fn report(marker: u8) -> RawFrame {
    let mut report = [0u8; REPORT_SIZE];
    report[0] = 0x09;
    report[1] = marker;
    report
}

fn frames(count: u8) -> Vec<MacroFrame> {
    (0..count)
        .map(|i| (i as u64 * 8_000, report(i)))
        .collect()
}

#[test]
fn test_header_layout() -> Result<(), Box<dyn Error>> {
    let header = PackedMacroHeader::new(3, 0x01020304);
    let bytes = header.pack()?;
    assert_eq!(&bytes[0..4], b"MAC2");
    assert_eq!(&bytes[4..6], &[2, 0]);
    assert_eq!(&bytes[6..8], &[64, 0]);
    assert_eq!(&bytes[8..12], &[3, 0, 0, 0]);
    assert_eq!(&bytes[12..16], &[4, 3, 2, 1]);
    assert_eq!(read_header(&bytes)?, header);
    Ok(())
}

#[test]
fn test_save_writes_trace_and_catalog() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path().join("macros"));

    let recorded = frames(3);
    let id = store.save(&recorded, Some("jump"))?;
    assert_eq!(id, 1);

    let entry = store.get(id)?;
    assert_eq!(entry.name, "jump");
    assert_eq!(entry.filename, "001_jump.bin");
    assert_eq!(entry.frame_count, 3);
    assert_eq!(entry.duration_ms, 16);
    assert!(!entry.created.is_empty());

    let bytes = fs::read(store.trace_path(&entry))?;
    assert_eq!(bytes.len(), HEADER_SIZE + 3 * FRAME_SIZE);
    let header = validate_trace(&bytes)?;
    assert_eq!(header.frame_count, 3);
    assert_eq!(header.duration_us, 16_000);

    let (_, loaded) = store.read_trace(id)?;
    assert_eq!(loaded, recorded);
    assert!(dir.path().join("macros").join(CATALOG_FILE).exists());
    Ok(())
}

#[test]
fn test_save_default_name() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    store.save(&frames(1), None)?;
    let id = store.save(&frames(1), None)?;
    let entry = store.get(id)?;
    assert_eq!(entry.name, "macro_2");
    assert_eq!(entry.filename, "002_macro_2.bin");
    Ok(())
}

#[test]
fn test_save_empty_is_no_data() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    assert!(matches!(store.save(&[], None), Err(MacroError::NoData)));
    assert_eq!(store.slot_count()?, 0);
    Ok(())
}

#[test]
fn test_ids_are_never_reused() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let first = store.save(&frames(1), None)?;
    let second = store.save(&frames(1), None)?;
    assert_eq!((first, second), (1, 2));

    // Deleting the highest id does not free it
    store.delete(second)?;
    let third = store.save(&frames(1), None)?;
    assert_eq!(third, 3);

    // Nor does deleting everything, even from a fresh handle
    store.delete(first)?;
    store.delete(third)?;
    let reopened = MacroStore::new(dir.path());
    assert_eq!(reopened.save(&frames(1), None)?, 4);
    Ok(())
}

#[test]
fn test_legacy_catalog_is_accepted() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let legacy = r#"[
      {"id": 4, "name": "old", "filename": "004_old.bin", "frame_count": 1, "duration_ms": 0, "created": "1700000000"},
      {"id": 7, "name": "older", "filename": "007_older.bin", "frame_count": 1, "duration_ms": 0}
    ]"#;
    fs::write(dir.path().join(CATALOG_FILE), legacy)?;

    let store = MacroStore::new(dir.path());
    let entries = store.list()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].created, "");
    assert_eq!(store.id_by_slot(1)?, Some(7));
    assert_eq!(store.id_by_slot(2)?, None);

    assert_eq!(store.save(&frames(1), None)?, 8);
    Ok(())
}

#[test]
fn test_rename_moves_trace() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let id = store.save(&frames(2), Some("before"))?;
    let old_path = store.trace_path(&store.get(id)?);

    store.rename(id, "after dash")?;
    let entry = store.get(id)?;
    assert_eq!(entry.name, "after dash");
    assert_eq!(entry.filename, "001_after_dash.bin");
    assert!(!old_path.exists());
    assert!(store.trace_path(&entry).exists());

    assert!(matches!(store.rename(99, "x"), Err(MacroError::NotFound(99))));
    Ok(())
}

#[test]
fn test_delete_removes_trace() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let keep = store.save(&frames(1), Some("keep"))?;
    let gone = store.save(&frames(1), Some("gone"))?;
    let path = store.trace_path(&store.get(gone)?);

    store.delete(gone)?;
    assert!(!path.exists());
    assert!(matches!(store.get(gone), Err(MacroError::NotFound(_))));
    assert_eq!(store.list()?.iter().map(|e| e.id).collect::<Vec<_>>(), vec![keep]);
    assert!(matches!(store.delete(gone), Err(MacroError::NotFound(_))));
    Ok(())
}

#[test]
fn test_header_validation() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let id = store.save(&frames(2), None)?;
    let bytes = fs::read(store.trace_path(&store.get(id)?))?;

    let mut bad_magic = bytes.clone();
    bad_magic[0..4].copy_from_slice(b"NOPE");
    assert!(matches!(read_header(&bad_magic), Err(MacroError::InvalidMagic(_))));

    let mut bad_version = bytes.clone();
    bad_version[4] = 9;
    assert!(matches!(
        read_header(&bad_version),
        Err(MacroError::UnsupportedVersion(9))
    ));

    let mut bad_size = bytes.clone();
    bad_size[6] = 32;
    assert!(matches!(
        read_header(&bad_size),
        Err(MacroError::ReportSizeMismatch(32))
    ));

    let truncated = &bytes[..bytes.len() - 1];
    assert!(matches!(
        validate_trace(truncated),
        Err(MacroError::Truncated { .. })
    ));
    assert!(matches!(
        read_header(&bytes[..4]),
        Err(MacroError::Truncated { .. })
    ));
    Ok(())
}

#[test]
fn test_legacy_trace_is_accepted() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let id = store.save(&frames(2), None)?;
    let path = store.trace_path(&store.get(id)?);

    let mut bytes = fs::read(&path)?;
    bytes[0..4].copy_from_slice(&MAGIC_V1);
    bytes[4] = 1;
    fs::write(&path, &bytes)?;
    let (header, loaded) = store.read_trace(id)?;
    assert_eq!(header.version, 1);
    assert_eq!(loaded.len(), 2);

    // A legacy magic with the current version is rejected
    bytes[4] = 2;
    assert!(matches!(
        read_header(&bytes),
        Err(MacroError::UnsupportedVersion(2))
    ));
    Ok(())
}

#[test]
fn test_sanitize_name() {
    assert_eq!(sanitize_name("combo-1_ok"), "combo-1_ok");
    assert_eq!(sanitize_name("../etc/passwd"), "___etc_passwd");
    assert_eq!(sanitize_name("hadoken ↓↘→"), "hadoken____");
    assert_eq!(sanitize_name(""), "_");
}

#[test]
fn test_oversized_frame_count_is_rejected() -> Result<(), Box<dyn Error>> {
    let header = PackedMacroHeader::new(u32::MAX, 0);
    let bytes = header.pack()?;

    let result = validate_trace(&bytes);
    assert!(
        matches!(
            result,
            Err(MacroError::TooLarge(u32::MAX)) | Err(MacroError::Truncated { .. })
        ),
        "unexpected result: {result:?}"
    );

    #[cfg(target_pointer_width = "64")]
    assert_eq!(
        header.trace_len(),
        Some(HEADER_SIZE + u32::MAX as usize * FRAME_SIZE)
    );
    #[cfg(target_pointer_width = "32")]
    assert_eq!(header.trace_len(), None);
    Ok(())
}
