use std::path::Path;

use notegraph::{NoteStore, NotesConfig, NotesService};

fn write(root: &Path, rel: &str, content: &str) {
    let abs = root.join(rel);
    std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
    std::fs::write(abs, content).unwrap();
}

#[tokio::test]
async fn search_matches_content_and_reports_line() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "recipes/bread.md", "# Bread\n\nknead the dough well\n");
    write(temp.path(), "journal.md", "nothing of note\n");

    let store = NoteStore::open(temp.path())?;
    let service = NotesService::new(store);
    service.build_index().await?;

    let hits = service.search("dough", 10).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/recipes/bread");
    assert_eq!(hits[0].title, "bread");
    assert_eq!(hits[0].line, 3);
    assert!(hits[0].snippet.contains("dough"));
    Ok(())
}

#[tokio::test]
async fn search_matches_filenames_too() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "projects/alpha-launch.md", "details\n");
    write(temp.path(), "misc.md", "details\n");

    let store = NoteStore::open(temp.path())?;
    let service = NotesService::new(store);
    service.build_index().await?;

    let hits = service.search("alpha", 10).await?;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].path, "/projects/alpha-launch");
    Ok(())
}

#[tokio::test]
async fn excluded_notes_are_invisible_to_search() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "public.md", "findable keyword here\n");
    write(temp.path(), "private/diary.md", "findable keyword here\n");

    let mut cfg = NotesConfig::default();
    cfg.exclude_patterns = vec!["private/*".into()];
    let store = NoteStore::with_config(temp.path(), cfg)?;
    let service = NotesService::new(store);
    service.build_index().await?;

    let hits = service.search("findable keyword", 10).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/public");
    Ok(())
}

#[tokio::test]
async fn recent_notes_are_newest_first() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "older.md", "# older\n");
    // Ensure distinct mtimes even on coarse-grained filesystems.
    std::thread::sleep(std::time::Duration::from_millis(20));
    write(temp.path(), "newer.md", "# newer\n");

    let store = NoteStore::open(temp.path())?;
    let service = NotesService::new(store);
    service.build_index().await?;

    let recent = service.recent_notes(10);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].path, "/newer");
    assert_eq!(recent[1].path, "/older");

    assert_eq!(service.recent_notes(1).len(), 1);
    Ok(())
}
