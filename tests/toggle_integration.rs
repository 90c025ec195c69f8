use std::path::Path;

use notegraph::{LiveEvent, NotePath, NoteStore, NotesService};

const TASKS_NOTE: &str = "# Chores\n\n- [ ] buy milk\n- [x] pay rent\ntext [x] lookalike\n- [ ] water plants\n";

fn write(root: &Path, rel: &str, content: &str) {
    let abs = root.join(rel);
    std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
    std::fs::write(abs, content).unwrap();
}

fn path(s: &str) -> NotePath {
    NotePath::try_from(s).unwrap()
}

async fn service_for(root: &Path) -> anyhow::Result<NotesService> {
    let store = NoteStore::open(root)?;
    let service = NotesService::new(store);
    service.build_index().await?;
    Ok(service)
}

#[tokio::test]
async fn toggle_flips_exactly_one_byte() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "chores.md", TASKS_NOTE);
    let service = service_for(temp.path()).await?;
    let rel = path("chores.md");

    service.toggle_checkbox(&rel, 0, true).await?;

    let after = service.read_note(&rel)?;
    let diffs: Vec<usize> = TASKS_NOTE
        .bytes()
        .zip(after.bytes())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(after.len(), TASKS_NOTE.len());
    assert_eq!(diffs.len(), 1);
    assert!(after.contains("- [x] buy milk"));
    assert!(after.contains("text [x] lookalike"));

    // The index was updated synchronously, without the watcher.
    let tasks = service.tasks_for(&rel).unwrap();
    assert!(tasks[0].checked);
    Ok(())
}

#[tokio::test]
async fn out_of_range_ordinal_is_not_found_and_writes_nothing() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "chores.md", TASKS_NOTE);
    let service = service_for(temp.path()).await?;
    let rel = path("chores.md");

    let err = service.toggle_checkbox(&rel, 3, true).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(service.read_note(&rel)?, TASKS_NOTE);
    Ok(())
}

#[tokio::test]
async fn stale_ordinal_after_disk_shrink_is_a_conflict() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "chores.md", TASKS_NOTE);
    let service = service_for(temp.path()).await?;
    let rel = path("chores.md");

    // The file shrinks behind the index's back (no watcher running).
    let shrunk = "- [ ] only one left\n";
    write(temp.path(), "chores.md", shrunk);

    let err = service.toggle_checkbox(&rel, 2, true).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(service.read_note(&rel)?, shrunk);
    Ok(())
}

#[tokio::test]
async fn toggling_a_missing_note_is_not_found() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "other.md", "# other\n");
    let service = service_for(temp.path()).await?;

    let err = service
        .toggle_checkbox(&path("gone.md"), 0, true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn toggle_broadcasts_without_the_watcher() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "chores.md", TASKS_NOTE);
    let service = service_for(temp.path()).await?;
    let rel = path("chores.md");

    let mut rx = service.subscribe();
    service.toggle_checkbox(&rel, 1, false).await?;

    match rx.recv().await {
        Some(LiveEvent::Change(ev)) => {
            assert_eq!(ev.kind_str(), "modified");
            assert_eq!(ev.path(), &rel);
        }
        other => anyhow::bail!("expected a modified event; got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn save_note_is_last_writer_wins_and_updates_index() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "a.md", "old content, no links\n");
    write(temp.path(), "b.md", "# b\n");
    let service = service_for(temp.path()).await?;
    let rel = path("a.md");

    assert!(service.graph_snapshot().edges.is_empty());

    service
        .save_note(&rel, "rewritten, now links [[b]]\n".into())
        .await?;

    assert_eq!(service.read_note(&rel)?, "rewritten, now links [[b]]\n");
    let snapshot = service.graph_snapshot();
    assert_eq!(snapshot.edges.len(), 1);
    assert_eq!(snapshot.edges[0].target, "b");

    let err = service
        .save_note(&path("missing.md"), "anything".into())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}
