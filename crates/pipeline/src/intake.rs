use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Spawn a notify watcher on `watch_dir` that sends newly created file
/// paths to `tx`. The returned watcher must be kept alive for watching to
/// continue.
pub fn spawn_intake_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(ev) = event {
            if matches!(ev.kind, EventKind::Create(_)) {
                for path in ev.paths {
                    if tx.try_send(path).is_err() {
                        tracing::warn!("intake queue full; dropping watch event");
                    }
                }
            }
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn watcher_reports_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let _watcher = spawn_intake_watcher(dir.path(), tx).unwrap();

        // Give the backend a moment to arm before creating the file.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(dir.path().join("drop.csv"), b"Date,Amount\n").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event within timeout")
            .expect("channel closed");
        assert_eq!(received.file_name().unwrap(), "drop.csv");
    }
}
