use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::error::Result;

/// Writes one artifact as `<role>-<millis>.png` under the output
/// directory. mkdir-then-write; the millisecond stamp keeps normal usage
/// from overwriting earlier results.
pub fn write_artifact(out_dir: &Path, role: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}-{}.png", role, timestamp_millis()));
    fs::write(&path, bytes)?;
    info!(path = %path.display(), "artifact written");
    Ok(path)
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::write_artifact;

    #[test]
    fn artifact_lands_under_the_role_prefix() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out_dir = temp.path().join("renders");
        let path = write_artifact(&out_dir, "generate", b"bytes")?;
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("generate-"));
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(&path)?, b"bytes");
        Ok(())
    }

    #[test]
    fn consecutive_writes_do_not_collide() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = write_artifact(temp.path(), "mask", b"a")?;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = write_artifact(temp.path(), "mask", b"b")?;
        assert_ne!(first, second);
        Ok(())
    }
}
