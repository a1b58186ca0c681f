use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::OpenOptions;

use crate::utils::validation::split_extension;

/// Gives up after this many same-second collisions.
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// A final filename claimed in the output directory by an empty placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub filename: String,
    pub path: PathBuf,
}

/// The directory that holds renamed, published files.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    root: PathBuf,
}

impl OutputDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Claims `filename`, or a timestamped variant of it when taken.
    ///
    /// Each candidate is created with `create_new`, so the existence check and
    /// the claim are one filesystem operation and two concurrent requests can
    /// never end up with the same name.
    pub async fn reserve(&self, filename: &str) -> std::io::Result<Reservation> {
        if let Some(reservation) = self.try_claim(filename).await? {
            return Ok(reservation);
        }

        let (stem, ext) = split_extension(filename);
        let timestamp = Local::now().format("%Y%m%d%H%M%S").to_string();

        let stamped = format!("{}_{}{}", stem, timestamp, ext);
        if let Some(reservation) = self.try_claim(&stamped).await? {
            tracing::info!(requested = %filename, reserved = %stamped, "Name taken, using timestamp suffix");
            return Ok(reservation);
        }

        for n in 1..=MAX_SUFFIX_ATTEMPTS {
            let candidate = format!("{}_{}_{}{}", stem, timestamp, n, ext);
            if let Some(reservation) = self.try_claim(&candidate).await? {
                tracing::info!(requested = %filename, reserved = %candidate, "Name taken, using counter suffix");
                return Ok(reservation);
            }
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free name for '{}' in {}", filename, self.root.display()),
        ))
    }

    async fn try_claim(&self, filename: &str) -> std::io::Result<Option<Reservation>> {
        let path = self.path_for(filename);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => Ok(Some(Reservation {
                filename: filename.to_string(),
                path,
            })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Moves the staged file over its reservation placeholder.
    pub async fn publish(&self, staged: &Path, reservation: &Reservation) -> std::io::Result<()> {
        if let Err(e) = tokio::fs::rename(staged, &reservation.path).await {
            self.release(reservation).await;
            return Err(e);
        }
        tracing::info!(path = %reservation.path.display(), "Saved renamed file");
        Ok(())
    }

    /// Moves a published file back to staging after a failed upload.
    pub async fn unpublish(&self, reservation: &Reservation, staged: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&reservation.path, staged).await
    }

    /// Drops an unused reservation placeholder.
    pub async fn release(&self, reservation: &Reservation) {
        if let Err(e) = tokio::fs::remove_file(&reservation.path).await {
            tracing::warn!(path = %reservation.path.display(), "Failed to release reservation: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_free_name() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputDirectory::new(dir.path());

        let reservation = output.reserve("2023_a_b_c.pdf").await.unwrap();
        assert_eq!(reservation.filename, "2023_a_b_c.pdf");
        assert!(reservation.path.exists());
    }

    #[tokio::test]
    async fn test_reserve_taken_name_gets_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputDirectory::new(dir.path());

        let first = output.reserve("report.pdf").await.unwrap();
        let second = output.reserve("report.pdf").await.unwrap();

        assert_ne!(first.filename, second.filename);
        assert!(second.filename.starts_with("report_"));
        assert!(second.filename.ends_with(".pdf"));
        let stamp = &second.filename["report_".len().."report_".len() + 14];
        assert!(stamp.chars().all(|c| c.is_ascii_digit()), "bad stamp {}", stamp);
        assert!(first.path.exists() && second.path.exists());
    }

    #[tokio::test]
    async fn test_reserve_same_second_uses_counter() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputDirectory::new(dir.path());

        let mut names = Vec::new();
        for _ in 0..4 {
            names.push(output.reserve("x.pdf").await.unwrap().filename);
        }

        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4, "names collided: {:?}", names);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputDirectory::new(dir.path());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let output = output.clone();
                tokio::spawn(async move { output.reserve("same.pdf").await.unwrap().filename })
            })
            .collect();

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[tokio::test]
    async fn test_publish_and_unpublish() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let output = OutputDirectory::new(out.path());

        let staged = staging.path().join("upload.pdf");
        tokio::fs::write(&staged, b"%PDF-body").await.unwrap();

        let reservation = output.reserve("final.pdf").await.unwrap();
        output.publish(&staged, &reservation).await.unwrap();
        assert!(!staged.exists());
        assert_eq!(tokio::fs::read(&reservation.path).await.unwrap(), b"%PDF-body");

        output.unpublish(&reservation, &staged).await.unwrap();
        assert!(staged.exists());
        assert!(!reservation.path.exists());
    }

    #[tokio::test]
    async fn test_publish_missing_source_releases_reservation() {
        let out = tempfile::tempdir().unwrap();
        let output = OutputDirectory::new(out.path());

        let reservation = output.reserve("final.pdf").await.unwrap();
        let missing = out.path().join("nope").join("gone.pdf");
        assert!(output.publish(&missing, &reservation).await.is_err());
        assert!(!reservation.path.exists());
    }
}
