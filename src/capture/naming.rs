//! Snapshot file naming.
//!
//! The engine writes wherever it is told; this helper gives collaborators
//! the appliance's naming scheme: `<dir>/<id1>_<id2>_<timestamp>.jpg`, or
//! `<dir>/<timestamp>.jpg` when no identifiers are supplied.

use crate::config::ConfigError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Default directory for captured images.
pub const DEFAULT_IMAGES_DIR: &str = "./captured_images";

/// Default chrono format for the timestamp part of a name.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Destination chosen for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub path: PathBuf,
    /// The formatted capture time embedded in the file name.
    pub timestamp: String,
}

/// Builds snapshot paths from identifiers and the capture time.
#[derive(Debug, Clone)]
pub struct SnapshotNamer {
    directory: PathBuf,
    datetime_format: String,
}

impl Default for SnapshotNamer {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_IMAGES_DIR),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

/// Rejects strftime patterns chrono cannot render.
pub fn check_datetime_format(format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidValue {
            key: "DATETIME_FORMAT",
            value: format.to_string(),
        });
    }
    Ok(())
}

impl SnapshotNamer {
    pub fn new(
        directory: impl Into<PathBuf>,
        datetime_format: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let datetime_format = datetime_format.into();
        check_datetime_format(&datetime_format)?;
        Ok(Self {
            directory: directory.into(),
            datetime_format,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Names a snapshot taken now.
    pub fn next<I, S>(&self, ids: I) -> SnapshotName
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.path_for(ids, &Local::now())
    }

    /// Names a snapshot taken at `when`.
    pub fn path_for<I, S, Tz>(&self, ids: I, when: &DateTime<Tz>) -> SnapshotName
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let mut timestamp = String::new();
        if write!(timestamp, "{}", when.format(&self.datetime_format)).is_err() {
            // A pattern that never went through `new` may not render.
            tracing::warn!(format = %self.datetime_format, "Timestamp format failed, using default");
            timestamp.clear();
            let _ = write!(timestamp, "{}", when.format(DEFAULT_DATETIME_FORMAT));
        }
        let joined = ids
            .into_iter()
            .map(|id| sanitize(id.as_ref()))
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>()
            .join("_");

        let stem = if joined.is_empty() {
            timestamp.clone()
        } else {
            format!("{}_{}", joined, timestamp)
        };

        SnapshotName {
            path: self.directory.join(format!("{}.jpg", sanitize(&stem))),
            timestamp,
        }
    }
}

/// Returns a `file://` URI for `path`, made absolute against the current
/// directory.
pub fn file_uri(path: &Path) -> std::io::Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(format!("file://{}", absolute.display()))
}

/// Keeps identifiers and timestamps from escaping the images directory.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_ids_joined_with_timestamp() {
        let namer = SnapshotNamer::new("/data/images", DEFAULT_DATETIME_FORMAT).unwrap();
        let name = namer.path_for(["door", "42"], &fixed_time());

        assert_eq!(name.timestamp, "2024-03-09T14:05:07");
        assert_eq!(
            name.path,
            PathBuf::from("/data/images/door_42_2024-03-09T14:05:07.jpg")
        );
    }

    #[test]
    fn test_no_ids_uses_timestamp_only() {
        let namer = SnapshotNamer::new("imgs", "%Y%m%d-%H%M%S").unwrap();
        let name = namer.path_for(Vec::<String>::new(), &fixed_time());
        assert_eq!(name.path, PathBuf::from("imgs/20240309-140507.jpg"));
    }

    #[test]
    fn test_empty_ids_are_skipped() {
        let namer = SnapshotNamer::new("imgs", "%H%M").unwrap();
        let name = namer.path_for(["", "cam"], &fixed_time());
        assert_eq!(name.path, PathBuf::from("imgs/cam_1405.jpg"));
    }

    #[test]
    fn test_separators_cannot_escape_directory() {
        let namer = SnapshotNamer::new("imgs", "%Y/%m/%d").unwrap();
        let name = namer.path_for(["../etc"], &fixed_time());
        assert_eq!(name.path.parent(), Some(Path::new("imgs")));
    }

    #[test]
    fn test_file_uri_is_absolute() {
        let uri = file_uri(Path::new("captured_images/a.jpg")).unwrap();
        assert!(uri.starts_with("file:///"));
        assert!(uri.ends_with("captured_images/a.jpg"));

        assert_eq!(file_uri(Path::new("/tmp/x.jpg")).unwrap(), "file:///tmp/x.jpg");
    }

    #[test]
    fn test_unrenderable_format_rejected() {
        assert!(matches!(
            SnapshotNamer::new("imgs", "%Q"),
            Err(ConfigError::InvalidValue { key: "DATETIME_FORMAT", .. })
        ));
        assert!(check_datetime_format("%Y-%m-%d %").is_err());
        assert!(check_datetime_format(DEFAULT_DATETIME_FORMAT).is_ok());
    }

    #[test]
    fn test_unchecked_format_falls_back_to_default() {
        let namer = SnapshotNamer {
            directory: PathBuf::from("imgs"),
            datetime_format: "%Q".to_string(),
        };
        let name = namer.path_for(["door"], &fixed_time());
        assert_eq!(name.timestamp, "2024-03-09T14:05:07");
        assert_eq!(name.path, PathBuf::from("imgs/door_2024-03-09T14:05:07.jpg"));

        // Naming at the current time must not panic either.
        let _ = namer.next(std::iter::empty::<&str>());
    }
}
