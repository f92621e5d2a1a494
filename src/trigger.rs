//! Storage event parsing and classification.
//!
//! The orchestrator is invoked with object-created notifications. Each
//! record is classified as one of:
//!
//! - an archive (`.zip`, `.tar`, `.tar.gz`, `.tgz`) which starts a new run,
//! - a continuation marker (`.<marker-extension>`) which resumes a run,
//! - anything else, which is ignored. This includes the run's own history
//!   copies under `<startTimeEpochMs>/history/`.

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveFormat;
use crate::constants::HISTORY_SEGMENT;
use crate::store::ObjectLocation;

/// An object storage notification as delivered to the function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageEventRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEventRecord {
    /// Event discriminator, e.g. `ObjectCreated:Put`.
    pub event_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,

    pub s3: StorageEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntity {
    /// URL-encoded object key, spaces as `+`.
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl StorageEventRecord {
    /// Builds an `ObjectCreated:Put` record for `bucket`/`key`, encoding the
    /// key the way storage notifications do.
    pub fn object_created(bucket: impl Into<String>, key: &str) -> Self {
        let encoded = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).replace("%20", "+"))
            .collect::<Vec<_>>()
            .join("/");
        Self {
            event_name: "ObjectCreated:Put".to_string(),
            event_time: None,
            aws_region: None,
            s3: StorageEntity {
                bucket: BucketEntity {
                    name: bucket.into(),
                },
                object: ObjectEntity {
                    key: encoded,
                    size: None,
                },
            },
        }
    }

    /// Decoded location of the object this record refers to.
    pub fn location(&self) -> ObjectLocation {
        let plus_decoded = self.s3.object.key.replace('+', " ");
        let key = urlencoding::decode(&plus_decoded)
            .map(|k| k.into_owned())
            .unwrap_or(plus_decoded);
        ObjectLocation::new(self.s3.bucket.name.clone(), key)
    }

    pub fn is_object_created(&self) -> bool {
        self.event_name.starts_with("ObjectCreated")
    }
}

/// Why a record produced no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IgnoreReason {
    /// Not an object-created event.
    NotObjectCreated,
    /// A history copy written by a previous run start.
    HistoryCopy,
    /// Neither an archive nor a continuation marker.
    UnrecognizedKey,
}

/// What an incoming record asks the engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    NewRun {
        archive: ObjectLocation,
        format: ArchiveFormat,
    },
    Resume {
        marker: ObjectLocation,
    },
    Ignored {
        location: ObjectLocation,
        reason: IgnoreReason,
    },
}

impl Trigger {
    /// Classifies a record given the configured marker extension
    /// (without leading dot).
    ///
    /// # Examples
    ///
    /// ```
    /// use lambduh::trigger::{IgnoreReason, StorageEventRecord, Trigger};
    ///
    /// let record = StorageEventRecord::object_created("deploys", "shop.zip");
    /// assert!(matches!(Trigger::classify(&record, "lambduh.txt"), Trigger::NewRun { .. }));
    ///
    /// let record = StorageEventRecord::object_created(
    ///     "deploys",
    ///     "1700000000000/remainingTasks/00002.lambduh.txt",
    /// );
    /// assert!(matches!(Trigger::classify(&record, "lambduh.txt"), Trigger::Resume { .. }));
    ///
    /// let record = StorageEventRecord::object_created("deploys", "notes.md");
    /// assert!(matches!(
    ///     Trigger::classify(&record, "lambduh.txt"),
    ///     Trigger::Ignored { reason: IgnoreReason::UnrecognizedKey, .. }
    /// ));
    /// ```
    pub fn classify(record: &StorageEventRecord, marker_extension: &str) -> Self {
        let location = record.location();
        if !record.is_object_created() {
            return Self::Ignored {
                location,
                reason: IgnoreReason::NotObjectCreated,
            };
        }
        if location.key.ends_with(&format!(".{marker_extension}")) {
            return Self::Resume { marker: location };
        }
        if is_history_key(&location.key) {
            return Self::Ignored {
                location,
                reason: IgnoreReason::HistoryCopy,
            };
        }
        match ArchiveFormat::from_key(&location.key) {
            Some(format) => Self::NewRun {
                archive: location,
                format,
            },
            None => Self::Ignored {
                location,
                reason: IgnoreReason::UnrecognizedKey,
            },
        }
    }
}

/// `<digits>/history/...`
fn is_history_key(key: &str) -> bool {
    let mut segments = key.split('/');
    let run = segments.next().unwrap_or_default();
    !run.is_empty()
        && run.bytes().all(|b| b.is_ascii_digit())
        && segments.next() == Some(HISTORY_SEGMENT)
}
