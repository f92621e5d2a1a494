//! Key layout and protocol constants.

/// Service name used in notification subjects.
pub const SERVICE_NAME: &str = "Lambduh";

/// Default extension of continuation marker objects.
pub const DEFAULT_MARKER_EXTENSION: &str = "lambduh.txt";

/// Default name of the deployment document at the archive root.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "lambduh.json";

/// Path segment holding continuation records under a run prefix.
pub const REMAINING_TASKS_SEGMENT: &str = "remainingTasks";

/// Path segment holding the archived raw input under a run prefix.
pub const HISTORY_SEGMENT: &str = "history";

/// Zero-padding width of the invocation index in continuation keys.
pub const INVOCATION_INDEX_WIDTH: usize = 5;

/// Maximum keys accepted by a single S3 `DeleteObjects` request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// List-and-delete passes over a run prefix before cleanup gives up.
pub const CLEANUP_PASSES: usize = 3;

/// Maximum length of an SNS message subject.
pub const MAX_SUBJECT_LENGTH: usize = 100;
