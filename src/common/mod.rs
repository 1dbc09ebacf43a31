pub const VALID_VIDEO_EXTENSIONS: &'static [&'static str] = &[
    "mp4", "webm", "mkv", "mov", "avi", "flv", "wmv", "mpeg", "mpg", "m4v", "3gp",
];

pub const MAX_DELETE_ATTEMPTS: u64 = 5;

/// The periodic full sweep leaves files younger than this alone so it never
/// reaps an output that a running job is still writing. The operator-triggered
/// cleanup-all applies no such window.
pub const SWEEP_STABILITY_SECS: u64 = 60;

pub const UPLOADS_ROUTE: &'static str = "/uploads";

pub const REVERSED_ROUTE: &'static str = "/reversed_videos";
