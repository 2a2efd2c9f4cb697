use crate::VideoId;

macro_rules! v1_path {
    ($path:literal) => {
        concat!("/api/v1", $path)
    };
}

/// Versioned API route definitions shared by the server and its clients.
pub mod v1 {
    pub const ROOT: &str = "/api/v1";
    pub const VERSION: &str = "v1";
    pub const HEALTH: &str = v1_path!("/health");

    pub mod stream {
        pub const VIDEO: &str = v1_path!("/stream/video/{id}");
        pub(crate) const VIDEO_PREFIX: &str = v1_path!("/stream/video/");
    }

    pub mod videos {
        pub const COLLECTION: &str = v1_path!("/videos");
        pub const ITEM: &str = v1_path!("/videos/{id}");
    }

    pub mod storage {
        pub const STATS: &str = v1_path!("/storage/stats");
        pub const SWEEP: &str = v1_path!("/storage/sweep");
        pub const IMPORT: &str = v1_path!("/storage/import");
    }

    pub mod cache {
        pub const ROOT: &str = v1_path!("/cache");
        pub const STATS: &str = v1_path!("/cache/stats");
        pub const WARM: &str = v1_path!("/cache/warm");
    }
}

/// Path suitable for a `<video src>`, embedding the video id.
pub fn stream_url(id: &VideoId) -> String {
    format!("{}{}", v1::stream::VIDEO_PREFIX, id)
}
