/// Constants describing request log rows and their normalization.
pub mod requests {
    /// Source table holding the raw access log.
    pub const REQUEST_LOG_TABLE: &str = "requestlog";
    /// Textual timestamp layout used by every timestamp column.
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    /// Parse layout accepting optional fractional seconds.
    pub const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
    /// Sentinel for absent path, cookie, and referer values.
    pub const NONE_SENTINEL: &str = "(none)";
    /// Sentinel for absent source address and user agent values.
    pub const UNSPECIFIED_SENTINEL: &str = "(unspecified)";
    /// Synthetic traffic excluded from every request query.
    ///
    /// Entries match as substrings, ASCII case-insensitive.
    pub const DEFAULT_USER_AGENT_DENYLIST: &[&str] = &[
        "GoogleBot",
        "Pingdom",
        "ApacheBench",
        "bingbot",
        "YandexBot",
        "SISTRIX Crawler",
    ];
    /// Default bounded queue capacity between a row producer and its consumer.
    pub const DEFAULT_BUFFER_SIZE: usize = 1000;
}

/// Constants used by identity extraction rules.
pub mod extraction {
    /// Path rule: optional locale/segment prefix, then `welcome/<name>`.
    pub const WELCOME_PATH_PATTERN: &str =
        r"^/(?:[^/?#]+/)?welcome/([A-Za-z0-9_.-]+)(?:[/?#]|$)";
    /// Cookie rule: login marker, 40 hex chars of signature, name up to `!`.
    pub const LOGIN_COOKIE_PATTERN: &str = r#"adhocracy_login="?[0-9a-fA-F]{40}([^!]+)!"#;
}

/// Constants used by the derived attribution table.
pub mod attribution {
    /// Default name of the request→user table.
    pub const DEFAULT_TABLE: &str = "analysis_request_user";
    /// Prefix every derived table name must carry.
    pub const DERIVED_TABLE_PREFIX: &str = "analysis_";
    /// Column definitions of the request→user table.
    pub const SCHEMA: &str = "request_id INTEGER PRIMARY KEY NOT NULL, user_id INTEGER NOT NULL";
}

/// Constants used by the activity aggregation.
pub mod activity {
    /// `delegateable.type` value identifying top-level proposals.
    pub const PROPOSAL_TYPE: &str = "proposal";
    /// Lower sentinel of the all-time range.
    pub const ALL_TIME_START: &str = "0001-01-01 00:00:00";
    /// Upper sentinel of the all-time range (inclusive).
    pub const ALL_TIME_END: &str = "9999-12-31 23:59:59";
}

/// Constants used by configuration loading and the CLI.
pub mod config {
    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = ".config.json";
    /// Fallback label for users holding none of the preferred badges.
    pub const DEFAULT_STATUS_GROUP: &str = "Sonstige";
}

/// Constants used by stream failure reporting.
pub mod stream {
    /// Reason reported when the producer thread panicked.
    pub const PRODUCER_PANICKED_REASON: &str = "producer thread panicked";
}
