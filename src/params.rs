// src/params.rs

// Net
pub const USER_AGENT: &str = "sitenav/0.3";
pub const TIMEOUT_SECS: u64 = 15;
pub const MAX_REDIRECTS: u32 = 5;

// Retry defaults. Tuned against one site; override per SiteConfig.
pub const MAX_RETRIES: u32 = 10;
pub const MAX_DELAY_SECS: u64 = 10;

// CLI
pub const PASSWORD_ENV: &str = "SITENAV_PASSWORD";
