use std::time::Duration;

use anyhow::Context;

use crate::api::MAX_CONTENT_LEN;

const ENV_MAX_CONTENT_LEN: &str = "PARLOR_MAX_CONTENT_LEN";
const ENV_COMMIT_TIMEOUT_MS: &str = "PARLOR_COMMIT_TIMEOUT_MS";
const ENV_JOURNAL_CAPACITY: &str = "PARLOR_JOURNAL_CAPACITY";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncConfig {
    /// Longest accepted comment, in characters
    pub max_content_len: usize,

    /// Deadline for the backend write, `None` waits forever
    pub commit_timeout: Option<Duration>,

    /// Number of applied mutations kept in the journal
    pub journal_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> SyncConfig {
        SyncConfig {
            max_content_len: MAX_CONTENT_LEN,
            commit_timeout: None,
            journal_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Defaults, overridden by whichever `PARLOR_*` environment variables are set
    pub fn from_env() -> anyhow::Result<SyncConfig> {
        let mut res = SyncConfig::default();
        if let Some(len) = read_env(ENV_MAX_CONTENT_LEN)? {
            res.max_content_len = len;
        }
        if let Some(ms) = read_env(ENV_COMMIT_TIMEOUT_MS)? {
            res.commit_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(cap) = read_env(ENV_JOURNAL_CAPACITY)? {
            res.journal_capacity = cap;
        }
        Ok(res)
    }
}

fn read_env<T>(var: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(var) {
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {var} environment variable")),
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("parsing {var} environment variable {v:?}")),
    }
}
