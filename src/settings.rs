use crate::{
    document_db::DocumentDb,
    embedding::{DEFAULT_DIMENSION, HashEmbedder},
    error::{Error, Result},
    ranking::{DEFAULT_LIMIT, DEFAULT_THRESHOLD, RankParams},
};

pub const DIMENSION_ENV_VAR: &str = "KBSEARCH_DIMENSION";
pub const THRESHOLD_ENV_VAR: &str = "KBSEARCH_THRESHOLD";
pub const LIMIT_ENV_VAR: &str = "KBSEARCH_LIMIT";

/// Keys of the persisted settings table.
pub mod keys {
    pub const DIMENSION: &str = "embedding_dimension";
    pub const THRESHOLD: &str = "default_threshold";
    pub const LIMIT: &str = "default_limit";

    pub const ALL: &[&str] = &[DIMENSION, THRESHOLD, LIMIT];
}

/// Deployment-wide search configuration.
///
/// Resolved once at startup and passed explicitly to the embedding and
/// ranking code; nothing below this layer reads the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub dimension: usize,
    pub threshold: f32,
    pub limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchSettings {
    /// Resolve each setting from, in order of priority:
    /// 1. Its environment variable (`KBSEARCH_DIMENSION`, ...)
    /// 2. The settings table in `documents.redb`
    /// 3. The built-in default
    pub fn resolve(db: &DocumentDb) -> Result<Self> {
        Self::resolve_with(db, |name| std::env::var(name).ok())
    }

    /// Like [`SearchSettings::resolve`] with an injectable environment.
    pub fn resolve_with(
        db: &DocumentDb,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |var: &str, key: &str| -> Result<Option<String>> {
            match env(var) {
                Some(value) => Ok(Some(value)),
                None => db.get_setting(key),
            }
        };

        let defaults = Self::default();
        let settings = Self {
            dimension: match lookup(DIMENSION_ENV_VAR, keys::DIMENSION)? {
                Some(v) => parse_setting(keys::DIMENSION, &v)?,
                None => defaults.dimension,
            },
            threshold: match lookup(THRESHOLD_ENV_VAR, keys::THRESHOLD)? {
                Some(v) => parse_setting(keys::THRESHOLD, &v)?,
                None => defaults.threshold,
            },
            limit: match lookup(LIMIT_ENV_VAR, keys::LIMIT)? {
                Some(v) => parse_setting(keys::LIMIT, &v)?,
                None => defaults.limit,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::Config(format!(
                "{} must be at least 1",
                keys::DIMENSION
            )));
        }
        if self.threshold.is_nan() {
            return Err(Error::Config(format!(
                "{} must be a number",
                keys::THRESHOLD
            )));
        }
        Ok(())
    }

    /// Validate and persist a single setting.
    pub fn store(db: &DocumentDb, key: &str, value: &str) -> Result<()> {
        match key {
            keys::DIMENSION => {
                let dimension: usize = parse_setting(key, value)?;
                if dimension == 0 {
                    return Err(Error::Config(format!(
                        "{key} must be at least 1"
                    )));
                }
            }
            keys::THRESHOLD => {
                let threshold: f32 = parse_setting(key, value)?;
                if threshold.is_nan() {
                    return Err(Error::Config(format!(
                        "{key} must be a number"
                    )));
                }
            }
            keys::LIMIT => {
                parse_setting::<usize>(key, value)?;
            }
            _ => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key.to_string(),
                });
            }
        }
        db.set_setting(key, value)
    }

    pub fn embedder(&self) -> Result<HashEmbedder> {
        HashEmbedder::new(self.dimension)
    }

    pub fn rank_params(&self) -> RankParams {
        RankParams {
            threshold: self.threshold,
            limit: self.limit,
        }
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("invalid value for {key}: {value:?}"))
    })
}
