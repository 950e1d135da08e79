//! Typed parsing of the query parameters the dispatcher understands.

use crate::error::StoreError;

/// Parsed query string of a client request.
///
/// `dir`, `recursive`, and `transient` are value-less flags; `wait` and
/// `version` take integers. Anything else is a `bad query parameter`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Query {
    pub dir: bool,
    pub recursive: bool,
    pub transient: bool,
    pub wait: Option<u64>,
    pub version: Option<i64>,
}

impl Query {
    /// Parse a raw (undecoded) query string. `None` and `""` parse to the
    /// default query.
    pub fn parse(raw: Option<&str>) -> Result<Self, StoreError> {
        let mut query = Query::default();
        let Some(raw) = raw else {
            return Ok(query);
        };

        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                None => match pair {
                    "dir" => query.dir = true,
                    "recursive" => query.recursive = true,
                    "transient" => query.transient = true,
                    _ => return Err(StoreError::BadQuery),
                },
                Some((key, value)) => match key {
                    "wait" => {
                        let wait = value.parse().map_err(|_| StoreError::BadQuery)?;
                        query.wait = Some(wait);
                    }
                    "version" => {
                        let version: i64 = value.parse().map_err(|_| StoreError::BadQuery)?;
                        if version < -1 {
                            return Err(StoreError::BadQuery);
                        }
                        query.version = Some(version);
                    }
                    _ => return Err(StoreError::BadQuery),
                },
            }
        }

        Ok(query)
    }
}
