//! Rendering of historian query-language statements.

mod builder;
mod model;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use builder::QueryBuilder;
pub use model::{Aggregation, EpisodeFilter, FillPolicy, GroupBy, MathFunction};

/// A fully rendered statement and the database it runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    database: String,
    text: String,
}

impl Query {
    pub fn new(database: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            text: text.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
