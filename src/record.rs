use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One extracted item: the page it came from plus its named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source: String,
    #[serde(flatten)]
    pub fields: IndexMap<String, Option<String>>,
}

impl Record {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.as_deref()
    }

    /// Cells in `columns` order, missing values as empty strings.
    pub fn row<'a>(&'a self, columns: &[String]) -> Vec<&'a str> {
        std::iter::once(self.source.as_str())
            .chain(columns.iter().map(|c| self.get(c).unwrap_or("")))
            .collect()
    }
}
