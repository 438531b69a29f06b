//! Static quiz content: question pools per stage and the cluster → domain →
//! role hierarchy used to scope each stage to the previous stage's winner.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::quiz::pipeline::Stage;

// ────────────────────────────────────────────────────────────────────────────
// QuestionPool
// ────────────────────────────────────────────────────────────────────────────

/// Ordered mapping from label to that label's ordered questions.
///
/// Label order is insertion order. Inserting an existing label replaces its
/// questions in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionPool {
    entries: Vec<(String, Vec<String>)>,
}

impl QuestionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, questions: Vec<String>) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some((_, existing)) => *existing = questions,
            None => self.entries.push((label, questions)),
        }
    }

    #[cfg(test)]
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    #[cfg(test)]
    pub fn questions(&self, label: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, q)| q.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, Vec<String>)> {
        self.entries
    }
}

impl<L, Q, S> FromIterator<(L, Q)> for QuestionPool
where
    L: Into<String>,
    Q: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (L, Q)>>(iter: I) -> Self {
        let mut pool = QuestionPool::new();
        for (label, questions) in iter {
            pool.insert(label, questions.into_iter().map(Into::into).collect());
        }
        pool
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QuestionCatalog
// ────────────────────────────────────────────────────────────────────────────

/// Ordered `key → [string]` table as stored in the data files.
pub type OrderedTable = Vec<(String, Vec<String>)>;

pub const CLUSTER_QUESTIONS_FILE: &str = "cluster_questions.json";
pub const DOMAINS_FILE: &str = "domains.json";
pub const DOMAIN_QUESTIONS_FILE: &str = "domain_questions.json";
pub const ROLES_FILE: &str = "roles.json";
pub const ROLE_QUESTIONS_FILE: &str = "role_questions.json";

#[derive(Debug, Clone, Default)]
pub struct QuestionCatalog {
    pub cluster_questions: OrderedTable,
    /// cluster → domains
    pub domains: OrderedTable,
    pub domain_questions: OrderedTable,
    /// domain → roles
    pub roles: OrderedTable,
    pub role_questions: OrderedTable,
}

impl QuestionCatalog {
    /// Loads all five content files from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let catalog = Self {
            cluster_questions: read_table(&dir.join(CLUSTER_QUESTIONS_FILE))?,
            domains: read_table(&dir.join(DOMAINS_FILE))?,
            domain_questions: read_table(&dir.join(DOMAIN_QUESTIONS_FILE))?,
            roles: read_table(&dir.join(ROLES_FILE))?,
            role_questions: read_table(&dir.join(ROLE_QUESTIONS_FILE))?,
        };
        info!(
            "Loaded quiz catalog from {}: {} clusters, {} domains, {} roles",
            dir.display(),
            catalog.cluster_questions.len(),
            catalog.domain_questions.len(),
            catalog.role_questions.len()
        );
        Ok(catalog)
    }

    /// Stage 1 pool: every cluster.
    pub fn cluster_pool(&self) -> QuestionPool {
        self.cluster_questions.iter().cloned().collect()
    }

    /// Stage 2 pool: the domains listed under `cluster`.
    pub fn domain_pool(&self, cluster: &str) -> QuestionPool {
        scoped_pool(&self.domains, &self.domain_questions, cluster)
    }

    /// Stage 3 pool: the roles listed under `domain`.
    pub fn role_pool(&self, domain: &str) -> QuestionPool {
        scoped_pool(&self.roles, &self.role_questions, domain)
    }

    /// Pool for `stage`, scoped by the previous stage's winner where relevant.
    pub fn pool_for(&self, stage: Stage, parent: Option<&str>) -> QuestionPool {
        match (stage, parent) {
            (Stage::Cluster, _) => self.cluster_pool(),
            (Stage::Domain, Some(cluster)) => self.domain_pool(cluster),
            (Stage::Role, Some(domain)) => self.role_pool(domain),
            _ => QuestionPool::new(),
        }
    }
}

/// Builds a pool over the children listed for `parent`, in listed order.
/// Children without a question list get an empty pool; an unknown parent
/// gives an empty pool.
fn scoped_pool(hierarchy: &OrderedTable, questions: &OrderedTable, parent: &str) -> QuestionPool {
    let Some((_, children)) = hierarchy.iter().find(|(p, _)| p == parent) else {
        warn!("No children defined for '{parent}'");
        return QuestionPool::new();
    };

    let mut pool = QuestionPool::new();
    for child in children {
        let child_questions = lookup(questions, child).unwrap_or_default();
        if child_questions.is_empty() {
            warn!("No questions defined for '{child}' under '{parent}'");
        }
        pool.insert(child.clone(), child_questions);
    }
    pool
}

fn lookup(table: &OrderedTable, key: &str) -> Option<Vec<String>> {
    table.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

fn read_table(path: &Path) -> Result<OrderedTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read quiz data file '{}'", path.display()))?;
    parse_table(&raw).with_context(|| format!("Invalid quiz data file '{}'", path.display()))
}

/// Parses a JSON object of string arrays, keeping key order.
pub fn parse_table(raw: &str) -> Result<OrderedTable> {
    let object: Map<String, Value> = serde_json::from_str(raw)?;
    object
        .into_iter()
        .map(|(key, value)| -> Result<(String, Vec<String>)> {
            let items = serde_json::from_value::<Vec<String>>(value)
                .with_context(|| format!("Entry '{key}' must be an array of strings"))?;
            Ok((key, items))
        })
        .collect()
}
