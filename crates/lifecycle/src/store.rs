//! Durable rule storage: one JSON file holding every rule.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;
use uuid::Uuid;

use l2m_core::error::{L2mError, Result};
use l2m_core::rule::MetricRule;

/// JSON-file store for [`MetricRule`] records.
///
/// The whole collection is one pretty-printed file, read and rewritten on
/// every mutation. Rule counts stay small (tens, not thousands), and the
/// file doubles as a human-readable inventory. A store-wide lock keeps
/// concurrent whole-file rewrites from clobbering each other; ordering of
/// writes to any single rule is the lifecycle manager's job.
pub struct RuleStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Result<Vec<MetricRule>> {
        let _io = self.lock();
        self.load()
    }

    pub fn get(&self, id: Uuid) -> Result<Option<MetricRule>> {
        let _io = self.lock();
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    /// Add a new rule. The id must not already be present.
    pub fn insert(&self, rule: &MetricRule) -> Result<()> {
        let _io = self.lock();
        let mut rules = self.load()?;
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(L2mError::Invariant(format!(
                "duplicate rule id {}",
                rule.id
            )));
        }
        rules.push(rule.clone());
        self.save(&rules)?;
        info!("Stored rule {} '{}'", rule.id, rule.name);
        Ok(())
    }

    /// Replace the stored record with the same id.
    pub fn update(&self, rule: &MetricRule) -> Result<()> {
        let _io = self.lock();
        let mut rules = self.load()?;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(slot) => *slot = rule.clone(),
            None => return Err(L2mError::RuleNotFound(rule.id)),
        }
        self.save(&rules)
    }

    /// Remove a rule, reporting whether it was there at all.
    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let _io = self.lock();
        let mut rules = self.load()?;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Ok(false);
        }
        self.save(&rules)?;
        info!("Removed rule {}", id);
        Ok(true)
    }

    fn load(&self) -> Result<Vec<MetricRule>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, rules: &[MetricRule]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(rules)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // Every write is a whole-file rewrite, so a guard recovered from
        // a poisoned lock still protects a consistent file.
        self.io.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use l2m_core::rule::{
        ComputeKind, ComputeSpec, MetricRule, RuleGrouping, RuleSource, RuleStatus,
    };

    fn sample_rule(name: &str) -> MetricRule {
        let now = Utc::now();
        MetricRule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner: "sre".to_string(),
            source: RuleSource {
                index_pattern: "app-logs*".to_string(),
                time_field: "timestamp".to_string(),
                filter: None,
            },
            grouping: RuleGrouping::default(),
            compute: ComputeSpec {
                kind: ComputeKind::Count,
                value_field: None,
                percentiles: None,
            },
            retention_days: 450,
            origin: None,
            status: RuleStatus::Draft,
            resources: None,
            last_error: None,
            guardrail_override: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn insert_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let rule = sample_rule("error rate");

        RuleStore::new(&path).insert(&rule).unwrap();

        let reopened = RuleStore::new(&path);
        let found = reopened.get(rule.id).unwrap().unwrap();
        assert_eq!(found, rule);
        assert_eq!(reopened.list().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        let rule = sample_rule("error rate");

        store.insert(&rule).unwrap();
        let err = store.insert(&rule).unwrap_err();
        assert!(matches!(err, L2mError::Invariant(_)));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn update_replaces_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        let mut rule = sample_rule("error rate");
        store.insert(&rule).unwrap();

        rule.status = RuleStatus::Active;
        rule.name = "error rate by service".to_string();
        store.update(&rule).unwrap();

        let found = store.get(rule.id).unwrap().unwrap();
        assert_eq!(found.status, RuleStatus::Active);
        assert_eq!(found.name, "error rate by service");
    }

    #[test]
    fn update_of_an_unknown_rule_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        let rule = sample_rule("error rate");

        let err = store.update(&rule).unwrap_err();
        assert!(matches!(err, L2mError::RuleNotFound(id) if id == rule.id));
    }

    #[test]
    fn remove_reports_whether_anything_was_there() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        let rule = sample_rule("error rate");
        store.insert(&rule).unwrap();

        assert!(store.remove(rule.id).unwrap());
        assert!(!store.remove(rule.id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn nested_data_dir_is_created_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("deep").join("rules.json");
        let store = RuleStore::new(&path);

        store.insert(&sample_rule("error rate")).unwrap();
        assert!(path.exists());
    }
}
