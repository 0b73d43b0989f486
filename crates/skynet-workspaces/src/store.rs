//! Workspace CRUD over YAML files under `.parachute/workspaces/{slug}/config.yaml`.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use skynet_capabilities::trust::normalize;

use crate::error::WorkspaceError;
use crate::model::{WorkspaceConfig, WorkspaceCreate, WorkspaceUpdate};

const WORKSPACES_DIR: &str = ".parachute/workspaces";

/// Reject slugs containing path separators, `..`, or anything outside
/// `[a-z0-9-]` (must start and end with an alphanumeric), so a workspace
/// slug can never be used to escape the workspaces directory.
pub fn validate_slug(slug: &str) -> Result<(), WorkspaceError> {
    let bytes = slug.as_bytes();
    let valid = !bytes.is_empty()
        && bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-';
    if !valid {
        return Err(WorkspaceError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("workspace");
    }
    slug
}

/// Derive a unique slug from a display name, resolving collisions with a
/// numeric suffix starting at 2 (`my-project`, `my-project-2`, ...).
pub fn generate_slug(name: &str, existing: &[String]) -> String {
    let base = slugify(name);
    if !existing.iter().any(|s| s == &base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.iter().any(|s| s == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

pub struct WorkspaceStore {
    vault_path: PathBuf,
}

impl WorkspaceStore {
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self {
            vault_path: vault_path.into(),
        }
    }

    fn workspaces_dir(&self) -> PathBuf {
        self.vault_path.join(WORKSPACES_DIR)
    }

    fn config_path(&self, slug: &str) -> PathBuf {
        self.workspaces_dir().join(slug).join("config.yaml")
    }

    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceConfig>, WorkspaceError> {
        let dir = self.workspaces_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let slug = entry.file_name().to_string_lossy().to_string();
            if validate_slug(&slug).is_err() {
                continue;
            }
            if let Ok(cfg) = self.load(&slug) {
                out.push(cfg);
            }
        }
        out.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(out)
    }

    pub fn existing_slugs(&self) -> Result<Vec<String>, WorkspaceError> {
        Ok(self.list_workspaces()?.into_iter().map(|w| w.slug).collect())
    }

    pub fn get_workspace(&self, slug: &str) -> Result<WorkspaceConfig, WorkspaceError> {
        validate_slug(slug)?;
        self.load(slug)
    }

    pub fn create_workspace(
        &self,
        create: WorkspaceCreate,
    ) -> Result<WorkspaceConfig, WorkspaceError> {
        let existing = self.existing_slugs()?;
        let slug = match create.slug {
            Some(slug) => {
                validate_slug(&slug)?;
                if existing.iter().any(|s| s == &slug) {
                    return Err(WorkspaceError::AlreadyExists(slug));
                }
                slug
            }
            None => generate_slug(&create.name, &existing),
        };
        let now = Utc::now();
        let cfg = WorkspaceConfig {
            slug: slug.clone(),
            name: create.name,
            description: create.description,
            working_directory: create.working_directory,
            default_trust_level: normalize(&create.default_trust_level)?,
            capabilities: create.capabilities,
            sandbox: create.sandbox,
            created_at: now,
            updated_at: now,
        };
        let dir = self.workspaces_dir().join(&slug);
        fs::create_dir_all(&dir)?;
        self.write(&cfg)?;
        Ok(cfg)
    }

    pub fn update_workspace(
        &self,
        slug: &str,
        update: WorkspaceUpdate,
    ) -> Result<WorkspaceConfig, WorkspaceError> {
        let mut cfg = self.get_workspace(slug)?;
        if let Some(name) = update.name {
            cfg.name = name;
        }
        if let Some(description) = update.description {
            cfg.description = Some(description);
        }
        if let Some(wd) = update.working_directory {
            cfg.working_directory = wd;
        }
        if let Some(trust) = update.default_trust_level {
            cfg.default_trust_level = normalize(&trust)?;
        }
        if let Some(caps) = update.capabilities {
            cfg.capabilities = caps;
        }
        if let Some(sandbox) = update.sandbox {
            cfg.sandbox = sandbox;
        }
        cfg.updated_at = Utc::now();
        self.write(&cfg)?;
        Ok(cfg)
    }

    pub fn delete_workspace(&self, slug: &str) -> Result<(), WorkspaceError> {
        validate_slug(slug)?;
        let dir = self.workspaces_dir().join(slug);
        if !dir.is_dir() {
            return Err(WorkspaceError::NotFound(slug.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    fn load(&self, slug: &str) -> Result<WorkspaceConfig, WorkspaceError> {
        let path = self.config_path(slug);
        let raw = fs::read_to_string(&path).map_err(|_| WorkspaceError::NotFound(slug.to_string()))?;
        let mut value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        migrate_legacy_trust_field(&mut value);
        let cfg: WorkspaceConfig = serde_yaml::from_value(value)?;
        Ok(cfg)
    }

    fn write(&self, cfg: &WorkspaceConfig) -> Result<(), WorkspaceError> {
        let path = self.config_path(&cfg.slug);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(cfg)?;
        fs::write(path, yaml)?;
        Ok(())
    }
}

/// Older workspace configs stored the trust level under `trust_level`
/// rather than `default_trust_level`. Migrate on load so the field can be
/// renamed without a one-shot file-rewrite migration.
fn migrate_legacy_trust_field(value: &mut serde_yaml::Value) {
    if let serde_yaml::Value::Mapping(map) = value {
        let legacy_key = serde_yaml::Value::String("trust_level".to_string());
        let canonical_key = serde_yaml::Value::String("default_trust_level".to_string());
        if !map.contains_key(&canonical_key) {
            if let Some(legacy) = map.remove(&legacy_key) {
                map.insert(canonical_key, legacy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("My Project!!"), "my-project");
        assert_eq!(slugify("  leading"), "leading");
    }

    #[test]
    fn generate_slug_resolves_collision() {
        let existing = vec!["demo".to_string(), "demo-2".to_string()];
        assert_eq!(generate_slug("Demo", &existing), "demo-3");
    }

    #[test]
    fn validate_slug_rejects_traversal() {
        assert!(validate_slug("../etc").is_err());
        assert!(validate_slug("a/b").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn create_list_get_update_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path());
        let created = store
            .create_workspace(WorkspaceCreate {
                name: "Demo Space".to_string(),
                slug: None,
                description: None,
                working_directory: "/vault/demo".to_string(),
                default_trust_level: "trusted".to_string(),
                capabilities: Default::default(),
                sandbox: Default::default(),
            })
            .unwrap();
        assert_eq!(created.slug, "demo-space");
        assert_eq!(
            created.default_trust_level,
            skynet_capabilities::TrustLevel::Direct
        );

        let listed = store.list_workspaces().unwrap();
        assert_eq!(listed.len(), 1);

        let fetched = store.get_workspace("demo-space").unwrap();
        assert_eq!(fetched.working_directory, "/vault/demo");

        let updated = store
            .update_workspace(
                "demo-space",
                WorkspaceUpdate {
                    working_directory: Some("/vault/demo2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.working_directory, "/vault/demo2");

        store.delete_workspace("demo-space").unwrap();
        assert!(store.get_workspace("demo-space").is_err());
    }

    #[test]
    fn legacy_trust_level_field_migrates_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path());
        let ws_dir = dir.path().join(WORKSPACES_DIR).join("legacy");
        fs::create_dir_all(&ws_dir).unwrap();
        fs::write(
            ws_dir.join("config.yaml"),
            "slug: legacy\nname: Legacy\nworking_directory: /vault\ntrust_level: vault\ncreated_at: 2024-01-01T00:00:00Z\nupdated_at: 2024-01-01T00:00:00Z\n",
        )
        .unwrap();
        let cfg = store.get_workspace("legacy").unwrap();
        assert_eq!(cfg.default_trust_level, skynet_capabilities::TrustLevel::Direct);
    }
}
