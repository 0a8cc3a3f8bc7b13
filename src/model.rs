use serde::{Deserialize, Serialize};

/// Registry metadata for one package, obtained fresh per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub versions: Vec<PublishedVersion>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedVersion {
    pub num: String,
    pub dl_path: String, // relative to the registry base URL
}

/// Dependency-change summary document consumed in batch mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSummary {
    #[serde(rename = "target-packages", default)]
    pub target_packages: Option<PackageChanges>,
    #[serde(rename = "host-packages", default)]
    pub host_packages: Option<PackageChanges>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageChanges {
    #[serde(default)]
    pub changed: Option<Vec<DependencyChangeRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyChangeRecord {
    pub name: String,
    pub change: String, // "modified", "added", "removed"
    #[serde(rename = "old-version", default)]
    pub old_version: Option<String>,
    pub version: String,
    // Present when the dependency lives inside the workspace rather than on the registry
    #[serde(rename = "workspace-path", default)]
    pub workspace_path: Option<String>,
    // True when the dependency is sourced from the public registry
    #[serde(rename = "crates-io", default)]
    pub crates_io: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_parses_full_document() {
        let raw = r#"{
            "target-packages": {
                "changed": [
                    {
                        "name": "beta",
                        "change": "modified",
                        "old-version": "2.0.0",
                        "version": "2.1.0",
                        "crates-io": true
                    }
                ]
            },
            "host-packages": {
                "changed": [
                    {
                        "name": "local-helper",
                        "change": "modified",
                        "old-version": "0.1.0",
                        "version": "0.2.0",
                        "workspace-path": "tools/local-helper"
                    }
                ]
            }
        }"#;

        let summary: ChangeSummary = serde_json::from_str(raw).unwrap();
        let target = summary.target_packages.unwrap().changed.unwrap();
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].name, "beta");
        assert_eq!(target[0].old_version.as_deref(), Some("2.0.0"));
        assert!(target[0].crates_io);
        assert!(target[0].workspace_path.is_none());

        let host = summary.host_packages.unwrap().changed.unwrap();
        assert_eq!(host[0].workspace_path.as_deref(), Some("tools/local-helper"));
        // crates-io absent defaults to false
        assert!(!host[0].crates_io);
    }

    #[test]
    fn test_summary_sections_are_optional() {
        let summary: ChangeSummary = serde_json::from_str("{}").unwrap();
        assert!(summary.target_packages.is_none());
        assert!(summary.host_packages.is_none());

        let summary: ChangeSummary = serde_json::from_str(r#"{"target-packages": {}}"#).unwrap();
        assert!(summary.target_packages.unwrap().changed.is_none());
    }

    #[test]
    fn test_record_without_old_version() {
        let raw = r#"{"name": "gamma", "change": "added", "version": "1.0.0"}"#;
        let record: DependencyChangeRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.change, "added");
        assert!(record.old_version.is_none());
        assert!(!record.crates_io);
    }
}
