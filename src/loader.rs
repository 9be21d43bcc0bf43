//! Reading build inputs from files.
//!
//! Topology, storage policy groups and host group tables are JSON. Weights
//! and exclusions are JSON too, or the simpler line formats:
//!
//! ```text
//! # weights                # exclusions
//! rack1 2.0                s7
//! s4    0.5                rack2
//! ```

use crate::error::{Error, Result};
use crate::topology::{ExclusionSet, HostGroupTable, StoragePolicyGroup, Topology, WeightSpecification};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Failed to read input file");
        Error::Io(e)
    })
}

fn parse_json<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Parse {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn load_topology(path: &Path) -> Result<Topology> {
    let topology: Topology = parse_json(path, &read(path)?)?;
    tracing::debug!(path = %path.display(), nodes = topology.node_count(), "Loaded topology");
    Ok(topology)
}

pub fn load_policy_group(path: &Path) -> Result<StoragePolicyGroup> {
    let group: StoragePolicyGroup = parse_json(path, &read(path)?)?;
    tracing::debug!(path = %path.display(), policies = group.len(), "Loaded storage policy group");
    Ok(group)
}

pub fn load_host_group_table(path: &Path) -> Result<HostGroupTable> {
    let table: HostGroupTable = parse_json(path, &read(path)?)?;
    tracing::debug!(path = %path.display(), groups = table.len(), "Loaded host group table");
    Ok(table)
}

/// Weights as a JSON object or in the `<id> <weight>` line format.
pub fn load_weights(path: &Path) -> Result<WeightSpecification> {
    let text = read(path)?;
    let weights = if text.trim_start().starts_with('{') {
        let weights: WeightSpecification = parse_json(path, &text)?;
        weights.validate().map_err(|e| Error::Parse {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        weights
    } else {
        WeightSpecification::parse_lines(&path.display().to_string(), &text)?
    };
    Ok(weights)
}

/// Exclusions as a JSON array or one id per line.
pub fn load_exclusions(path: &Path) -> Result<ExclusionSet> {
    let text = read(path)?;
    let exclusions = if text.trim_start().starts_with('[') {
        parse_json(path, &text)?
    } else {
        ExclusionSet::parse_lines(&text)?
    };
    tracing::debug!(path = %path.display(), excluded = exclusions.len(), "Loaded exclusions");
    Ok(exclusions)
}

/// Split a comma-separated host group list, dropping blanks.
pub fn parse_host_groups(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeClass;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_topology() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "topology.json",
            r#"{"intermediate": {"id": "rack1", "class": "rack", "children": [
                {"server": {"id": "s1"}},
                {"server": {"id": "s2"}}
            ]}}"#,
        );

        let topology = load_topology(&path).unwrap();
        assert_eq!(topology.root().class(), NodeClass::Rack);
        assert_eq!(topology.servers(), vec!["s1", "s2"]);
    }

    #[test]
    fn test_duplicate_ids_surface_as_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "topology.json",
            r#"{"intermediate": {"id": "rack1", "class": "rack", "children": [
                {"server": {"id": "s1"}},
                {"server": {"id": "s1"}}
            ]}}"#,
        );

        match load_topology(&path) {
            Err(Error::Parse { source_name, .. }) => assert!(source_name.ends_with("topology.json")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_policy_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "policies.json",
            r#"[
                {"name": "dc_policy", "node_class": "datacenter",
                 "primary": {"replicas": 2, "children": [{"node_class": "rack", "policy_name": "rack_policy"}]},
                 "secondary": {"replicas": 1}},
                {"name": "rack_policy", "node_class": "rack", "primary": {"replicas": 1}}
            ]"#,
        );

        let group = load_policy_group(&path).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.policy("dc_policy").unwrap().total_replicas(), 3);
        assert!(group.policy("rack_policy").unwrap().secondary.is_none());
    }

    #[test]
    fn test_load_host_group_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "hosts.json", r#"{"east": ["s1", "s2"], "west": ["s3"]}"#);

        let table = load_host_group_table(&path).unwrap();
        let servers = table.servers_in(&parse_host_groups("east, west")).unwrap();
        assert_eq!(servers.len(), 3);
    }

    #[test]
    fn test_load_weights_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let lines = write(&dir, "weights.txt", "# capacity\nrack1 2.0\ns4 0.5 # half\n");
        let json = write(&dir, "weights.json", r#"{"weights": {"rack1": 2.0}}"#);

        let from_lines = load_weights(&lines).unwrap();
        assert_eq!(from_lines.weight("rack1"), 2.0);
        assert_eq!(from_lines.weight("s4"), 0.5);
        assert_eq!(from_lines.weight("other"), 1.0);

        let from_json = load_weights(&json).unwrap();
        assert_eq!(from_json.weight("rack1"), 2.0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let lines = write(&dir, "weights.txt", "rack1 -2\n");
        let json = write(&dir, "weights.json", r#"{"weights": {"rack1": 0.0}}"#);

        assert!(matches!(load_weights(&lines), Err(Error::Parse { .. })));
        assert!(matches!(load_weights(&json), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_load_exclusions_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let lines = write(&dir, "exclusions.txt", "s7\n\n# down for repair\nrack2\n");
        let json = write(&dir, "exclusions.json", r#"["s7"]"#);
        let empty = write(&dir, "empty.txt", "");

        let from_lines = load_exclusions(&lines).unwrap();
        assert!(from_lines.is_excluded("s7"));
        assert!(from_lines.is_excluded("rack2"));
        assert_eq!(from_lines.len(), 2);

        assert!(load_exclusions(&json).unwrap().is_excluded("s7"));
        assert!(load_exclusions(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_topology(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_parse_host_groups() {
        assert_eq!(parse_host_groups("east,west"), vec!["east", "west"]);
        assert_eq!(parse_host_groups(" east , ,west,"), vec!["east", "west"]);
        assert!(parse_host_groups("").is_empty());
    }
}
