//! `datapackage.json` descriptor kept next to each scraped CSV.
//!
//! Written once with the source's defaults; afterwards only the resource's
//! byte count and field list are refreshed, so hand edits survive.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

/// Static provenance for one dataset.
#[derive(Debug, Clone, Copy)]
pub struct PackageInfo {
    pub title: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub source_name: &'static str,
    pub source_title: &'static str,
    pub contributor: &'static str,
    pub license_name: &'static str,
    pub license_path: &'static str,
    pub license_title: &'static str,
    pub collection: &'static str,
}

#[derive(Serialize)]
struct Descriptor<'a> {
    title: &'a str,
    name: &'a str,
    description: &'a str,
    sources: Vec<Link<'a>>,
    contributors: Vec<Contributor<'a>>,
    licenses: Vec<Link<'a>>,
    resources: Vec<Resource<'a>>,
    collection: &'a str,
}

#[derive(Serialize)]
struct Link<'a> {
    name: &'a str,
    path: &'a str,
    title: &'a str,
}

#[derive(Serialize)]
struct Contributor<'a> {
    name: &'a str,
    role: &'a str,
}

#[derive(Serialize)]
struct Resource<'a> {
    name: &'a str,
    path: &'a str,
    mediatype: &'a str,
    bytes: u64,
    schema: Value,
}

fn schema_fields(header: &[String]) -> Value {
    Value::Array(
        header
            .iter()
            .map(|h| json!({ "name": h, "type": "string" }))
            .collect(),
    )
}

fn default_descriptor(info: &PackageInfo, source_url: &str, csv_name: &str, header: &[String]) -> Result<Value> {
    let descriptor = Descriptor {
        title: info.title,
        name: info.name,
        description: info.description,
        sources: vec![Link {
            name: info.source_name,
            path: source_url,
            title: info.source_title,
        }],
        contributors: vec![Contributor {
            name: info.contributor,
            role: "maintainer",
        }],
        licenses: vec![Link {
            name: info.license_name,
            path: info.license_path,
            title: info.license_title,
        }],
        resources: vec![Resource {
            name: csv_name,
            path: csv_name,
            mediatype: "text/csv",
            bytes: 0,
            schema: json!({ "fields": schema_fields(header) }),
        }],
        collection: info.collection,
    };
    Ok(serde_json::to_value(descriptor)?)
}

/// Create the descriptor if missing, then refresh its byte count and fields from `csv_path`.
pub fn refresh(
    path: &Path,
    csv_path: &Path,
    header: &[String],
    info: &PackageInfo,
    source_url: &str,
) -> Result<()> {
    let csv_name = csv_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut doc = if path.exists() {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str::<Value>(&text).with_context(|| format!("Invalid JSON in {:?}", path))?
    } else {
        default_descriptor(info, source_url, &csv_name, header)?
    };

    let bytes = fs::metadata(csv_path)
        .with_context(|| format!("Failed to stat {:?}", csv_path))?
        .len();

    let resource = doc
        .get_mut("resources")
        .and_then(|r| r.get_mut(0))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("{:?} has no resources[0] object", path))?;
    resource.insert("bytes".to_string(), json!(bytes));
    let schema = resource
        .entry("schema")
        .or_insert_with(|| json!({}));
    let schema = schema
        .as_object_mut()
        .ok_or_else(|| anyhow!("{:?}: resources[0].schema is not an object", path))?;
    schema.insert("fields".to_string(), schema_fields(header));

    fs::write(path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("Datapackage {:?} updated ({} bytes).", path, bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: PackageInfo = PackageInfo {
        title: "EU AI Companies",
        name: "eu-ai-companies",
        description: "EU AI companies.",
        source_name: "eu-startups.com",
        source_title: "EU Startups Directory",
        contributor: "maintainer",
        license_name: "CC0-1.0",
        license_path: "https://creativecommons.org/publicdomain/zero/1.0/",
        license_title: "Creative Commons Zero v1.0 Universal",
        collection: "business-data",
    };

    fn header(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn creates_descriptor_with_csv_size() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("eu_ai_companies.csv");
        fs::write(&csv, "Name,Founded\nAcme,2019\n").unwrap();
        let path = dir.path().join("datapackage.json");

        refresh(&path, &csv, &header(&["Name", "Founded"]), &INFO, "https://example.test/dir").unwrap();

        let doc = read(&path);
        assert_eq!(doc["title"], "EU AI Companies");
        assert_eq!(doc["sources"][0]["path"], "https://example.test/dir");
        assert_eq!(doc["resources"][0]["bytes"], fs::metadata(&csv).unwrap().len());
        assert_eq!(doc["resources"][0]["path"], "eu_ai_companies.csv");
        assert_eq!(doc["resources"][0]["schema"]["fields"][1], json!({ "name": "Founded", "type": "string" }));
    }

    #[test]
    fn refresh_keeps_hand_edits() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("out.csv");
        fs::write(&csv, "Domain\n.aaa\n").unwrap();
        let path = dir.path().join("datapackage.json");
        fs::write(
            &path,
            r#"{"title": "Edited", "keywords": ["tld"], "resources": [{"name": "out.csv", "bytes": 1}]}"#,
        )
        .unwrap();

        refresh(&path, &csv, &header(&["Domain", "Type"]), &INFO, "https://example.test").unwrap();

        let doc = read(&path);
        assert_eq!(doc["title"], "Edited");
        assert_eq!(doc["keywords"][0], "tld");
        assert_eq!(doc["resources"][0]["bytes"], fs::metadata(&csv).unwrap().len());
        assert_eq!(doc["resources"][0]["schema"]["fields"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn descriptor_without_resources_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("out.csv");
        fs::write(&csv, "a\n").unwrap();
        let path = dir.path().join("datapackage.json");
        fs::write(&path, r#"{"title": "x"}"#).unwrap();

        assert!(refresh(&path, &csv, &header(&["a"]), &INFO, "u").is_err());
    }
}
