//! Built-in directories and how each is scraped, stored, and loaded.

use std::path::PathBuf;

use crate::config::{ConfigError, Settings};
use crate::datapackage::PackageInfo;
use crate::extract::ExtractorKind;
use crate::fetch::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetcher {
    Http,
    Browser,
}

/// Compiled-in defaults for one source. Settings may override the URLs, page cap, and load options.
#[derive(Debug)]
pub struct Preset {
    pub key: &'static str,
    pub url: &'static str,
    pub paged_url: Option<&'static str>,
    pub pagination: Pagination,
    pub extractor: ExtractorKind,
    pub fetcher: Fetcher,
    pub csv_name: &'static str,
    pub package: PackageInfo,
    pub table: &'static str,
    pub numeric: &'static [&'static str],
    pub shorthand: &'static [&'static str],
}

pub const PRESETS: &[Preset] = &[
    Preset {
        key: "iana-tld",
        url: "https://www.iana.org/domains/root/db",
        paged_url: None,
        pagination: Pagination::Single,
        extractor: ExtractorKind::IanaTable,
        fetcher: Fetcher::Http,
        csv_name: "top-level-domain-names.csv",
        package: PackageInfo {
            title: "Top Level Domain Names",
            name: "top-level-domain-names",
            description: "Delegation details of top-level domains.",
            source_name: "The Internet Assigned Numbers Authority (IANA)",
            source_title: "The Internet Assigned Numbers Authority (IANA)",
            contributor: "harvest",
            license_name: "ODC-PDDL-1.0",
            license_path: "http://opendatacommons.org/licenses/pddl/",
            license_title: "Open Data Commons Public Domain Dedication and License v1.0",
            collection: "reference-data",
        },
        table: "top_level_domains",
        numeric: &[],
        shorthand: &[],
    },
    Preset {
        key: "eu-startups",
        url: "https://www.eu-startups.com/directory/?wpbdp_sort=field-1",
        paged_url: Some("https://www.eu-startups.com/directory/page/{page}/?wpbdp_sort=field-1"),
        pagination: Pagination::Numbered { max_pages: 15 },
        extractor: ExtractorKind::EuStartups,
        fetcher: Fetcher::Http,
        csv_name: "eu_ai_companies.csv",
        package: PackageInfo {
            title: "EU AI Companies",
            name: "eu-ai-companies",
            description: "Information about EU AI companies.",
            source_name: "eu-startups.com",
            source_title: "EU Startups Directory",
            contributor: "harvest",
            license_name: "CC0-1.0",
            license_path: "https://creativecommons.org/publicdomain/zero/1.0/",
            license_title: "Creative Commons Zero v1.0 Universal",
            collection: "business-data",
        },
        table: "eu_ai_companies",
        numeric: &["Founded"],
        shorthand: &[],
    },
    Preset {
        key: "startup-nation",
        url: "https://finder.startupnationcentral.org/startups/search?&days=30&alltags=artificial-intelligence&status=Active",
        paged_url: None,
        pagination: Pagination::NextControl,
        extractor: ExtractorKind::StartupNation,
        fetcher: Fetcher::Browser,
        csv_name: "ai_companies_startupnation.csv",
        package: PackageInfo {
            title: "Israeli AI Companies",
            name: "ai-companies-startupnation",
            description: "Active artificial-intelligence companies listed on Start-Up Nation Finder.",
            source_name: "finder.startupnationcentral.org",
            source_title: "Start-Up Nation Finder",
            contributor: "harvest",
            license_name: "other-nc",
            license_path: "https://finder.startupnationcentral.org/",
            license_title: "Start-Up Nation Central terms of use",
            collection: "business-data",
        },
        table: "ai_companies",
        numeric: &["Founded"],
        shorthand: &["Employees", "Total Raised"],
    },
];

pub fn preset(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.key == key)
}

fn unknown(key: &str) -> ConfigError {
    ConfigError::UnknownSource {
        name: key.to_string(),
        known: PRESETS.iter().map(|p| p.key).collect::<Vec<_>>().join(", "),
    }
}

/// Options for one load into the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub table: String,
    pub numeric: Vec<String>,
    pub shorthand: Vec<String>,
}

/// A preset with settings applied.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub key: &'static str,
    pub url: String,
    pub paged_url: Option<String>,
    pub pagination: Pagination,
    pub extractor: ExtractorKind,
    pub fetcher: Fetcher,
    pub dir: PathBuf,
    pub csv_path: PathBuf,
    pub package: PackageInfo,
    pub load: LoadConfig,
}

impl SourceConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join("progress.json")
    }

    pub fn datapackage_path(&self) -> PathBuf {
        self.dir.join("datapackage.json")
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// Resolve `key` against the presets and the settings' overrides.
pub fn resolve(settings: &Settings, key: &str) -> Result<SourceConfig, ConfigError> {
    let p = preset(key).ok_or_else(|| unknown(key))?;
    let o = settings.source_override(key).cloned().unwrap_or_default();

    let pagination = match (p.pagination, o.max_pages) {
        (Pagination::Numbered { .. }, Some(max_pages)) => Pagination::Numbered { max_pages },
        (pagination, _) => pagination,
    };
    let dir = settings.data_dir.join(p.key);

    Ok(SourceConfig {
        key: p.key,
        url: o.url.unwrap_or_else(|| p.url.to_string()),
        paged_url: o.paged_url.or_else(|| p.paged_url.map(str::to_string)),
        pagination,
        extractor: p.extractor,
        fetcher: p.fetcher,
        csv_path: dir.join(p.csv_name),
        dir,
        package: p.package,
        load: LoadConfig {
            table: o.load.table.unwrap_or_else(|| p.table.to_string()),
            numeric: o.load.numeric.unwrap_or_else(|| owned(p.numeric)),
            shorthand: o.load.shorthand.unwrap_or_else(|| owned(p.shorthand)),
        },
    })
}

/// Every override must name a known source.
pub fn check_overrides(settings: &Settings) -> Result<(), ConfigError> {
    for name in settings.sources.keys() {
        let key = name.replace('_', "-");
        if preset(name).is_none() && preset(&key).is_none() {
            return Err(unknown(name));
        }
    }
    Ok(())
}

/// Load options when no source is named: the table defaults to the CSV's file stem.
pub fn load_for_file(csv: &std::path::Path) -> LoadConfig {
    let stem = csv
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['-', ' ', '.'], "_"))
        .unwrap_or_else(|| "imported".to_string());
    LoadConfig {
        table: stem,
        numeric: Vec::new(),
        shorthand: Vec::new(),
    }
}
