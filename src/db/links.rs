//! ModLinks and ApiLinks catalog files
//!
//! Both files are XML documents of `<Manifest>` entries. A manifest carries
//! either a single `<Link>` or per-platform `<Links>`, each with a `SHA256`
//! attribute holding the expected digest of the download.

use super::InstalledModRecord;
use crate::mods::{version, Mod, ModState, RecentChangeInfo, MANUAL_INSTALL_DESCRIPTION};
use anyhow::{Context, Result};
use quick_xml::de::from_str;
use semver::Version;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Root of ModLinks.xml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "ModLinks")]
pub struct ModLinks {
    #[serde(rename = "Manifest", default)]
    pub manifests: Vec<ModManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModManifest {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Version")]
    pub version: String,

    #[serde(rename = "Link", default)]
    pub link: Option<Link>,

    #[serde(rename = "Links", default)]
    pub links: Option<PlatformLinks>,

    #[serde(rename = "Dependencies", default)]
    pub dependencies: Option<DependencyList>,

    #[serde(rename = "Repository", default)]
    pub repository: String,

    #[serde(rename = "Integrations", default)]
    pub integrations: Option<IntegrationList>,

    #[serde(rename = "Tags", default)]
    pub tags: Option<TagList>,

    #[serde(rename = "Authors", default)]
    pub authors: Option<AuthorList>,
}

/// Download location and digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Link {
    #[serde(rename = "@SHA256", default)]
    pub sha256: String,

    #[serde(rename = "$text", default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformLinks {
    #[serde(rename = "Windows", default)]
    pub windows: Option<Link>,

    #[serde(rename = "Mac", default)]
    pub mac: Option<Link>,

    #[serde(rename = "Linux", default)]
    pub linux: Option<Link>,
}

impl PlatformLinks {
    /// Link for the running platform, falling back to any available one.
    pub fn current(&self) -> Option<&Link> {
        let preferred = match std::env::consts::OS {
            "windows" => self.windows.as_ref(),
            "macos" => self.mac.as_ref(),
            _ => self.linux.as_ref(),
        };
        preferred
            .or(self.windows.as_ref())
            .or(self.linux.as_ref())
            .or(self.mac.as_ref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencyList {
    #[serde(rename = "Dependency", default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationList {
    #[serde(rename = "Integration", default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagList {
    #[serde(rename = "Tag", default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorList {
    #[serde(rename = "Author", default)]
    pub items: Vec<String>,
}

impl ModManifest {
    pub fn download(&self) -> Option<&Link> {
        self.link
            .as_ref()
            .or_else(|| self.links.as_ref().and_then(PlatformLinks::current))
    }

    /// Catalog entry for this manifest, not installed.
    pub fn to_mod(&self) -> Mod {
        let link = self.download().cloned().unwrap_or_default();

        Mod {
            version: parse_version(&self.name, &self.version),
            dependencies: self.dependencies.clone().unwrap_or_default().items,
            integrations: self.integrations.clone().unwrap_or_default().items,
            tags: self.tags.clone().unwrap_or_default().items,
            authors: self.authors.clone().unwrap_or_default().items,
            link: link.url.trim().to_string(),
            sha256: link.sha256.to_lowercase(),
            description: self.description.trim().to_string(),
            repository: self.repository.trim().to_string(),
            ..Mod::new(self.name.trim())
        }
    }
}

/// Root of ApiLinks.xml
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "ApiLinks")]
pub struct ApiLinks {
    #[serde(rename = "Manifest")]
    pub manifest: ApiManifest,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiManifest {
    #[serde(rename = "Version")]
    pub version: u32,

    #[serde(rename = "Link", default)]
    pub link: Option<Link>,

    #[serde(rename = "Links", default)]
    pub links: Option<PlatformLinks>,

    #[serde(rename = "Files", default)]
    pub files: Option<FileList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileList {
    #[serde(rename = "File", default)]
    pub items: Vec<String>,
}

impl ApiManifest {
    pub fn download(&self) -> Option<&Link> {
        self.link
            .as_ref()
            .or_else(|| self.links.as_ref().and_then(PlatformLinks::current))
    }

    pub fn files(&self) -> &[String] {
        self.files.as_ref().map(|f| f.items.as_slice()).unwrap_or(&[])
    }
}

fn clean(xml: &str) -> &str {
    xml.trim_start_matches('\u{feff}').trim()
}

/// Parse ModLinks.xml content
pub fn parse_mod_links(xml: &str) -> Result<ModLinks> {
    from_str(clean(xml)).context("Failed to parse ModLinks.xml")
}

/// Parse ApiLinks.xml content
pub fn parse_api_links(xml: &str) -> Result<ApiLinks> {
    from_str(clean(xml)).context("Failed to parse ApiLinks.xml")
}

fn parse_version(name: &str, raw: &str) -> Version {
    version::parse_lenient(raw).unwrap_or_else(|| {
        tracing::warn!("Unparseable version '{}' for {}, treating as 0.0.0", raw, name);
        version::zero()
    })
}

/// The catalog joined with what is installed locally
#[derive(Debug, Clone, Default)]
pub struct ModDatabase {
    pub items: Vec<Mod>,
    pub api: ApiManifest,
}

impl ModDatabase {
    /// Join catalog manifests with install records.
    ///
    /// Records with no manifest become out-of-catalog entries; records that
    /// came from the catalog are marked as delisted rather than manual.
    pub fn new(
        links: &ModLinks,
        api: ApiManifest,
        installed: &[InstalledModRecord],
        recent: &HashMap<String, RecentChangeInfo>,
    ) -> Self {
        let records: HashMap<&str, &InstalledModRecord> =
            installed.iter().map(|r| (r.name.as_str(), r)).collect();

        let mut items = Vec::with_capacity(links.manifests.len());
        let mut seen = HashSet::new();

        for manifest in &links.manifests {
            let mut m = manifest.to_mod();
            if !seen.insert(m.name.clone()) {
                tracing::warn!("Duplicate manifest for {}, keeping the first", m.name);
                continue;
            }

            if let Some(record) = records.get(m.name.as_str()) {
                let installed_version = parse_version(&record.name, &record.version);
                m.state = ModState::Installed {
                    enabled: record.enabled,
                    updated: installed_version >= m.version,
                    version: installed_version,
                    pinned: record.pinned,
                };
            }
            m.recent_changes = recent.get(&m.name).cloned().unwrap_or_default();
            items.push(m);
        }

        for record in installed {
            if seen.contains(&record.name) {
                continue;
            }
            let mut m = Mod::new(record.name.clone());
            m.version = parse_version(&record.name, &record.version);
            if !record.from_catalog {
                m.description = MANUAL_INSTALL_DESCRIPTION.to_string();
            }
            m.state = ModState::NotInModLinks {
                installed: true,
                enabled: record.enabled,
                modlinks_mod: record.from_catalog,
                pinned: record.pinned,
            };
            items.push(m);
        }

        Self { items, api }
    }

    /// Catalog names and versions, for history tracking
    pub fn catalog_entries(links: &ModLinks) -> Vec<(String, String)> {
        links
            .manifests
            .iter()
            .map(|m| (m.name.trim().to_string(), m.version.trim().to_string()))
            .collect()
    }
}
