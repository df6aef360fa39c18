//! Synthetic documents for embedded shell and python regions.
//!
//! [`EmbeddedDocuments`] keeps, per host document and language, one synthetic
//! document per region together with the mapping back into the host. Each
//! regeneration diffs the new region set against the stored one: documents
//! keep their URI across edits, bump their version when their text changes
//! and are reported closed when their region disappears.

mod mapping;

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::Url;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

pub use mapping::{render_region, PositionMapping};

use crate::regions::{classify_regions, EmbeddedLanguage, EmbeddedRegion};
use crate::syntax::{Parser, Position, Range, SyntaxTree};

pub const EMBEDDED_SCHEME: &str = "bitbake-embedded";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddedError {
    #[error("cannot derive an embedded document uri from {host}: {source}")]
    InvalidUri {
        host: Url,
        #[source]
        source: url::ParseError,
    },
}

/// `bitbake-embedded://<language>/<scheme>/<authority><host path>.<ordinal>.<ext>`
///
/// The host's query and fragment carry over unchanged, so distinct hosts
/// never share a synthetic document. Opaque hosts such as
/// `untitled:Untitled-1` mark their scheme segment with a trailing `:`.
pub fn synthetic_uri(
    host: &Url,
    language: EmbeddedLanguage,
    index: usize,
) -> Result<Url, EmbeddedError> {
    let scheme = if host.cannot_be_a_base() {
        format!("{}:", host.scheme())
    } else {
        host.scheme().to_string()
    };
    let path = host.path();
    let separator = if path.starts_with('/') { "" } else { "/" };
    let raw = format!(
        "{EMBEDDED_SCHEME}://{}/{scheme}/{}{separator}{path}.{index}.{}",
        language.as_str(),
        host.authority(),
        language.extension()
    );
    let mut uri = Url::parse(&raw).map_err(|source| EmbeddedError::InvalidUri {
        host: host.clone(),
        source,
    })?;
    uri.set_query(host.query());
    uri.set_fragment(host.fragment());
    Ok(uri)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedDocumentInfo {
    pub uri: Url,
    pub language: EmbeddedLanguage,
    pub host_uri: Url,
    pub index: usize,
    pub text: String,
    /// Starts at 1 and grows by one with every text change.
    pub version: i32,
    /// Host range the document was rendered from.
    pub range: Range,
    pub mapping: PositionMapping,
}

impl EmbeddedDocumentInfo {
    pub fn contains(&self, host: Position) -> bool {
        self.range.contains_inclusive(host)
    }

    pub fn to_embedded(&self, host: Position) -> Option<Position> {
        self.mapping.to_embedded(host)
    }

    pub fn to_host(&self, embedded: Position) -> Option<Position> {
        self.mapping.to_host(embedded)
    }
}

/// What a router needs to forward a request at a host position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedLanguageDocInfo {
    pub uri: Url,
    pub language: EmbeddedLanguage,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLocation {
    pub uri: Url,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    pub uri: Url,
    pub start: Position,
    pub end: Position,
}

/// The outcome of one regeneration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedDocumentChanges {
    pub opened: Vec<Arc<EmbeddedDocumentInfo>>,
    pub changed: Vec<Arc<EmbeddedDocumentInfo>>,
    pub closed: Vec<Url>,
}

impl EmbeddedDocumentChanges {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.changed.is_empty() && self.closed.is_empty()
    }
}

type LanguageTable = HashMap<EmbeddedLanguage, Vec<Arc<EmbeddedDocumentInfo>>>;

#[derive(Default)]
struct Tables {
    hosts: HashMap<Url, LanguageTable>,
    synthetic: HashMap<Url, Arc<EmbeddedDocumentInfo>>,
}

#[derive(Default)]
pub struct EmbeddedDocuments {
    parser: Parser,
    tables: RwLock<Tables>,
}

impl EmbeddedDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(parser: Parser) -> Self {
        Self {
            parser,
            tables: RwLock::default(),
        }
    }

    /// Reclassifies `text` and regenerates the host's synthetic documents.
    pub fn generate_embedded_language_docs(
        &self,
        host: &Url,
        text: &str,
    ) -> Result<EmbeddedDocumentChanges, EmbeddedError> {
        let tree = match self.parser.parse(text) {
            Ok(tree) => tree,
            Err(err) => {
                debug!(%host, error = %err, "dropping embedded documents of unparsed host");
                SyntaxTree::without_root(text)
            }
        };
        self.generate_from_tree(host, &tree)
    }

    pub fn generate_from_tree(
        &self,
        host: &Url,
        tree: &SyntaxTree,
    ) -> Result<EmbeddedDocumentChanges, EmbeddedError> {
        let regions = classify_regions(tree);
        let mut rendered = Vec::with_capacity(regions.len());
        for region in &regions {
            rendered.push(render(host, tree.source(), region)?);
        }

        let mut tables = self.tables.write();
        let previous = tables.hosts.remove(host).unwrap_or_default();
        let mut previous_by_uri: HashMap<Url, Arc<EmbeddedDocumentInfo>> = previous
            .into_values()
            .flatten()
            .map(|info| (info.uri.clone(), info))
            .collect();

        let mut changes = EmbeddedDocumentChanges::default();
        let mut table = LanguageTable::new();
        for mut info in rendered {
            let info = match previous_by_uri.remove(&info.uri) {
                Some(old) if old.text == info.text && old.range == info.range => old,
                Some(old) if old.text == info.text => {
                    info.version = old.version;
                    Arc::new(info)
                }
                Some(old) => {
                    info.version = old.version + 1;
                    let info = Arc::new(info);
                    changes.changed.push(info.clone());
                    info
                }
                None => {
                    let info = Arc::new(info);
                    changes.opened.push(info.clone());
                    info
                }
            };
            tables.synthetic.insert(info.uri.clone(), info.clone());
            table.entry(info.language).or_default().push(info);
        }

        for uri in previous_by_uri.into_keys() {
            tables.synthetic.remove(&uri);
            changes.closed.push(uri);
        }
        changes.closed.sort();
        if !table.is_empty() {
            tables.hosts.insert(host.clone(), table);
        }

        debug!(
            %host,
            opened = changes.opened.len(),
            changed = changes.changed.len(),
            closed = changes.closed.len(),
            "regenerated embedded documents"
        );
        Ok(changes)
    }

    /// Synthetic document owning `position`, trying languages in
    /// [`EmbeddedLanguage::ALL`] order.
    pub fn get_embedded_language_doc_uri_on_position(
        &self,
        host: &Url,
        position: Position,
    ) -> Option<Url> {
        self.owner(host, position).map(|info| info.uri.clone())
    }

    pub fn embedded_language_doc_info(
        &self,
        host: &Url,
        position: Position,
    ) -> Option<EmbeddedLanguageDocInfo> {
        let info = self.owner(host, position)?;
        let position = info.to_embedded(position)?;
        Some(EmbeddedLanguageDocInfo {
            uri: info.uri.clone(),
            language: info.language,
            position,
        })
    }

    fn owner(&self, host: &Url, position: Position) -> Option<Arc<EmbeddedDocumentInfo>> {
        let tables = self.tables.read();
        let table = tables.hosts.get(host)?;
        EmbeddedLanguage::ALL.iter().find_map(|language| {
            table
                .get(language)?
                .iter()
                .find(|info| info.contains(position))
                .cloned()
        })
    }

    /// Documents of one language for a host, in region order.
    pub fn get_embedded_language_doc_infos(
        &self,
        host: &Url,
        language: EmbeddedLanguage,
    ) -> Vec<Arc<EmbeddedDocumentInfo>> {
        self.tables
            .read()
            .hosts
            .get(host)
            .and_then(|table| table.get(&language))
            .cloned()
            .unwrap_or_default()
    }

    pub fn document(&self, uri: &Url) -> Option<Arc<EmbeddedDocumentInfo>> {
        self.tables.read().synthetic.get(uri).cloned()
    }

    pub fn map_to_host(&self, uri: &Url, position: Position) -> Option<HostLocation> {
        let info = self.document(uri)?;
        Some(HostLocation {
            position: info.to_host(position)?,
            uri: info.host_uri.clone(),
        })
    }

    pub fn map_range_to_host(&self, uri: &Url, start: Position, end: Position) -> Option<HostRange> {
        let info = self.document(uri)?;
        Some(HostRange {
            start: info.to_host(start)?,
            end: info.to_host(end)?,
            uri: info.host_uri.clone(),
        })
    }

    /// Drops every synthetic document of `host` and returns their URIs.
    pub fn close(&self, host: &Url) -> Vec<Url> {
        let mut tables = self.tables.write();
        let Some(table) = tables.hosts.remove(host) else {
            return Vec::new();
        };
        let mut closed: Vec<Url> = table
            .into_values()
            .flatten()
            .map(|info| info.uri.clone())
            .collect();
        for uri in &closed {
            tables.synthetic.remove(uri);
        }
        closed.sort();
        closed
    }
}

fn render(
    host: &Url,
    source: &str,
    region: &EmbeddedRegion,
) -> Result<EmbeddedDocumentInfo, EmbeddedError> {
    let (text, mapping) = render_region(source, region);
    Ok(EmbeddedDocumentInfo {
        uri: synthetic_uri(host, region.language, region.index)?,
        language: region.language,
        host_uri: host.clone(),
        index: region.index,
        text,
        version: 1,
        range: region.range.clone(),
        mapping,
    })
}
