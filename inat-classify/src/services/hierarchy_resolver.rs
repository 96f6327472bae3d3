//! Taxon hierarchy resolution
//!
//! Looks up a taxon's ancestry and extracts subfamily, tribe and genus.
//! Missing ranks are normal (taxonomic completeness varies) and are
//! represented as absent levels, never raised as errors.

use crate::config::Endpoints;
use crate::error::ClassifyError;
use crate::models::{Hierarchy, Rank};
use crate::services::transport::{Method, RequestBody, Transport};
use serde::Deserialize;
use std::sync::Arc;

/// Taxonomy lookup response
#[derive(Debug, Deserialize)]
struct TaxaResponse {
    results: Vec<TaxonNode>,
}

/// A taxon or one of its ancestors
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonNode {
    pub name: String,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub preferred_common_name: Option<String>,
    /// Root first; only populated on the looked-up taxon
    #[serde(default)]
    pub ancestors: Vec<TaxonNode>,
}

pub struct HierarchyResolver {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    locale: Option<String>,
}

impl HierarchyResolver {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            locale: None,
        }
    }

    /// Request common names in this locale (e.g. `zh-CN`)
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    /// Resolve subfamily/tribe/genus for a taxon id
    pub async fn resolve(&self, taxon_id: u64) -> Result<Hierarchy, ClassifyError> {
        let mut url = self.endpoints.taxon_url(taxon_id);
        if let Some(locale) = &self.locale {
            url = format!("{}?locale={}", url, locale);
        }

        tracing::debug!(taxon_id, url = %url, "Querying taxonomy");

        let response = self
            .transport
            .request(Method::GET, &url, RequestBody::Empty)
            .await?;

        let parsed: TaxaResponse = response.parse_json("taxonomy")?;
        let taxon = parsed.results.into_iter().next().ok_or_else(|| {
            ClassifyError::parse(
                "taxonomy",
                format!("no taxon returned for id {}", taxon_id),
                &response.body,
            )
        })?;

        let hierarchy = extract_hierarchy(&taxon);
        let missing = hierarchy.missing_ranks();
        if missing.is_empty() {
            tracing::info!(taxon_id, %hierarchy, "Hierarchy resolved");
        } else {
            tracing::debug!(taxon_id, %hierarchy, ?missing, "Hierarchy resolved with missing ranks");
        }

        Ok(hierarchy)
    }
}

/// Walk the ancestors followed by the taxon itself and record every rank of
/// interest. A taxon that is itself a genus fills the genus level.
pub fn extract_hierarchy(taxon: &TaxonNode) -> Hierarchy {
    let mut hierarchy = Hierarchy::empty();

    for node in taxon.ancestors.iter().chain(std::iter::once(taxon)) {
        let Some(rank) = node.rank.as_deref().and_then(Rank::parse) else {
            continue;
        };
        let name = node.name.trim();
        if name.is_empty() {
            continue;
        }
        hierarchy.set(
            rank,
            Hierarchy::format_level(name, node.preferred_common_name.as_deref()),
        );
    }

    hierarchy
}
