use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{FROM, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::config::NcbiSettings;
use crate::domain::{TaxId, TaxonomyRecord, non_empty};
use crate::error::LctrError;
use crate::rank_cache::{RankLookup, RankResolver};

pub trait TaxonomyClient: Send + Sync {
    fn fetch_taxonomy(&self, taxids: &[TaxId]) -> Result<Vec<TaxonomyRecord>, LctrError>;
}

const PAGE_SIZE: &str = "1000";

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    base_url: String,
    max_retries: usize,
}

impl NcbiHttpClient {
    pub fn new(settings: &NcbiSettings) -> Result<Self, LctrError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-lctr/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LctrError::InvalidConfig(err.to_string()))?,
        );
        headers.insert("X-Datasets-Client", HeaderValue::from_static("kira-lctr"));
        headers.insert(
            "X-Datasets-Client-Version",
            HeaderValue::from_str(env!("CARGO_PKG_VERSION"))
                .map_err(|err| LctrError::InvalidConfig(err.to_string()))?,
        );
        if let Some(api_key) = &settings.api_key {
            headers.insert(
                "api-key",
                HeaderValue::from_str(api_key)
                    .map_err(|err| LctrError::InvalidConfig(format!("api key: {err}")))?,
            );
        }
        if let Some(email) = &settings.email {
            headers.insert(
                FROM,
                HeaderValue::from_str(email)
                    .map_err(|err| LctrError::InvalidConfig(format!("email: {err}")))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| LctrError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            max_retries: settings.max_retries,
        })
    }

    fn report_url(&self, taxons: &str) -> Result<Url, LctrError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| LctrError::InvalidConfig(format!("NCBI base url: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| LctrError::InvalidConfig("NCBI base url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("taxonomy")
            .push("taxon")
            .push(taxons)
            .push("dataset_report");
        Ok(url)
    }

    fn fetch_reports(&self, taxons: &str) -> Result<Vec<TaxonomyReport>, LctrError> {
        let url = self.report_url(taxons)?;
        let mut reports = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let response = self.send_with_retries(|| {
                let mut request = self.client.get(url.clone()).query(&[("page_size", PAGE_SIZE)]);
                if let Some(token) = &page_token {
                    request = request.query(&[("page_token", token.as_str())]);
                }
                request
            })?;
            let status = response.status().as_u16();
            if status == 404 {
                return Ok(reports);
            }
            if !response.status().is_success() {
                let message = response
                    .text()
                    .unwrap_or_else(|_| "NCBI request failed".to_string());
                return Err(LctrError::NcbiStatus { status, message });
            }
            let page: TaxonomyReportPage = response
                .json()
                .map_err(|err| LctrError::NcbiDecode(err.to_string()))?;
            reports.extend(page.reports);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(reports),
            }
        }
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, LctrError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(LctrError::NcbiHttp(err.to_string()));
                }
            }
        }
    }
}

impl TaxonomyClient for NcbiHttpClient {
    fn fetch_taxonomy(&self, taxids: &[TaxId]) -> Result<Vec<TaxonomyRecord>, LctrError> {
        if taxids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = taxids
            .iter()
            .map(TaxId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let reports = self.fetch_reports(&joined)?;
        Ok(reports
            .into_iter()
            .filter_map(|report| report.taxonomy)
            .filter_map(TaxonomyNode::into_record)
            .collect())
    }
}

impl RankResolver for NcbiHttpClient {
    fn lookup_rank(&self, name: &str) -> Result<RankLookup, LctrError> {
        let reports = self.fetch_reports(name)?;
        Ok(rank_from_reports(reports))
    }
}

fn rank_from_reports(reports: Vec<TaxonomyReport>) -> RankLookup {
    match reports.into_iter().find_map(|report| report.taxonomy) {
        Some(node) => {
            RankLookup::Found(node.rank.as_deref().map(normalize_rank).unwrap_or_default())
        }
        None => RankLookup::NotFound,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaxonomyReportPage {
    #[serde(default)]
    reports: Vec<TaxonomyReport>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyReport {
    #[serde(default)]
    taxonomy: Option<TaxonomyNode>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyNode {
    #[serde(default)]
    tax_id: Option<u64>,
    #[serde(default)]
    rank: Option<String>,
    #[serde(default)]
    current_scientific_name: Option<NamedEntry>,
    #[serde(default)]
    classification: Option<Classification>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Classification {
    #[serde(default)]
    superkingdom: Option<NamedEntry>,
    #[serde(default)]
    domain: Option<NamedEntry>,
    #[serde(default)]
    kingdom: Option<NamedEntry>,
    #[serde(default)]
    phylum: Option<NamedEntry>,
    #[serde(default)]
    class: Option<NamedEntry>,
    #[serde(default)]
    order: Option<NamedEntry>,
    #[serde(default)]
    family: Option<NamedEntry>,
    #[serde(default)]
    genus: Option<NamedEntry>,
    #[serde(default)]
    species: Option<NamedEntry>,
}

impl Classification {
    fn lineage(&self) -> Option<String> {
        let ordered = [
            &self.superkingdom,
            &self.domain,
            &self.kingdom,
            &self.phylum,
            &self.class,
            &self.order,
            &self.family,
            &self.genus,
            &self.species,
        ];
        let mut names: Vec<&str> = Vec::new();
        for entry in ordered.into_iter().flatten() {
            if let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                if names.last() != Some(&name) {
                    names.push(name);
                }
            }
        }
        (!names.is_empty()).then(|| names.join("; "))
    }
}

impl TaxonomyNode {
    fn into_record(self) -> Option<TaxonomyRecord> {
        let taxon_id = self.tax_id?.to_string().parse().ok()?;
        Some(TaxonomyRecord {
            taxon_id,
            scientific_name: self
                .current_scientific_name
                .and_then(|entry| entry.name)
                .as_deref()
                .and_then(non_empty),
            rank: self.rank.as_deref().map(normalize_rank).and_then(|rank| non_empty(&rank)),
            lineage: self.classification.as_ref().and_then(Classification::lineage),
        })
    }
}

pub fn normalize_rank(rank: &str) -> String {
    rank.trim().to_lowercase().replace('_', " ")
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
