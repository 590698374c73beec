//! # Wildberries Service
//!
//! Product lookups and search ranking against Wildberries' public JSON
//! endpoints. URL builders and response mapping are plain functions; the
//! service adds HTTP, retries and pacing on top of them.
//!
//! ## Endpoints
//!
//! - basket CDN `card.json`: full product card, fed to the LLM
//! - `card.wb.ru/cards/v2/detail`: name, brand, price, rating
//! - `search.wb.ru/exactmatch/{region}/common/v9/search`: ranked search page

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, WildberriesConfig};
use crate::errors::BotError;
use crate::http_client::OutboundClient;
use crate::models::{KeywordAnalysis, ProductDetails, SearchResult};
use crate::retry::{with_backoff, RetryPolicy};
use crate::url_patterns::PRODUCT_URL_REGEX;

/// Pause between two search pages of one query
pub const PAGE_DELAY: Duration = Duration::from_millis(500);
/// Pause between two keyword searches
pub const KEYWORD_DELAY: Duration = Duration::from_millis(300);

/// Upper volume bound for each basket host, in order
const BASKET_VOLUME_BOUNDS: [(u64, &str); 25] = [
    (143, "01"),
    (287, "02"),
    (431, "03"),
    (719, "04"),
    (1007, "05"),
    (1061, "06"),
    (1115, "07"),
    (1169, "08"),
    (1313, "09"),
    (1601, "10"),
    (1655, "11"),
    (1919, "12"),
    (2045, "13"),
    (2189, "14"),
    (2405, "15"),
    (2621, "16"),
    (2837, "17"),
    (3053, "18"),
    (3269, "19"),
    (3485, "20"),
    (3701, "21"),
    (3917, "22"),
    (4133, "23"),
    (4349, "24"),
    (4565, "25"),
];
const LAST_BASKET: &str = "26";

/// Extract the article number from a product link
pub fn extract_article_id(url: &str) -> Option<u64> {
    PRODUCT_URL_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Basket host number serving the article's static files
pub fn basket_id(article: u64) -> &'static str {
    let volume = article / 100_000;
    BASKET_VOLUME_BOUNDS
        .iter()
        .find(|(bound, _)| volume <= *bound)
        .map(|(_, basket)| *basket)
        .unwrap_or(LAST_BASKET)
}

fn basket_path(article: u64) -> String {
    format!(
        "https://basket-{}.wbbasket.ru/vol{}/part{}/{}",
        basket_id(article),
        article / 100_000,
        article / 1_000,
        article
    )
}

/// Canonical product page link
pub fn product_url(article: u64) -> String {
    format!("https://www.wildberries.ru/catalog/{article}/detail.aspx")
}

pub fn card_url(article: u64, region: &str) -> String {
    format!("{}/info/{}/card.json", basket_path(article), region)
}

pub fn detail_url(article: u64) -> String {
    format!(
        "https://card.wb.ru/cards/v2/detail?appType=1&curr=rub&dest=-363095&hide_dtype=13&lang=ru&spp=30&nm={article}"
    )
}

pub fn image_url(article: u64) -> String {
    format!("{}/images/c516x688/1.webp", basket_path(article))
}

/// Search page URL with the query percent-encoded
pub fn search_url(query: &str, page: u32, region: &str) -> Result<String, BotError> {
    let base = format!("https://search.wb.ru/exactmatch/{region}/common/v9/search");
    let page = page.to_string();
    let url = Url::parse_with_params(
        &base,
        &[
            ("ab_testing", "false"),
            ("appType", "1"),
            ("curr", "rub"),
            ("dest", "-363095"),
            ("hide_dtype", "13"),
            ("lang", region),
            ("page", page.as_str()),
            ("query", query),
            ("resultset", "catalog"),
            ("sort", "popular"),
            ("spp", "30"),
            ("suppressSpellcheck", "false"),
        ],
    )
    .map_err(|e| BotError::Config(format!("Invalid search URL for region '{region}': {e}")))?;
    Ok(url.into())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Option<SearchData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub products: Vec<SearchProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchProduct {
    pub id: u64,
}

impl SearchResponse {
    pub fn products(&self) -> &[SearchProduct] {
        self.data.as_ref().map(|d| d.products.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub data: Option<DetailData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailData {
    #[serde(default)]
    pub products: Vec<DetailProduct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailProduct {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub brand: Option<String>,
    #[serde(rename = "reviewRating")]
    pub review_rating: Option<f64>,
    pub feedbacks: Option<u32>,
    #[serde(default)]
    pub sizes: Vec<DetailSize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailSize {
    pub price: Option<DetailPrice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailPrice {
    /// Price in kopecks
    pub product: Option<u64>,
}

/// Map the detail endpoint answer onto a product card
pub fn product_details_from(
    response: &DetailResponse,
    article: u64,
    product_url: &str,
) -> Option<ProductDetails> {
    let product = response.data.as_ref()?.products.first()?;
    let price_kopecks = product
        .sizes
        .first()
        .and_then(|size| size.price.as_ref())
        .and_then(|price| price.product)
        .unwrap_or(0);

    Some(ProductDetails {
        id: product.id.unwrap_or(article),
        name: product
            .name
            .clone()
            .unwrap_or_else(|| format!("Товар {article}")),
        brand: product.brand.clone().unwrap_or_default(),
        price: price_kopecks as f64 / 100.0,
        rating: product.review_rating.unwrap_or(0.0),
        feedbacks: product.feedbacks.unwrap_or(0),
        image_url: image_url(article),
        url: product_url.to_string(),
    })
}

/// Outcome of scanning one search page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScan {
    /// Product found at this 1-based overall position
    Found(u32),
    /// The position limit was passed before the product showed up
    LimitReached,
    /// Not on this page; `seen` products counted so far
    Continue { seen: u32 },
}

/// Walk one page of results, continuing the count from `seen`
pub fn scan_page(products: &[SearchProduct], article: u64, seen: u32, limit: u32) -> PageScan {
    let mut position = seen;
    for product in products {
        position += 1;
        if position > limit {
            return PageScan::LimitReached;
        }
        if product.id == article {
            return PageScan::Found(position);
        }
    }
    PageScan::Continue { seen: position }
}

/// Wildberries lookups and ranking
pub struct WildberriesService {
    http: Arc<OutboundClient>,
    config: WildberriesConfig,
    retry: RetryPolicy,
}

impl WildberriesService {
    pub fn new(config: &AppConfig, http: Arc<OutboundClient>) -> Self {
        Self {
            http,
            config: config.wildberries.clone(),
            retry: config.retry.clone(),
        }
    }

    pub fn config(&self) -> &WildberriesConfig {
        &self.config
    }

    async fn fetch<T>(&self, url: &str, operation: &str) -> Result<T, BotError>
    where
        T: serde::de::DeserializeOwned,
    {
        let use_proxy = self.config.use_proxy;
        with_backoff(&self.retry, self.http.rotation_for(use_proxy), operation, |_| {
            self.http.get_json::<T>(url, use_proxy)
        })
        .await
    }

    /// Full product card as JSON, used as LLM input
    pub async fn get_product_data(&self, article: u64) -> Result<Value, BotError> {
        let url = card_url(article, &self.config.region);
        debug!(article, url = %url, "Fetching product card");
        self.fetch(&url, "wb_card").await
    }

    /// Product name, brand, price and rating
    ///
    /// Returns `Ok(None)` when the endpoint answers without the product.
    pub async fn get_product_details(
        &self,
        article: u64,
        product_url: &str,
    ) -> Result<Option<ProductDetails>, BotError> {
        let response: DetailResponse = self.fetch(&detail_url(article), "wb_detail").await?;
        Ok(product_details_from(&response, article, product_url))
    }

    /// 1-based position of `article` in the search results for `query`
    pub async fn find_product_position(
        &self,
        query: &str,
        article: u64,
    ) -> Result<Option<u32>, BotError> {
        let region = self.config.region.as_str();
        scan_search_pages(
            query,
            article,
            self.config.max_search_pages,
            self.config.max_position_limit,
            |page| {
                let url = search_url(query, page, region);
                async move { self.fetch::<SearchResponse>(&url?, "wb_search").await }
            },
        )
        .await
    }

    /// Product card plus its rank for every keyword
    pub async fn analyze_product_keywords(
        &self,
        article: u64,
        product_url: &str,
        keywords: &[String],
    ) -> KeywordAnalysis {
        let details = self.get_product_details(article, product_url).await;
        assemble_analysis(article, product_url, keywords, details, |keyword| async move {
            self.find_product_position(&keyword, article).await
        })
        .await
    }
}

/// Walk search pages `1..=max_pages` until the article shows up
///
/// `fetch_page` loads one page by its 1-based number. The walk stops on an
/// empty page (or one without a product list) and once `limit` products
/// have been counted.
pub async fn scan_search_pages<F, Fut>(
    query: &str,
    article: u64,
    max_pages: u32,
    limit: u32,
    mut fetch_page: F,
) -> Result<Option<u32>, BotError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<SearchResponse, BotError>>,
{
    let mut seen = 0;

    for page in 1..=max_pages {
        if page > 1 {
            tokio::time::sleep(PAGE_DELAY).await;
        }

        let response = fetch_page(page).await?;
        let products = response.products();
        if products.is_empty() {
            debug!(query, page, "Search returned an empty page");
            break;
        }

        match scan_page(products, article, seen, limit) {
            PageScan::Found(position) => {
                debug!(query, article, position, "Product found in search");
                return Ok(Some(position));
            }
            PageScan::LimitReached => break,
            PageScan::Continue { seen: counted } => {
                seen = counted;
                if seen >= limit {
                    break;
                }
            }
        }
    }

    Ok(None)
}

/// Combine the detail lookup with one search per keyword
///
/// A failed detail lookup yields a placeholder card and a failed search
/// reports its keyword as not found.
pub async fn assemble_analysis<F, Fut>(
    article: u64,
    product_url: &str,
    keywords: &[String],
    details: Result<Option<ProductDetails>, BotError>,
    mut search: F,
) -> KeywordAnalysis
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Option<u32>, BotError>>,
{
    let product = match details {
        Ok(Some(details)) => details,
        Ok(None) => {
            warn!(article, "Detail endpoint returned no product, using placeholder");
            ProductDetails::placeholder(article, image_url(article), product_url)
        }
        Err(e) => {
            warn!(article, error = %e, "Failed to fetch product details, using placeholder");
            ProductDetails::placeholder(article, image_url(article), product_url)
        }
    };

    let mut results = Vec::with_capacity(keywords.len());
    for (i, keyword) in keywords.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(KEYWORD_DELAY).await;
        }

        let position = match search(keyword.clone()).await {
            Ok(position) => position,
            Err(e) => {
                warn!(keyword = %keyword, error = %e, "Search failed, reporting keyword as not found");
                None
            }
        };
        results.push(SearchResult {
            keyword: keyword.clone(),
            position,
        });
    }

    let analysis = KeywordAnalysis {
        product,
        keywords: keywords.to_vec(),
        results,
    };
    info!(
        article,
        keywords = analysis.keywords.len(),
        found = analysis.found_count(),
        "Keyword analysis completed"
    );
    analysis
}
