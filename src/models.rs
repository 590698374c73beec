//! # Analysis Data Model
//!
//! Data structures produced by a product analysis: the product card shown
//! to the user and the rank of the product for every extracted keyword.

use serde::{Deserialize, Serialize};

/// Product information shown next to the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    /// Wildberries article (nm id)
    pub id: u64,
    pub name: String,
    pub brand: String,
    /// Price in roubles
    pub price: f64,
    pub rating: f64,
    pub feedbacks: u32,
    pub image_url: String,
    /// Link the user sent
    pub url: String,
}

impl ProductDetails {
    /// Minimal card used when the detail endpoint gives nothing usable
    pub fn placeholder(id: u64, image_url: String, url: &str) -> Self {
        Self {
            id,
            name: format!("Товар {id}"),
            brand: String::new(),
            price: 0.0,
            rating: 0.0,
            feedbacks: 0,
            image_url,
            url: url.to_string(),
        }
    }
}

/// Rank of the product for one search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub keyword: String,
    /// 1-based position; `None` when not found within the searched range
    pub position: Option<u32>,
}

/// Complete keyword analysis for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordAnalysis {
    pub product: ProductDetails,
    /// Keywords extracted by the LLM
    pub keywords: Vec<String>,
    pub results: Vec<SearchResult>,
}

impl KeywordAnalysis {
    /// Number of keywords the product ranks for
    pub fn found_count(&self) -> usize {
        self.results.iter().filter(|r| r.position.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_product() {
        let product = ProductDetails::placeholder(182803851, "img".to_string(), "link");
        assert_eq!(product.name, "Товар 182803851");
        assert_eq!(product.price, 0.0);
        assert_eq!(product.url, "link");
    }

    #[test]
    fn test_found_count() {
        let analysis = KeywordAnalysis {
            product: ProductDetails::placeholder(1, String::new(), ""),
            keywords: vec!["a".to_string(), "b".to_string()],
            results: vec![
                SearchResult { keyword: "a".to_string(), position: Some(3) },
                SearchResult { keyword: "b".to_string(), position: None },
            ],
        };
        assert_eq!(analysis.found_count(), 1);
    }
}
