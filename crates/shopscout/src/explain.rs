//! Grounded answers about previously shown products: single-product
//! explanation, review digests, and multi-product comparison.

use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::llm::ChatModel;
use crate::types::ProductOverview;

pub struct ProductExplainer {
    store: Arc<dyn CatalogStore>,
    model: Arc<dyn ChatModel>,
}

impl ProductExplainer {
    pub fn new(store: Arc<dyn CatalogStore>, model: Arc<dyn ChatModel>) -> Self {
        Self { store, model }
    }

    /// Answer a question about one product from its catalog record.
    pub async fn explain_product(&self, query: &str, product_id: &str) -> Result<String> {
        let overview = self.store.product_overview(product_id).await?;
        let context = render_overview(&overview);
        let prompt = format!(
            "Answer the user query based on the product details provided.\n{}\n{}",
            context, query
        );
        self.model.complete(&prompt).await
    }

    /// Answer a question from the product's customer reviews.
    pub async fn explain_reviews(&self, query: &str, product_id: &str) -> Result<String> {
        let reviews = self.store.product_reviews(product_id).await?;
        if reviews.is_empty() {
            return Ok("This product doesn't have any customer reviews yet.".to_string());
        }
        let blocks: Vec<String> = reviews
            .iter()
            .map(|r| format!("{}\nRating: {}\n{}", r.title, r.rating, r.text))
            .collect();
        let prompt = format!(
            "Answer the user query based on the product reviews provided.\n{}\n{}",
            blocks.join("\n\n"),
            query
        );
        self.model.complete(&prompt).await
    }

    /// Compare two or more products, answering as a markdown table.
    pub async fn compare_products(&self, query: &str, product_ids: &[String]) -> Result<String> {
        let mut descriptions = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            let overview = self.store.product_overview(product_id).await?;
            descriptions.push(render_overview(&overview));
        }
        let prompt = format!(
            "Compare the products based on the details provided and answer the user query. \
             Format your answer as a Markdown table.\n{}\n{}",
            descriptions.join("\n\n"),
            query
        );
        self.model.complete(&prompt).await
    }
}

fn render_overview(overview: &ProductOverview) -> String {
    let attributes: Vec<String> = overview
        .attributes
        .iter()
        .map(|a| format!("{}: {}", a.name, a.value))
        .collect();
    format!(
        "{}\nRating: {}/5 from {} reviews\n{}\n{}\n{}",
        overview.title,
        overview.average_rating,
        overview.rating_number,
        overview.features,
        overview.description,
        attributes.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeValue;

    #[test]
    fn test_render_overview_includes_rating_line_and_attributes() {
        let overview = ProductOverview {
            product_id: "p1".into(),
            title: "Gentle Cleanser".into(),
            average_rating: 4.6,
            rating_number: 812,
            features: "Fragrance free".into(),
            description: "A daily cleanser.".into(),
            attributes: vec![AttributeValue {
                name: "vegan".into(),
                value: "true".into(),
            }],
        };
        let rendered = render_overview(&overview);
        assert!(rendered.starts_with("Gentle Cleanser\nRating: 4.6/5 from 812 reviews"));
        assert!(rendered.contains("vegan: true"));
    }
}
