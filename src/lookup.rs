use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{
    catalog::ProductSeed,
    config::LookupConfig,
    nutrition::Nutrition,
    types::{StringList, Upc},
};

lazy_static! {
    static ref LANG_PREFIX: Regex = Regex::new(r"^[a-z]{2,3}:").unwrap();
}

const NUTRIMENTS: [(&str, &str); 6] = [
    ("energy-kcal_100g", "calories"),
    ("proteins_100g", "protein"),
    ("fat_100g", "fat"),
    ("carbohydrates_100g", "carbs"),
    ("fiber_100g", "fiber"),
    ("sugars_100g", "sugars"),
];

/// External product reference used to identify a UPC nobody has named yet.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// `Ok(None)` when the reference has no usable record for the code.
    async fn lookup(&self, upc: &Upc) -> anyhow::Result<Option<ProductSeed>>;
}

pub struct NoLookup;

#[async_trait]
impl ProductLookup for NoLookup {
    async fn lookup(&self, _upc: &Upc) -> anyhow::Result<Option<ProductSeed>> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct OpenFoodFacts {
    client: reqwest::Client,
    base_url: String,
}

impl OpenFoodFacts {
    pub fn new(config: &LookupConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("pantry/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build openfoodfacts client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProductLookup for OpenFoodFacts {
    async fn lookup(&self, upc: &Upc) -> anyhow::Result<Option<ProductSeed>> {
        let url = format!("{}/api/v2/product/{}.json", self.base_url, upc);
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("openfoodfacts request")?
            .json()
            .await
            .context("openfoodfacts response body")?;

        if body.get("status").and_then(Value::as_i64) != Some(1) {
            debug!(upc = %upc, "openfoodfacts has no record");
            return Ok(None);
        }
        Ok(body.get("product").map(seed_from_product))
    }
}

fn strings(v: Option<&Value>) -> impl Iterator<Item = &str> {
    v.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

pub(crate) fn seed_from_product(p: &Value) -> ProductSeed {
    let name = ["product_name", "product_name_en", "generic_name"]
        .iter()
        .filter_map(|k| p.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned);

    let tags = StringList::normalized(
        strings(p.get("categories_tags"))
            .chain(strings(p.get("labels_tags")))
            .map(|t| LANG_PREFIX.replace(t, "").into_owned()),
    )
    .into_vec();

    let listed: Vec<&str> = p
        .get("ingredients")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|i| i.get("text").and_then(Value::as_str))
        .collect();
    let ingredients = if listed.is_empty() {
        let text = p.get("ingredients_text").and_then(Value::as_str).unwrap_or("");
        StringList::normalized(text.split(',')).into_vec()
    } else {
        StringList::normalized(listed).into_vec()
    };

    let nutrition: Nutrition = match p.get("nutriments") {
        Some(n) => NUTRIMENTS
            .iter()
            .filter_map(|(from, to)| {
                let v = n.get(*from).and_then(Value::as_f64)?;
                (v.is_finite() && v > 0.0).then(|| (to.to_string(), v))
            })
            .collect(),
        None => Nutrition::default(),
    };

    ProductSeed {
        name,
        tags,
        ingredients,
        nutrition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalises_an_openfoodfacts_record() {
        let seed = seed_from_product(&json!({
            "product_name": "  ",
            "product_name_en": " Peanut Butter ",
            "categories_tags": ["en:spreads", "fr:spreads", "en:nut-butters"],
            "labels_tags": ["en:vegan"],
            "ingredients_text": "peanuts, salt, Salt, ",
            "nutriments": {
                "energy-kcal_100g": 588,
                "proteins_100g": 25.1,
                "fat_100g": "50",
                "sugars_100g": 0
            }
        }));
        assert_eq!(seed.name.as_deref(), Some("Peanut Butter"));
        assert_eq!(seed.tags, vec!["spreads", "nut-butters", "vegan"]);
        assert_eq!(seed.ingredients, vec!["peanuts", "salt"]);
        assert_eq!(seed.nutrition.get("calories"), Some(588.0));
        assert_eq!(seed.nutrition.get("protein"), Some(25.1));
        assert_eq!(seed.nutrition.get("fat"), None);
        assert_eq!(seed.nutrition.get("sugars"), None);
    }

    #[test]
    fn structured_ingredients_win_over_text() {
        let seed = seed_from_product(&json!({
            "generic_name": "Crackers",
            "ingredients": [{ "text": "wheat" }, { "text": "Wheat" }, { "id": "en:oil" }],
            "ingredients_text": "ignored"
        }));
        assert_eq!(seed.name.as_deref(), Some("Crackers"));
        assert_eq!(seed.ingredients, vec!["wheat"]);
        assert!(seed.nutrition.is_empty());
    }

    #[tokio::test]
    async fn no_lookup_never_answers() {
        let upc = Upc::parse("0001").unwrap();
        assert!(NoLookup.lookup(&upc).await.unwrap().is_none());
    }
}
