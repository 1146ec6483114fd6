use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FoodError;

/// Nutrient keys a product may carry; energy in kcal, macros in grams, the rest as suffixed.
pub const NUTRIENT_KEYS: &[&str] = &[
    "calories",
    "protein",
    "fat",
    "carbs",
    "fiber",
    "sugars",
    "saturated_fat",
    "trans_fat",
    "cholesterol_mg",
    "sodium_mg",
    "potassium_mg",
    "calcium_mg",
    "iron_mg",
    "magnesium_mg",
    "phosphorus_mg",
    "zinc_mg",
    "selenium_mcg",
    "copper_mg",
    "manganese_mg",
    "vitamin_a_mcg",
    "vitamin_c_mg",
    "vitamin_d_mcg",
    "vitamin_e_mg",
    "vitamin_k_mcg",
    "thiamin_mg",
    "riboflavin_mg",
    "niacin_mg",
    "vitamin_b6_mg",
    "folate_mcg",
    "vitamin_b12_mcg",
];

/// Client-supplied nutrition where `null` entries mean "leave this key out".
pub type NutritionInput = BTreeMap<String, Option<f64>>;

/// Amount of each nutrient in one unit of a product (or in one log entry).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nutrition(BTreeMap<String, f64>);

impl Nutrition {
    pub fn from_input(input: NutritionInput) -> Result<Self, FoodError> {
        let mut out = Nutrition::default();
        for (key, value) in input {
            if let Some(value) = value {
                out.set(&key, value)?;
            } else {
                check_key(&key)?;
            }
        }
        Ok(out)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn set(&mut self, key: &str, value: f64) -> Result<(), FoodError> {
        check_key(key)?;
        if !value.is_finite() || value < 0.0 {
            return Err(FoodError::validation(format!(
                "nutrition value for {key} must be a non-negative number"
            )));
        }
        self.0.insert(key.to_owned(), value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    /// Key-by-key overwrite; keys missing from `other` stay as they are.
    pub fn merge(&mut self, other: &Nutrition) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), *v);
        }
    }

    pub fn scaled(&self, factor: f64) -> Nutrition {
        Nutrition(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect())
    }

    /// Adds every value of `other` onto this map.
    pub fn accumulate(&mut self, other: &Nutrition) {
        for (k, v) in &other.0 {
            *self.0.entry(k.clone()).or_insert(0.0) += v;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for Nutrition {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Nutrition(iter.into_iter().collect())
    }
}

fn check_key(key: &str) -> Result<(), FoodError> {
    if NUTRIENT_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(FoodError::validation(format!("unknown nutrition key: {key}")))
    }
}
