use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    nutrition::NutritionInput,
    types::{Patch, StringList, Upc},
};

/// Body of `POST /catalog`. Every field except `upc` is three-state.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    #[serde(default)]
    pub upc: Option<Upc>,
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub tags: Patch<StringList>,
    #[serde(default)]
    pub ingredients: Patch<StringList>,
    #[serde(default)]
    pub nutrition: Patch<NutritionInput>,
    // legacy top-level macros, applied after `nutrition`
    #[serde(default)]
    pub calories: Patch<f64>,
    #[serde(default)]
    pub protein: Patch<f64>,
    #[serde(default)]
    pub fat: Patch<f64>,
    #[serde(default)]
    pub carbs: Patch<f64>,
}

impl ProductPatch {
    pub(crate) fn macro_fields(&self) -> [(&'static str, &Patch<f64>); 4] {
        [
            ("calories", &self.calories),
            ("protein", &self.protein),
            ("fat", &self.fat),
            ("carbs", &self.carbs),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub upc: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedProduct {
    pub id: Uuid,
}
