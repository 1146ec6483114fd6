use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    nutrition::NutritionInput,
    types::{StringList, Upc},
};

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StockItem {
    pub upc: Upc,
    pub quantity: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<StringList>,
    #[serde(default)]
    pub ingredients: Option<StringList>,
    #[serde(default)]
    pub nutrition: Option<NutritionInput>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddRequest {
    pub items: Vec<StockItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumeRequest {
    pub upc: Upc,
    #[serde(default = "one")]
    pub units: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveRequest {
    pub upc: Upc,
    #[serde(default = "one")]
    pub units: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub view: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedRow {
    pub id: Uuid,
}
