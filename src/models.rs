use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A dish read off the menu. Field names on the wire follow the Italian
/// schema the frontend consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Dish {
    /// Name of the dish
    #[serde(rename = "nome")]
    pub name: String,
    /// Course of the dish, e.g. Antipasto, Primo, Secondo, Dessert
    #[serde(rename = "categoria")]
    pub category: String,
    /// Description of the dish, or null
    #[serde(rename = "descrizione", default)]
    pub description: Option<String>,
    /// Price of the dish
    #[serde(rename = "prezzo")]
    #[schemars(range(min = 0))]
    pub price: f64,
    /// Filled in after extraction by the image generation pass.
    #[serde(default)]
    #[schemars(skip)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Drink {
    /// Name of the drink
    #[serde(rename = "nome")]
    pub name: String,
    /// Description of the drink, or null
    #[serde(rename = "descrizione", default)]
    pub description: Option<String>,
    /// Price of the drink
    #[serde(rename = "prezzo")]
    #[schemars(range(min = 0))]
    pub price: f64,
}

/// Structured menu, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Menu {
    /// Dishes listed on the menu
    #[serde(rename = "piatti", default)]
    pub dishes: Vec<Dish>,
    /// Drinks listed on the menu
    #[serde(rename = "bevande", default)]
    pub drinks: Vec<Drink>,
    /// Cover charge, or null
    #[serde(rename = "prezzo_coperto", default)]
    #[schemars(range(min = 0))]
    pub cover_charge: Option<f64>,
}

impl Menu {
    /// JSON schema handed to the model as the structured-output target.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Menu)).unwrap_or_default()
    }

    /// Describes the first negative price on the menu, if any.
    pub fn negative_price(&self) -> Option<String> {
        self.dishes
            .iter()
            .find(|d| d.price < 0.0)
            .map(|d| format!("dish '{}' has price {}", d.name, d.price))
            .or_else(|| {
                self.drinks
                    .iter()
                    .find(|d| d.price < 0.0)
                    .map(|d| format!("drink '{}' has price {}", d.name, d.price))
            })
            .or_else(|| {
                self.cover_charge
                    .filter(|c| *c < 0.0)
                    .map(|c| format!("cover charge is {}", c))
            })
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessMenuResponse {
    pub success: bool,
    pub data: Menu,
    pub message: String,
}
