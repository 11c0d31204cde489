use serde::{Deserialize, Serialize};

use super::products::Product;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Shop {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub min_price_in_cents: i64,
    pub max_price_in_cents: i64,
    pub created_at: chrono::NaiveDateTime,
}

impl Shop {
    pub fn accepts_price(&self, price_in_cents: i64) -> bool {
        (self.min_price_in_cents..=self.max_price_in_cents).contains(&price_in_cents)
    }

    /// Products inside this shop's range that `updated` would leave outside it.
    /// Products already outside the range are not counted.
    pub fn excluded_by<'a>(&self, updated: &Shop, products: &'a [Product]) -> Vec<&'a Product> {
        products
            .iter()
            .filter(|p| self.accepts_price(p.price_in_cents) && !updated.accepts_price(p.price_in_cents))
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ShopDetails {
    #[serde(flatten)]
    pub shop: Shop,
    pub products: Vec<Product>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewShop {
    pub name: String,
    pub image_url: Option<String>,
    pub min_price_in_cents: i64,
    pub max_price_in_cents: i64,
}

impl NewShop {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Shop name cannot be empty.".to_string());
        }
        validate_bucket(self.min_price_in_cents, self.max_price_in_cents)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ShopUpdate {
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub min_price_in_cents: Option<i64>,
    pub max_price_in_cents: Option<i64>,
}

impl ShopUpdate {
    /// Merges the update into `shop`, returning the validated result.
    pub fn apply(&self, shop: &Shop) -> Result<Shop, String> {
        let mut updated = shop.clone();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("Shop name cannot be empty.".to_string());
            }
            updated.name = name.trim().to_string();
        }
        if let Some(image_url) = &self.image_url {
            updated.image_url = Some(image_url.clone());
        }
        if let Some(min) = self.min_price_in_cents {
            updated.min_price_in_cents = min;
        }
        if let Some(max) = self.max_price_in_cents {
            updated.max_price_in_cents = max;
        }

        validate_bucket(updated.min_price_in_cents, updated.max_price_in_cents)?;
        Ok(updated)
    }
}

fn validate_bucket(min: i64, max: i64) -> Result<(), String> {
    if min < 0 || max < 0 {
        return Err("Price range cannot be negative.".to_string());
    }
    if min > max {
        return Err(format!("Invalid price range: {} > {}.", min, max));
    }

    Ok(())
}
