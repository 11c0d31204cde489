use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    pub slug: String,
    pub price_in_cents: i64,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct ProductPrice {
    pub id: i64,
    pub product_id: String,
    pub price_in_cents: i64,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct OwnedProduct {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub purchased_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewProduct {
    pub shop_slug: String,
    pub name: String,
    pub price_in_cents: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price_in_cents: Option<i64>,
    pub shop_slug: Option<String>,
}

pub fn validate_product_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Product name cannot be empty.".to_string());
    }

    Ok(())
}

pub fn validate_price(price_in_cents: i64) -> Result<(), String> {
    if price_in_cents <= 0 {
        return Err(format!("Invalid price: {}.", price_in_cents));
    }

    Ok(())
}
