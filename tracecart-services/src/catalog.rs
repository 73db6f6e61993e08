//! Static product data shared by the catalog, recommendation, and checkout
//! services.

use serde::Serialize;

use crate::outcome::{pick, OutcomeSampler};

/// One catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub price: f64,
    pub categories: &'static [&'static str],
}

/// The fixed demo catalog.
pub const PRODUCTS: [Product; 9] = [
    Product { id: "OLJCESPC7Z", name: "Sunglasses", description: "High quality sunglasses", price: 19.99, categories: &["accessories"] },
    Product { id: "66VCHSJNUP", name: "Tank Top", description: "Comfortable tank top", price: 18.99, categories: &["clothing"] },
    Product { id: "1YMWWN1N4O", name: "Watch", description: "Classic wristwatch", price: 109.99, categories: &["accessories"] },
    Product { id: "L9ECAV7KIM", name: "Loafers", description: "Leather loafers", price: 89.99, categories: &["footwear"] },
    Product { id: "2ZYFJ3GM2N", name: "Hairdryer", description: "Professional hairdryer", price: 24.99, categories: &["beauty"] },
    Product { id: "0PUK6V6EV0", name: "Candle Holder", description: "Decorative candle holder", price: 15.99, categories: &["home"] },
    Product { id: "LS4PSXUNUM", name: "Salt Shaker", description: "Ceramic salt shaker", price: 9.99, categories: &["home"] },
    Product { id: "9SIQT8TOJO", name: "Bamboo Glass Jar", description: "Eco-friendly glass jar", price: 14.99, categories: &["home"] },
    Product { id: "6E92ZMYYFZ", name: "Mug", description: "Ceramic coffee mug", price: 12.99, categories: &["home"] },
];

/// Look a product up by id.
pub fn find(id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.id == id)
}

/// A uniformly random product.
pub fn random_product(sampler: &dyn OutcomeSampler) -> &'static Product {
    pick(sampler, &PRODUCTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FixedSampler;

    #[test]
    fn find_known_and_unknown() {
        assert_eq!(find("OLJCESPC7Z").map(|p| p.name), Some("Sunglasses"));
        assert!(find("NOPE").is_none());
    }

    #[test]
    fn random_product_is_from_the_catalog() {
        let product = random_product(&FixedSampler::never());
        assert!(find(product.id).is_some());
    }
}
