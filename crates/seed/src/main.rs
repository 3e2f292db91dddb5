//! Demo catalog seeding.
//!
//! Inserts a demo store's product catalog so the create-order flow has
//! products to resolve. Run it once against an empty database:
//!
//! ```text
//! SEED_STORE_ID=<store uuid> cargo run -p seed
//! ```

use anyhow::{Context, Result};
use app_config::AppConfig;
use fake::{Fake, Faker};
use rand::seq::SliceRandom;
use tokio_postgres::NoTls;
use tracing::{error, info};
use uuid::Uuid;

const CATEGORIES: &[&str] = &[
    "Молочные продукты",
    "Выпечка",
    "Мясо",
    "Овощи и фрукты",
    "Напитки",
    "Другое",
];

const PRODUCTS_PER_STORE: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load().context("Failed to load config")?;
    let dsn = format!(
        "host={} port={} user={} password={} dbname={} sslmode=disable",
        config.db_host, config.db_port, config.db_user, config.db_password, config.db_name
    );

    let (client, connection) = tokio_postgres::connect(&dsn, NoTls)
        .await
        .context("Failed to connect to database")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Connection error: {}", e);
        }
    });

    // Reuse an existing store id when provided so repeated runs extend
    // the same demo store.
    let store_id =
        std::env::var("SEED_STORE_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());

    let mut inserted = 0u32;
    for _ in 0..PRODUCTS_PER_STORE {
        let category = CATEGORIES
            .choose(&mut rand::thread_rng())
            .expect("categories are not empty");
        let name = format!("{} {}", category, Faker.fake::<String>());
        let price: i64 = (50i64..1500i64).fake();
        let id = Uuid::new_v4().to_string();

        client
            .execute(
                "INSERT INTO products (id, name, price, store_id) VALUES ($1, $2, $3, $4)",
                &[&id, &name, &price, &store_id],
            )
            .await
            .context("Failed to insert product")?;
        inserted += 1;
    }

    info!(store_id = %store_id, "Seeded {} products", inserted);
    Ok(())
}
