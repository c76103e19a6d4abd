use std::env;

use vidz_backend::config::AppConfig;
use vidz_backend::db::{self, PgStore, Store, StoreError};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let names: Vec<String> = env::args()
        .skip(1)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        eprintln!("Usage: cargo run --bin seed-tags <TAG> [TAG...]");
        std::process::exit(1);
    }

    let Some(db_config) = AppConfig::from_env().database else {
        eprintln!("DATABASE_URL must be set");
        std::process::exit(1);
    };

    let pool = match db::init_pool(&db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = db::run_migrations(&pool).await {
        eprintln!("Error running migrations: {}", e);
        std::process::exit(1);
    }

    let store = PgStore::new(pool);
    for name in &names {
        match store.create_tag(name).await {
            Ok(tag) => println!("created  {:>4}  {}", tag.id, tag.name),
            Err(StoreError::Conflict) => println!("exists         {}", name),
            Err(e) => {
                eprintln!("Error creating tag {}: {}", name, e);
                std::process::exit(1);
            }
        }
    }
}
